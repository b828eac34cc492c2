//! Service-account credential handling
//!
//! The token may be supplied either as the raw service-account JSON or as a
//! base64 encoding of it. Both forms are accepted transparently.

use base64::Engine as _;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    #[serde(default)]
    project_id: String,
}

/// Return the service-account JSON, decoding it first if it is base64-wrapped
pub fn decode_token(token: &str) -> String {
    let trimmed = token.trim();
    match base64::engine::general_purpose::STANDARD.decode(trimmed.as_bytes()) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(decoded) => decoded,
            Err(_) => token.to_string(),
        },
        Err(_) => token.to_string(),
    }
}

/// Extract `project_id` from service-account JSON
///
/// Returns `None` when the token does not parse or carries no project.
pub fn project_from_token(token: &str) -> Option<String> {
    let key: ServiceAccountKey = serde_json::from_str(token).ok()?;
    if key.project_id.is_empty() {
        None
    } else {
        Some(key.project_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = r#"{
  "type": "service_account",
  "project_id": "nyt-project-dev",
  "private_key": "shhh"
}"#;

    #[test]
    fn test_decode_raw_token() {
        assert_eq!(decode_token(KEY), KEY);
    }

    #[test]
    fn test_decode_base64_token() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(KEY);
        assert_eq!(decode_token(&encoded), KEY);
    }

    #[test]
    fn test_decode_base64_with_trailing_newline() {
        let encoded = format!(
            "{}\n",
            base64::engine::general_purpose::STANDARD.encode(KEY)
        );
        assert_eq!(decode_token(&encoded), KEY);
    }

    #[test]
    fn test_project_from_token() {
        assert_eq!(
            project_from_token(r#"{"project_id":"test-project"}"#),
            Some("test-project".to_string())
        );
        assert_eq!(project_from_token(KEY), Some("nyt-project-dev".to_string()));
    }

    #[test]
    fn test_project_from_invalid_token() {
        assert_eq!(project_from_token("{\"key\", \"val\"}"), None);
        assert_eq!(project_from_token("{}"), None);
    }
}
