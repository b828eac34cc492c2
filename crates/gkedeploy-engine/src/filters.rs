//! Template filters for Kubernetes manifests

use std::cmp::Ordering;

use base64::Engine as _;
use minijinja::value::ValueKind;
use minijinja::{Error, ErrorKind, Value};

/// Convert a value to YAML format
///
/// Usage: {{ .config | toyaml }}
pub fn toyaml(value: Value) -> Result<String, Error> {
    let json_value: serde_json::Value = serde_json::to_value(&value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;

    let yaml = serde_yaml::to_string(&json_value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;

    Ok(yaml.trim_start_matches("---\n").trim_end().to_string())
}

/// Convert a value to JSON format
///
/// Usage: {{ .config | tojson }}
pub fn tojson(value: Value) -> Result<String, Error> {
    serde_json::to_string(&value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
}

/// Base64 encode a string
///
/// Usage: {{ .password | b64encode }}
#[must_use]
pub fn b64encode(value: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

/// Base64 decode a string
///
/// Usage: {{ .SECRET_BASE64_CERT | b64decode }}
pub fn b64decode(value: String) -> Result<String, Error> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(value.as_bytes())
        .map_err(|e| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("base64 decode error: {}", e),
            )
        })?;

    String::from_utf8(decoded)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("UTF-8 decode error: {}", e)))
}

fn as_text(value: &Value) -> String {
    value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

/// Quote a string with double quotes
///
/// Usage: {{ .BUILD_NUMBER | quote }}
#[must_use]
pub fn quote(value: Value) -> String {
    let s = as_text(&value);
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Quote a string with single quotes
#[must_use]
pub fn squote(value: Value) -> String {
    format!("'{}'", as_text(&value).replace('\'', "''"))
}

/// Indent every non-empty line by `spaces`
///
/// Usage: {{ .config | toyaml | indent 4 }}
#[must_use]
pub fn indent(value: String, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    value
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Like `indent`, prefixed with a newline
///
/// Usage: {{ .config | toyaml | nindent 4 }}
#[must_use]
pub fn nindent(value: String, spaces: usize) -> String {
    format!("\n{}", indent(value, spaces))
}

/// Key/value pairs for Go-style `range`
///
/// Sequences yield `(index, item)` and maps yield `(key, value)` in key
/// order; none yields nothing.
///
/// Backs `{{ range $name, $value := .labels }}`.
pub fn entries(value: Value) -> Result<Value, Error> {
    let pairs: Vec<Value> = match value.kind() {
        ValueKind::None | ValueKind::Undefined => Vec::new(),
        ValueKind::Map => {
            let mut keys: Vec<Value> = value.try_iter()?.collect();
            keys.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
            keys.into_iter()
                .map(|key| {
                    let item = value.get_item(&key)?;
                    Ok(Value::from(vec![key, item]))
                })
                .collect::<Result<_, Error>>()?
        }
        ValueKind::Seq => value
            .try_iter()?
            .enumerate()
            .map(|(index, item)| Value::from(vec![Value::from(index), item]))
            .collect(),
        _ => {
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("range can't iterate over {}", value),
            ));
        }
    };
    Ok(Value::from(pairs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toyaml() {
        let value = Value::from_serialize(serde_json::json!({
            "name": "test",
            "port": 8080
        }));
        let yaml = toyaml(value).unwrap();
        assert!(yaml.contains("name: test"));
        assert!(yaml.contains("port: 8080"));
    }

    #[test]
    fn test_tojson() {
        let value = Value::from_serialize(serde_json::json!(["a", 1]));
        assert_eq!(tojson(value).unwrap(), r#"["a",1]"#);
    }

    #[test]
    fn test_b64encode_decode() {
        assert_eq!(b64encode("test0".to_string()), "dGVzdDA=");
        assert_eq!(b64decode("dGVzdDA=".to_string()).unwrap(), "test0");
        assert!(b64decode("not base64!".to_string()).is_err());
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote(Value::from("test")), "\"test\"");
        assert_eq!(quote(Value::from(42)), "\"42\"");
        assert_eq!(quote(Value::from("say \"hi\"")), "\"say \\\"hi\\\"\"");
        assert_eq!(squote(Value::from("it's")), "'it''s'");
    }

    #[test]
    fn test_indent() {
        assert_eq!(indent("a\n\nb".to_string(), 2), "  a\n\n  b");
        assert_eq!(nindent("line1\nline2".to_string(), 4), "\n    line1\n    line2");
    }

    #[test]
    fn test_entries() {
        let list = Value::from_serialize(serde_json::json!(["a", "b"]));
        assert_eq!(entries(list).unwrap().to_string(), r#"[[0, "a"], [1, "b"]]"#);

        let map = Value::from_serialize(serde_json::json!({"b": 2, "a": 1}));
        assert_eq!(entries(map).unwrap().to_string(), r#"[["a", 1], ["b", 2]]"#);

        assert_eq!(entries(Value::from(())).unwrap().to_string(), "[]");
        assert!(entries(Value::from(3)).is_err());
    }
}
