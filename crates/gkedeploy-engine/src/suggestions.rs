//! Suggestions for template errors
//!
//! Only key names are ever compared or shown; values never appear in a
//! suggestion, so these are safe to print for secret templates too.

use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum Levenshtein distance to consider for suggestions
const MAX_SUGGESTION_DISTANCE: usize = 3;

static ACTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{(.*?)\}\}").expect("valid regex"));

// `.a.b` or `$.a.b`, but not the `.b` of `$x.b` or `1.5`
static FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^\w$.)\]])\$?\.([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)")
        .expect("valid regex")
});

/// Find the field reference on a template line most likely to be undefined
///
/// Prefers a reference whose root name is not bound at all; otherwise the
/// first nested reference on the line.
pub fn undefined_expression_on_line(line: &str, keys: &[&str]) -> Option<String> {
    let fields: Vec<&str> = ACTION
        .captures_iter(line)
        .filter_map(|caps| caps.get(1))
        .flat_map(|action| {
            FIELD
                .captures_iter(action.as_str())
                .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        })
        .collect();

    fields
        .iter()
        .find(|field| !keys.contains(&root_name(field)))
        .or_else(|| fields.iter().find(|field| field.contains('.')))
        .map(|field| field.to_string())
}

fn root_name(expr: &str) -> &str {
    expr.split('.').next().unwrap_or(expr)
}

/// Suggest the closest bound key names for an undefined expression
pub fn suggest_undefined_variable(expr: &str, keys: &[&str]) -> Option<String> {
    let name = root_name(expr);

    let mut matches: Vec<(usize, &str)> = keys
        .iter()
        .map(|key| (strsim::levenshtein(name, key), *key))
        .filter(|(distance, _)| *distance > 0 && *distance <= MAX_SUGGESTION_DISTANCE)
        .collect();
    matches.sort_by_key(|(distance, _)| *distance);
    matches.truncate(3);

    if matches.is_empty() {
        return None;
    }

    let names: Vec<String> = matches.iter().map(|(_, key)| format!("`{}`", key)).collect();
    Some(format!("Did you mean {}?", names.join(" or ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYS: &[&str] = &["COMMIT", "BRANCH", "image", "namespace"];

    #[test]
    fn test_undefined_expression_on_line() {
        assert_eq!(
            undefined_expression_on_line("name: {{ .COMMIT }}-{{ .COMIT }}", KEYS),
            Some("COMIT".to_string())
        );
        assert_eq!(
            undefined_expression_on_line("tag: {{ .image.digest | quote }}", KEYS),
            Some("image.digest".to_string())
        );
        assert_eq!(
            undefined_expression_on_line("{{ if eq $.BRANCH .BRANCHE }}", KEYS),
            Some("BRANCHE".to_string())
        );
        assert_eq!(undefined_expression_on_line("{{ $x.foo }} {{ 1.5 }}", KEYS), None);
        assert_eq!(undefined_expression_on_line("plain .text", KEYS), None);
    }

    #[test]
    fn test_suggest_undefined_variable() {
        assert_eq!(
            suggest_undefined_variable("COMIT", KEYS),
            Some("Did you mean `COMMIT`?".to_string())
        );
        assert_eq!(suggest_undefined_variable("SECRET_TEST", KEYS), None);
    }
}
