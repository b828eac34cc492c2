//! Namespace name sanitization and manifest generation

use once_cell::sync::Lazy;
use regex::Regex;

static INVALID_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9.\-]+").expect("valid regex"));

/// Lowercase the name and collapse every run of characters outside
/// `[a-z0-9.-]` into a single hyphen
#[must_use]
pub fn sanitize_namespace(namespace: &str) -> String {
    let lower = namespace.to_lowercase();
    INVALID_NAME_CHARS.replace_all(&lower, "-").into_owned()
}

/// Minimal Namespace manifest, applied so that creation is idempotent
#[must_use]
pub fn namespace_manifest(namespace: &str) -> String {
    format!(
        "\n---\napiVersion: v1\nkind: Namespace\nmetadata:\n  name: {}\n",
        namespace
    )
}
