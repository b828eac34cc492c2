//! Template variables: built-ins, user vars and secrets
//!
//! Three tiers are merged into the data views the templates render against:
//!
//! 1. Built-in variables (build metadata and cluster coordinates)
//! 2. User variables, supplied as a JSON object
//! 3. Secrets, taken from `SECRET_*` environment variables
//!
//! No tier may redefine a key from an earlier tier. The resource template only
//! ever sees tiers 1 and 2 (`TemplateData::public`); the secret template sees
//! all three (`TemplateData::secret`).

use std::ffi::{OsStr, OsString};

use base64::Engine as _;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::config::{BuildInfo, ClusterLocation};
use crate::error::{CoreError, Result};

/// Prefix marking an environment variable as a secret
pub const SECRET_PREFIX: &str = "SECRET_";

/// Prefix marking a secret whose value is already base64 encoded
pub const SECRET_BASE64_PREFIX: &str = "SECRET_BASE64_";

/// Placeholder shown instead of secret values in debug output
pub const REDACTED: &str = "VALUE REDACTED";

/// A schema-free template variable value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<VarValue>),
    Map(VarMap),
}

impl From<&str> for VarValue {
    fn from(value: &str) -> Self {
        VarValue::String(value.to_string())
    }
}

impl From<String> for VarValue {
    fn from(value: String) -> Self {
        VarValue::String(value)
    }
}

/// Ordered variable map
pub type VarMap = IndexMap<String, VarValue>;

/// Secret name to base64 value
pub type SecretMap = IndexMap<String, String>;

/// Parse the user variables JSON object; an empty string yields no variables
pub fn parse_vars(json: &str) -> Result<VarMap> {
    if json.trim().is_empty() {
        return Ok(VarMap::new());
    }
    Ok(serde_json::from_str(json)?)
}

/// Whether an environment variable name carries a secret
#[must_use]
pub fn is_secret_key(key: &str) -> bool {
    key.starts_with(SECRET_PREFIX)
}

/// Whether a raw environment variable name carries a secret
#[must_use]
pub fn is_secret_os_key(key: &OsStr) -> bool {
    key.as_encoded_bytes().starts_with(SECRET_PREFIX.as_bytes())
}

/// Collect secrets from raw process environment pairs
///
/// A secret whose name or value is not valid UTF-8 is an error, never
/// silently skipped.
pub fn collect_os_secrets<I>(env: I) -> Result<SecretMap>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let mut pairs = Vec::new();

    for (key, value) in env {
        if !is_secret_os_key(&key) {
            continue;
        }
        let name = key.to_string_lossy().into_owned();
        let (Ok(key), Ok(value)) = (key.into_string(), value.into_string()) else {
            return Err(CoreError::SecretNotUnicode { key: name });
        };
        pairs.push((key, value));
    }

    collect_secrets(pairs)
}

/// Collect secrets from environment-style key/value pairs
///
/// Values of `SECRET_BASE64_*` keys are kept as-is; every other secret is
/// base64 encoded, since Kubernetes Secret data must be base64.
pub fn collect_secrets<I, K, V>(env: I) -> Result<SecretMap>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let mut secrets = SecretMap::new();

    for (key, value) in env {
        let key = key.into();
        if !is_secret_key(&key) {
            continue;
        }

        let value = value.into();
        if secrets.contains_key(&key) {
            return Err(CoreError::SecretShadowsVar { key });
        }
        if value.is_empty() {
            return Err(CoreError::EmptySecret { key });
        }

        let stored = if key.starts_with(SECRET_BASE64_PREFIX) {
            value
        } else {
            base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
        };
        secrets.insert(key, stored);
    }

    Ok(secrets)
}

/// Build the built-in variables
///
/// The cluster location is exposed as `zone` or `region`, whichever was
/// configured.
pub fn builtin_vars(
    build: &BuildInfo,
    project: &str,
    location: &ClusterLocation,
    cluster: &str,
    namespace: &str,
) -> VarMap {
    let mut vars = VarMap::new();
    vars.insert("BUILD_NUMBER".into(), build.build_number.as_str().into());
    vars.insert("COMMIT".into(), build.commit.as_str().into());
    vars.insert("BRANCH".into(), build.branch.as_str().into());
    vars.insert("TAG".into(), build.tag.as_str().into());
    vars.insert("project".into(), project.into());
    vars.insert(location.var_name().into(), location.name().into());
    vars.insert("cluster".into(), cluster.into());
    vars.insert("namespace".into(), namespace.into());
    vars
}

// `${name}`, an unclosed `${`, a one-character special name (`$1`, `$*`, ...)
// or an alphanumeric run
static ENV_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(?:\{([^}]*)\}|(\{)|([*#$@!?0-9-])|([A-Za-z0-9_]+))").expect("valid regex")
});

/// Expand `$NAME` and `${NAME}` references the way a POSIX-style shell
/// expansion does
///
/// Unknown names expand to "". Special names such as `$1` or `$*` are looked
/// up like any other. `${}` and an unclosed `${` expand to nothing. A `$` not
/// followed by a name is kept.
pub fn expand_env<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ENV_REFERENCE
        .replace_all(input, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str())
                .unwrap_or_default();
            if name.is_empty() {
                return String::new();
            }
            lookup(name).unwrap_or_default()
        })
        .into_owned()
}

/// The data views produced by variable resolution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateData {
    /// Built-ins and user vars; the only view the resource template sees
    pub public: VarMap,
    /// `public` plus secrets; bound to the secret template
    pub secret: VarMap,
    /// Secret names mapped to [`REDACTED`], for debug output
    pub redacted: IndexMap<String, String>,
}

type EnvLookup<'a> = Box<dyn Fn(&str) -> Option<String> + 'a>;

/// Merges the variable tiers while enforcing the no-shadowing rule
#[derive(Default)]
pub struct VarResolver<'a> {
    expand_env: Option<EnvLookup<'a>>,
}

impl<'a> VarResolver<'a> {
    pub fn new() -> Self {
        Self { expand_env: None }
    }

    /// Expand environment references in string user vars using `lookup`
    pub fn expand_env_with<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + 'a,
    {
        self.expand_env = Some(Box::new(lookup));
        self
    }

    /// Expand environment references against the process environment
    pub fn expand_process_env(self) -> Self {
        self.expand_env_with(|name| std::env::var(name).ok())
    }

    /// Merge the tiers into the three data views
    pub fn resolve(
        &self,
        builtins: VarMap,
        vars: VarMap,
        secrets: SecretMap,
    ) -> Result<TemplateData> {
        let mut public = builtins;

        for (key, value) in vars {
            if public.contains_key(&key) {
                return Err(CoreError::VarShadowsVar { key });
            }

            let value = match (&self.expand_env, value) {
                (Some(lookup), VarValue::String(raw)) => {
                    VarValue::String(expand_env(&raw, |name| lookup(name)))
                }
                (_, value) => value,
            };
            public.insert(key, value);
        }

        let mut secret = public.clone();
        let mut redacted = IndexMap::new();

        for (key, value) in secrets {
            if secret.contains_key(&key) {
                return Err(CoreError::SecretShadowsVar { key });
            }
            if value.is_empty() {
                return Err(CoreError::EmptySecret { key });
            }

            redacted.insert(key.clone(), REDACTED.to_string());
            secret.insert(key, VarValue::String(value));
        }

        Ok(TemplateData {
            public,
            secret,
            redacted,
        })
    }
}
