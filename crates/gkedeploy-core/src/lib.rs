//! gkedeploy Core - Core types for the single-shot GKE deployment step
//!
//! This crate provides the foundational types used throughout gkedeploy:
//! - `DeployConfig`: Validated run configuration (cluster location, templates, waits)
//! - `credentials`: Service-account token decoding and project inference
//! - `vars`: Built-in, user and secret template variables with shadowing protection
//! - `namespace`: Namespace sanitization and the Namespace manifest

pub mod config;
pub mod credentials;
pub mod error;
pub mod namespace;
pub mod vars;

pub use config::{
    BuildInfo, ClusterLocation, DeployConfig, DeployParams, KUBECTL, TemplatePaths, WaitConfig,
    kubectl_program,
};
pub use credentials::{decode_token, project_from_token};
pub use error::{CoreError, Result};
pub use namespace::{namespace_manifest, sanitize_namespace};
pub use vars::{
    REDACTED, SecretMap, TemplateData, VarMap, VarResolver, VarValue, builtin_vars,
    collect_os_secrets, collect_secrets, expand_env, is_secret_key, is_secret_os_key, parse_vars,
};
