//! CLI error types with exit code handling
//!
//! Every library error is mapped into a [`CliError`], whose variant decides
//! the process exit code.

use gkedeploy_core::CoreError;
use gkedeploy_engine::{EngineError, TemplateError};
use gkedeploy_kube::KubeError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Missing or conflicting parameters
    #[error("{message}")]
    #[diagnostic(code(gkedeploy::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Template rendering failed, with source location
    #[error(transparent)]
    #[diagnostic(transparent)]
    Render(TemplateError),

    /// Template file missing or not writable
    #[error("{message}")]
    #[diagnostic(code(gkedeploy::cli::template))]
    Template { message: String },

    /// Vars could not be parsed, a key is shadowed or a secret is empty
    #[error("{message}")]
    #[diagnostic(code(gkedeploy::cli::vars))]
    Vars {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(gkedeploy::cli::io))]
    Io { message: String },

    /// gcloud or kubectl failed
    #[error("Error: {message}")]
    #[diagnostic(code(gkedeploy::cli::command))]
    Command { message: String },

    /// The secret manifest failed to apply; output withheld
    #[error("{message}")]
    #[diagnostic(code(gkedeploy::cli::secret))]
    Redacted { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Render(_) | CliError::Template { .. } => exit_codes::TEMPLATE_ERROR,
            CliError::Vars { .. } => exit_codes::VARS_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Command { .. } | CliError::Redacted { .. } => exit_codes::COMMAND_ERROR,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::MissingParam { .. } | CoreError::InvalidParams { .. } => CliError::Config {
                message: err.to_string(),
                help: None,
            },
            CoreError::InvalidVars(_) => CliError::Vars {
                message: err.to_string(),
                help: Some("vars must be a JSON object, e.g. {\"replicas\": 3}".to_string()),
            },
            _ if err.is_shadowing() => CliError::Vars {
                message: err.to_string(),
                help: Some("built-in, user and secret variable names must not overlap".to_string()),
            },
            _ => CliError::Vars {
                message: err.to_string(),
                help: None,
            },
        }
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Template { source, .. } => CliError::Render(source),
            EngineError::MissingTemplate { .. } | EngineError::Write { .. } => CliError::Template {
                message: err.to_string(),
            },
            EngineError::Io(e) => CliError::Io {
                message: e.to_string(),
            },
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match err {
            KubeError::SecretApplyFailed { .. } => CliError::Redacted {
                message: err.to_string(),
            },
            KubeError::Write { .. } => CliError::Io {
                message: err.to_string(),
            },
            _ => CliError::Command {
                message: err.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_exit_codes() {
        let err: CliError = CoreError::missing("cluster").into();
        assert_eq!(err.exit_code(), exit_codes::CONFIG_ERROR);
        assert_eq!(err.to_string(), "Missing required param: cluster");

        let err: CliError = CoreError::VarShadowsVar { key: "COMMIT".into() }.into();
        assert_eq!(err.exit_code(), exit_codes::VARS_ERROR);

        let err: CliError = CoreError::EmptySecret { key: "SECRET_X".into() }.into();
        assert_eq!(err.exit_code(), exit_codes::VARS_ERROR);
    }

    #[test]
    fn test_secret_apply_failure_stays_redacted() {
        let err: CliError = KubeError::CommandFailed {
            command: "kubectl apply --filename /tmp/.kube.sec.yml".into(),
            status: "exit status: 1".into(),
        }
        .redacted()
        .into();

        assert_eq!(err.exit_code(), exit_codes::COMMAND_ERROR);
        assert_eq!(err.to_string(), "Error (kubectl output redacted): exit status: 1");
    }

    #[test]
    fn test_missing_template_exit_code() {
        let err: CliError = EngineError::MissingTemplate {
            path: ".kube.yml".into(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_codes::TEMPLATE_ERROR);
    }
}
