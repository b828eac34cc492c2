//! Error types for gkedeploy-kube

use thiserror::Error;

/// Result type for gkedeploy-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while driving gcloud and kubectl
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// The program could not be started at all
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran and exited unsuccessfully
    #[error("`{command}` failed: {status}")]
    CommandFailed { command: String, status: String },

    /// Applying the secret manifest failed; command output is withheld
    #[error("Error (kubectl output redacted): {status}")]
    SecretApplyFailed { status: String },

    /// Error writing the key file or the namespace manifest
    #[error("Error writing {what} file: {source}")]
    Write {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl KubeError {
    /// Exit status of a failed command, if this is a command failure
    pub fn status(&self) -> Option<&str> {
        match self {
            KubeError::CommandFailed { status, .. } | KubeError::SecretApplyFailed { status } => {
                Some(status)
            }
            _ => None,
        }
    }

    /// Replace a command failure with its redacted form
    ///
    /// Only the exit status survives; the command line and anything else is
    /// dropped.
    pub fn redacted(self) -> Self {
        match self {
            KubeError::CommandFailed { status, .. } => KubeError::SecretApplyFailed { status },
            KubeError::Spawn { source, .. } => KubeError::SecretApplyFailed {
                status: source.to_string(),
            },
            other => other,
        }
    }
}
