//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Missing required param: {param}")]
    MissingParam { param: String },

    #[error("Invalid params: {message}")]
    InvalidParams { message: String },

    #[error("Failed to parse vars: {0}")]
    InvalidVars(#[from] serde_json::Error),

    #[error("var {key:?} shadows existing var")]
    VarShadowsVar { key: String },

    #[error("secret var {key:?} shadows existing var")]
    SecretShadowsVar { key: String },

    #[error("secret var {key:?} is an empty string")]
    EmptySecret { key: String },

    #[error("secret var {key:?} is not valid UTF-8")]
    SecretNotUnicode { key: String },
}

impl CoreError {
    pub fn missing(param: impl Into<String>) -> Self {
        Self::MissingParam {
            param: param.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Whether this error came from variable or secret resolution
    pub fn is_shadowing(&self) -> bool {
        matches!(
            self,
            CoreError::VarShadowsVar { .. }
                | CoreError::SecretShadowsVar { .. }
                | CoreError::EmptySecret { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
