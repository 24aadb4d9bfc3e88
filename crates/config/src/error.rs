//! Configuration error types

use thiserror::Error;

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur when loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is unset or empty
    #[error("missing required environment variable '{var}'")]
    MissingVar {
        /// Name of the variable
        var: &'static str,
    },

    /// An environment variable is set but cannot be parsed
    #[error("invalid value for environment variable '{var}': {message}")]
    InvalidVar {
        /// Name of the variable
        var: &'static str,
        /// What went wrong
        message: String,
    },
}

impl ConfigError {
    /// Create a MissingVar error
    pub fn missing(var: &'static str) -> Self {
        Self::MissingVar { var }
    }

    /// Create an InvalidVar error
    pub fn invalid(var: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidVar {
            var,
            message: message.into(),
        }
    }
}
