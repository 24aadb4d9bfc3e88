//! Error types for provider adapters

use thiserror::Error;

/// Errors that can occur while talking to an upstream provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP request failed
    #[error("{provider}: request failed: {source}")]
    Http {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Upstream answered with a non-success status
    #[error("{provider}: received non-200 response: {status} with body {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    /// Response body could not be decoded
    #[error("{provider}: failed to decode response: {message}")]
    Decode {
        provider: &'static str,
        message: String,
    },

    /// CSV payload could not be parsed
    #[error("{provider}: failed to parse CSV data: {source}")]
    Csv {
        provider: &'static str,
        #[source]
        source: csv::Error,
    },

    /// The operation was cancelled (client disconnect or fleet deadline)
    #[error("operation cancelled")]
    Cancelled,

    /// Every attempt of the retry schedule failed
    #[error("all retries failed, last error: {0}")]
    RetriesExhausted(#[source] Box<ProviderError>),
}

impl ProviderError {
    /// Wrap a reqwest error with the provider name
    pub fn http(provider: &'static str, source: reqwest::Error) -> Self {
        Self::Http { provider, source }
    }

    /// Create a non-200 status error
    pub fn status(provider: &'static str, status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            provider,
            status,
            body: body.into(),
        }
    }

    /// Create a decode error
    pub fn decode(provider: &'static str, message: impl std::fmt::Display) -> Self {
        Self::Decode {
            provider,
            message: message.to_string(),
        }
    }
}
