//! Error types for Vox relay

use thiserror::Error;

use crate::pipeline::FailureKind;

/// Result type alias for Vox operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Vox relay
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Rejected client input (empty or missing audio)
    #[error("invalid input: {0}")]
    Input(String),

    /// Provider was never initialized (missing credential)
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Provider answered with a non-success status or an unusable body
    #[error("provider error: {0}")]
    Provider(String),

    /// Provider did not finish within its time budget
    #[error("provider timed out: {0}")]
    Timeout(String),

    /// Provider succeeded but returned no usable content
    #[error("empty result: {0}")]
    EmptyResult(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Classify this error for a stage outcome
    ///
    /// Everything that is not a missing credential or an empty answer is
    /// treated as transient; provider responses carry no reliable way to
    /// tell a bad request from an outage.
    #[must_use]
    pub const fn failure_kind(&self) -> FailureKind {
        match self {
            Self::ProviderUnavailable(_) => FailureKind::Unavailable,
            Self::EmptyResult(_) => FailureKind::EmptyResult,
            _ => FailureKind::Transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_provider_errors() {
        assert_eq!(
            Error::ProviderUnavailable("stt".into()).failure_kind(),
            FailureKind::Unavailable
        );
        assert_eq!(
            Error::EmptyResult("no text".into()).failure_kind(),
            FailureKind::EmptyResult
        );
        assert_eq!(
            Error::Provider("503".into()).failure_kind(),
            FailureKind::Transient
        );
        assert_eq!(
            Error::Timeout("stt".into()).failure_kind(),
            FailureKind::Transient
        );
    }
}
