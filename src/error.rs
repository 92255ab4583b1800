//! Error types for the memory engine.
//!
//! [`Error`] is the crate-level error. Provider and crypto failures have their own
//! enums so callers can tell a timeout from a rejection, or a bad token from a bad
//! password, without string matching.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for memory engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the memory engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad input: empty content/source, unknown type, malformed update.
    #[error("validation error: {0}")]
    Validation(String),

    /// Argument outside the domain of a pure helper (e.g. vector length mismatch).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Encryption or decryption failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Embedding backend failure.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Underlying storage engine failure.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Errors from password-based encryption.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Token does not have the `salt.nonce.ciphertext` shape or is not valid base64.
    #[error("malformed encrypted token: {0}")]
    MalformedToken(String),

    /// Authentication failed: wrong password or tampered ciphertext.
    #[error("decryption failed: wrong password or corrupted data")]
    DecryptionFailed,

    /// The cipher refused to encrypt the input.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
}

/// Errors from embedding providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Provider is not configured or its backing model/key is missing.
    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within the allotted time.
    #[error("embedding request timed out after {0:?}")]
    Timeout(Duration),

    /// The remote backend answered with a non-success status.
    #[error("embedding request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// Transport-level HTTP failure.
    #[error("http error: {0}")]
    Http(String),

    /// The backend answered with something we could not interpret.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A vector did not have the provider's declared dimensionality.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Local inference failure.
    #[error("embedding backend error: {0}")]
    Backend(String),
}

impl ProviderError {
    /// `true` for [`ProviderError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not report the configured duration back to us
            Self::Timeout(Duration::ZERO)
        } else if let Some(status) = err.status() {
            Self::Rejected {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            Self::Http(err.to_string())
        }
    }
}
