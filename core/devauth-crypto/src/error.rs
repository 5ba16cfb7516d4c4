//! Error types for the crypto layer.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur while sealing or encoding.
///
/// Opening and decoding never produce these: a token or blob that does not
/// verify is reported as `None`.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// No shared secret was configured for the wire envelope.
    #[error("shared secret is empty")]
    MissingSecret,

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Compression of the at-rest payload failed.
    #[error("compression failed: {0}")]
    Compression(String),

    /// Payload does not fit the 32-bit length field.
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
