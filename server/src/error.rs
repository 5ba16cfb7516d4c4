//! Error types for the device registry.

use thiserror::Error;

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No device with this id.
    #[error("device not found: {0}")]
    NotFound(String),

    /// Underlying storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// A stored value could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// A lock holder panicked.
    #[error("registry lock poisoned")]
    Poisoned,
}

impl From<rusqlite::Error> for RegistryError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
