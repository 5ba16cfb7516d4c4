//! Core type definitions shared by the devauth client and server.
//!
//! This crate defines the small, transport-agnostic vocabulary both sides
//! agree on:
//! - Device identifiers
//! - The heartbeat request/response bodies and their sealed envelope
//! - Unix-seconds time helpers used by the cache and key schedule
//!
//! Nothing here performs I/O or cryptography.

mod ids;
mod timestamp;
mod wire;

pub use ids::{DeviceId, DERIVED_ID_LEN};
pub use timestamp::{hour_bucket, unix_now, SECS_PER_DAY, SECS_PER_HOUR};
pub use wire::{
    EncryptedEnvelope, ErrorDetail, HeartbeatRequest, HeartbeatResponse, HEARTBEAT_PATH,
};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid device id: {0}")]
    InvalidDeviceId(String),
}
