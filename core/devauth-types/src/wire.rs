//! Heartbeat wire format.
//!
//! Both directions carry a single `encrypted_data` field whose value is a
//! sealed token (see `devauth-crypto`). The sealed plaintexts are
//! [`HeartbeatRequest`] going up and [`HeartbeatResponse`] coming back.
//! Error responses are sent in clear JSON as [`ErrorDetail`].

use crate::ids::DeviceId;
use serde::{Deserialize, Serialize};

/// Path of the heartbeat endpoint, relative to the server base URL.
pub const HEARTBEAT_PATH: &str = "/api/auth/heartbeat";

/// Outer body of every heartbeat request and successful response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    /// Sealed token holding the JSON payload.
    pub encrypted_data: String,
}

impl EncryptedEnvelope {
    /// Wraps a sealed token.
    #[must_use]
    pub fn new(encrypted_data: impl Into<String>) -> Self {
        Self {
            encrypted_data: encrypted_data.into(),
        }
    }
}

/// Sealed plaintext sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub device_id: DeviceId,
    #[serde(default)]
    pub software_name: Option<String>,
    #[serde(default)]
    pub device_info: Option<serde_json::Value>,
}

/// Sealed plaintext returned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    #[serde(default)]
    pub authorized: bool,
    #[serde(default)]
    pub message: String,
}

/// Clear-text error body (`{"detail": "..."}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub detail: String,
}

impl ErrorDetail {
    #[must_use]
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}
