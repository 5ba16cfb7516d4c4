//! Verdicts produced by an authorization check.

use serde::{Deserialize, Serialize};

/// Result of one authorization check.
///
/// `success` says whether a verdict could be reached at all; `authorized`
/// is only meaningful when it is `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationOutcome {
    pub authorized: bool,
    pub message: String,
    pub success: bool,
    pub from_cache: bool,
    /// Set when the server rejected the request with 403.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_auth_error: bool,
}

impl AuthorizationOutcome {
    /// A verdict returned by the server.
    #[must_use]
    pub fn online(authorized: bool, message: impl Into<String>) -> Self {
        Self {
            authorized,
            message: message.into(),
            success: true,
            from_cache: false,
            is_auth_error: false,
        }
    }

    /// A verdict replayed from a still-valid cache record.
    #[must_use]
    pub fn cached(authorized: bool, message: impl Into<String>) -> Self {
        Self {
            authorized,
            message: message.into(),
            success: true,
            from_cache: true,
            is_auth_error: false,
        }
    }

    /// No verdict could be reached.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            authorized: false,
            message: message.into(),
            success: false,
            from_cache: false,
            is_auth_error: false,
        }
    }

    /// The server refused to verify the device.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            is_auth_error: true,
            ..Self::failure(message)
        }
    }

    /// True only for a successful check that granted access.
    #[must_use]
    pub fn is_granted(&self) -> bool {
        self.success && self.authorized
    }
}
