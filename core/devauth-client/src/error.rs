//! Error types for the authorization client.

use crate::outcome::AuthorizationOutcome;
use devauth_crypto::CryptoError;
use thiserror::Error;

/// Errors raised while building or configuring a client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No shared secret was passed and `CLIENT_SECRET` is unset or empty.
    #[error("shared secret not configured (pass one explicitly or set CLIENT_SECRET)")]
    MissingSecret,

    /// A configuration value is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The HTTP transport could not be built.
    #[error("transport error: {0}")]
    Transport(String),

    /// Cipher construction failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

const NETWORK_KEYWORDS: [&str; 4] = ["connection", "network", "timeout", "timed out"];

/// Raised by [`AuthClient::require_authorization`](crate::AuthClient::require_authorization)
/// when a check does not end in an authorized verdict.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AuthorizationError {
    message: String,
    outcome: Option<AuthorizationOutcome>,
    device_id: Option<String>,
    server_url: Option<String>,
}

impl AuthorizationError {
    /// Builds the error from a failed or negative outcome.
    #[must_use]
    pub fn from_outcome(
        outcome: AuthorizationOutcome,
        device_id: impl Into<String>,
        server_url: impl Into<String>,
    ) -> Self {
        Self {
            message: outcome.message.clone(),
            outcome: Some(outcome),
            device_id: Some(device_id.into()),
            server_url: Some(server_url.into()),
        }
    }

    /// Builds a bare error carrying only a message.
    #[must_use]
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            outcome: None,
            device_id: None,
            server_url: None,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn outcome(&self) -> Option<&AuthorizationOutcome> {
        self.outcome.as_ref()
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn server_url(&self) -> Option<&str> {
        self.server_url.as_deref()
    }

    /// True when the server could not be reached.
    ///
    /// A server verdict or a 403 is never a network error, whatever its
    /// text. Only failed checks, or errors without an outcome, are matched
    /// against network keywords.
    #[must_use]
    pub fn is_network_error(&self) -> bool {
        let message = self.message.to_lowercase();
        match &self.outcome {
            Some(o) if o.success || o.is_auth_error => false,
            Some(o) => {
                let outcome_message = o.message.to_lowercase();
                NETWORK_KEYWORDS
                    .iter()
                    .any(|k| message.contains(k) || outcome_message.contains(k))
            }
            None => NETWORK_KEYWORDS.iter().any(|k| message.contains(k)),
        }
    }

    /// True when the server answered and said the device is not authorized.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        match &self.outcome {
            Some(o) => o.success && !o.authorized,
            None => {
                let message = self.message.to_lowercase();
                message.contains("not authorized") || message.contains("disabled")
            }
        }
    }

    /// True when authorization could not be determined at all.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        match &self.outcome {
            Some(o) => !o.success,
            None => {
                let message = self.message.to_lowercase();
                message.contains("cannot verify") || message.contains("verification failed")
            }
        }
    }
}
