//! Heartbeat transport.
//!
//! The decision engine only needs "post this envelope, give me a status and
//! a body". [`HttpTransport`] does that over blocking HTTP; tests substitute
//! their own implementation.

use crate::error::{ClientError, ClientResult};
use devauth_types::{EncryptedEnvelope, HEARTBEAT_PATH};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Raw HTTP response to a heartbeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Failure to obtain any response.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connect, DNS, TLS or timeout failure.
    #[error("{0}")]
    Connection(String),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

/// Sends a sealed heartbeat to the server.
pub trait HeartbeatTransport: Send + Sync {
    /// Posts `envelope` and returns the raw response.
    fn post_heartbeat(
        &self,
        envelope: &EncryptedEnvelope,
    ) -> Result<TransportResponse, TransportError>;
}

/// Blocking HTTP transport with a fixed timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpTransport {
    /// Creates a transport posting to `<server_url>/api/auth/heartbeat`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the HTTP client cannot be built.
    pub fn new(server_url: &str, timeout: Duration) -> ClientResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}{HEARTBEAT_PATH}", server_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl HeartbeatTransport for HttpTransport {
    fn post_heartbeat(
        &self,
        envelope: &EncryptedEnvelope,
    ) -> Result<TransportResponse, TransportError> {
        debug!(endpoint = %self.endpoint, "sending heartbeat");
        let response = self
            .client
            .post(&self.endpoint)
            .json(envelope)
            .send()
            .map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.text().map_err(classify)?;
        debug!(status, "heartbeat response received");
        Ok(TransportResponse { status, body })
    }
}

fn classify(error: reqwest::Error) -> TransportError {
    if error.is_connect() || error.is_timeout() || error.is_request() || error.is_body() {
        TransportError::Connection(error.to_string())
    } else {
        TransportError::Other(error.to_string())
    }
}
