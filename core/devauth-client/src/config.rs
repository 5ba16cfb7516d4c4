//! Client configuration.

use crate::error::{ClientError, ClientResult};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable consulted when no secret is configured.
pub const CLIENT_SECRET_ENV: &str = "CLIENT_SECRET";

/// Default cache validity, in days.
pub const DEFAULT_CACHE_VALIDITY_DAYS: u32 = 7;

/// Default check interval, in days.
pub const DEFAULT_CHECK_INTERVAL_DAYS: u32 = 2;

/// Default heartbeat request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything an [`AuthClient`](crate::AuthClient) needs to run.
#[derive(Clone)]
pub struct ClientConfig {
    /// Server base URL, e.g. `http://localhost:8000`.
    pub server_url: String,
    /// Pre-shared wire secret. Falls back to `CLIENT_SECRET`.
    pub client_secret: Option<String>,
    /// Explicit device id; wins over any persisted or derived id.
    pub device_id: Option<String>,
    pub software_name: Option<String>,
    /// Replaces the collected device-info report verbatim.
    pub device_info: Option<Value>,
    /// Cache directory override.
    pub cache_dir: Option<PathBuf>,
    /// Device-identity directory override.
    pub identity_dir: Option<PathBuf>,
    pub enable_cache: bool,
    pub cache_validity_days: u32,
    pub check_interval_days: u32,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            client_secret: None,
            device_id: None,
            software_name: None,
            device_info: None,
            cache_dir: None,
            identity_dir: None,
            enable_cache: true,
            cache_validity_days: DEFAULT_CACHE_VALIDITY_DAYS,
            check_interval_days: DEFAULT_CHECK_INTERVAL_DAYS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Creates a configuration for `server_url` with default settings.
    #[must_use]
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    #[must_use]
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    #[must_use]
    pub fn with_software_name(mut self, name: impl Into<String>) -> Self {
        self.software_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_device_info(mut self, info: Value) -> Self {
        self.device_info = Some(info);
        self
    }

    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_identity_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.identity_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.enable_cache = enabled;
        self
    }

    #[must_use]
    pub fn with_cache_validity_days(mut self, days: u32) -> Self {
        self.cache_validity_days = days;
        self
    }

    #[must_use]
    pub fn with_check_interval_days(mut self, days: u32) -> Self {
        self.check_interval_days = days;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Returns the server URL without trailing slashes.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfig`] if the URL is empty.
    pub fn normalized_server_url(&self) -> ClientResult<String> {
        let url = self.server_url.trim().trim_end_matches('/');
        if url.is_empty() {
            return Err(ClientError::InvalidConfig("server_url is empty".into()));
        }
        Ok(url.to_string())
    }

    /// Returns the configured secret, falling back to `CLIENT_SECRET`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MissingSecret`] if neither is set.
    pub fn resolve_secret(&self) -> ClientResult<String> {
        pick_secret(
            self.client_secret.as_deref(),
            std::env::var(CLIENT_SECRET_ENV).ok(),
        )
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server_url", &self.server_url)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("device_id", &self.device_id)
            .field("software_name", &self.software_name)
            .field("cache_dir", &self.cache_dir)
            .field("identity_dir", &self.identity_dir)
            .field("enable_cache", &self.enable_cache)
            .field("cache_validity_days", &self.cache_validity_days)
            .field("check_interval_days", &self.check_interval_days)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

fn pick_secret(explicit: Option<&str>, from_env: Option<String>) -> ClientResult<String> {
    if let Some(secret) = explicit.filter(|s| !s.is_empty()) {
        return Ok(secret.to_string());
    }
    from_env
        .filter(|s| !s.is_empty())
        .ok_or(ClientError::MissingSecret)
}
