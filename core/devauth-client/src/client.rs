//! Authorization decision engine.
//!
//! Every check goes online. The cache is only consulted when the online
//! attempt fails to produce a verdict:
//!
//! | online result            | valid cache | returned                         |
//! |--------------------------|-------------|----------------------------------|
//! | verdict (`success`)      | any         | online verdict, cache overwritten |
//! | failure                  | yes         | cached verdict, cache untouched  |
//! | failure                  | no          | online failure                   |

use crate::cache::{CacheRecord, CacheStore};
use crate::config::ClientConfig;
use crate::error::{AuthorizationError, ClientResult};
use crate::facts::{build_device_info, DeviceFacts};
use crate::identity::IdentityStore;
use crate::outcome::AuthorizationOutcome;
use crate::transport::{HeartbeatTransport, HttpTransport, TransportError};
use chrono::{Local, TimeZone};
use devauth_crypto::WireCipher;
use devauth_types::{
    unix_now, DeviceId, EncryptedEnvelope, ErrorDetail, HeartbeatRequest, HeartbeatResponse,
    SECS_PER_DAY, SECS_PER_HOUR,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use tracing::{debug, info};

/// Human-readable authorization summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationInfo {
    pub authorized: bool,
    pub success: bool,
    pub from_cache: bool,
    pub message: String,
    pub device_id: String,
    pub server_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_at_readable: Option<String>,
}

/// Cache diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheInfo {
    pub authorized: bool,
    pub message: String,
    pub cached_at: f64,
    pub last_check: f64,
    pub cache_age_days: f64,
    pub last_check_age_days: f64,
    pub cache_valid: bool,
    pub needs_check: bool,
    pub cache_file: PathBuf,
}

/// Device authorization client.
pub struct AuthClient {
    server_url: String,
    device_id: DeviceId,
    software_name: Option<String>,
    device_info: Value,
    cipher: WireCipher,
    cache: Option<CacheStore>,
    transport: Box<dyn HeartbeatTransport>,
}

impl AuthClient {
    /// Builds a client that collects local facts and talks HTTP.
    ///
    /// # Errors
    ///
    /// Fails if the secret is missing, the URL is empty, or the HTTP client
    /// cannot be built.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let server_url = config.normalized_server_url()?;
        let transport = HttpTransport::new(&server_url, config.request_timeout)?;
        Self::with_transport(config, DeviceFacts::collect(), Box::new(transport))
    }

    /// Builds a client from explicit facts and transport.
    ///
    /// # Errors
    ///
    /// Fails if the secret is missing or the URL is empty.
    pub fn with_transport(
        config: ClientConfig,
        facts: DeviceFacts,
        transport: Box<dyn HeartbeatTransport>,
    ) -> ClientResult<Self> {
        let server_url = config.normalized_server_url()?;
        let cipher = WireCipher::new(&config.resolve_secret()?)?;

        let identity = config
            .identity_dir
            .clone()
            .map_or_else(IdentityStore::default_location, IdentityStore::new);
        let software_name = config.software_name.clone().filter(|s| !s.is_empty());
        let device_id = identity.resolve(
            &server_url,
            config.device_id.as_deref(),
            software_name.as_deref(),
            &facts,
        );
        let device_info = build_device_info(&facts, config.device_info.clone());

        let cache = config.enable_cache.then(|| {
            let dir = config.cache_dir.clone().unwrap_or_else(CacheStore::default_dir);
            CacheStore::new(
                dir,
                &device_id,
                &server_url,
                config.cache_validity_days,
                config.check_interval_days,
            )
        });

        info!(
            %server_url,
            %device_id,
            cache_enabled = cache.is_some(),
            "authorization client ready"
        );

        Ok(Self {
            server_url,
            device_id,
            software_name,
            device_info,
            cipher,
            cache,
            transport,
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn software_name(&self) -> Option<&str> {
        self.software_name.as_deref()
    }

    pub fn device_info(&self) -> &Value {
        &self.device_info
    }

    /// The cache store, if caching is enabled.
    pub fn cache(&self) -> Option<&CacheStore> {
        self.cache.as_ref()
    }

    /// Runs one authorization check.
    pub fn check_authorization(&self) -> AuthorizationOutcome {
        let Some(cache) = &self.cache else {
            return self.check_online();
        };

        let cached = cache.get().or_else(|| {
            let lenient = cache.read_lenient();
            if lenient.is_some() {
                debug!("cache recovered by lenient read");
            }
            lenient
        });
        let cache_valid = cached
            .as_ref()
            .is_some_and(|r| r.is_valid_at(unix_now(), cache.validity_secs()));
        match (&cached, cache_valid) {
            (Some(_), true) => debug!("valid cache present, checking online anyway"),
            (Some(_), false) => debug!("cache expired, checking online"),
            (None, _) => debug!("no cache, checking online"),
        }

        let online = self.check_online();

        if online.success {
            let saved = cache.save(online.authorized, &online.message);
            debug!(saved, path = %cache.path().display(), "cache updated from online verdict");
            return online;
        }

        if let Some(record) = cached.filter(|_| cache_valid) {
            debug!(
                reason = %online.message,
                remaining = %self.remaining_time(record.cached_at),
                "online check failed, using cached verdict"
            );
            return AuthorizationOutcome::cached(record.authorized, record.message);
        }

        debug!(reason = %online.message, "online check failed and no valid cache");
        online
    }

    /// Sends one heartbeat and interprets the response.
    fn check_online(&self) -> AuthorizationOutcome {
        let request = HeartbeatRequest {
            device_id: self.device_id.clone(),
            software_name: self.software_name.clone(),
            device_info: Some(self.device_info.clone()),
        };
        let token = match self.cipher.seal(&request) {
            Ok(token) => token,
            Err(e) => return AuthorizationOutcome::failure(format!("unknown error: {e}")),
        };

        let response = match self.transport.post_heartbeat(&EncryptedEnvelope::new(token)) {
            Ok(response) => response,
            Err(TransportError::Connection(e)) => {
                debug!(error = %e, "heartbeat request failed");
                return AuthorizationOutcome::failure(format!("connection failed: {e}"));
            }
            Err(TransportError::Other(e)) => {
                debug!(error = %e, "heartbeat request failed");
                return AuthorizationOutcome::failure(format!("unknown error: {e}"));
            }
        };

        match response.status {
            200 => {
                let verdict = serde_json::from_str::<EncryptedEnvelope>(&response.body)
                    .ok()
                    .and_then(|env| self.cipher.open::<HeartbeatResponse>(&env.encrypted_data));
                match verdict {
                    Some(verdict) => {
                        debug!(authorized = verdict.authorized, "online verdict received");
                        AuthorizationOutcome::online(verdict.authorized, verdict.message)
                    }
                    None => {
                        debug!("heartbeat response did not decrypt");
                        AuthorizationOutcome::failure("decryption failed")
                    }
                }
            }
            403 => {
                let detail = serde_json::from_str::<ErrorDetail>(&response.body)
                    .map(|d| d.detail)
                    .unwrap_or_else(|_| "server error: 403".to_string());
                debug!(%detail, "server rejected heartbeat");
                AuthorizationOutcome::rejected(detail)
            }
            status => {
                debug!(status, "heartbeat failed");
                AuthorizationOutcome::failure(format!("server error: {status}"))
            }
        }
    }

    /// Checks authorization and fails unless access was granted.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthorizationError`] carrying the outcome when the check
    /// failed or the device is not authorized.
    pub fn require_authorization(&self) -> Result<(), AuthorizationError> {
        let outcome = self.check_authorization();
        if outcome.is_granted() {
            Ok(())
        } else {
            Err(AuthorizationError::from_outcome(
                outcome,
                self.device_id.as_str(),
                &self.server_url,
            ))
        }
    }

    /// True if a fresh check grants access.
    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.check_authorization().is_granted()
    }

    /// Deletes the local cache. Always succeeds when caching is disabled.
    pub fn clear_cache(&self) -> bool {
        self.cache.as_ref().is_none_or(CacheStore::clear)
    }

    /// Runs a check and summarizes it together with the cache state.
    #[must_use]
    pub fn authorization_info(&self) -> AuthorizationInfo {
        let outcome = self.check_authorization();
        let mut info = AuthorizationInfo {
            authorized: outcome.authorized,
            success: outcome.success,
            from_cache: outcome.from_cache,
            message: outcome.message,
            device_id: self.device_id.to_string(),
            server_url: self.server_url.clone(),
            remaining_time: None,
            cache_valid: None,
            cached_at: None,
            cached_at_readable: None,
        };

        if let Some(cache) = &self.cache {
            match cache.get() {
                Some(record) => {
                    info.remaining_time = Some(self.remaining_time(record.cached_at));
                    info.cache_valid = Some(cache.is_valid());
                    info.cached_at = Some(record.cached_at);
                    info.cached_at_readable = readable_local_time(record.cached_at);
                }
                None => {
                    info.remaining_time = Some("no cache".to_string());
                    info.cache_valid = Some(false);
                }
            }
        }
        info
    }

    /// Cache diagnostics, or `None` when there is no readable record.
    #[must_use]
    pub fn cache_info(&self) -> Option<CacheInfo> {
        let cache = self.cache.as_ref()?;
        let CacheRecord {
            authorized,
            message,
            cached_at,
            last_check,
        } = cache.get()?;
        let now = unix_now();
        let day = SECS_PER_DAY as f64;
        Some(CacheInfo {
            authorized,
            message,
            cached_at,
            last_check,
            cache_age_days: (now - cached_at) / day,
            last_check_age_days: (now - last_check) / day,
            cache_valid: cache.is_valid_at(now),
            needs_check: cache.needs_check_at(now),
            cache_file: cache.path().to_path_buf(),
        })
    }

    fn remaining_time(&self, cached_at: f64) -> String {
        match &self.cache {
            Some(cache) => format_remaining(cached_at, unix_now(), cache.validity_secs()),
            None => "unknown".to_string(),
        }
    }
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("server_url", &self.server_url)
            .field("device_id", &self.device_id)
            .field("software_name", &self.software_name)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// Runs one check with a fresh client and returns whether access was granted.
///
/// # Errors
///
/// Returns a configuration error if the client cannot be built.
pub fn check_authorization(config: ClientConfig) -> ClientResult<bool> {
    Ok(AuthClient::new(config)?.is_authorized())
}

/// Formats the validity left on a record as `"<d>d <h>h <m>m"`.
///
/// Zero components are omitted, except that minutes are always shown when
/// nothing else is.
pub(crate) fn format_remaining(cached_at: f64, now: f64, validity_secs: f64) -> String {
    if cached_at <= 0.0 {
        return "unknown".to_string();
    }
    let remaining = validity_secs - (now - cached_at);
    if remaining <= 0.0 {
        return "expired".to_string();
    }

    let remaining = remaining as i64;
    let days = remaining / SECS_PER_DAY;
    let hours = (remaining % SECS_PER_DAY) / SECS_PER_HOUR;
    let minutes = (remaining % SECS_PER_HOUR) / 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 || parts.is_empty() {
        parts.push(format!("{minutes}m"));
    }
    parts.join(" ")
}

fn readable_local_time(unix_secs: f64) -> Option<String> {
    if unix_secs <= 0.0 {
        return None;
    }
    Local
        .timestamp_opt(unix_secs as i64, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
}
