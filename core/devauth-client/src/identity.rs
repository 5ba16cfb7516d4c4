//! Device identity resolution.
//!
//! A device id is resolved once per `(server_url, software_name)` pair and
//! persisted to a small plaintext file, so hardware changes after the first
//! run never move a device to a new id. Resolution order:
//!
//! 1. an explicit id from the caller (persisted, always wins)
//! 2. a previously persisted id
//! 3. an id derived from hardware facts (persisted)
//! 4. a random UUID when no fact is available (persisted)
//!
//! I/O failures are logged and swallowed; the worst case is a fresh id on
//! every run.

use crate::facts::DeviceFacts;
use devauth_types::{DeviceId, DERIVED_ID_LEN};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directory under the home directory holding identity files.
pub const IDENTITY_DIR_NAME: &str = ".devauth_device";

/// Persists resolved device ids, one file per server and software pair.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    base_dir: PathBuf,
}

impl IdentityStore {
    /// Creates a store rooted at `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Creates a store in `~/.devauth_device`.
    #[must_use]
    pub fn default_location() -> Self {
        let home = dirs::home_dir().unwrap_or_else(std::env::temp_dir);
        Self::new(home.join(IDENTITY_DIR_NAME))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of the identity file for one server and software pair.
    #[must_use]
    pub fn path_for(&self, server_url: &str, software_name: Option<&str>) -> PathBuf {
        let server_hash = short_sha256(server_url, 12);
        let software_hash = match software_name.filter(|s| !s.is_empty()) {
            Some(name) => short_sha256(name, 8),
            None => "default".to_string(),
        };
        self.base_dir
            .join(format!("device_{server_hash}_{software_hash}.txt"))
    }

    /// Loads a persisted id. Empty or unreadable files count as absent.
    #[must_use]
    pub fn load(&self, server_url: &str, software_name: Option<&str>) -> Option<DeviceId> {
        let path = self.path_for(server_url, software_name);
        let content = fs::read_to_string(&path).ok()?;
        DeviceId::new(content)
    }

    /// Persists `device_id`, returning whether the write succeeded.
    pub fn persist(
        &self,
        server_url: &str,
        software_name: Option<&str>,
        device_id: &DeviceId,
    ) -> bool {
        let path = self.path_for(server_url, software_name);
        let result = fs::create_dir_all(&self.base_dir)
            .and_then(|()| fs::write(&path, device_id.as_str()));
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to persist device id");
                false
            }
        }
    }

    /// Resolves the device id for this server and software pair.
    pub fn resolve(
        &self,
        server_url: &str,
        explicit_id: Option<&str>,
        software_name: Option<&str>,
        facts: &DeviceFacts,
    ) -> DeviceId {
        if let Some(id) = explicit_id.and_then(DeviceId::exact) {
            debug!(device_id = %id, "using explicit device id");
            self.persist(server_url, software_name, &id);
            return id;
        }

        if let Some(id) = self.load(server_url, software_name) {
            debug!(device_id = %id, "using persisted device id");
            return id;
        }

        let id = derive_device_id(facts, software_name).unwrap_or_else(|| {
            debug!("no hardware facts available, using random device id");
            DeviceId::random()
        });
        self.persist(server_url, software_name, &id);
        id
    }
}

/// Derives a stable id from hardware facts and the software name.
///
/// Returns `None` when every component is empty.
#[must_use]
pub fn derive_device_id(facts: &DeviceFacts, software_name: Option<&str>) -> Option<DeviceId> {
    let components = [
        facts.mac.clone(),
        facts.disk_id.clone(),
        facts.cpu_count.filter(|n| *n > 0).map(|n| n.to_string()),
        facts.memory_total_gb.filter(|m| *m != 0.0).map(format_float),
        facts.disk_total_gb.filter(|d| *d != 0.0).map(format_float),
        facts.system.clone(),
        facts.machine.clone(),
        software_name.map(String::from),
    ];
    let joined = components
        .into_iter()
        .flatten()
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if joined.is_empty() {
        return None;
    }
    let digest = hex::encode(Sha256::digest(joined.as_bytes()));
    DeviceId::new(&digest[..DERIVED_ID_LEN])
}

/// Formats a float the way other clients of the same server do: whole
/// numbers keep one decimal place (`16.0`), others print as-is (`15.55`).
fn format_float(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

fn short_sha256(input: &str, len: usize) -> String {
    let mut digest = hex::encode(Sha256::digest(input.as_bytes()));
    digest.truncate(len);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_formatting() {
        assert_eq!(format_float(16.0), "16.0");
        assert_eq!(format_float(15.55), "15.55");
        assert_eq!(format_float(465.76), "465.76");
    }

    #[test]
    fn short_hash_lengths() {
        assert_eq!(short_sha256("x", 12).len(), 12);
        assert_eq!(short_sha256("x", 8).len(), 8);
    }
}
