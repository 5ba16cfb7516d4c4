//! Obfuscated local cache of the last online verdict.
//!
//! The cache holds a single record. Every write replaces it whole; reads
//! that fail to decode (missing file, wrong device, expired key window,
//! corruption) are cache misses, never errors.
//!
//! The on-disk JSON uses short keys (`a`, `m`, `c`, `l`) plus two decoy
//! fields that only vary the plaintext.

use devauth_crypto::ObfuscationCodec;
use devauth_types::{unix_now, DeviceId, SECS_PER_DAY};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Decoy version tag written with every record.
const RECORD_VERSION: u32 = 2;

/// Semantic view of a cache record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub authorized: bool,
    pub message: String,
    /// When the verdict was fetched (Unix seconds).
    pub cached_at: f64,
    /// When the server was last consulted (Unix seconds).
    pub last_check: f64,
}

impl CacheRecord {
    /// True if the record is younger than `validity_secs` at `now`.
    ///
    /// A record without a positive `cached_at` is never valid.
    #[must_use]
    pub fn is_valid_at(&self, now: f64, validity_secs: f64) -> bool {
        self.cached_at > 0.0 && now - self.cached_at < validity_secs
    }

    /// True if at least `interval_secs` passed since the last check.
    #[must_use]
    pub fn needs_check_at(&self, now: f64, interval_secs: f64) -> bool {
        now - self.last_check >= interval_secs
    }
}

/// A cache record presented as a replayed verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResult {
    pub authorized: bool,
    pub message: String,
    pub from_cache: bool,
    pub cached_at: f64,
    pub last_check: f64,
}

/// On-disk layout of a record.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    a: bool,
    m: String,
    c: f64,
    l: f64,
    #[serde(default)]
    v: u32,
    #[serde(default)]
    f: String,
}

impl From<StoredRecord> for CacheRecord {
    fn from(stored: StoredRecord) -> Self {
        Self {
            authorized: stored.a,
            message: stored.m,
            cached_at: stored.c,
            last_check: stored.l,
        }
    }
}

/// Owns the cache file for one device and server.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
    file: PathBuf,
    codec: ObfuscationCodec,
    validity_secs: f64,
    check_interval_secs: f64,
}

impl CacheStore {
    /// Creates a store in `dir` for `device_id` talking to `server_url`.
    #[must_use]
    pub fn new(
        dir: impl Into<PathBuf>,
        device_id: &DeviceId,
        server_url: &str,
        validity_days: u32,
        check_interval_days: u32,
    ) -> Self {
        let dir = dir.into();
        let file = dir.join(Self::file_name(device_id));
        Self {
            dir,
            file,
            codec: ObfuscationCodec::new(server_url, device_id.as_str(), validity_days),
            validity_secs: f64::from(validity_days) * SECS_PER_DAY as f64,
            check_interval_secs: f64::from(check_interval_days) * SECS_PER_DAY as f64,
        }
    }

    /// Platform cache directory used when none is configured.
    #[must_use]
    pub fn default_dir() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(std::env::temp_dir);

        #[cfg(target_os = "windows")]
        {
            std::env::var_os("LOCALAPPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|| home.join("AppData").join("Local"))
                .join("Microsoft")
                .join("CLR_v4.0")
        }

        #[cfg(target_os = "macos")]
        {
            home.join("Library")
                .join("Caches")
                .join(".com.apple.metadata")
        }

        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            home.join(".cache").join(".fontconfig")
        }
    }

    /// Cache file name for `device_id`: `runtime_<md5[..12]>.dat`.
    #[must_use]
    pub fn file_name(device_id: &DeviceId) -> String {
        let digest = hex::encode(Md5::digest(device_id.as_str().as_bytes()));
        format!("runtime_{}.dat", &digest[..12])
    }

    pub fn path(&self) -> &Path {
        &self.file
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn validity_secs(&self) -> f64 {
        self.validity_secs
    }

    pub fn check_interval_secs(&self) -> f64 {
        self.check_interval_secs
    }

    /// Reads and decodes the current record.
    #[must_use]
    pub fn get(&self) -> Option<CacheRecord> {
        let plaintext = self.read_decoded()?;
        match serde_json::from_slice::<StoredRecord>(&plaintext) {
            Ok(stored) => Some(stored.into()),
            Err(e) => {
                debug!(error = %e, "cache record has unexpected layout");
                None
            }
        }
    }

    /// Decodes the raw file, accepting short or legacy long keys and
    /// defaulting missing fields.
    #[must_use]
    pub fn read_lenient(&self) -> Option<CacheRecord> {
        let plaintext = self.read_decoded()?;
        let raw: Value = serde_json::from_slice(&plaintext).ok()?;
        let field = |short: &str, long: &str| raw.get(short).or_else(|| raw.get(long));
        Some(CacheRecord {
            authorized: field("a", "authorized")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            message: field("m", "message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            cached_at: field("c", "cached_at")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            last_check: field("l", "last_check")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
        })
    }

    fn read_decoded(&self) -> Option<Vec<u8>> {
        let blob = match fs::read(&self.file) {
            Ok(blob) => blob,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                debug!(path = %self.file.display(), error = %e, "cache file unreadable");
                return None;
            }
        };
        debug!(path = %self.file.display(), size = blob.len(), "read cache file");
        let plaintext = self.codec.decode(&blob);
        if plaintext.is_none() {
            debug!("cache blob did not decode");
        }
        plaintext
    }

    /// Saves a record stamped with the current time.
    pub fn save(&self, authorized: bool, message: &str) -> bool {
        self.save_with(authorized, message, None, None)
    }

    /// Saves a record, defaulting missing timestamps to now.
    ///
    /// Returns `false` if the file could not be written even after
    /// clearing and deleting the old one.
    pub fn save_with(
        &self,
        authorized: bool,
        message: &str,
        cached_at: Option<f64>,
        last_check: Option<f64>,
    ) -> bool {
        let now = unix_now();
        let stored = StoredRecord {
            a: authorized,
            m: message.to_string(),
            c: cached_at.unwrap_or(now),
            l: last_check.unwrap_or(now),
            v: RECORD_VERSION,
            f: decoy_tag(now),
        };

        let blob = match serde_json::to_vec(&stored)
            .map_err(devauth_crypto::CryptoError::from)
            .and_then(|json| self.codec.encode(&json))
        {
            Ok(blob) => blob,
            Err(e) => {
                warn!(error = %e, "failed to encode cache record");
                return false;
            }
        };

        if let Err(e) = fs::create_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), error = %e, "failed to create cache directory");
            return false;
        }

        if let Err(first) = self.write_replacing(&blob) {
            debug!(error = %first, "cache write failed, deleting old file and retrying");
            self.force_remove();
            if let Err(e) = fs::write(&self.file, &blob) {
                warn!(path = %self.file.display(), error = %e, "failed to save cache");
                return false;
            }
        }

        hide_file(&self.file);
        true
    }

    /// Sibling file a save writes before renaming it over the cache file.
    ///
    /// Qualified by process id so concurrent writers never share one.
    #[must_use]
    pub fn temp_path(&self) -> PathBuf {
        self.file
            .with_extension(format!("{}.tmp", std::process::id()))
    }

    /// Writes to a sibling temp file and renames it over the cache file.
    fn write_replacing(&self, blob: &[u8]) -> io::Result<()> {
        let tmp = self.temp_path();
        fs::write(&tmp, blob)?;
        fs::rename(&tmp, &self.file).inspect_err(|_| {
            let _ = fs::remove_file(&tmp);
        })
    }

    /// Clears read-only and platform attributes, then deletes the file.
    fn force_remove(&self) {
        if let Ok(meta) = fs::metadata(&self.file) {
            let mut perms = meta.permissions();
            if perms.readonly() {
                #[allow(clippy::permissions_set_readonly_false)]
                perms.set_readonly(false);
                let _ = fs::set_permissions(&self.file, perms);
            }
        }
        #[cfg(target_os = "windows")]
        {
            let _ = std::process::Command::new("attrib")
                .args(["-h", "-s", "-r"])
                .arg(&self.file)
                .status();
        }
        let _ = fs::remove_file(&self.file);
    }

    /// Re-saves the current record with `last_check = now`.
    pub fn update_last_check(&self) -> bool {
        match self.get() {
            Some(record) => self.save_with(
                record.authorized,
                &record.message,
                Some(record.cached_at),
                None,
            ),
            None => false,
        }
    }

    /// True if a record exists and is within the validity period.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(unix_now())
    }

    #[must_use]
    pub fn is_valid_at(&self, now: f64) -> bool {
        self.get()
            .is_some_and(|r| r.is_valid_at(now, self.validity_secs))
    }

    /// True if there is no record or the check interval has elapsed.
    #[must_use]
    pub fn needs_check(&self) -> bool {
        self.needs_check_at(unix_now())
    }

    #[must_use]
    pub fn needs_check_at(&self, now: f64) -> bool {
        self.get()
            .is_none_or(|r| r.needs_check_at(now, self.check_interval_secs))
    }

    /// Returns the record as a replayed verdict.
    #[must_use]
    pub fn cached_result(&self) -> Option<CachedResult> {
        self.get().map(|r| CachedResult {
            authorized: r.authorized,
            message: r.message,
            from_cache: true,
            cached_at: r.cached_at,
            last_check: r.last_check,
        })
    }

    /// Deletes the cache file. A missing file counts as cleared.
    pub fn clear(&self) -> bool {
        match fs::remove_file(&self.file) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => {
                warn!(path = %self.file.display(), error = %e, "failed to clear cache");
                false
            }
        }
    }
}

fn decoy_tag(now: f64) -> String {
    let digest = hex::encode(Md5::digest(now.to_string().as_bytes()));
    digest[..8].to_string()
}

/// Marks the file hidden where the platform has such a flag.
fn hide_file(path: &Path) {
    #[cfg(target_os = "windows")]
    {
        let _ = std::process::Command::new("attrib")
            .arg("+h")
            .arg(path)
            .status();
    }

    #[cfg(not(target_os = "windows"))]
    {
        let _ = path;
    }
}
