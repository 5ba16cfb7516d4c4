//! Key derivation for both schemes.
//!
//! Neither scheme stretches its input: the wire key is a plain SHA-256 of
//! the shared secret, and the at-rest key is a SHA-256 of the server URL and
//! device id. Both wrappers zeroize on drop and redact themselves in `Debug`.

use base64::{engine::general_purpose::URL_SAFE, Engine};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of a derived key in bytes.
pub const KEY_SIZE: usize = 32;

/// Half of a wire key: one half signs, the other encrypts.
const HALF_KEY_SIZE: usize = KEY_SIZE / 2;

/// Domain suffix mixed into the at-rest base key.
const OBFUSCATION_DOMAIN: &str = "obfuscate_v1";

/// Signing and encryption keys for the wire envelope.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EnvelopeKeys {
    signing: [u8; HALF_KEY_SIZE],
    encryption: [u8; HALF_KEY_SIZE],
}

impl EnvelopeKeys {
    /// Derives the keys from a pre-shared secret (`SHA256(secret)`).
    #[must_use]
    pub fn derive(shared_secret: &str) -> Self {
        let digest: [u8; KEY_SIZE] = Sha256::digest(shared_secret.as_bytes()).into();
        Self::from_key(digest)
    }

    /// Splits a raw 32-byte key into its signing and encryption halves.
    #[must_use]
    pub fn from_key(mut key: [u8; KEY_SIZE]) -> Self {
        let mut signing = [0u8; HALF_KEY_SIZE];
        let mut encryption = [0u8; HALF_KEY_SIZE];
        signing.copy_from_slice(&key[..HALF_KEY_SIZE]);
        encryption.copy_from_slice(&key[HALF_KEY_SIZE..]);
        key.zeroize();
        Self {
            signing,
            encryption,
        }
    }

    /// Returns the HMAC-SHA256 signing key.
    pub fn signing(&self) -> &[u8; HALF_KEY_SIZE] {
        &self.signing
    }

    /// Returns the AES-128 encryption key.
    pub fn encryption(&self) -> &[u8; HALF_KEY_SIZE] {
        &self.encryption
    }

    /// Encodes the full key the way standard Fernet tooling expects it
    /// (URL-safe base64 of the 32 raw bytes).
    #[must_use]
    pub fn to_fernet_key(&self) -> String {
        let mut raw = [0u8; KEY_SIZE];
        raw[..HALF_KEY_SIZE].copy_from_slice(&self.signing);
        raw[HALF_KEY_SIZE..].copy_from_slice(&self.encryption);
        let encoded = URL_SAFE.encode(raw);
        raw.zeroize();
        encoded
    }
}

impl std::fmt::Debug for EnvelopeKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeKeys")
            .field("signing", &"[REDACTED]")
            .field("encryption", &"[REDACTED]")
            .finish()
    }
}

/// Base key of the at-rest obfuscation.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ObfuscationKey {
    bytes: [u8; KEY_SIZE],
}

impl ObfuscationKey {
    /// Derives `SHA256(server_url ":" device_id ":obfuscate_v1")`.
    #[must_use]
    pub fn derive(server_url: &str, device_id: &str) -> Self {
        let material = format!("{server_url}:{device_id}:{OBFUSCATION_DOMAIN}");
        Self {
            bytes: Sha256::digest(material.as_bytes()).into(),
        }
    }

    /// Returns the key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Derives the outer-layer key for one salt: `SHA256(base_key || salt)`.
    #[must_use]
    pub fn round_key(&self, salt: &[u8]) -> [u8; KEY_SIZE] {
        let mut hasher = Sha256::new();
        hasher.update(self.bytes);
        hasher.update(salt);
        hasher.finalize().into()
    }
}

impl std::fmt::Debug for ObfuscationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObfuscationKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
