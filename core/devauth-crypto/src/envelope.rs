//! Authenticated wire envelope.
//!
//! Tokens use the Fernet layout, so any standard Fernet implementation
//! holding the same key can open them:
//!
//! ```text
//! base64url( 0x80 | timestamp: u64 BE | iv: 16 | AES-128-CBC/PKCS7 ciphertext | HMAC-SHA256: 32 )
//! ```
//!
//! The HMAC covers everything before it. The key is `SHA256(shared_secret)`
//! (see [`EnvelopeKeys`]). One [`WireCipher`] is built from the secret at
//! startup and shared by reference with every caller.

use crate::error::{CryptoError, CryptoResult};
use crate::key::EnvelopeKeys;
use aes::Aes128;
use base64::{engine::general_purpose::URL_SAFE, Engine};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{de::DeserializeOwned, Serialize};
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;
type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Version byte leading every token.
pub const TOKEN_VERSION: u8 = 0x80;

/// How far in the future a token timestamp may be when an age limit is set.
pub const MAX_CLOCK_SKEW_SECS: u64 = 60;

const TIMESTAMP_SIZE: usize = 8;
const IV_SIZE: usize = 16;
const BLOCK_SIZE: usize = 16;
const HMAC_SIZE: usize = 32;
const PREFIX_SIZE: usize = 1 + TIMESTAMP_SIZE + IV_SIZE;

/// Seals and opens heartbeat payloads with a pre-shared secret.
#[derive(Clone)]
pub struct WireCipher {
    keys: EnvelopeKeys,
    max_age: Option<Duration>,
}

impl WireCipher {
    /// Builds the cipher from the shared secret.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::MissingSecret`] if the secret is empty.
    pub fn new(shared_secret: &str) -> CryptoResult<Self> {
        if shared_secret.is_empty() {
            return Err(CryptoError::MissingSecret);
        }
        Ok(Self {
            keys: EnvelopeKeys::derive(shared_secret),
            max_age: None,
        })
    }

    /// Rejects tokens older than `max_age` (or stamped more than
    /// [`MAX_CLOCK_SKEW_SECS`] in the future).
    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Returns the configured maximum token age.
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    /// Encrypts raw bytes into a token stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns an error if the block cipher cannot be initialized.
    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<String> {
        let mut iv = [0u8; IV_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut iv);
        self.encrypt_at(plaintext, now_secs(), iv)
    }

    /// Encrypts raw bytes with an explicit timestamp and IV.
    pub fn encrypt_at(
        &self,
        plaintext: &[u8],
        timestamp: u64,
        iv: [u8; IV_SIZE],
    ) -> CryptoResult<String> {
        let ciphertext = Aes128CbcEnc::new_from_slices(self.keys.encryption(), &iv)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut token = Vec::with_capacity(PREFIX_SIZE + ciphertext.len() + HMAC_SIZE);
        token.push(TOKEN_VERSION);
        token.extend_from_slice(&timestamp.to_be_bytes());
        token.extend_from_slice(&iv);
        token.extend_from_slice(&ciphertext);

        let mut mac = HmacSha256::new_from_slice(self.keys.signing())
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;
        mac.update(&token);
        token.extend_from_slice(&mac.finalize().into_bytes());

        Ok(URL_SAFE.encode(&token))
    }

    /// Opens a token, returning `None` on any integrity or format failure.
    #[must_use]
    pub fn decrypt(&self, token: &str) -> Option<Vec<u8>> {
        self.decrypt_at(token, now_secs())
    }

    /// Opens a token as of `now` (Unix seconds).
    #[must_use]
    pub fn decrypt_at(&self, token: &str, now: u64) -> Option<Vec<u8>> {
        let data = URL_SAFE.decode(token.trim().as_bytes()).ok()?;
        if data.len() < PREFIX_SIZE + BLOCK_SIZE + HMAC_SIZE || data[0] != TOKEN_VERSION {
            return None;
        }

        let (signed, tag) = data.split_at(data.len() - HMAC_SIZE);
        let mut mac = HmacSha256::new_from_slice(self.keys.signing()).ok()?;
        mac.update(signed);
        mac.verify_slice(tag).ok()?;

        let timestamp = u64::from_be_bytes(signed[1..1 + TIMESTAMP_SIZE].try_into().ok()?);
        if let Some(max_age) = self.max_age {
            if timestamp.saturating_add(max_age.as_secs()) < now {
                return None;
            }
            if now.saturating_add(MAX_CLOCK_SKEW_SECS) < timestamp {
                return None;
            }
        }

        let iv = &signed[1 + TIMESTAMP_SIZE..PREFIX_SIZE];
        let ciphertext = &signed[PREFIX_SIZE..];
        if ciphertext.len() % BLOCK_SIZE != 0 {
            return None;
        }

        Aes128CbcDec::new_from_slices(self.keys.encryption(), iv)
            .ok()?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .ok()
    }

    /// Serializes `value` to compact JSON and seals it.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or encryption fails.
    pub fn seal<T: Serialize + ?Sized>(&self, value: &T) -> CryptoResult<String> {
        let json = serde_json::to_vec(value)?;
        self.encrypt(&json)
    }

    /// Opens a token and parses its JSON payload.
    #[must_use]
    pub fn open<T: DeserializeOwned>(&self, token: &str) -> Option<T> {
        let plaintext = self.decrypt(token)?;
        serde_json::from_slice(&plaintext).ok()
    }

    /// Returns the key halves.
    pub fn keys(&self) -> &EnvelopeKeys {
        &self.keys
    }
}

impl std::fmt::Debug for WireCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireCipher")
            .field("keys", &self.keys)
            .field("max_age", &self.max_age)
            .finish()
    }
}

fn now_secs() -> u64 {
    devauth_types::unix_now() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_starts_with_version_and_timestamp() {
        let cipher = WireCipher::new("secret").unwrap();
        let token = cipher.encrypt_at(b"hi", 1_700_000_000, [7u8; 16]).unwrap();
        let raw = URL_SAFE.decode(token).unwrap();
        assert_eq!(raw[0], TOKEN_VERSION);
        assert_eq!(&raw[1..9], &1_700_000_000u64.to_be_bytes());
        assert_eq!(&raw[9..25], &[7u8; 16]);
        // one padded block plus the tag
        assert_eq!(raw.len(), PREFIX_SIZE + BLOCK_SIZE + HMAC_SIZE);
    }

    #[test]
    fn max_age_rejects_stale_and_future_tokens() {
        let cipher = WireCipher::new("secret")
            .unwrap()
            .with_max_age(Duration::from_secs(300));
        let token = cipher.encrypt_at(b"x", 1_000, [0u8; 16]).unwrap();
        assert!(cipher.decrypt_at(&token, 1_200).is_some());
        assert!(cipher.decrypt_at(&token, 1_301).is_none());
        assert!(cipher.decrypt_at(&token, 900).is_none());
    }

    #[test]
    fn no_max_age_accepts_old_tokens() {
        let cipher = WireCipher::new("secret").unwrap();
        let token = cipher.encrypt_at(b"x", 1, [0u8; 16]).unwrap();
        assert_eq!(cipher.decrypt_at(&token, u64::MAX / 2).unwrap(), b"x");
    }
}
