//! At-rest obfuscation with an hourly key schedule.
//!
//! Encoding:
//!
//! 1. `compressed = zlib(plaintext, level 9)`
//! 2. `stage1 = compressed XOR cyclic(base_key)`
//! 3. `salt = MD5(device_id ":" hour_bucket)[..4]`
//! 4. `packed = salt | len(stage1): u32 BE | stage1`
//! 5. `output = packed XOR cyclic(SHA256(base_key | salt))`
//!
//! The writer never records its hour bucket, so the reader walks every
//! bucket within `max(2, validity_days * 24 + 12)` hours of its own clock.
//! A candidate bucket is rejected as soon as the decoded salt disagrees;
//! only a successful inflate accepts it.

use crate::error::{CryptoError, CryptoResult};
use crate::key::ObfuscationKey;
use devauth_types::{hour_bucket, unix_now};
use flate2::{write::ZlibEncoder, Compression, Decompress, FlushDecompress, Status};
use md5::{Digest, Md5};
use std::io::Write;
use tracing::trace;

/// Size of the hour salt prefix.
pub const SALT_SIZE: usize = 4;

/// Salt plus the big-endian length field.
pub const HEADER_SIZE: usize = SALT_SIZE + 4;

/// Smallest search window, in hours.
pub const MIN_WINDOW_HOURS: i64 = 2;

/// Hours added to the validity period to absorb clock drift.
pub const SKEW_MARGIN_HOURS: i64 = 12;

/// Reversible transform between a plaintext record and the on-disk blob.
#[derive(Debug, Clone)]
pub struct ObfuscationCodec {
    device_id: String,
    key: ObfuscationKey,
    validity_days: u32,
}

impl ObfuscationCodec {
    /// Creates a codec keyed by server URL and device id.
    #[must_use]
    pub fn new(server_url: &str, device_id: &str, validity_days: u32) -> Self {
        Self {
            device_id: device_id.to_string(),
            key: ObfuscationKey::derive(server_url, device_id),
            validity_days,
        }
    }

    /// Half-width of the decode search window, in hours.
    #[must_use]
    pub fn window_hours(&self) -> i64 {
        (i64::from(self.validity_days) * 24 + SKEW_MARGIN_HOURS).max(MIN_WINDOW_HOURS)
    }

    /// Encodes `plaintext` using the current hour bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if compression fails or the compressed payload does
    /// not fit the 32-bit length field.
    pub fn encode(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        self.encode_at(plaintext, unix_now())
    }

    /// Encodes `plaintext` using the hour bucket containing `unix_secs`.
    pub fn encode_at(&self, plaintext: &[u8], unix_secs: f64) -> CryptoResult<Vec<u8>> {
        let mut stage1 = deflate(plaintext)?;
        xor_cyclic(&mut stage1, self.key.as_bytes());

        let length =
            u32::try_from(stage1.len()).map_err(|_| CryptoError::PayloadTooLarge(stage1.len()))?;
        let salt = salt_for(&self.device_id, hour_bucket(unix_secs));

        let mut packed = Vec::with_capacity(HEADER_SIZE + stage1.len());
        packed.extend_from_slice(&salt);
        packed.extend_from_slice(&length.to_be_bytes());
        packed.extend_from_slice(&stage1);

        xor_cyclic(&mut packed, &self.key.round_key(&salt));
        Ok(packed)
    }

    /// Decodes a blob against the current clock.
    #[must_use]
    pub fn decode(&self, blob: &[u8]) -> Option<Vec<u8>> {
        self.decode_at(blob, unix_now())
    }

    /// Decodes a blob as if the current time were `unix_secs`.
    ///
    /// Returns `None` when no hour bucket in the window yields a valid
    /// payload.
    #[must_use]
    pub fn decode_at(&self, blob: &[u8], unix_secs: f64) -> Option<Vec<u8>> {
        if blob.len() < HEADER_SIZE {
            return None;
        }
        let current = hour_bucket(unix_secs);
        for offset in scan_offsets(self.window_hours()) {
            if let Some(plaintext) = self.try_bucket(blob, current + offset) {
                trace!(offset, "cache blob decoded");
                return Some(plaintext);
            }
        }
        None
    }

    fn try_bucket(&self, blob: &[u8], bucket: i64) -> Option<Vec<u8>> {
        let salt = salt_for(&self.device_id, bucket);
        let round_key = self.key.round_key(&salt);

        let salt_matches = salt
            .iter()
            .zip(blob.iter().zip(round_key.iter()))
            .all(|(s, (b, k))| b ^ k == *s);
        if !salt_matches {
            return None;
        }

        let mut unpacked = blob.to_vec();
        xor_cyclic(&mut unpacked, &round_key);

        let length = u32::from_be_bytes(unpacked[SALT_SIZE..HEADER_SIZE].try_into().ok()?) as usize;
        if length > unpacked.len() - HEADER_SIZE {
            return None;
        }

        let mut compressed = unpacked[HEADER_SIZE..HEADER_SIZE + length].to_vec();
        xor_cyclic(&mut compressed, self.key.as_bytes());
        inflate(&compressed)
    }
}

/// Offsets in the order they are tried: `0, -1, 1, -2, 2, ...`.
fn scan_offsets(window: i64) -> impl Iterator<Item = i64> {
    std::iter::once(0).chain((1..=window).flat_map(|n| [-n, n]))
}

fn salt_for(device_id: &str, bucket: i64) -> [u8; SALT_SIZE] {
    let digest = Md5::digest(format!("{device_id}:{bucket}").as_bytes());
    let mut salt = [0u8; SALT_SIZE];
    salt.copy_from_slice(&digest[..SALT_SIZE]);
    salt
}

fn xor_cyclic(data: &mut [u8], key: &[u8]) {
    for (byte, k) in data.iter_mut().zip(key.iter().cycle()) {
        *byte ^= k;
    }
}

fn deflate(data: &[u8]) -> CryptoResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(data)
        .map_err(|e| CryptoError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| CryptoError::Compression(e.to_string()))
}

/// Inflates a complete zlib stream. A stream that ends before its
/// end marker or fails its checksum is rejected.
fn inflate(data: &[u8]) -> Option<Vec<u8>> {
    let mut inflater = Decompress::new(true);
    let mut out = Vec::with_capacity(data.len().saturating_mul(4).max(64));
    loop {
        if out.len() == out.capacity() {
            out.reserve(out.capacity().max(64));
        }
        let consumed = inflater.total_in();
        let produced = inflater.total_out();
        let input = data.get(consumed as usize..)?;
        let status = inflater
            .decompress_vec(input, &mut out, FlushDecompress::Finish)
            .ok()?;
        match status {
            Status::StreamEnd => return Some(out),
            Status::Ok | Status::BufError => {
                if inflater.total_in() == consumed && inflater.total_out() == produced {
                    return None;
                }
            }
        }
    }
}
