//! Cryptographic building blocks for devauth.
//!
//! Two independent schemes live here:
//!
//! - [`ObfuscationCodec`]: the at-rest transform for the local authorization
//!   cache. It deters casual inspection and tampering, keyed by server URL
//!   and device id, with a salt that rotates every hour. It is not meant to
//!   resist a determined attacker.
//! - [`WireCipher`]: authenticated encryption of the JSON payloads exchanged
//!   with the server, keyed by a pre-shared secret. This is the actual
//!   security boundary.

mod envelope;
mod error;
mod key;
mod obfuscate;

pub use envelope::{WireCipher, MAX_CLOCK_SKEW_SECS, TOKEN_VERSION};
pub use error::{CryptoError, CryptoResult};
pub use key::{EnvelopeKeys, ObfuscationKey, KEY_SIZE};
pub use obfuscate::{
    ObfuscationCodec, HEADER_SIZE, MIN_WINDOW_HOURS, SALT_SIZE, SKEW_MARGIN_HOURS,
};
