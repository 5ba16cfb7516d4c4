//! Device authorization client.
//!
//! This crate answers one question for an embedding application: is this
//! device allowed to run? It handles:
//! - Stable device-id derivation from hardware facts
//! - Sealed heartbeats to the authorization server
//! - An obfuscated local cache that stands in when the server is unreachable
//!
//! # Decision policy
//!
//! - **Always online**: every check contacts the server
//! - **Cache as fallback**: a valid cached verdict is used only when the
//!   online attempt fails to produce one
//! - **Fresh verdicts win**: a successful online verdict always overwrites
//!   the cache, whatever it held
//!
//! ```no_run
//! use devauth_client::{AuthClient, ClientConfig};
//!
//! let config = ClientConfig::new("http://localhost:8000")
//!     .with_secret("shared-secret")
//!     .with_software_name("my-app");
//! let client = AuthClient::new(config)?;
//! if let Err(e) = client.require_authorization() {
//!     eprintln!("not authorized: {e}");
//! }
//! # Ok::<(), devauth_client::ClientError>(())
//! ```

mod cache;
mod client;
mod config;
mod error;
mod facts;
mod identity;
mod outcome;
mod transport;

pub use cache::{CacheRecord, CacheStore, CachedResult};
pub use client::{check_authorization, AuthClient, AuthorizationInfo, CacheInfo};
pub use config::{
    ClientConfig, CLIENT_SECRET_ENV, DEFAULT_CACHE_VALIDITY_DAYS, DEFAULT_CHECK_INTERVAL_DAYS,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use error::{AuthorizationError, ClientError, ClientResult};
pub use facts::{build_device_info, DeviceFacts};
pub use identity::{derive_device_id, IdentityStore, IDENTITY_DIR_NAME};
pub use outcome::AuthorizationOutcome;
pub use transport::{HeartbeatTransport, HttpTransport, TransportError, TransportResponse};
