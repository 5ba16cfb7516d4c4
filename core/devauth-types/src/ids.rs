//! Device identifier type.
//!
//! A device id is either 32 lowercase hex characters derived from hardware
//! facts, a random UUID when no facts were available, or any non-empty
//! string an embedding application chose to supply.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Length of a hardware-derived device id in hex characters.
pub const DERIVED_ID_LEN: usize = 32;

/// Stable identifier for one (machine, software) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a device id from a caller-supplied string.
    ///
    /// Surrounding whitespace is trimmed. Returns `None` for an empty id.
    #[must_use]
    pub fn new(id: impl AsRef<str>) -> Option<Self> {
        let id = id.as_ref().trim();
        if id.is_empty() {
            None
        } else {
            Some(Self(id.to_string()))
        }
    }

    /// Creates a device id from exactly the given string, surrounding
    /// whitespace included. Returns `None` for an empty or blank string.
    #[must_use]
    pub fn exact(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    /// Creates a random (UUID v4) device id.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this id has the shape of a hardware-derived id.
    #[must_use]
    pub fn is_derived(&self) -> bool {
        self.0.len() == DERIVED_ID_LEN && self.0.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// Consumes the id and returns the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeviceId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or_else(|| crate::Error::InvalidDeviceId("empty device id".to_string()))
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
