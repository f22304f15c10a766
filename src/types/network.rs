//! Network key slots.

use std::fmt;

use crate::error::{Error, Result};

/// Length of network key material in bytes.
pub const NETWORK_KEY_LEN: usize = 8;

/// A named network key held in one of the radio's network slots.
///
/// The name identifies the network within a session; channels are assigned
/// to a network by name. The slot index is stamped when the key is loaded
/// into the radio.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct NetworkKey {
    name: String,
    key: [u8; NETWORK_KEY_LEN],
    index: Option<u8>,
}

impl NetworkKey {
    /// Creates a network key.
    #[must_use]
    pub fn new(name: impl Into<String>, key: [u8; NETWORK_KEY_LEN]) -> Self {
        Self {
            name: name.into(),
            key,
            index: None,
        }
    }

    /// Parses key material from a 16-character hex string.
    ///
    /// # Errors
    ///
    /// Returns `InvalidNetworkKey` if the string is not valid hex or not
    /// exactly eight bytes long.
    pub fn from_hex(name: impl Into<String>, s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::InvalidNetworkKey {
            reason: e.to_string(),
        })?;
        let key: [u8; NETWORK_KEY_LEN] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| Error::InvalidNetworkKey {
                    reason: format!("expected {NETWORK_KEY_LEN} bytes, got {}", bytes.len()),
                })?;
        Ok(Self::new(name, key))
    }

    /// Creates the all-zero key a slot holds until the caller replaces it.
    #[must_use]
    pub fn placeholder(index: u8) -> Self {
        Self::new(format!("network-{index}"), [0; NETWORK_KEY_LEN])
    }

    /// Returns the network name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the key material.
    #[must_use]
    pub const fn key(&self) -> &[u8; NETWORK_KEY_LEN] {
        &self.key
    }

    /// Returns the slot this key was loaded into, if any.
    #[must_use]
    pub const fn index(&self) -> Option<u8> {
        self.index
    }

    pub(crate) fn set_index(&mut self, index: u8) {
        self.index = Some(index);
    }

    /// Returns the key material as a hex string.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.key)
    }
}

impl fmt::Debug for NetworkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkKey")
            .field("name", &self.name)
            .field("key", &self.to_hex())
            .field("index", &self.index)
            .finish()
    }
}

impl fmt::Display for NetworkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.to_hex())
    }
}
