//! Data types for ANT session entities.
//!
//! - Network keys and their slots
//! - Negotiated radio capabilities

pub mod device;
pub mod network;

pub use device::Capabilities;
pub use network::{NETWORK_KEY_LEN, NetworkKey};
