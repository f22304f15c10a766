//! # antcore
//!
//! A Rust session layer for ANT USB radio sticks.
//!
//! This library frames the ANT serial protocol, runs a background event pump
//! over the stick's byte stream, and turns the radio's asynchronous replies
//! into async request/acknowledge calls on a [`Node`] and its [`Channel`]s.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - Wire-compatible frame codec with stream resynchronisation
//! - Listener-based dispatch of every decoded message
//! - Optional timeouts on every reply wait
//! - In-memory transport and stick emulator for testing without hardware
//!   (`mock` feature)
//!
//! ## Quick Start
//!
//! ```no_run
//! use antcore::{ChannelType, NetworkKey, Node};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), antcore::Error> {
//!     let node = Node::serial("/dev/ttyUSB0");
//!     node.start().await?;
//!
//!     // Load a network key and listen for a heart rate monitor
//!     let key = NetworkKey::from_hex("ant+", "B9A521FBBD72C345")?;
//!     node.set_network_key(0, Some(key)).await?;
//!
//!     let channel = node.get_free_channel()?;
//!     channel.assign("ant+", ChannelType::BidirectionalReceive).await?;
//!     channel.set_id(0, 120, 0).await?;
//!     channel.set_period(8070).await?;
//!     channel.set_frequency(57).await?;
//!     channel.open().await?;
//!
//!     // ...
//!
//!     channel.close().await?;
//!     node.stop(true).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`protocol`] - Frame codec, opcode table and typed message variants
//! - [`event`] - Event pump, listeners and reply collectors
//! - [`commands`] - Write-then-wait command handler
//! - [`node`] - The [`Node`] session
//! - [`channel`] - The [`Channel`] slot state machine
//! - [`types`] - Network keys and capabilities
//! - [`transport`] - Serial, mock and logging transports

pub mod channel;
pub mod commands;
pub mod error;
pub mod event;
pub mod node;
pub mod protocol;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use channel::{Channel, ChannelState};
pub use commands::CommandHandler;
pub use error::{
    ChannelOperation, Error, FrameError, MalformedFrame, MessageError, NodeOperation, Result,
    TransportError,
};
pub use event::{EventPump, Listener};
pub use node::{Node, NodeConfig};
pub use protocol::{
    AntMessage, ChannelType, Message, MessageId, RadioChannelState, ResponseCode,
};
pub use transport::{SerialTransport, Transport, list_ports};
pub use types::{Capabilities, NetworkKey};
