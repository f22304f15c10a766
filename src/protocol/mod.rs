//! Protocol definitions for ANT serial communication.
//!
//! This module contains the low-level protocol types including:
//! - Frame encoding/decoding and checksums
//! - Message identifiers and response codes
//! - Typed message variants and opcode resolution

pub mod command;
pub mod frame;
pub mod variant;

pub use command::{
    ChannelType, EVENT_MESSAGE_ID, MAX_FREQUENCY, MessageId, RadioChannelState, ResponseCode,
    SEARCH_TIMEOUT_NEVER,
};
pub use frame::{FrameDecoder, MAX_PAYLOAD_SIZE, Message, SYNC, checksum};
pub use variant::{AntMessage, ChannelScoped};
