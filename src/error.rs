//! Error types for the antcore library.

use std::fmt;

use thiserror::Error;

use crate::channel::ChannelState;
use crate::protocol::{MessageId, ResponseCode};

/// The main error type for antcore operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport contract violation.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame encoding/decoding error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Message construction error.
    #[error("message error: {0}")]
    Message(#[from] MessageError),

    /// Transport log could not be written.
    #[error("log encode error: {0}")]
    LogEncode(#[from] rmp_serde::encode::Error),

    /// Transport log could not be read.
    #[error("log decode error: {0}")]
    LogDecode(#[from] rmp_serde::decode::Error),

    /// Transport log has an unexpected header.
    #[error("invalid log file: {reason}")]
    LogFormat { reason: String },

    /// A channel command was rejected by the radio.
    #[error("channel {channel}: {operation} failed with {code:?}")]
    Channel {
        channel: u8,
        operation: ChannelOperation,
        code: ResponseCode,
    },

    /// A node command was rejected by the radio.
    #[error("node: {operation} failed with {code:?}")]
    Node {
        operation: NodeOperation,
        code: ResponseCode,
    },

    /// The node session is already running.
    #[error("node already started")]
    AlreadyStarted,

    /// The node session is not running.
    #[error("node not started")]
    NotStarted,

    /// A channel command was issued in the wrong lifecycle state.
    #[error("channel {channel}: cannot {operation} while {state:?}")]
    InvalidChannelState {
        channel: u8,
        operation: ChannelOperation,
        state: ChannelState,
    },

    /// Every channel slot is assigned.
    #[error("no free channel")]
    NoFreeChannel,

    /// No network slot carries the given name.
    #[error("unknown network: {name}")]
    UnknownNetwork { name: String },

    /// Network slot index beyond the negotiated maximum.
    #[error("network slot {index} out of range ({available} available)")]
    NetworkSlotOutOfRange { index: u8, available: usize },

    /// Another network slot already uses this name.
    #[error("duplicate network name: {name}")]
    DuplicateNetworkName { name: String },

    /// Invalid network key format.
    #[error("invalid network key: {reason}")]
    InvalidNetworkKey { reason: String },

    /// The reply collected for a request had an unexpected type.
    #[error("unexpected reply: expected {expected:?}, got {got:?}")]
    UnexpectedReply { expected: MessageId, got: MessageId },

    /// The channel outlived the node that owns it.
    #[error("node session closed")]
    SessionClosed,

    /// The event pump is not running, so no reply can arrive.
    #[error("event pump stopped")]
    PumpStopped,

    /// Command timed out waiting for response.
    #[error("command timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Frame decoding errors.
///
/// Only [`FrameError::ChecksumMismatch`] allows a reader to resynchronize by
/// skipping the declared frame; everything else is malformed input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The frame is structurally invalid.
    #[error("malformed frame: {0}")]
    Malformed(#[from] MalformedFrame),

    /// The trailing checksum does not match the frame contents.
    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch {
        expected: u8,
        actual: u8,
        frame_len: usize,
    },

    /// The opcode is not part of the protocol table.
    #[error("unknown message type 0x{0:02X}")]
    UnknownMessageType(u8),
}

impl FrameError {
    /// Returns true if a stream reader can skip the frame and continue.
    #[must_use]
    pub const fn is_resynchronizable(&self) -> bool {
        matches!(self, Self::ChecksumMismatch { .. })
    }
}

/// Reasons a frame is malformed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedFrame {
    /// Fewer bytes than the smallest decodable frame.
    #[error("frame too short: need at least 5 bytes, got {0}")]
    TooShort(usize),

    /// First byte is not the sync byte.
    #[error("expected sync byte 0xA4, got 0x{0:02X}")]
    BadSync(u8),

    /// Declared payload length exceeds the protocol maximum.
    #[error("payload too long: {size} bytes exceeds maximum {max}")]
    PayloadTooLong { size: usize, max: usize },

    /// Buffer ends before the declared frame does.
    #[error("incomplete frame: expected {expected} bytes, got {got}")]
    Incomplete { expected: usize, got: usize },

    /// Payload too short for the fields of its message type.
    #[error("{id:?} payload too short: need {expected} bytes, got {got}")]
    PayloadTooShort {
        id: MessageId,
        expected: usize,
        got: usize,
    },
}

/// Errors raised while building or mutating a message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// Payload longer than the protocol allows.
    #[error("payload too long: {size} bytes exceeds maximum {max}")]
    PayloadTooLong { size: usize, max: usize },

    /// A field value outside its legal range.
    #[error("{field} out of range: {value} (max {max})")]
    ValueOutOfRange {
        field: &'static str,
        value: usize,
        max: usize,
    },
}

/// Transport contract violations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// `open` on a transport that is already open.
    #[error("device already open")]
    AlreadyOpen,

    /// I/O or `close` on a transport that is not open.
    #[error("device not open")]
    NotOpen,

    /// `read` asked for zero bytes.
    #[error("zero-length read request")]
    ZeroLengthRead,

    /// `write` was given no data.
    #[error("empty write request")]
    EmptyWrite,
}

/// Channel operations, used to name the step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelOperation {
    Assign,
    SetId,
    SetSearchTimeout,
    SetPeriod,
    SetFrequency,
    SetTxPower,
    Open,
    Close,
    Unassign,
    SendBroadcast,
}

impl fmt::Display for ChannelOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Assign => "assign",
            Self::SetId => "set ID",
            Self::SetSearchTimeout => "set search timeout",
            Self::SetPeriod => "set period",
            Self::SetFrequency => "set frequency",
            Self::SetTxPower => "set TX power",
            Self::Open => "open",
            Self::Close => "close",
            Self::Unassign => "unassign",
            Self::SendBroadcast => "send broadcast data",
        };
        f.write_str(name)
    }
}

/// Node operations, used to name the step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeOperation {
    SetNetworkKey,
}

impl fmt::Display for NodeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetNetworkKey => f.write_str("set network key"),
        }
    }
}

/// Result type alias for antcore operations.
pub type Result<T> = std::result::Result<T, Error>;
