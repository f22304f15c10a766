//! Opcodes and code tables for the ANT serial protocol.
//!
//! Every message starts with a one-byte identifier. The identifiers below
//! are the complete set this library understands; anything else is
//! rejected as an unknown message type.

/// Message identifiers (opcodes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageId {
    // Configuration messages
    /// Release a channel slot.
    ChannelUnassign = 0x41,
    /// Bind a channel slot to a network and channel type.
    ChannelAssign = 0x42,
    /// Device number, device type and transmission type of a channel.
    ChannelId = 0x51,
    /// Message period of a channel.
    ChannelPeriod = 0x43,
    /// Receive search timeout of a channel.
    ChannelSearchTimeout = 0x44,
    /// RF frequency of a channel.
    ChannelFrequency = 0x45,
    /// Per-channel transmit power.
    ChannelTxPower = 0x60,
    /// Load a network key into a network slot.
    NetworkKey = 0x46,
    /// Transmit power for all channels.
    TxPower = 0x47,

    // Control messages
    /// Reset the radio.
    SystemReset = 0x4A,
    /// Start a channel.
    ChannelOpen = 0x4B,
    /// Stop a channel.
    ChannelClose = 0x4C,
    /// Ask the radio to send a specific message.
    ChannelRequest = 0x4D,

    // Data messages
    /// Broadcast data.
    ChannelBroadcastData = 0x4E,
    /// Acknowledged data.
    ChannelAcknowledgedData = 0x4F,
    /// Burst data.
    ChannelBurstData = 0x50,

    // Channel event messages
    /// Command response or RF event.
    ChannelEvent = 0x40,

    // Requested response messages
    /// Channel status.
    ChannelStatus = 0x52,
    /// Radio firmware version string.
    Version = 0x3E,
    /// Radio capabilities.
    Capabilities = 0x54,
    /// Radio serial number.
    SerialNumber = 0x61,
}

impl MessageId {
    /// Every known identifier, in opcode table order.
    pub const ALL: [Self; 21] = [
        Self::ChannelUnassign,
        Self::ChannelAssign,
        Self::ChannelId,
        Self::ChannelPeriod,
        Self::ChannelSearchTimeout,
        Self::ChannelFrequency,
        Self::ChannelTxPower,
        Self::NetworkKey,
        Self::TxPower,
        Self::SystemReset,
        Self::ChannelOpen,
        Self::ChannelClose,
        Self::ChannelRequest,
        Self::ChannelBroadcastData,
        Self::ChannelAcknowledgedData,
        Self::ChannelBurstData,
        Self::ChannelEvent,
        Self::ChannelStatus,
        Self::Version,
        Self::Capabilities,
        Self::SerialNumber,
    ];

    /// Attempts to parse a message identifier from a byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x41 => Some(Self::ChannelUnassign),
            0x42 => Some(Self::ChannelAssign),
            0x51 => Some(Self::ChannelId),
            0x43 => Some(Self::ChannelPeriod),
            0x44 => Some(Self::ChannelSearchTimeout),
            0x45 => Some(Self::ChannelFrequency),
            0x60 => Some(Self::ChannelTxPower),
            0x46 => Some(Self::NetworkKey),
            0x47 => Some(Self::TxPower),
            0x4A => Some(Self::SystemReset),
            0x4B => Some(Self::ChannelOpen),
            0x4C => Some(Self::ChannelClose),
            0x4D => Some(Self::ChannelRequest),
            0x4E => Some(Self::ChannelBroadcastData),
            0x4F => Some(Self::ChannelAcknowledgedData),
            0x50 => Some(Self::ChannelBurstData),
            0x40 => Some(Self::ChannelEvent),
            0x52 => Some(Self::ChannelStatus),
            0x3E => Some(Self::Version),
            0x54 => Some(Self::Capabilities),
            0x61 => Some(Self::SerialNumber),
            _ => None,
        }
    }

    /// Returns true if payload byte 0 carries a channel number.
    #[must_use]
    pub const fn is_channel_scoped(&self) -> bool {
        !matches!(
            self,
            Self::NetworkKey
                | Self::TxPower
                | Self::SystemReset
                | Self::Version
                | Self::Capabilities
                | Self::SerialNumber
        )
    }
}

impl From<MessageId> for u8 {
    fn from(id: MessageId) -> Self {
        id as Self
    }
}

/// Channel types passed to channel assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelType {
    /// Bidirectional receive (slave). The usual setup for listening to
    /// broadcasting sensors.
    BidirectionalReceive = 0x00,
    /// Bidirectional transmit (master).
    BidirectionalTransmit = 0x10,
    /// Shared bidirectional receive.
    SharedReceive = 0x20,
    /// Shared bidirectional transmit.
    SharedTransmit = 0x30,
    /// Receive only.
    ReceiveOnly = 0x40,
    /// Transmit only.
    TransmitOnly = 0x50,
}

impl ChannelType {
    /// Attempts to parse a channel type from a byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::BidirectionalReceive),
            0x10 => Some(Self::BidirectionalTransmit),
            0x20 => Some(Self::SharedReceive),
            0x30 => Some(Self::SharedTransmit),
            0x40 => Some(Self::ReceiveOnly),
            0x50 => Some(Self::TransmitOnly),
            _ => None,
        }
    }
}

impl From<ChannelType> for u8 {
    fn from(kind: ChannelType) -> Self {
        kind as Self
    }
}

/// Message ID carried by a channel event that is an RF event rather than
/// a reply to a command.
pub const EVENT_MESSAGE_ID: u8 = 0x01;

/// Search timeout value that disables the timeout.
pub const SEARCH_TIMEOUT_NEVER: u8 = 0xFF;

/// Highest RF channel offset (2400 MHz + offset).
pub const MAX_FREQUENCY: u8 = 124;

/// Response and event codes carried by channel events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    /// Command succeeded.
    NoError,
    EventRxSearchTimeout,
    EventRxFail,
    EventTx,
    EventTransferRxFailed,
    EventTransferTxCompleted,
    EventTransferTxFailed,
    /// The channel has been closed.
    EventChannelClosed,
    EventRxFailGoToSearch,
    EventChannelCollision,
    EventTransferTxStart,
    ChannelInWrongState,
    ChannelNotOpened,
    ChannelIdNotSet,
    CloseAllChannels,
    TransferInProgress,
    TransferSequenceNumberError,
    TransferInError,
    InvalidMessage,
    InvalidNetworkNumber,
    InvalidListId,
    InvalidScanTxChannel,
    InvalidParameterProvided,
    EventQueueOverflow,
    NvmFullError,
    NvmWriteError,
    /// A code this library has no name for.
    Unknown(u8),
}

impl ResponseCode {
    /// Parses a response code from a byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => Self::NoError,
            0x01 => Self::EventRxSearchTimeout,
            0x02 => Self::EventRxFail,
            0x03 => Self::EventTx,
            0x04 => Self::EventTransferRxFailed,
            0x05 => Self::EventTransferTxCompleted,
            0x06 => Self::EventTransferTxFailed,
            0x07 => Self::EventChannelClosed,
            0x08 => Self::EventRxFailGoToSearch,
            0x09 => Self::EventChannelCollision,
            0x0A => Self::EventTransferTxStart,
            0x15 => Self::ChannelInWrongState,
            0x16 => Self::ChannelNotOpened,
            0x18 => Self::ChannelIdNotSet,
            0x19 => Self::CloseAllChannels,
            0x1F => Self::TransferInProgress,
            0x20 => Self::TransferSequenceNumberError,
            0x21 => Self::TransferInError,
            0x28 => Self::InvalidMessage,
            0x29 => Self::InvalidNetworkNumber,
            0x30 => Self::InvalidListId,
            0x31 => Self::InvalidScanTxChannel,
            0x33 => Self::InvalidParameterProvided,
            0x35 => Self::EventQueueOverflow,
            0x40 => Self::NvmFullError,
            0x41 => Self::NvmWriteError,
            other => Self::Unknown(other),
        }
    }

    /// Encodes the response code as a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::NoError => 0x00,
            Self::EventRxSearchTimeout => 0x01,
            Self::EventRxFail => 0x02,
            Self::EventTx => 0x03,
            Self::EventTransferRxFailed => 0x04,
            Self::EventTransferTxCompleted => 0x05,
            Self::EventTransferTxFailed => 0x06,
            Self::EventChannelClosed => 0x07,
            Self::EventRxFailGoToSearch => 0x08,
            Self::EventChannelCollision => 0x09,
            Self::EventTransferTxStart => 0x0A,
            Self::ChannelInWrongState => 0x15,
            Self::ChannelNotOpened => 0x16,
            Self::ChannelIdNotSet => 0x18,
            Self::CloseAllChannels => 0x19,
            Self::TransferInProgress => 0x1F,
            Self::TransferSequenceNumberError => 0x20,
            Self::TransferInError => 0x21,
            Self::InvalidMessage => 0x28,
            Self::InvalidNetworkNumber => 0x29,
            Self::InvalidListId => 0x30,
            Self::InvalidScanTxChannel => 0x31,
            Self::InvalidParameterProvided => 0x33,
            Self::EventQueueOverflow => 0x35,
            Self::NvmFullError => 0x40,
            Self::NvmWriteError => 0x41,
            Self::Unknown(byte) => byte,
        }
    }

    /// Returns true for the success code.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::NoError)
    }
}

impl From<ResponseCode> for u8 {
    fn from(code: ResponseCode) -> Self {
        code.as_byte()
    }
}

/// Channel state as reported by a channel status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RadioChannelState {
    Unassigned = 0x00,
    Assigned = 0x01,
    Searching = 0x02,
    Tracking = 0x03,
}

impl RadioChannelState {
    /// Parses the state from the low two bits of a status byte.
    #[must_use]
    pub const fn from_bits(byte: u8) -> Self {
        match byte & 0x03 {
            0x00 => Self::Unassigned,
            0x01 => Self::Assigned,
            0x02 => Self::Searching,
            _ => Self::Tracking,
        }
    }
}
