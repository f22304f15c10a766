//! Typed views over protocol messages.
//!
//! Each variant wraps a [`Message`] and reads or writes fields at fixed
//! payload offsets. Channel-scoped variants keep the channel number at
//! offset 0. Multi-byte fields are little-endian.
//!
//! [`AntMessage::resolve`] maps an opcode to its variant through an explicit
//! table; opcodes outside the table are rejected.

use bytes::Bytes;

use crate::error::{FrameError, MalformedFrame, MessageError};
use crate::protocol::command::{
    ChannelType, EVENT_MESSAGE_ID, MAX_FREQUENCY, MessageId, RadioChannelState, ResponseCode,
};
use crate::protocol::frame::{MAX_PAYLOAD_SIZE, Message};

/// Largest data block carried by a data message.
pub const MAX_DATA_SIZE: usize = 8;

/// Length of a version string payload.
pub const VERSION_SIZE: usize = 9;

/// Highest burst sequence number (three bits).
pub const MAX_BURST_SEQUENCE: u8 = 0x07;

/// Access to the channel number of a channel-scoped message.
pub trait ChannelScoped {
    /// Returns the channel number.
    fn channel_number(&self) -> u8;

    /// Sets the channel number.
    fn set_channel_number(&mut self, channel: u8);
}

macro_rules! message_variant {
    ($(#[$meta:meta])* $name:ident => $id:ident, min_len = $min:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name(Message);

        impl $name {
            /// Opcode of this variant.
            pub const ID: MessageId = MessageId::$id;

            /// Smallest payload holding every fixed field.
            pub const MIN_LEN: usize = $min;

            fn empty() -> Self {
                Self(Message::zeroed(Self::ID as u8, Self::MIN_LEN))
            }

            fn checked(message: Message) -> Result<Self, FrameError> {
                let got = message.payload().len();
                if got < Self::MIN_LEN {
                    return Err(MalformedFrame::PayloadTooShort {
                        id: Self::ID,
                        expected: Self::MIN_LEN,
                        got,
                    }
                    .into());
                }
                Ok(Self(message))
            }

            /// Returns the underlying message.
            #[must_use]
            pub const fn as_message(&self) -> &Message {
                &self.0
            }

            /// Encodes the variant into a complete frame.
            #[must_use]
            pub fn encode(&self) -> Bytes {
                self.0.encode()
            }
        }

        impl From<$name> for Message {
            fn from(variant: $name) -> Self {
                variant.0
            }
        }

        impl From<$name> for AntMessage {
            fn from(variant: $name) -> Self {
                Self::$name(variant)
            }
        }
    };
}

macro_rules! channel_scoped {
    ($($name:ident),+ $(,)?) => {
        $(
            impl ChannelScoped for $name {
                fn channel_number(&self) -> u8 {
                    self.0.payload()[0]
                }

                fn set_channel_number(&mut self, channel: u8) {
                    self.0.payload_mut()[0] = channel;
                }
            }
        )+
    };
}

fn read_u16_le(payload: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([payload[offset], payload[offset + 1]])
}

fn write_u16_le(payload: &mut [u8], offset: usize, value: u16) {
    payload[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn set_data_block(message: &mut Message, data: &[u8]) -> Result<(), MessageError> {
    if data.len() > MAX_DATA_SIZE {
        return Err(MessageError::PayloadTooLong {
            size: data.len(),
            max: MAX_DATA_SIZE,
        });
    }
    let mut payload = [0u8; MAX_PAYLOAD_SIZE];
    payload[0] = message.payload()[0];
    payload[1..1 + data.len()].copy_from_slice(data);
    message.set_payload(&payload[..1 + data.len()])
}

// ==================== Configuration ====================

message_variant! {
    /// Releases a channel slot: `[channel]`.
    ChannelUnassign => ChannelUnassign, min_len = 1
}

impl ChannelUnassign {
    /// Creates an unassign command.
    #[must_use]
    pub fn new(channel: u8) -> Self {
        let mut message = Self::empty();
        message.set_channel_number(channel);
        message
    }
}

message_variant! {
    /// Binds a channel to a network: `[channel, type, network]`.
    ChannelAssign => ChannelAssign, min_len = 3
}

impl ChannelAssign {
    /// Creates an assign command.
    #[must_use]
    pub fn new(channel: u8, channel_type: ChannelType, network: u8) -> Self {
        let mut message = Self::empty();
        message.set_channel_number(channel);
        message.set_channel_type(channel_type);
        message.set_network_number(network);
        message
    }

    /// Returns the raw channel type byte.
    #[must_use]
    pub fn channel_type_byte(&self) -> u8 {
        self.0.payload()[1]
    }

    /// Returns the channel type, if the byte is a known type.
    #[must_use]
    pub fn channel_type(&self) -> Option<ChannelType> {
        ChannelType::from_byte(self.channel_type_byte())
    }

    pub fn set_channel_type(&mut self, channel_type: ChannelType) {
        self.0.payload_mut()[1] = channel_type.into();
    }

    #[must_use]
    pub fn network_number(&self) -> u8 {
        self.0.payload()[2]
    }

    pub fn set_network_number(&mut self, network: u8) {
        self.0.payload_mut()[2] = network;
    }
}

message_variant! {
    /// Pairing identity of a channel:
    /// `[channel, device_number:2LE, device_type, transmission_type]`.
    ChannelId => ChannelId, min_len = 5
}

impl ChannelId {
    /// Creates a channel ID command. Zero fields act as wildcards while searching.
    #[must_use]
    pub fn new(channel: u8, device_number: u16, device_type: u8, transmission_type: u8) -> Self {
        let mut message = Self::empty();
        message.set_channel_number(channel);
        message.set_device_number(device_number);
        message.set_device_type(device_type);
        message.set_transmission_type(transmission_type);
        message
    }

    #[must_use]
    pub fn device_number(&self) -> u16 {
        read_u16_le(self.0.payload(), 1)
    }

    pub fn set_device_number(&mut self, device_number: u16) {
        write_u16_le(self.0.payload_mut(), 1, device_number);
    }

    #[must_use]
    pub fn device_type(&self) -> u8 {
        self.0.payload()[3]
    }

    pub fn set_device_type(&mut self, device_type: u8) {
        self.0.payload_mut()[3] = device_type;
    }

    #[must_use]
    pub fn transmission_type(&self) -> u8 {
        self.0.payload()[4]
    }

    pub fn set_transmission_type(&mut self, transmission_type: u8) {
        self.0.payload_mut()[4] = transmission_type;
    }
}

message_variant! {
    /// Message period in 1/32768 s units: `[channel, period:2LE]`.
    ChannelPeriod => ChannelPeriod, min_len = 3
}

impl ChannelPeriod {
    #[must_use]
    pub fn new(channel: u8, period: u16) -> Self {
        let mut message = Self::empty();
        message.set_channel_number(channel);
        message.set_period(period);
        message
    }

    #[must_use]
    pub fn period(&self) -> u16 {
        read_u16_le(self.0.payload(), 1)
    }

    pub fn set_period(&mut self, period: u16) {
        write_u16_le(self.0.payload_mut(), 1, period);
    }
}

message_variant! {
    /// Receive search timeout in 2.5 s units: `[channel, timeout]`.
    ChannelSearchTimeout => ChannelSearchTimeout, min_len = 2
}

impl ChannelSearchTimeout {
    #[must_use]
    pub fn new(channel: u8, timeout: u8) -> Self {
        let mut message = Self::empty();
        message.set_channel_number(channel);
        message.set_timeout(timeout);
        message
    }

    #[must_use]
    pub fn timeout(&self) -> u8 {
        self.0.payload()[1]
    }

    pub fn set_timeout(&mut self, timeout: u8) {
        self.0.payload_mut()[1] = timeout;
    }
}

message_variant! {
    /// RF frequency as an offset from 2400 MHz: `[channel, frequency]`.
    ChannelFrequency => ChannelFrequency, min_len = 2
}

impl ChannelFrequency {
    /// Creates a frequency command.
    ///
    /// # Errors
    ///
    /// Returns `ValueOutOfRange` if `frequency` exceeds 124.
    pub fn new(channel: u8, frequency: u8) -> Result<Self, MessageError> {
        let mut message = Self::empty();
        message.set_channel_number(channel);
        message.set_frequency(frequency)?;
        Ok(message)
    }

    #[must_use]
    pub fn frequency(&self) -> u8 {
        self.0.payload()[1]
    }

    pub fn set_frequency(&mut self, frequency: u8) -> Result<(), MessageError> {
        if frequency > MAX_FREQUENCY {
            return Err(MessageError::ValueOutOfRange {
                field: "frequency",
                value: usize::from(frequency),
                max: usize::from(MAX_FREQUENCY),
            });
        }
        self.0.payload_mut()[1] = frequency;
        Ok(())
    }
}

message_variant! {
    /// Per-channel transmit power: `[channel, power]`.
    ChannelTxPower => ChannelTxPower, min_len = 2
}

impl ChannelTxPower {
    #[must_use]
    pub fn new(channel: u8, power: u8) -> Self {
        let mut message = Self::empty();
        message.set_channel_number(channel);
        message.set_power(power);
        message
    }

    #[must_use]
    pub fn power(&self) -> u8 {
        self.0.payload()[1]
    }

    pub fn set_power(&mut self, power: u8) {
        self.0.payload_mut()[1] = power;
    }
}

message_variant! {
    /// Loads key material into a network slot: `[network, key:8]`.
    SetNetworkKey => NetworkKey, min_len = 9
}

impl SetNetworkKey {
    #[must_use]
    pub fn new(network: u8, key: &[u8; 8]) -> Self {
        let mut message = Self::empty();
        message.set_network_number(network);
        message.set_key(key);
        message
    }

    #[must_use]
    pub fn network_number(&self) -> u8 {
        self.0.payload()[0]
    }

    pub fn set_network_number(&mut self, network: u8) {
        self.0.payload_mut()[0] = network;
    }

    #[must_use]
    pub fn key(&self) -> [u8; 8] {
        let mut key = [0u8; 8];
        key.copy_from_slice(&self.0.payload()[1..9]);
        key
    }

    pub fn set_key(&mut self, key: &[u8; 8]) {
        self.0.payload_mut()[1..9].copy_from_slice(key);
    }
}

message_variant! {
    /// Transmit power for every channel: `[0, power]`.
    SetTxPower => TxPower, min_len = 2
}

impl SetTxPower {
    #[must_use]
    pub fn new(power: u8) -> Self {
        let mut message = Self::empty();
        message.set_power(power);
        message
    }

    #[must_use]
    pub fn power(&self) -> u8 {
        self.0.payload()[1]
    }

    pub fn set_power(&mut self, power: u8) {
        self.0.payload_mut()[1] = power;
    }
}

// ==================== Control ====================

message_variant! {
    /// Resets the radio: `[0]`. The radio sends no acknowledgement.
    SystemReset => SystemReset, min_len = 1
}

impl SystemReset {
    #[must_use]
    pub fn new() -> Self {
        Self::empty()
    }
}

impl Default for SystemReset {
    fn default() -> Self {
        Self::new()
    }
}

message_variant! {
    /// Opens a channel: `[channel]`.
    ChannelOpen => ChannelOpen, min_len = 1
}

impl ChannelOpen {
    #[must_use]
    pub fn new(channel: u8) -> Self {
        let mut message = Self::empty();
        message.set_channel_number(channel);
        message
    }
}

message_variant! {
    /// Closes a channel: `[channel]`.
    ///
    /// The radio acknowledges the command, then later reports a separate
    /// "channel closed" event once the channel has actually stopped.
    ChannelClose => ChannelClose, min_len = 1
}

impl ChannelClose {
    #[must_use]
    pub fn new(channel: u8) -> Self {
        let mut message = Self::empty();
        message.set_channel_number(channel);
        message
    }
}

message_variant! {
    /// Asks the radio to send a message: `[channel, message_id]`.
    ChannelRequest => ChannelRequest, min_len = 2
}

impl ChannelRequest {
    #[must_use]
    pub fn new(channel: u8, requested: MessageId) -> Self {
        let mut message = Self::empty();
        message.set_channel_number(channel);
        message.set_requested(requested);
        message
    }

    /// Returns the raw id of the requested message.
    #[must_use]
    pub fn requested_byte(&self) -> u8 {
        self.0.payload()[1]
    }

    #[must_use]
    pub fn requested(&self) -> Option<MessageId> {
        MessageId::from_byte(self.requested_byte())
    }

    pub fn set_requested(&mut self, requested: MessageId) {
        self.0.payload_mut()[1] = requested.into();
    }
}

// ==================== Data ====================

message_variant! {
    /// Broadcast data: `[channel, data:0..8]`.
    ChannelBroadcastData => ChannelBroadcastData, min_len = 1
}

message_variant! {
    /// Acknowledged data: `[channel, data:0..8]`.
    ChannelAcknowledgedData => ChannelAcknowledgedData, min_len = 1
}

message_variant! {
    /// Burst data: `[sequence:3 | channel:5, data:0..8]`.
    ChannelBurstData => ChannelBurstData, min_len = 1
}

macro_rules! data_accessors {
    ($($name:ident),+) => {
        $(
            impl $name {
                /// Creates a data message.
                ///
                /// # Errors
                ///
                /// Returns `PayloadTooLong` if `data` exceeds eight bytes.
                pub fn new(channel: u8, data: &[u8]) -> Result<Self, MessageError> {
                    let mut message = Self::empty();
                    message.set_channel_number(channel);
                    message.set_data(data)?;
                    Ok(message)
                }

                /// Returns the data bytes after the channel byte.
                #[must_use]
                pub fn data(&self) -> &[u8] {
                    &self.0.payload()[1..]
                }

                /// Replaces the data bytes. On error the message is unchanged.
                pub fn set_data(&mut self, data: &[u8]) -> Result<(), MessageError> {
                    set_data_block(&mut self.0, data)
                }
            }
        )+
    };
}

data_accessors!(
    ChannelBroadcastData,
    ChannelAcknowledgedData,
    ChannelBurstData
);

impl ChannelBurstData {
    /// Returns the burst sequence number (upper three bits of byte 0).
    #[must_use]
    pub fn sequence(&self) -> u8 {
        self.0.payload()[0] >> 5
    }

    pub fn set_sequence(&mut self, sequence: u8) -> Result<(), MessageError> {
        if sequence > MAX_BURST_SEQUENCE {
            return Err(MessageError::ValueOutOfRange {
                field: "burst sequence",
                value: usize::from(sequence),
                max: usize::from(MAX_BURST_SEQUENCE),
            });
        }
        let byte = &mut self.0.payload_mut()[0];
        *byte = (*byte & 0x1F) | (sequence << 5);
        Ok(())
    }
}

impl ChannelScoped for ChannelBurstData {
    fn channel_number(&self) -> u8 {
        self.0.payload()[0] & 0x1F
    }

    fn set_channel_number(&mut self, channel: u8) {
        let byte = &mut self.0.payload_mut()[0];
        *byte = (*byte & 0xE0) | (channel & 0x1F);
    }
}

// ==================== Events and responses ====================

message_variant! {
    /// Command response or RF event: `[channel, message_id, code]`.
    ///
    /// For a command response `message_id` is the opcode of the command being
    /// answered; for an RF event it is `0x01`.
    ChannelEvent => ChannelEvent, min_len = 3
}

impl ChannelEvent {
    #[must_use]
    pub fn new(channel: u8, message_id: u8, code: ResponseCode) -> Self {
        let mut message = Self::empty();
        message.set_channel_number(channel);
        message.set_message_id(message_id);
        message.set_response_code(code);
        message
    }

    /// Returns the id of the message this event answers.
    #[must_use]
    pub fn message_id(&self) -> u8 {
        self.0.payload()[1]
    }

    pub fn set_message_id(&mut self, message_id: u8) {
        self.0.payload_mut()[1] = message_id;
    }

    #[must_use]
    pub fn message_code(&self) -> u8 {
        self.0.payload()[2]
    }

    #[must_use]
    pub fn response_code(&self) -> ResponseCode {
        ResponseCode::from_byte(self.message_code())
    }

    pub fn set_response_code(&mut self, code: ResponseCode) {
        self.0.payload_mut()[2] = code.into();
    }

    /// Returns true for RF events, as opposed to command responses.
    #[must_use]
    pub fn is_rf_event(&self) -> bool {
        self.message_id() == EVENT_MESSAGE_ID
    }
}

message_variant! {
    /// Channel status reply: `[channel, status]`.
    ChannelStatus => ChannelStatus, min_len = 2
}

impl ChannelStatus {
    #[must_use]
    pub fn new(channel: u8, state: RadioChannelState) -> Self {
        let mut message = Self::empty();
        message.set_channel_number(channel);
        message.0.payload_mut()[1] = state as u8;
        message
    }

    #[must_use]
    pub fn status_byte(&self) -> u8 {
        self.0.payload()[1]
    }

    /// Returns the channel state from the low two status bits.
    #[must_use]
    pub fn state(&self) -> RadioChannelState {
        RadioChannelState::from_bits(self.status_byte())
    }
}

message_variant! {
    /// Firmware version string, NUL padded to nine bytes.
    Version => Version, min_len = 0
}

impl Version {
    /// Creates a version reply.
    ///
    /// # Errors
    ///
    /// Returns `ValueOutOfRange` unless `version` is exactly nine bytes.
    pub fn new(version: &[u8]) -> Result<Self, MessageError> {
        let mut message = Self::empty();
        message.set_version(version)?;
        Ok(message)
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        self.0.payload()
    }

    /// Returns the version as text, up to the first NUL byte.
    #[must_use]
    pub fn version(&self) -> String {
        let payload = self.0.payload();
        let len = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
        String::from_utf8_lossy(&payload[..len]).into_owned()
    }

    pub fn set_version(&mut self, version: &[u8]) -> Result<(), MessageError> {
        if version.len() != VERSION_SIZE {
            return Err(MessageError::ValueOutOfRange {
                field: "version length",
                value: version.len(),
                max: VERSION_SIZE,
            });
        }
        self.0.set_payload(version)
    }
}

message_variant! {
    /// Radio capabilities:
    /// `[max_channels, max_networks, standard, advanced, advanced2?]`.
    Capabilities => Capabilities, min_len = 4
}

impl Capabilities {
    #[must_use]
    pub fn new(max_channels: u8, max_networks: u8, standard: u8, advanced: u8) -> Self {
        let mut message = Self::empty();
        let payload = message.0.payload_mut();
        payload[0] = max_channels;
        payload[1] = max_networks;
        payload[2] = standard;
        payload[3] = advanced;
        message
    }

    #[must_use]
    pub fn max_channels(&self) -> u8 {
        self.0.payload()[0]
    }

    #[must_use]
    pub fn max_networks(&self) -> u8 {
        self.0.payload()[1]
    }

    #[must_use]
    pub fn standard_options(&self) -> u8 {
        self.0.payload()[2]
    }

    #[must_use]
    pub fn advanced_options(&self) -> u8 {
        self.0.payload()[3]
    }

    /// Returns the second advanced options byte, sent by newer radios only.
    #[must_use]
    pub fn advanced_options2(&self) -> Option<u8> {
        self.0.payload().get(4).copied()
    }

    /// Sets the second advanced options byte, appending it if absent.
    pub fn set_advanced_options2(&mut self, options: u8) {
        self.0.ensure_len(5);
        self.0.payload_mut()[4] = options;
    }
}

message_variant! {
    /// Radio serial number: four bytes, read as a little-endian `u32`.
    SerialNumber => SerialNumber, min_len = 4
}

impl SerialNumber {
    #[must_use]
    pub fn new(serial: u32) -> Self {
        let mut message = Self::empty();
        message.0.payload_mut()[..4].copy_from_slice(&serial.to_le_bytes());
        message
    }

    #[must_use]
    pub fn bytes(&self) -> [u8; 4] {
        let payload = self.0.payload();
        [payload[0], payload[1], payload[2], payload[3]]
    }

    #[must_use]
    pub fn serial(&self) -> u32 {
        u32::from_le_bytes(self.bytes())
    }
}

channel_scoped!(
    ChannelUnassign,
    ChannelAssign,
    ChannelId,
    ChannelPeriod,
    ChannelSearchTimeout,
    ChannelFrequency,
    ChannelTxPower,
    ChannelOpen,
    ChannelClose,
    ChannelRequest,
    ChannelBroadcastData,
    ChannelAcknowledgedData,
    ChannelEvent,
    ChannelStatus,
);

// ==================== Resolution ====================

/// A decoded message, tagged by variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AntMessage {
    ChannelUnassign(ChannelUnassign),
    ChannelAssign(ChannelAssign),
    ChannelId(ChannelId),
    ChannelPeriod(ChannelPeriod),
    ChannelSearchTimeout(ChannelSearchTimeout),
    ChannelFrequency(ChannelFrequency),
    ChannelTxPower(ChannelTxPower),
    SetNetworkKey(SetNetworkKey),
    SetTxPower(SetTxPower),
    SystemReset(SystemReset),
    ChannelOpen(ChannelOpen),
    ChannelClose(ChannelClose),
    ChannelRequest(ChannelRequest),
    ChannelBroadcastData(ChannelBroadcastData),
    ChannelAcknowledgedData(ChannelAcknowledgedData),
    ChannelBurstData(ChannelBurstData),
    ChannelEvent(ChannelEvent),
    ChannelStatus(ChannelStatus),
    Version(Version),
    Capabilities(Capabilities),
    SerialNumber(SerialNumber),
}

impl AntMessage {
    /// Resolves a raw message into its variant.
    ///
    /// # Errors
    ///
    /// Returns `UnknownMessageType` for opcodes outside the protocol table,
    /// or `Malformed` if the payload is too short for the variant's fields.
    pub fn resolve(message: Message) -> Result<Self, FrameError> {
        let Some(id) = message.message_id() else {
            return Err(FrameError::UnknownMessageType(message.id()));
        };

        Ok(match id {
            MessageId::ChannelUnassign => Self::ChannelUnassign(ChannelUnassign::checked(message)?),
            MessageId::ChannelAssign => Self::ChannelAssign(ChannelAssign::checked(message)?),
            MessageId::ChannelId => Self::ChannelId(ChannelId::checked(message)?),
            MessageId::ChannelPeriod => Self::ChannelPeriod(ChannelPeriod::checked(message)?),
            MessageId::ChannelSearchTimeout => {
                Self::ChannelSearchTimeout(ChannelSearchTimeout::checked(message)?)
            }
            MessageId::ChannelFrequency => {
                Self::ChannelFrequency(ChannelFrequency::checked(message)?)
            }
            MessageId::ChannelTxPower => Self::ChannelTxPower(ChannelTxPower::checked(message)?),
            MessageId::NetworkKey => Self::SetNetworkKey(SetNetworkKey::checked(message)?),
            MessageId::TxPower => Self::SetTxPower(SetTxPower::checked(message)?),
            MessageId::SystemReset => Self::SystemReset(SystemReset::checked(message)?),
            MessageId::ChannelOpen => Self::ChannelOpen(ChannelOpen::checked(message)?),
            MessageId::ChannelClose => Self::ChannelClose(ChannelClose::checked(message)?),
            MessageId::ChannelRequest => Self::ChannelRequest(ChannelRequest::checked(message)?),
            MessageId::ChannelBroadcastData => {
                Self::ChannelBroadcastData(ChannelBroadcastData::checked(message)?)
            }
            MessageId::ChannelAcknowledgedData => {
                Self::ChannelAcknowledgedData(ChannelAcknowledgedData::checked(message)?)
            }
            MessageId::ChannelBurstData => {
                Self::ChannelBurstData(ChannelBurstData::checked(message)?)
            }
            MessageId::ChannelEvent => Self::ChannelEvent(ChannelEvent::checked(message)?),
            MessageId::ChannelStatus => Self::ChannelStatus(ChannelStatus::checked(message)?),
            MessageId::Version => Self::Version(Version::checked(message)?),
            MessageId::Capabilities => Self::Capabilities(Capabilities::checked(message)?),
            MessageId::SerialNumber => Self::SerialNumber(SerialNumber::checked(message)?),
        })
    }

    /// Decodes and resolves one frame from the start of `raw`.
    ///
    /// Returns the message and the number of bytes the frame occupied.
    pub fn from_frame(raw: &[u8]) -> Result<(Self, usize), FrameError> {
        let (message, consumed) = Message::decode(raw)?;
        Ok((Self::resolve(message)?, consumed))
    }

    /// Returns the underlying message.
    #[must_use]
    pub const fn message(&self) -> &Message {
        match self {
            Self::ChannelUnassign(m) => m.as_message(),
            Self::ChannelAssign(m) => m.as_message(),
            Self::ChannelId(m) => m.as_message(),
            Self::ChannelPeriod(m) => m.as_message(),
            Self::ChannelSearchTimeout(m) => m.as_message(),
            Self::ChannelFrequency(m) => m.as_message(),
            Self::ChannelTxPower(m) => m.as_message(),
            Self::SetNetworkKey(m) => m.as_message(),
            Self::SetTxPower(m) => m.as_message(),
            Self::SystemReset(m) => m.as_message(),
            Self::ChannelOpen(m) => m.as_message(),
            Self::ChannelClose(m) => m.as_message(),
            Self::ChannelRequest(m) => m.as_message(),
            Self::ChannelBroadcastData(m) => m.as_message(),
            Self::ChannelAcknowledgedData(m) => m.as_message(),
            Self::ChannelBurstData(m) => m.as_message(),
            Self::ChannelEvent(m) => m.as_message(),
            Self::ChannelStatus(m) => m.as_message(),
            Self::Version(m) => m.as_message(),
            Self::Capabilities(m) => m.as_message(),
            Self::SerialNumber(m) => m.as_message(),
        }
    }

    /// Returns the variant's opcode.
    #[must_use]
    pub const fn id(&self) -> MessageId {
        match self {
            Self::ChannelUnassign(_) => MessageId::ChannelUnassign,
            Self::ChannelAssign(_) => MessageId::ChannelAssign,
            Self::ChannelId(_) => MessageId::ChannelId,
            Self::ChannelPeriod(_) => MessageId::ChannelPeriod,
            Self::ChannelSearchTimeout(_) => MessageId::ChannelSearchTimeout,
            Self::ChannelFrequency(_) => MessageId::ChannelFrequency,
            Self::ChannelTxPower(_) => MessageId::ChannelTxPower,
            Self::SetNetworkKey(_) => MessageId::NetworkKey,
            Self::SetTxPower(_) => MessageId::TxPower,
            Self::SystemReset(_) => MessageId::SystemReset,
            Self::ChannelOpen(_) => MessageId::ChannelOpen,
            Self::ChannelClose(_) => MessageId::ChannelClose,
            Self::ChannelRequest(_) => MessageId::ChannelRequest,
            Self::ChannelBroadcastData(_) => MessageId::ChannelBroadcastData,
            Self::ChannelAcknowledgedData(_) => MessageId::ChannelAcknowledgedData,
            Self::ChannelBurstData(_) => MessageId::ChannelBurstData,
            Self::ChannelEvent(_) => MessageId::ChannelEvent,
            Self::ChannelStatus(_) => MessageId::ChannelStatus,
            Self::Version(_) => MessageId::Version,
            Self::Capabilities(_) => MessageId::Capabilities,
            Self::SerialNumber(_) => MessageId::SerialNumber,
        }
    }

    /// Returns the channel number for channel-scoped variants.
    #[must_use]
    pub fn channel_number(&self) -> Option<u8> {
        match self {
            Self::ChannelUnassign(m) => Some(m.channel_number()),
            Self::ChannelAssign(m) => Some(m.channel_number()),
            Self::ChannelId(m) => Some(m.channel_number()),
            Self::ChannelPeriod(m) => Some(m.channel_number()),
            Self::ChannelSearchTimeout(m) => Some(m.channel_number()),
            Self::ChannelFrequency(m) => Some(m.channel_number()),
            Self::ChannelTxPower(m) => Some(m.channel_number()),
            Self::ChannelOpen(m) => Some(m.channel_number()),
            Self::ChannelClose(m) => Some(m.channel_number()),
            Self::ChannelRequest(m) => Some(m.channel_number()),
            Self::ChannelBroadcastData(m) => Some(m.channel_number()),
            Self::ChannelAcknowledgedData(m) => Some(m.channel_number()),
            Self::ChannelBurstData(m) => Some(m.channel_number()),
            Self::ChannelEvent(m) => Some(m.channel_number()),
            Self::ChannelStatus(m) => Some(m.channel_number()),
            Self::SetNetworkKey(_)
            | Self::SetTxPower(_)
            | Self::SystemReset(_)
            | Self::Version(_)
            | Self::Capabilities(_)
            | Self::SerialNumber(_) => None,
        }
    }

    /// Returns the channel event, if this is one.
    #[must_use]
    pub const fn as_channel_event(&self) -> Option<&ChannelEvent> {
        match self {
            Self::ChannelEvent(event) => Some(event),
            _ => None,
        }
    }

    /// Encodes the message into a complete frame.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        self.message().encode()
    }
}

impl From<AntMessage> for Message {
    fn from(message: AntMessage) -> Self {
        *message.message()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_every_opcode() {
        for id in MessageId::ALL {
            let message = Message::new(id as u8, &[0u8; MAX_PAYLOAD_SIZE]).unwrap();
            let resolved = AntMessage::resolve(message).unwrap();
            assert_eq!(resolved.id(), id);
            assert_eq!(resolved.message(), &message);
            assert_eq!(
                resolved.channel_number().is_some(),
                id.is_channel_scoped(),
                "{id:?}"
            );
        }
    }

    #[test]
    fn test_resolve_unassign_is_unassign() {
        let message = Message::new(0x41, &[0x03]).unwrap();
        match AntMessage::resolve(message).unwrap() {
            AntMessage::ChannelUnassign(unassign) => assert_eq!(unassign.channel_number(), 3),
            other => panic!("resolved to {other:?}"),
        }
    }

    #[test]
    fn test_resolve_unknown_opcode() {
        let message = Message::new(0x99, &[0x00]).unwrap();
        assert_eq!(
            AntMessage::resolve(message).unwrap_err(),
            FrameError::UnknownMessageType(0x99)
        );
    }

    #[test]
    fn test_resolve_short_payload() {
        let message = Message::new(MessageId::ChannelEvent as u8, &[0x00, 0x42]).unwrap();
        assert_eq!(
            AntMessage::resolve(message).unwrap_err(),
            FrameError::Malformed(MalformedFrame::PayloadTooShort {
                id: MessageId::ChannelEvent,
                expected: 3,
                got: 2
            })
        );
    }

    #[test]
    fn test_from_frame() {
        let frame = [0xA4, 0x03, 0x42, 0x00, 0x00, 0x00, 0xE5];
        let (message, consumed) = AntMessage::from_frame(&frame).unwrap();
        assert_eq!(consumed, 7);
        let AntMessage::ChannelAssign(assign) = message else {
            panic!("expected assign, got {message:?}");
        };
        assert_eq!(assign.channel_type(), Some(ChannelType::BidirectionalReceive));
        assert_eq!(assign.network_number(), 0);
    }

    #[test]
    fn test_channel_assign_layout() {
        let assign = ChannelAssign::new(2, ChannelType::SharedTransmit, 1);
        assert_eq!(assign.as_message().payload(), &[0x02, 0x30, 0x01]);
        assert_eq!(&assign.encode()[..3], &[0xA4, 0x03, 0x42]);
    }

    #[test]
    fn test_channel_id_little_endian() {
        let mut id = ChannelId::new(1, 0x1234, 0x78, 0x01);
        assert_eq!(id.as_message().payload(), &[0x01, 0x34, 0x12, 0x78, 0x01]);
        id.set_device_number(0xBEEF);
        assert_eq!(id.device_number(), 0xBEEF);
        assert_eq!(id.device_type(), 0x78);
        assert_eq!(id.transmission_type(), 0x01);
    }

    #[test]
    fn test_channel_period() {
        let period = ChannelPeriod::new(0, 8070);
        assert_eq!(period.as_message().payload(), &[0x00, 0x86, 0x1F]);
        assert_eq!(period.period(), 8070);
    }

    #[test]
    fn test_frequency_range() {
        assert_eq!(ChannelFrequency::new(0, 57).unwrap().frequency(), 57);
        assert_eq!(ChannelFrequency::new(0, 124).unwrap().frequency(), 124);

        let mut frequency = ChannelFrequency::new(0, 66).unwrap();
        let err = frequency.set_frequency(125).unwrap_err();
        assert_eq!(
            err,
            MessageError::ValueOutOfRange {
                field: "frequency",
                value: 125,
                max: 124
            }
        );
        assert_eq!(frequency.frequency(), 66);
    }

    #[test]
    fn test_network_key() {
        let key = [0xB9, 0xA5, 0x21, 0xFB, 0xBD, 0x72, 0xC3, 0x45];
        let message = SetNetworkKey::new(0, &key);
        assert_eq!(message.network_number(), 0);
        assert_eq!(message.key(), key);
        assert_eq!(message.as_message().size(), 13);
    }

    #[test]
    fn test_data_messages() {
        let data = [1, 2, 3, 4, 5, 6, 7, 8];
        let broadcast = ChannelBroadcastData::new(3, &data).unwrap();
        assert_eq!(broadcast.channel_number(), 3);
        assert_eq!(broadcast.data(), &data);

        let mut ack = ChannelAcknowledgedData::new(1, &[0xAA]).unwrap();
        assert!(ack.set_data(&[0u8; 9]).is_err());
        assert_eq!(ack.data(), &[0xAA]);
    }

    #[test]
    fn test_burst_sequence_bits() {
        let mut burst = ChannelBurstData::new(5, &[0u8; 8]).unwrap();
        burst.set_sequence(3).unwrap();
        assert_eq!(burst.channel_number(), 5);
        assert_eq!(burst.sequence(), 3);
        assert_eq!(burst.as_message().payload()[0], 0x65);
        assert!(burst.set_sequence(8).is_err());

        let resolved = AntMessage::resolve(burst.into()).unwrap();
        assert_eq!(resolved.channel_number(), Some(5));
    }

    #[test]
    fn test_channel_event() {
        let event = ChannelEvent::new(0, MessageId::ChannelOpen as u8, ResponseCode::NoError);
        assert_eq!(event.message_id(), 0x4B);
        assert!(event.response_code().is_success());
        assert!(!event.is_rf_event());

        let closed = ChannelEvent::new(0, EVENT_MESSAGE_ID, ResponseCode::EventChannelClosed);
        assert!(closed.is_rf_event());
        assert_eq!(closed.message_code(), 0x07);
    }

    #[test]
    fn test_channel_status() {
        let status = ChannelStatus::new(2, RadioChannelState::Searching);
        assert_eq!(status.state(), RadioChannelState::Searching);
        assert_eq!(status.channel_number(), 2);
    }

    #[test]
    fn test_version() {
        let version = Version::new(b"AP2-1.05\0").unwrap();
        assert_eq!(version.version(), "AP2-1.05");
        assert!(Version::new(b"short").is_err());
    }

    #[test]
    fn test_capabilities() {
        let mut caps = Capabilities::new(8, 8, 0x00, 0x3A);
        assert_eq!(caps.max_channels(), 8);
        assert_eq!(caps.max_networks(), 8);
        assert_eq!(caps.advanced_options(), 0x3A);
        assert_eq!(caps.advanced_options2(), None);

        caps.set_advanced_options2(0x05);
        assert_eq!(caps.advanced_options2(), Some(0x05));
        assert_eq!(caps.as_message().payload().len(), 5);
    }

    #[test]
    fn test_serial_number() {
        let serial = SerialNumber::new(0x1234_5678);
        assert_eq!(serial.bytes(), [0x78, 0x56, 0x34, 0x12]);
        assert_eq!(serial.serial(), 0x1234_5678);
    }

    #[test]
    fn test_system_reset_checksum() {
        assert_eq!(
            &SystemReset::new().encode()[..],
            &[0xA4, 0x01, 0x4A, 0x00, 0xEF]
        );
    }
}
