//! Radio capability types.

use crate::protocol::variant::Capabilities as CapabilitiesMessage;

/// Capabilities negotiated with the radio at session start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Number of channel slots.
    pub max_channels: u8,
    /// Number of network key slots.
    pub max_networks: u8,
    /// Standard options bit field.
    pub standard_options: u8,
    /// Advanced options bit field.
    pub advanced_options: u8,
    /// Second advanced options bit field, if the radio reports one.
    pub advanced_options2: Option<u8>,
}

impl Capabilities {
    /// Standard option: receive channels unsupported.
    pub const NO_RECEIVE_CHANNELS: u8 = 0x01;
    /// Standard option: transmit channels unsupported.
    pub const NO_TRANSMIT_CHANNELS: u8 = 0x02;
    /// Standard option: acknowledged messages unsupported.
    pub const NO_ACKNOWLEDGED_MESSAGES: u8 = 0x10;
    /// Standard option: burst messages unsupported.
    pub const NO_BURST_MESSAGES: u8 = 0x20;

    /// Advanced option: network keys can be loaded.
    pub const NETWORK_ENABLED: u8 = 0x02;
    /// Advanced option: serial number available.
    pub const SERIAL_NUMBER_ENABLED: u8 = 0x08;
    /// Advanced option: per-channel transmit power.
    pub const PER_CHANNEL_TX_POWER_ENABLED: u8 = 0x10;

    /// Returns true if a standard option bit is set.
    #[must_use]
    pub const fn has_standard(&self, bit: u8) -> bool {
        self.standard_options & bit != 0
    }

    /// Returns true if an advanced option bit is set.
    #[must_use]
    pub const fn has_advanced(&self, bit: u8) -> bool {
        self.advanced_options & bit != 0
    }

    /// Returns true if the radio reports its serial number.
    #[must_use]
    pub const fn supports_serial_number(&self) -> bool {
        self.has_advanced(Self::SERIAL_NUMBER_ENABLED)
    }

    /// Returns true if channels can have their own transmit power.
    #[must_use]
    pub const fn supports_channel_tx_power(&self) -> bool {
        self.has_advanced(Self::PER_CHANNEL_TX_POWER_ENABLED)
    }
}

impl From<&CapabilitiesMessage> for Capabilities {
    fn from(message: &CapabilitiesMessage) -> Self {
        Self {
            max_channels: message.max_channels(),
            max_networks: message.max_networks(),
            standard_options: message.standard_options(),
            advanced_options: message.advanced_options(),
            advanced_options2: message.advanced_options2(),
        }
    }
}
