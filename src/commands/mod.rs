//! Command handling for ANT operations.
//!
//! A command is written to the transport and the caller then waits on the
//! event pump's collectors for the reply: a channel event for configuration
//! commands, or a specific message for requests.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::event::EventPump;
use crate::protocol::variant::{ChannelRequest, SetNetworkKey, SystemReset};
use crate::protocol::{AntMessage, Message, MessageId, RadioChannelState, ResponseCode};
use crate::transport::SharedTransport;
use crate::types::{Capabilities, NetworkKey};

/// Command handler shared by a node and its channels.
#[derive(Clone)]
pub struct CommandHandler {
    transport: SharedTransport,
    pump: EventPump,
    timeout: Option<Duration>,
}

impl CommandHandler {
    /// Creates a command handler that waits indefinitely for replies.
    #[must_use]
    pub const fn new(transport: SharedTransport, pump: EventPump) -> Self {
        Self {
            transport,
            pump,
            timeout: None,
        }
    }

    /// Sets the reply timeout. `None` waits indefinitely.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Returns the reply timeout.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns the event pump replies arrive through.
    #[must_use]
    pub const fn pump(&self) -> &EventPump {
        &self.pump
    }

    /// Writes a message without waiting for a reply.
    pub async fn send(&self, message: impl Into<Message>) -> Result<()> {
        let message = message.into();
        tracing::trace!("sending {:?}", message);
        let mut transport = self.transport.lock().await;
        transport.write(message.encode()).await?;
        Ok(())
    }

    /// Writes a command and waits for the channel event answering it.
    ///
    /// Returns the response code without interpreting it. Stale replies to
    /// the same opcode are dropped before sending.
    pub async fn send_and_ack(&self, message: impl Into<Message>) -> Result<ResponseCode> {
        let message = message.into();
        let opcode = message.id();
        self.pump.purge_acks(|event| event.message_id() == opcode);
        self.send(message).await?;

        let code = self.pump.wait_for_ack(opcode, self.timeout).await?;
        tracing::debug!("command 0x{:02X} answered with {:?}", opcode, code);
        Ok(code)
    }

    /// Writes a message and waits for a reply of kind `reply`.
    pub async fn send_and_wait(
        &self,
        message: impl Into<Message>,
        reply: MessageId,
    ) -> Result<AntMessage> {
        self.pump.purge_messages(|m| m.id() == reply);
        self.send(message).await?;
        self.pump.wait_for_message(reply, self.timeout).await
    }

    /// Asks the radio to send a message of kind `id` about `channel`.
    pub async fn request(&self, channel: u8, id: MessageId) -> Result<AntMessage> {
        self.send_and_wait(ChannelRequest::new(channel, id), id)
            .await
    }

    // ==================== System ====================

    /// Resets the radio and waits `delay` for it to settle.
    ///
    /// The radio does not acknowledge a reset, so nothing is awaited.
    pub async fn reset(&self, delay: Duration) -> Result<()> {
        tracing::info!("resetting radio");
        self.send(SystemReset::new()).await?;
        tokio::time::sleep(delay).await;
        Ok(())
    }

    /// Requests the radio's capabilities.
    pub async fn capabilities(&self) -> Result<Capabilities> {
        match self.request(0, MessageId::Capabilities).await? {
            AntMessage::Capabilities(caps) => Ok(Capabilities::from(&caps)),
            other => Err(unexpected(MessageId::Capabilities, &other)),
        }
    }

    /// Requests the firmware version string.
    pub async fn version(&self) -> Result<String> {
        match self.request(0, MessageId::Version).await? {
            AntMessage::Version(version) => Ok(version.version()),
            other => Err(unexpected(MessageId::Version, &other)),
        }
    }

    /// Requests the radio's serial number.
    pub async fn serial_number(&self) -> Result<u32> {
        match self.request(0, MessageId::SerialNumber).await? {
            AntMessage::SerialNumber(serial) => Ok(serial.serial()),
            other => Err(unexpected(MessageId::SerialNumber, &other)),
        }
    }

    /// Loads `key` into network slot `index`.
    pub async fn set_network_key(&self, index: u8, key: &NetworkKey) -> Result<ResponseCode> {
        self.send_and_ack(SetNetworkKey::new(index, key.key()))
            .await
    }

    // ==================== Channel ====================

    /// Requests the radio-side state of a channel.
    pub async fn channel_status(&self, channel: u8) -> Result<RadioChannelState> {
        match self.request(channel, MessageId::ChannelStatus).await? {
            AntMessage::ChannelStatus(status) => Ok(status.state()),
            other => Err(unexpected(MessageId::ChannelStatus, &other)),
        }
    }
}

fn unexpected(expected: MessageId, got: &AntMessage) -> Error {
    Error::UnexpectedReply {
        expected,
        got: got.id(),
    }
}
