//! Channel slots.
//!
//! Each [`Channel`] is one of the radio's numbered channel slots. It moves
//! through `Free -> Assigned -> Open -> Assigned -> Free`, and every
//! transition is a command the radio must acknowledge with a success code
//! before the local state changes.
//!
//! A channel is also a [`Listener`] on its node's event pump: messages
//! carrying its number are handed to the callbacks registered on it.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::error::{ChannelOperation, Error, Result};
use crate::event::{Listener, ListenerSet};
use crate::node::NodeShared;
use crate::protocol::variant::{
    ChannelAssign, ChannelBroadcastData, ChannelClose, ChannelEvent, ChannelFrequency, ChannelId,
    ChannelOpen, ChannelPeriod, ChannelScoped, ChannelSearchTimeout, ChannelTxPower,
    ChannelUnassign,
};
use crate::protocol::{AntMessage, ChannelType, Message, RadioChannelState, ResponseCode};

/// Local lifecycle state of a channel slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelState {
    /// Not bound to a network.
    #[default]
    Free,
    /// Bound to a network and configurable, but not on air.
    Assigned,
    /// Searching for or tracking a device.
    Open,
}

#[derive(Debug, Default)]
struct ChannelInner {
    state: ChannelState,
    retired: bool,
    name: Option<String>,
    network: Option<u8>,
    channel_type: Option<ChannelType>,
}

/// One channel slot of a [`Node`](crate::node::Node).
pub struct Channel {
    number: u8,
    node: Weak<NodeShared>,
    inner: Mutex<ChannelInner>,
    callbacks: ListenerSet,
}

impl Channel {
    pub(crate) fn new(number: u8, node: Weak<NodeShared>) -> Self {
        Self {
            number,
            node,
            inner: Mutex::new(ChannelInner::default()),
            callbacks: ListenerSet::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the slot number.
    #[must_use]
    pub const fn number(&self) -> u8 {
        self.number
    }

    /// Returns the local lifecycle state.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.lock().state
    }

    /// Returns true if the channel can be assigned.
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.state() == ChannelState::Free
    }

    /// Returns the caller-chosen name, if any.
    #[must_use]
    pub fn name(&self) -> Option<String> {
        self.lock().name.clone()
    }

    /// Names the channel.
    pub fn set_name(&self, name: impl Into<String>) {
        self.lock().name = Some(name.into());
    }

    /// Returns the network slot the channel is assigned to.
    #[must_use]
    pub fn network(&self) -> Option<u8> {
        self.lock().network
    }

    /// Returns the channel type it was assigned with.
    #[must_use]
    pub fn channel_type(&self) -> Option<ChannelType> {
        self.lock().channel_type
    }

    /// Detaches the channel from a session that has reallocated its slots.
    pub(crate) fn retire(&self) {
        self.lock().retired = true;
    }

    /// Forgets the assignment after the radio was reset.
    pub(crate) fn release(&self) {
        let mut inner = self.lock();
        inner.state = ChannelState::Free;
        inner.network = None;
        inner.channel_type = None;
    }

    // ==================== Callbacks ====================

    /// Registers a callback for messages about this channel.
    pub fn register_callback(&self, callback: Arc<dyn Listener>) {
        self.callbacks.register(callback);
    }

    /// Removes a callback.
    pub fn remove_callback(&self, callback: &Arc<dyn Listener>) {
        self.callbacks.remove(callback);
    }

    // ==================== Lifecycle ====================

    /// Assigns the channel to the network called `network`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownNetwork` if no network slot has that name, and
    /// `Channel` if the radio rejects the assignment.
    pub async fn assign(&self, network: &str, channel_type: ChannelType) -> Result<()> {
        let node = self.session(ChannelOperation::Assign, &[ChannelState::Free])?;
        let index = node.network_index(network)?;
        self.command(
            &node,
            ChannelOperation::Assign,
            ChannelAssign::new(self.number, channel_type, index),
        )
        .await?;

        let mut inner = self.lock();
        inner.state = ChannelState::Assigned;
        inner.network = Some(index);
        inner.channel_type = Some(channel_type);
        Ok(())
    }

    /// Sets the device the channel pairs with.
    ///
    /// Zero fields act as wildcards when searching.
    pub async fn set_id(
        &self,
        device_number: u16,
        device_type: u8,
        transmission_type: u8,
    ) -> Result<()> {
        self.configure(
            ChannelOperation::SetId,
            ChannelId::new(self.number, device_number, device_type, transmission_type),
        )
        .await
    }

    /// Sets the search timeout in 2.5 s units.
    /// [`SEARCH_TIMEOUT_NEVER`](crate::protocol::SEARCH_TIMEOUT_NEVER) disables it.
    pub async fn set_search_timeout(&self, timeout: u8) -> Result<()> {
        self.configure(
            ChannelOperation::SetSearchTimeout,
            ChannelSearchTimeout::new(self.number, timeout),
        )
        .await
    }

    /// Sets the message period in 1/32768 s units.
    pub async fn set_period(&self, period: u16) -> Result<()> {
        self.configure(
            ChannelOperation::SetPeriod,
            ChannelPeriod::new(self.number, period),
        )
        .await
    }

    /// Sets the RF frequency as an offset from 2400 MHz.
    ///
    /// # Errors
    ///
    /// Returns a `ValueOutOfRange` message error above
    /// [`MAX_FREQUENCY`](crate::protocol::MAX_FREQUENCY).
    pub async fn set_frequency(&self, frequency: u8) -> Result<()> {
        let message = ChannelFrequency::new(self.number, frequency)?;
        self.configure(ChannelOperation::SetFrequency, message)
            .await
    }

    /// Sets this channel's transmit power level.
    pub async fn set_tx_power(&self, power: u8) -> Result<()> {
        self.configure(
            ChannelOperation::SetTxPower,
            ChannelTxPower::new(self.number, power),
        )
        .await
    }

    /// Opens the channel.
    pub async fn open(&self) -> Result<()> {
        let node = self.session(ChannelOperation::Open, &[ChannelState::Assigned])?;
        self.command(&node, ChannelOperation::Open, ChannelOpen::new(self.number))
            .await?;
        self.lock().state = ChannelState::Open;
        Ok(())
    }

    /// Closes the channel.
    ///
    /// Returns once the radio has acknowledged the close and then reported
    /// the channel closed.
    pub async fn close(&self) -> Result<()> {
        let node = self.session(ChannelOperation::Close, &[ChannelState::Open])?;
        let number = self.number;
        let closed = move |message: &AntMessage| {
            message
                .as_channel_event()
                .is_some_and(|event| event.channel_number() == number && is_closed_event(event))
        };

        let pump = node.commands().pump();
        pump.purge_messages(closed);
        self.command(&node, ChannelOperation::Close, ChannelClose::new(number))
            .await?;
        pump.wait_for(closed, node.commands().timeout()).await?;

        self.lock().state = ChannelState::Assigned;
        Ok(())
    }

    /// Unassigns the channel, freeing the slot.
    pub async fn unassign(&self) -> Result<()> {
        let node = self.session(ChannelOperation::Unassign, &[ChannelState::Assigned])?;
        self.command(
            &node,
            ChannelOperation::Unassign,
            ChannelUnassign::new(self.number),
        )
        .await?;
        self.release();
        Ok(())
    }

    // ==================== Traffic ====================

    /// Queues up to eight bytes for the next broadcast period.
    pub async fn send_broadcast(&self, data: &[u8]) -> Result<()> {
        let message = ChannelBroadcastData::new(self.number, data)?;
        let node = self.session(ChannelOperation::SendBroadcast, &[ChannelState::Open])?;
        node.commands().send(message).await
    }

    /// Asks the radio for the channel's state.
    pub async fn status(&self) -> Result<RadioChannelState> {
        let node = self.node()?;
        node.commands().channel_status(self.number).await
    }

    // ==================== Internals ====================

    fn node(&self) -> Result<Arc<NodeShared>> {
        let node = self.node.upgrade().ok_or(Error::SessionClosed)?;
        if self.lock().retired {
            return Err(Error::SessionClosed);
        }
        node.ensure_running()?;
        Ok(node)
    }

    /// Returns the running session if the channel is in one of `allowed`.
    fn session(
        &self,
        operation: ChannelOperation,
        allowed: &[ChannelState],
    ) -> Result<Arc<NodeShared>> {
        let node = self.node()?;
        let state = self.state();
        if !allowed.contains(&state) {
            return Err(Error::InvalidChannelState {
                channel: self.number,
                operation,
                state,
            });
        }
        Ok(node)
    }

    async fn configure(&self, operation: ChannelOperation, message: impl Into<Message>) -> Result<()> {
        let node = self.session(operation, &[ChannelState::Assigned, ChannelState::Open])?;
        self.command(&node, operation, message).await
    }

    async fn command(
        &self,
        node: &NodeShared,
        operation: ChannelOperation,
        message: impl Into<Message>,
    ) -> Result<()> {
        let code = node.commands().send_and_ack(message).await?;
        if !code.is_success() {
            return Err(Error::Channel {
                channel: self.number,
                operation,
                code,
            });
        }
        tracing::debug!("channel {}: {} done", self.number, operation);
        Ok(())
    }
}

fn is_closed_event(event: &ChannelEvent) -> bool {
    event.is_rf_event() && event.response_code() == ResponseCode::EventChannelClosed
}

impl Listener for Channel {
    fn process(&self, message: &AntMessage) -> Result<()> {
        if message.channel_number() != Some(self.number) {
            return Ok(());
        }

        if message.as_channel_event().is_some_and(is_closed_event) {
            let mut inner = self.lock();
            if inner.state == ChannelState::Open {
                inner.state = ChannelState::Assigned;
                tracing::debug!("channel {} closed by radio", self.number);
            }
        }

        self.callbacks.deliver(message);
        Ok(())
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Channel")
            .field("number", &self.number)
            .field("state", &inner.state)
            .field("name", &inner.name)
            .field("network", &inner.network)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::MessageError;
    use crate::node::{Node, NodeConfig};
    use crate::protocol::{EVENT_MESSAGE_ID, MessageId};
    use crate::transport::{MockHandle, MockTransport, StickEmulator};
    use crate::types::NetworkKey;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    async fn started_node(stick: &StickEmulator) -> (Node, MockHandle) {
        init_tracing();
        let (transport, handle) = MockTransport::with_responder(stick.clone());
        let config = NodeConfig::new()
            .reset_delay(Duration::ZERO)
            .poll_interval(Duration::from_millis(1))
            .command_timeout(Duration::from_secs(1));
        let node = Node::new(transport, config);
        node.start().await.unwrap();
        (node, handle)
    }

    async fn opened_channel(node: &Node) -> Arc<Channel> {
        let channel = node.get_free_channel().unwrap();
        channel
            .assign("network-0", ChannelType::BidirectionalReceive)
            .await
            .unwrap();
        channel.open().await.unwrap();
        channel
    }

    #[tokio::test]
    async fn test_heart_rate_session() {
        let stick = StickEmulator::new(8, 8);
        let (node, _handle) = started_node(&stick).await;
        let caps = node.capabilities().unwrap();
        assert_eq!((caps.max_channels, caps.max_networks), (8, 8));

        let key = NetworkKey::from_hex("ant+", "B9A521FBBD72C345").unwrap();
        node.set_network_key(0, Some(key)).await.unwrap();

        let channel = node.get_free_channel().unwrap();
        channel
            .assign("ant+", ChannelType::BidirectionalReceive)
            .await
            .unwrap();
        assert_eq!(channel.state(), ChannelState::Assigned);
        assert_eq!(channel.network(), Some(0));
        channel.set_id(0, 120, 0).await.unwrap();
        channel.set_search_timeout(12).await.unwrap();
        channel.set_period(8070).await.unwrap();
        channel.set_frequency(57).await.unwrap();

        stick.fail(MessageId::ChannelOpen, ResponseCode::ChannelInWrongState);
        let err = channel.open().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Channel {
                channel: 0,
                operation: ChannelOperation::Open,
                code: ResponseCode::ChannelInWrongState,
            }
        ));
        assert_eq!(channel.state(), ChannelState::Assigned);

        stick.clear_failure(MessageId::ChannelOpen);
        channel.open().await.unwrap();
        assert_eq!(channel.state(), ChannelState::Open);
        assert_eq!(stick.channel_state(0), Some(RadioChannelState::Searching));
        assert_eq!(channel.status().await.unwrap(), RadioChannelState::Searching);

        channel.close().await.unwrap();
        assert_eq!(channel.state(), ChannelState::Assigned);

        channel.unassign().await.unwrap();
        assert!(channel.is_free());
        assert_eq!(channel.network(), None);
        node.stop(true).await.unwrap();
    }

    #[tokio::test]
    async fn test_close_waits_for_closed_event() {
        let stick = StickEmulator::new(8, 8);
        let (node, handle) = started_node(&stick).await;
        let channel = opened_channel(&node).await;

        stick.withhold_close_event(true);
        let closing = Arc::clone(&channel);
        let task = tokio::spawn(async move { closing.close().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());
        assert_eq!(channel.state(), ChannelState::Open);

        handle.push_message(ChannelEvent::new(
            0,
            EVENT_MESSAGE_ID,
            ResponseCode::EventChannelClosed,
        ));
        task.await.unwrap().unwrap();
        assert_eq!(channel.state(), ChannelState::Assigned);
        node.stop(true).await.unwrap();
    }

    #[tokio::test]
    async fn test_close_failure_keeps_open() {
        let stick = StickEmulator::new(8, 8);
        let (node, _handle) = started_node(&stick).await;
        let channel = opened_channel(&node).await;

        stick.fail(MessageId::ChannelClose, ResponseCode::ChannelNotOpened);
        assert!(matches!(
            channel.close().await,
            Err(Error::Channel {
                operation: ChannelOperation::Close,
                ..
            })
        ));
        assert_eq!(channel.state(), ChannelState::Open);
        node.stop(true).await.unwrap();
    }

    #[tokio::test]
    async fn test_wrong_state_is_rejected() {
        let stick = StickEmulator::new(8, 8);
        let (node, handle) = started_node(&stick).await;
        let channel = node.channel(3).unwrap();
        handle.clear_written();

        assert!(matches!(
            channel.open().await,
            Err(Error::InvalidChannelState {
                channel: 3,
                operation: ChannelOperation::Open,
                state: ChannelState::Free,
            })
        ));
        assert!(matches!(
            channel.set_period(8070).await,
            Err(Error::InvalidChannelState { .. })
        ));
        assert!(matches!(
            channel.unassign().await,
            Err(Error::InvalidChannelState { .. })
        ));

        channel
            .assign("network-0", ChannelType::BidirectionalReceive)
            .await
            .unwrap();
        assert!(matches!(
            channel
                .assign("network-0", ChannelType::BidirectionalReceive)
                .await,
            Err(Error::InvalidChannelState { .. })
        ));
        assert!(matches!(
            channel.close().await,
            Err(Error::InvalidChannelState { .. })
        ));

        // only the successful assign reached the radio
        assert_eq!(handle.written_messages().len(), 1);
        node.stop(true).await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_arguments_leave_state() {
        let stick = StickEmulator::new(8, 8);
        let (node, _handle) = started_node(&stick).await;
        let channel = node.get_free_channel().unwrap();

        assert!(matches!(
            channel
                .assign("missing", ChannelType::BidirectionalReceive)
                .await,
            Err(Error::UnknownNetwork { .. })
        ));
        assert!(channel.is_free());

        channel
            .assign("network-0", ChannelType::BidirectionalReceive)
            .await
            .unwrap();
        assert!(matches!(
            channel.set_frequency(125).await,
            Err(Error::Message(MessageError::ValueOutOfRange { .. }))
        ));
        assert_eq!(channel.state(), ChannelState::Assigned);
        node.stop(true).await.unwrap();
    }

    #[tokio::test]
    async fn test_callbacks_see_own_traffic() {
        let stick = StickEmulator::new(8, 8);
        let (node, handle) = started_node(&stick).await;
        let channel = node.channel(1).unwrap();
        channel.set_name("heart rate");
        assert_eq!(channel.name().as_deref(), Some("heart rate"));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: Arc<dyn Listener> = Arc::new(move |m: &AntMessage| -> Result<()> {
            sink.lock().unwrap().push(*m);
            Ok(())
        });
        let failing: Arc<dyn Listener> =
            Arc::new(|_: &AntMessage| -> Result<()> { Err(Error::NoFreeChannel) });
        channel.register_callback(Arc::clone(&failing));
        channel.register_callback(Arc::clone(&callback));

        let ours = ChannelBroadcastData::new(1, &[0, 0, 0, 0, 0, 0, 0x3C, 0x48]).unwrap();
        handle.push_message(ChannelBroadcastData::new(0, &[1; 8]).unwrap());
        handle.push_message(ours);

        tokio::time::timeout(Duration::from_secs(1), async {
            while seen.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![AntMessage::from(ours)]);

        channel.remove_callback(&callback);
        channel.remove_callback(&failing);
        node.stop(true).await.unwrap();
    }

    #[tokio::test]
    async fn test_unsolicited_close_returns_to_assigned() {
        let stick = StickEmulator::new(8, 8);
        let (node, handle) = started_node(&stick).await;
        let channel = opened_channel(&node).await;

        handle.push_message(ChannelEvent::new(
            0,
            EVENT_MESSAGE_ID,
            ResponseCode::EventChannelClosed,
        ));
        tokio::time::timeout(Duration::from_secs(1), async {
            while channel.state() == ChannelState::Open {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(channel.state(), ChannelState::Assigned);
        node.stop(true).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_broadcast_requires_open() {
        let stick = StickEmulator::new(8, 8);
        let (node, handle) = started_node(&stick).await;
        let channel = node.get_free_channel().unwrap();
        assert!(matches!(
            channel.send_broadcast(&[1, 2, 3]).await,
            Err(Error::InvalidChannelState { .. })
        ));

        let channel = opened_channel(&node).await;
        handle.clear_written();
        channel.send_broadcast(&[1, 2, 3]).await.unwrap();
        assert_eq!(
            handle.written_messages(),
            vec![Message::from(ChannelBroadcastData::new(0, &[1, 2, 3]).unwrap())]
        );
        node.stop(true).await.unwrap();
    }

    #[tokio::test]
    async fn test_channel_outliving_node() {
        let stick = StickEmulator::new(8, 8);
        let (node, _handle) = started_node(&stick).await;
        let channel = node.channel(0).unwrap();
        node.stop(true).await.unwrap();
        drop(node);

        assert!(matches!(channel.status().await, Err(Error::SessionClosed)));
    }
}
