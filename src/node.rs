//! The [`Node`] session.
//!
//! A node owns one radio: the transport, the event pump reading it, the
//! network key slots and the channel slots. Slots are sized from the
//! capabilities the radio reports when the session starts.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::channel::Channel;
use crate::commands::CommandHandler;
use crate::error::{Error, NodeOperation, Result};
use crate::event::{DEFAULT_POLL_INTERVAL, DEFAULT_READ_CHUNK, EventPump, Listener, ListenerSet};
use crate::protocol::{AntMessage, Message, MessageId};
use crate::transport::{SerialTransport, SharedTransport, Transport, shared};
use crate::types::{Capabilities, NetworkKey};

/// Default time the radio is given to settle after a reset.
pub const DEFAULT_RESET_DELAY: Duration = Duration::from_secs(1);

/// Session configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeConfig {
    /// Pause after writing a reset.
    pub reset_delay: Duration,
    /// Pause between transport polls, and between checks of a pending wait.
    pub poll_interval: Duration,
    /// Bytes requested per transport read.
    pub read_chunk: usize,
    /// Upper bound on every reply wait. `None` waits indefinitely.
    pub command_timeout: Option<Duration>,
}

impl NodeConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reset_delay: DEFAULT_RESET_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            read_chunk: DEFAULT_READ_CHUNK,
            command_timeout: None,
        }
    }

    /// Sets the reset settle delay.
    #[must_use]
    pub const fn reset_delay(mut self, delay: Duration) -> Self {
        self.reset_delay = delay;
        self
    }

    /// Sets the poll interval.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the read chunk size.
    #[must_use]
    pub const fn read_chunk(mut self, bytes: usize) -> Self {
        self.read_chunk = bytes;
        self
    }

    /// Bounds every reply wait by `timeout`.
    #[must_use]
    pub const fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct NodeState {
    running: bool,
    capabilities: Option<Capabilities>,
    networks: Vec<NetworkKey>,
    channels: Vec<Arc<Channel>>,
}

/// Hands messages that do not concern a single channel to node listeners.
#[derive(Default)]
struct NodeListeners {
    listeners: ListenerSet,
}

impl Listener for NodeListeners {
    fn process(&self, message: &AntMessage) -> Result<()> {
        if message.channel_number().is_none() {
            self.listeners.deliver(message);
        }
        Ok(())
    }
}

/// Session state shared between a node and its channels.
pub(crate) struct NodeShared {
    commands: CommandHandler,
    config: NodeConfig,
    state: Mutex<NodeState>,
    lifecycle: tokio::sync::Mutex<()>,
    listeners: Arc<NodeListeners>,
}

impl NodeShared {
    fn lock(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) const fn commands(&self) -> &CommandHandler {
        &self.commands
    }

    pub(crate) fn is_running(&self) -> bool {
        self.lock().running
    }

    pub(crate) fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(Error::NotStarted)
        }
    }

    /// Returns the slot index of the network called `name`.
    pub(crate) fn network_index(&self, name: &str) -> Result<u8> {
        (0u8..)
            .zip(self.lock().networks.iter())
            .find(|(_, key)| key.name() == name)
            .map(|(index, key)| key.index().unwrap_or(index))
            .ok_or_else(|| Error::UnknownNetwork {
                name: name.to_owned(),
            })
    }
}

/// A session with one ANT radio.
///
/// Dropping the node aborts its event pump; call [`Node::stop`] first to
/// reset the radio and close the transport cleanly.
pub struct Node {
    shared: Arc<NodeShared>,
}

impl Node {
    /// Creates a node over `transport`. The session is not started.
    #[must_use]
    pub fn new(transport: impl Transport + 'static, config: NodeConfig) -> Self {
        Self::from_shared(shared(transport), config)
    }

    /// Creates a node over an already shared transport.
    #[must_use]
    pub fn from_shared(transport: SharedTransport, config: NodeConfig) -> Self {
        let pump = EventPump::new(transport.clone(), config.poll_interval, config.read_chunk);
        let listeners = Arc::new(NodeListeners::default());
        pump.register_listener(Arc::clone(&listeners) as Arc<dyn Listener>);

        let mut commands = CommandHandler::new(transport, pump);
        commands.set_timeout(config.command_timeout);

        Self {
            shared: Arc::new(NodeShared {
                commands,
                config,
                state: Mutex::new(NodeState::default()),
                lifecycle: tokio::sync::Mutex::new(()),
                listeners,
            }),
        }
    }

    /// Creates a node for the stick on a serial port, with default settings.
    #[must_use]
    pub fn serial(port: impl Into<String>) -> Self {
        Self::new(SerialTransport::with_port(port), NodeConfig::default())
    }

    /// Returns the session configuration.
    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.shared.config
    }

    /// Returns the event pump, for waiting on raw traffic.
    #[must_use]
    pub fn event_pump(&self) -> &EventPump {
        self.shared.commands.pump()
    }

    /// Returns true while the session is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    // ==================== Lifecycle ====================

    /// Starts the session.
    ///
    /// This will:
    /// 1. Open the transport if it is closed
    /// 2. Reset the radio
    /// 3. Start the event pump
    /// 4. Negotiate capabilities and allocate the network and channel slots
    ///
    /// # Errors
    ///
    /// Returns `AlreadyStarted` if the session is running, or the first
    /// transport or protocol error met along the way.
    pub async fn start(&self) -> Result<()> {
        let _lifecycle = self.shared.lifecycle.lock().await;
        if self.is_running() {
            return Err(Error::AlreadyStarted);
        }

        {
            let mut transport = self.event_pump().transport().lock().await;
            if !transport.is_open() {
                transport.open().await?;
            }
        }

        self.shared.commands.reset(self.shared.config.reset_delay).await?;
        self.event_pump().start().await;
        self.shared.lock().running = true;
        tracing::info!("node started");

        self.negotiate().await?;
        Ok(())
    }

    /// Stops the session, optionally resetting the radio first.
    ///
    /// The slot tables are kept until the next [`Node::start`].
    ///
    /// # Errors
    ///
    /// Returns `NotStarted` if the session is not running.
    pub async fn stop(&self, reset: bool) -> Result<()> {
        let _lifecycle = self.shared.lifecycle.lock().await;
        if !self.is_running() {
            return Err(Error::NotStarted);
        }

        if reset {
            if let Err(e) = self.shared.commands.reset(self.shared.config.reset_delay).await {
                tracing::warn!("reset on stop failed: {}", e);
            }
        }
        self.event_pump().stop().await;
        self.shared.lock().running = false;

        let mut transport = self.event_pump().transport().lock().await;
        if transport.is_open() {
            transport.close().await?;
        }
        tracing::info!("node stopped");
        Ok(())
    }

    /// Reads the radio's capabilities and rebuilds both slot tables.
    async fn negotiate(&self) -> Result<()> {
        self.shared.ensure_running()?;
        let caps = self.shared.commands.capabilities().await?;
        tracing::debug!(
            "radio reports {} channels, {} networks",
            caps.max_channels,
            caps.max_networks
        );

        let retired = std::mem::take(&mut self.shared.lock().channels);
        for channel in retired {
            channel.retire();
            self.event_pump()
                .remove_listener(&(channel as Arc<dyn Listener>));
        }

        {
            let mut state = self.shared.lock();
            state.capabilities = Some(caps);
            state.networks = (0..caps.max_networks).map(NetworkKey::placeholder).collect();
        }
        for index in 0..caps.max_networks {
            self.set_network_key(index, None).await?;
        }

        let node = Arc::downgrade(&self.shared);
        let channels: Vec<Arc<Channel>> = (0..caps.max_channels)
            .map(|number| Arc::new(Channel::new(number, node.clone())))
            .collect();
        for channel in &channels {
            self.event_pump()
                .register_listener(Arc::clone(channel) as Arc<dyn Listener>);
        }
        self.shared.lock().channels = channels;
        Ok(())
    }

    // ==================== Networks ====================

    /// Loads a network key into slot `index`.
    ///
    /// With `Some(key)` the slot's key is replaced once the radio accepts
    /// it; with `None` the slot's current key is pushed again.
    ///
    /// # Errors
    ///
    /// Returns `NetworkSlotOutOfRange` for an unknown slot,
    /// `DuplicateNetworkName` if another slot already uses the key's name,
    /// and `Node` if the radio rejects the key. The table is unchanged on
    /// error.
    pub async fn set_network_key(&self, index: u8, key: Option<NetworkKey>) -> Result<()> {
        self.shared.ensure_running()?;
        let mut key = {
            let state = self.shared.lock();
            let slot = state.networks.get(usize::from(index)).ok_or(
                Error::NetworkSlotOutOfRange {
                    index,
                    available: state.networks.len(),
                },
            )?;
            match key {
                Some(key) => {
                    let taken = (0u8..)
                        .zip(state.networks.iter())
                        .any(|(i, other)| i != index && other.name() == key.name());
                    if taken {
                        return Err(Error::DuplicateNetworkName {
                            name: key.name().to_owned(),
                        });
                    }
                    key
                }
                None => slot.clone(),
            }
        };

        let code = self.shared.commands.set_network_key(index, &key).await?;
        if !code.is_success() {
            return Err(Error::Node {
                operation: NodeOperation::SetNetworkKey,
                code,
            });
        }

        key.set_index(index);
        tracing::debug!("network slot {} holds {}", index, key);
        if let Some(slot) = self.shared.lock().networks.get_mut(usize::from(index)) {
            *slot = key;
        }
        Ok(())
    }

    /// Returns the network key called `name`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownNetwork` if no slot has that name.
    pub fn get_network_key(&self, name: &str) -> Result<NetworkKey> {
        self.shared
            .lock()
            .networks
            .iter()
            .find(|key| key.name() == name)
            .cloned()
            .ok_or_else(|| Error::UnknownNetwork {
                name: name.to_owned(),
            })
    }

    /// Returns a copy of the network slot table.
    #[must_use]
    pub fn networks(&self) -> Vec<NetworkKey> {
        self.shared.lock().networks.clone()
    }

    // ==================== Channels ====================

    /// Returns the lowest-numbered free channel.
    ///
    /// # Errors
    ///
    /// Returns `NoFreeChannel` if every channel is assigned.
    pub fn get_free_channel(&self) -> Result<Arc<Channel>> {
        self.shared
            .lock()
            .channels
            .iter()
            .find(|channel| channel.is_free())
            .cloned()
            .ok_or(Error::NoFreeChannel)
    }

    /// Returns channel slot `number`.
    #[must_use]
    pub fn channel(&self, number: u8) -> Option<Arc<Channel>> {
        self.shared.lock().channels.get(usize::from(number)).cloned()
    }

    /// Returns every channel slot.
    #[must_use]
    pub fn channels(&self) -> Vec<Arc<Channel>> {
        self.shared.lock().channels.clone()
    }

    /// Returns the capabilities negotiated at the last start.
    #[must_use]
    pub fn capabilities(&self) -> Option<Capabilities> {
        self.shared.lock().capabilities
    }

    // ==================== Listeners ====================

    /// Registers a listener for messages that are not about one channel,
    /// such as capability, version and serial number replies.
    pub fn register_event_listener(&self, listener: Arc<dyn Listener>) {
        self.shared.listeners.listeners.register(listener);
    }

    /// Removes a node listener.
    pub fn remove_event_listener(&self, listener: &Arc<dyn Listener>) {
        self.shared.listeners.listeners.remove(listener);
    }

    // ==================== Commands ====================

    /// Writes a message without waiting for a reply.
    ///
    /// # Errors
    ///
    /// Returns `NotStarted` if the session is not running.
    pub async fn send(&self, message: impl Into<Message>) -> Result<()> {
        self.shared.ensure_running()?;
        self.shared.commands.send(message).await
    }

    /// Requests a message of kind `id` about `channel`.
    ///
    /// # Errors
    ///
    /// Returns `NotStarted` if the session is not running.
    pub async fn request(&self, channel: u8, id: MessageId) -> Result<AntMessage> {
        self.shared.ensure_running()?;
        self.shared.commands.request(channel, id).await
    }

    /// Returns the radio's firmware version.
    ///
    /// # Errors
    ///
    /// Returns `NotStarted` if the session is not running.
    pub async fn version(&self) -> Result<String> {
        self.shared.ensure_running()?;
        self.shared.commands.version().await
    }

    /// Returns the radio's serial number.
    ///
    /// # Errors
    ///
    /// Returns `NotStarted` if the session is not running.
    pub async fn serial_number(&self) -> Result<u32> {
        self.shared.ensure_running()?;
        self.shared.commands.serial_number().await
    }

    /// Resets the radio while the session keeps running.
    ///
    /// Every channel returns to free and the network slot table is loaded
    /// into the radio again.
    ///
    /// # Errors
    ///
    /// Returns `NotStarted` if the session is not running.
    pub async fn reset(&self) -> Result<()> {
        self.shared.ensure_running()?;
        self.shared.commands.reset(self.shared.config.reset_delay).await?;
        for channel in self.channels() {
            channel.release();
        }
        let networks = self.capabilities().map_or(0, |caps| caps.max_networks);
        for index in 0..networks {
            self.set_network_key(index, None).await?;
        }
        Ok(())
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.event_pump().abort();
    }
}
