//! In-memory transport for testing sessions without hardware.
//!
//! [`MockTransport`] honours the full transport contract. Bytes written to
//! it are recorded and, if a [`Responder`] is installed, decoded and
//! answered; the replies are queued for subsequent reads. [`MockHandle`]
//! stays with the test to inspect writes and inject unsolicited traffic
//! after the transport has been handed to a node.
//!
//! [`StickEmulator`] is a responder that behaves like an ANT USB stick.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use crate::error::{Result, TransportError};
use crate::protocol::variant::{
    Capabilities, ChannelEvent, ChannelScoped, ChannelStatus, SerialNumber, Version,
};
use crate::protocol::{
    AntMessage, EVENT_MESSAGE_ID, FrameDecoder, Message, MessageId, RadioChannelState,
    ResponseCode,
};
use crate::transport::{Transport, TransportFuture};

/// Produces the replies to a message written to a [`MockTransport`].
pub trait Responder: Send {
    /// Returns the messages the device sends back for `request`.
    fn respond(&mut self, request: &Message) -> Vec<Message>;
}

impl<F> Responder for F
where
    F: FnMut(&Message) -> Vec<Message> + Send,
{
    fn respond(&mut self, request: &Message) -> Vec<Message> {
        self(request)
    }
}

#[derive(Default)]
struct MockState {
    open: bool,
    incoming: VecDeque<u8>,
    written: Vec<Bytes>,
    decoder: FrameDecoder,
    responder: Option<Box<dyn Responder>>,
}

impl MockState {
    fn answer(&mut self, data: &[u8]) {
        let Some(responder) = self.responder.as_mut() else {
            return;
        };
        self.decoder.feed(data);
        loop {
            match self.decoder.decode() {
                Ok(Some(request)) => {
                    for reply in responder.respond(&request) {
                        self.incoming.extend(reply.encode().iter());
                    }
                }
                Ok(None) => break,
                Err(e) => tracing::warn!("mock transport ignored bad frame: {}", e),
            }
        }
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An in-memory [`Transport`].
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Creates a closed mock transport.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Creates a mock transport answered by `responder`, plus its handle.
    #[must_use]
    pub fn with_responder(responder: impl Responder + 'static) -> (Self, MockHandle) {
        let transport = Self::new();
        let handle = transport.handle();
        handle.set_responder(responder);
        (transport, handle)
    }

    /// Returns a handle sharing this transport's state.
    #[must_use]
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn do_open(&self) -> Result<()> {
        let mut state = lock(&self.state);
        if state.open {
            return Err(TransportError::AlreadyOpen.into());
        }
        state.open = true;
        state.decoder.clear();
        Ok(())
    }

    fn do_close(&self) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.open {
            return Err(TransportError::NotOpen.into());
        }
        state.open = false;
        Ok(())
    }

    fn do_read(&self, count: usize) -> Result<Bytes> {
        let mut state = lock(&self.state);
        if !state.open {
            return Err(TransportError::NotOpen.into());
        }
        if count == 0 {
            return Err(TransportError::ZeroLengthRead.into());
        }
        let n = count.min(state.incoming.len());
        Ok(state.incoming.drain(..n).collect())
    }

    fn do_write(&self, data: &Bytes) -> Result<usize> {
        let mut state = lock(&self.state);
        if !state.open {
            return Err(TransportError::NotOpen.into());
        }
        if data.is_empty() {
            return Err(TransportError::EmptyWrite.into());
        }
        state.written.push(data.clone());
        state.answer(data);
        Ok(data.len())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn open(&mut self) -> TransportFuture<'_, ()> {
        let result = self.do_open();
        Box::pin(async move { result })
    }

    fn close(&mut self) -> TransportFuture<'_, ()> {
        let result = self.do_close();
        Box::pin(async move { result })
    }

    fn read(&mut self, count: usize) -> TransportFuture<'_, Bytes> {
        let result = self.do_read(count);
        Box::pin(async move { result })
    }

    fn write(&mut self, data: Bytes) -> TransportFuture<'_, usize> {
        let result = self.do_write(&data);
        Box::pin(async move { result })
    }

    fn is_open(&self) -> bool {
        lock(&self.state).open
    }
}

/// Test-side access to a [`MockTransport`].
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    /// Queues raw bytes for the transport to return from reads.
    pub fn push_incoming(&self, data: &[u8]) {
        lock(&self.state).incoming.extend(data);
    }

    /// Queues an encoded message for the transport to return from reads.
    pub fn push_message(&self, message: impl Into<Message>) {
        self.push_incoming(&message.into().encode());
    }

    /// Installs the responder that answers written frames.
    pub fn set_responder(&self, responder: impl Responder + 'static) {
        lock(&self.state).responder = Some(Box::new(responder));
    }

    /// Returns every buffer written so far.
    #[must_use]
    pub fn written(&self) -> Vec<Bytes> {
        lock(&self.state).written.clone()
    }

    /// Decodes every frame written so far.
    #[must_use]
    pub fn written_messages(&self) -> Vec<Message> {
        let mut decoder = FrameDecoder::new();
        for chunk in self.written() {
            decoder.feed(&chunk);
        }
        let mut messages = Vec::new();
        while let Ok(Some(message)) = decoder.decode() {
            messages.push(message);
        }
        messages
    }

    /// Forgets recorded writes.
    pub fn clear_written(&self) {
        lock(&self.state).written.clear();
    }

    /// Returns the number of bytes waiting to be read.
    #[must_use]
    pub fn pending(&self) -> usize {
        lock(&self.state).incoming.len()
    }

    /// Returns true if the transport is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    /// Closes the transport underneath its owner, like an unplugged stick.
    pub fn disconnect(&self) {
        lock(&self.state).open = false;
    }
}

struct EmulatorState {
    capabilities: Capabilities,
    version: [u8; 9],
    serial: u32,
    failures: HashMap<MessageId, ResponseCode>,
    withhold_close_event: bool,
    channels: Vec<RadioChannelState>,
}

/// A [`Responder`] that answers like an ANT USB stick.
///
/// - capability, version, serial number and channel status requests get
///   their reply message
/// - configuration and control commands get a channel event carrying the
///   command's opcode and `NoError`, or a code injected with [`fail`]
/// - a successful close is followed by a "channel closed" event, unless
///   withheld with [`withhold_close_event`]
/// - a reset produces no reply, like real hardware
///
/// Clones share state, so a test can keep one clone to adjust behaviour
/// while the transport owns another.
///
/// [`fail`]: StickEmulator::fail
/// [`withhold_close_event`]: StickEmulator::withhold_close_event
#[derive(Clone)]
pub struct StickEmulator {
    state: Arc<Mutex<EmulatorState>>,
}

impl StickEmulator {
    /// Creates an emulator reporting the given slot counts.
    #[must_use]
    pub fn new(max_channels: u8, max_networks: u8) -> Self {
        Self {
            state: Arc::new(Mutex::new(EmulatorState {
                capabilities: Capabilities::new(max_channels, max_networks, 0x00, 0x3A),
                version: *b"AP2-1.05\0",
                serial: 0x1234_5678,
                failures: HashMap::new(),
                withhold_close_event: false,
                channels: vec![RadioChannelState::Unassigned; usize::from(max_channels)],
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EmulatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every later `id` command fail with `code`.
    pub fn fail(&self, id: MessageId, code: ResponseCode) {
        self.lock().failures.insert(id, code);
    }

    /// Lets `id` commands succeed again.
    pub fn clear_failure(&self, id: MessageId) {
        self.lock().failures.remove(&id);
    }

    /// Stops (or resumes) sending "channel closed" after a close.
    pub fn withhold_close_event(&self, withhold: bool) {
        self.lock().withhold_close_event = withhold;
    }

    /// Returns the emulated state of a channel.
    #[must_use]
    pub fn channel_state(&self, channel: u8) -> Option<RadioChannelState> {
        self.lock().channels.get(usize::from(channel)).copied()
    }

    /// Returns the serial number the emulator reports.
    #[must_use]
    pub fn serial(&self) -> u32 {
        self.lock().serial
    }
}

impl EmulatorState {
    fn reply_to_request(&self, channel: u8, requested: Option<MessageId>) -> Vec<Message> {
        match requested {
            Some(MessageId::Capabilities) => vec![self.capabilities.into()],
            Some(MessageId::Version) => Version::new(&self.version)
                .map(Message::from)
                .into_iter()
                .collect(),
            Some(MessageId::SerialNumber) => vec![SerialNumber::new(self.serial).into()],
            Some(MessageId::ChannelStatus) => {
                let state = self
                    .channels
                    .get(usize::from(channel))
                    .copied()
                    .unwrap_or(RadioChannelState::Unassigned);
                vec![ChannelStatus::new(channel, state).into()]
            }
            _ => Vec::new(),
        }
    }

    fn acknowledge(&mut self, request: &Message, id: MessageId) -> Vec<Message> {
        let channel = request.payload().first().copied().unwrap_or(0);
        let code = self
            .failures
            .get(&id)
            .copied()
            .unwrap_or(ResponseCode::NoError);
        let mut replies = vec![ChannelEvent::new(channel, request.id(), code).into()];
        if !code.is_success() {
            return replies;
        }

        let next = match id {
            MessageId::ChannelAssign => Some(RadioChannelState::Assigned),
            MessageId::ChannelOpen => Some(RadioChannelState::Searching),
            MessageId::ChannelClose => Some(RadioChannelState::Assigned),
            MessageId::ChannelUnassign => Some(RadioChannelState::Unassigned),
            _ => None,
        };
        if let (Some(next), Some(slot)) = (next, self.channels.get_mut(usize::from(channel))) {
            *slot = next;
        }

        if id == MessageId::ChannelClose && !self.withhold_close_event {
            replies.push(
                ChannelEvent::new(channel, EVENT_MESSAGE_ID, ResponseCode::EventChannelClosed)
                    .into(),
            );
        }
        replies
    }
}

impl Responder for StickEmulator {
    fn respond(&mut self, request: &Message) -> Vec<Message> {
        let Ok(message) = AntMessage::resolve(*request) else {
            return Vec::new();
        };
        let mut state = self.lock();
        match message {
            AntMessage::SystemReset(_) => {
                state.channels.fill(RadioChannelState::Unassigned);
                Vec::new()
            }
            AntMessage::ChannelRequest(request) => {
                state.reply_to_request(request.channel_number(), request.requested())
            }
            AntMessage::ChannelUnassign(_)
            | AntMessage::ChannelAssign(_)
            | AntMessage::ChannelId(_)
            | AntMessage::ChannelPeriod(_)
            | AntMessage::ChannelSearchTimeout(_)
            | AntMessage::ChannelFrequency(_)
            | AntMessage::ChannelTxPower(_)
            | AntMessage::SetNetworkKey(_)
            | AntMessage::SetTxPower(_)
            | AntMessage::ChannelOpen(_)
            | AntMessage::ChannelClose(_) => state.acknowledge(request, message.id()),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::protocol::ChannelType;
    use crate::protocol::variant::{ChannelAssign, ChannelClose, ChannelRequest, SystemReset};

    async fn read_messages(transport: &mut MockTransport) -> Vec<AntMessage> {
        let data = transport.read(256).await.unwrap();
        let mut decoder = FrameDecoder::new();
        decoder.feed(&data);
        let mut messages = Vec::new();
        while let Ok(Some(message)) = decoder.decode() {
            messages.push(AntMessage::resolve(message).unwrap());
        }
        messages
    }

    #[tokio::test]
    async fn test_open_twice_fails() {
        let mut transport = MockTransport::new();
        transport.open().await.unwrap();
        assert!(matches!(
            transport.open().await,
            Err(Error::Transport(TransportError::AlreadyOpen))
        ));
        transport.close().await.unwrap();
        transport.open().await.unwrap();
    }

    #[tokio::test]
    async fn test_io_before_open_fails() {
        let mut transport = MockTransport::new();
        assert!(matches!(
            transport.read(10).await,
            Err(Error::Transport(TransportError::NotOpen))
        ));
        assert!(matches!(
            transport.write(Bytes::from_static(&[0xA4])).await,
            Err(Error::Transport(TransportError::NotOpen))
        ));
        assert!(matches!(
            transport.close().await,
            Err(Error::Transport(TransportError::NotOpen))
        ));
    }

    #[tokio::test]
    async fn test_zero_length_requests_fail() {
        let mut transport = MockTransport::new();
        transport.open().await.unwrap();
        assert!(matches!(
            transport.read(0).await,
            Err(Error::Transport(TransportError::ZeroLengthRead))
        ));
        assert!(matches!(
            transport.write(Bytes::new()).await,
            Err(Error::Transport(TransportError::EmptyWrite))
        ));
    }

    #[tokio::test]
    async fn test_read_returns_up_to_count() {
        let mut transport = MockTransport::new();
        let handle = transport.handle();
        transport.open().await.unwrap();
        handle.push_incoming(&[1, 2, 3, 4, 5]);

        assert_eq!(&transport.read(3).await.unwrap()[..], &[1, 2, 3]);
        assert_eq!(&transport.read(20).await.unwrap()[..], &[4, 5]);
        assert!(transport.read(20).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_writes_are_recorded() {
        let mut transport = MockTransport::new();
        let handle = transport.handle();
        transport.open().await.unwrap();

        let reset = SystemReset::new();
        assert_eq!(transport.write(reset.encode()).await.unwrap(), 5);
        assert_eq!(handle.written_messages(), vec![Message::from(reset)]);
    }

    #[tokio::test]
    async fn test_emulator_answers_capabilities() {
        let (mut transport, _handle) = MockTransport::with_responder(StickEmulator::new(8, 3));
        transport.open().await.unwrap();
        transport
            .write(ChannelRequest::new(0, MessageId::Capabilities).encode())
            .await
            .unwrap();

        let replies = read_messages(&mut transport).await;
        let [AntMessage::Capabilities(caps)] = replies.as_slice() else {
            panic!("unexpected replies: {replies:?}");
        };
        assert_eq!(caps.max_channels(), 8);
        assert_eq!(caps.max_networks(), 3);
    }

    #[tokio::test]
    async fn test_emulator_acks_and_injects_failures() {
        let stick = StickEmulator::new(8, 8);
        let (mut transport, _handle) = MockTransport::with_responder(stick.clone());
        transport.open().await.unwrap();

        let assign = ChannelAssign::new(2, ChannelType::BidirectionalReceive, 0);
        transport.write(assign.encode()).await.unwrap();
        let replies = read_messages(&mut transport).await;
        let event = replies[0].as_channel_event().unwrap();
        assert_eq!(event.channel_number(), 2);
        assert_eq!(event.message_id(), MessageId::ChannelAssign as u8);
        assert_eq!(event.response_code(), ResponseCode::NoError);
        assert_eq!(stick.channel_state(2), Some(RadioChannelState::Assigned));

        stick.fail(MessageId::ChannelAssign, ResponseCode::ChannelInWrongState);
        transport.write(assign.encode()).await.unwrap();
        let replies = read_messages(&mut transport).await;
        assert_eq!(
            replies[0].as_channel_event().unwrap().response_code(),
            ResponseCode::ChannelInWrongState
        );
    }

    #[tokio::test]
    async fn test_emulator_reports_channel_closed() {
        let stick = StickEmulator::new(8, 8);
        let (mut transport, _handle) = MockTransport::with_responder(stick.clone());
        transport.open().await.unwrap();

        transport.write(ChannelClose::new(1).encode()).await.unwrap();
        let replies = read_messages(&mut transport).await;
        assert_eq!(replies.len(), 2);
        let closed = replies[1].as_channel_event().unwrap();
        assert!(closed.is_rf_event());
        assert_eq!(closed.response_code(), ResponseCode::EventChannelClosed);

        stick.withhold_close_event(true);
        transport.write(ChannelClose::new(1).encode()).await.unwrap();
        assert_eq!(read_messages(&mut transport).await.len(), 1);
    }

    #[tokio::test]
    async fn test_emulator_ignores_reset() {
        let (mut transport, handle) = MockTransport::with_responder(StickEmulator::new(8, 8));
        transport.open().await.unwrap();
        transport.write(SystemReset::new().encode()).await.unwrap();
        assert_eq!(handle.pending(), 0);
    }
}
