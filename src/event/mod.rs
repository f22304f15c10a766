//! Event pump and listener dispatch.
//!
//! The pump is a background task that reads the transport, reframes the byte
//! stream into messages and hands every message to the registered
//! listeners in registration order. Two collectors are always registered
//! first: one keeps channel events (command replies), the other keeps every
//! message. Callers wait on these collectors to turn asynchronous radio
//! traffic into request/reply exchanges.

pub mod queue;

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::protocol::variant::ChannelEvent;
use crate::protocol::{AntMessage, FrameDecoder, Message, MessageId, ResponseCode};
use crate::transport::SharedTransport;

pub use queue::{AckCollector, BoundedQueue, Collector, MessageCollector, QUEUE_CAPACITY};

/// Default pause between transport polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Default number of bytes requested per transport read.
pub const DEFAULT_READ_CHUNK: usize = 20;

/// Receives decoded messages.
///
/// Listeners run on the pump task and must not block. An error returned
/// (or a panic raised) by one listener is logged and does not affect other
/// listeners or the pump.
pub trait Listener: Send + Sync {
    /// Handles one message.
    fn process(&self, message: &AntMessage) -> Result<()>;
}

impl<F> Listener for F
where
    F: Fn(&AntMessage) -> Result<()> + Send + Sync,
{
    fn process(&self, message: &AntMessage) -> Result<()> {
        self(message)
    }
}

/// Delivers `message` to each listener in order, isolating failures.
pub fn deliver(listeners: &[Arc<dyn Listener>], message: &AntMessage) {
    for listener in listeners {
        match panic::catch_unwind(AssertUnwindSafe(|| listener.process(message))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("listener failed on {:?}: {}", message.id(), e),
            Err(_) => tracing::warn!("listener panicked on {:?}", message.id()),
        }
    }
}

/// An ordered set of listeners without duplicates.
///
/// The lock is held only while the set changes or is copied; dispatch runs
/// on a snapshot.
#[derive(Default)]
pub struct ListenerSet {
    listeners: Mutex<Vec<Arc<dyn Listener>>>,
}

impl ListenerSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<dyn Listener>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a listener. Returns false if it was already registered.
    pub fn register(&self, listener: Arc<dyn Listener>) -> bool {
        let mut listeners = self.lock();
        if listeners.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn remove(&self, listener: &Arc<dyn Listener>) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        listeners.len() != before
    }

    /// Returns the listeners in registration order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<dyn Listener>> {
        self.lock().clone()
    }

    /// Delivers a message to a snapshot of the set.
    pub fn deliver(&self, message: &AntMessage) {
        deliver(&self.snapshot(), message);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn same_listener(a: &Arc<dyn Listener>, b: &Arc<dyn Listener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

struct PumpCore {
    transport: SharedTransport,
    listeners: ListenerSet,
    acks: Arc<AckCollector>,
    messages: Arc<MessageCollector>,
    alive: AtomicBool,
    poll_interval: Duration,
    read_chunk: usize,
}

impl PumpCore {
    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>, ready: oneshot::Sender<()>) {
        self.alive.store(true, Ordering::SeqCst);
        let _ = ready.send(());

        let mut decoder = FrameDecoder::new();
        loop {
            if *shutdown.borrow() {
                break;
            }

            let read = {
                let mut transport = self.transport.lock().await;
                transport.read(self.read_chunk).await
            };
            match read {
                Ok(data) if !data.is_empty() => {
                    tracing::trace!("pump read {} bytes: {}", data.len(), hex::encode(&data));
                    decoder.feed(&data);
                    self.drain(&mut decoder);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!("event pump stopping on transport error: {}", e);
                    break;
                }
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        self.alive.store(false, Ordering::SeqCst);
        tracing::debug!("event pump exited");
    }

    fn drain(&self, decoder: &mut FrameDecoder) {
        loop {
            match decoder.decode() {
                Ok(Some(message)) => self.dispatch(message),
                Ok(None) => break,
                Err(e) if e.is_resynchronizable() => {
                    tracing::warn!("skipping frame: {}", e);
                }
                Err(e) => tracing::warn!("discarding bytes: {}", e),
            }
        }
    }

    fn dispatch(&self, message: Message) {
        match AntMessage::resolve(message) {
            Ok(message) => {
                tracing::trace!("dispatching {:?}", message);
                self.listeners.deliver(&message);
            }
            Err(e) => tracing::warn!("dropping {:?}: {}", message, e),
        }
    }
}

struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Background reader and dispatcher for one session.
///
/// Clones share the same pump.
#[derive(Clone)]
pub struct EventPump {
    core: Arc<PumpCore>,
    worker: Arc<tokio::sync::Mutex<Option<Worker>>>,
}

impl EventPump {
    /// Creates a stopped pump over `transport`.
    #[must_use]
    pub fn new(transport: SharedTransport, poll_interval: Duration, read_chunk: usize) -> Self {
        let acks = Arc::new(AckCollector::default());
        let messages = Arc::new(MessageCollector::default());
        let listeners = ListenerSet::new();
        listeners.register(Arc::clone(&acks) as Arc<dyn Listener>);
        listeners.register(Arc::clone(&messages) as Arc<dyn Listener>);

        Self {
            core: Arc::new(PumpCore {
                transport,
                listeners,
                acks,
                messages,
                alive: AtomicBool::new(false),
                poll_interval,
                read_chunk: read_chunk.max(1),
            }),
            worker: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    /// Starts the worker. Does nothing if it is already running.
    ///
    /// Returns once the worker has begun polling. Queued replies from an
    /// earlier run are discarded.
    pub async fn start(&self) {
        let mut worker = self.worker.lock().await;
        if worker.is_some() && self.is_running() {
            return;
        }
        if let Some(dead) = worker.take() {
            let _ = dead.handle.await;
        }

        self.core.acks.clear();
        self.core.messages.clear();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (ready_tx, ready_rx) = oneshot::channel();
        let handle = tokio::spawn(Arc::clone(&self.core).run(shutdown_rx, ready_tx));
        let _ = ready_rx.await;

        *worker = Some(Worker {
            shutdown: shutdown_tx,
            handle,
        });
        tracing::info!("event pump started");
    }

    /// Stops the worker. Does nothing if it is not running.
    ///
    /// Returns once the worker has exited.
    pub async fn stop(&self) {
        let Some(worker) = self.worker.lock().await.take() else {
            return;
        };
        let _ = worker.shutdown.send(true);
        if let Err(e) = worker.handle.await {
            tracing::warn!("event pump task failed: {}", e);
        }
        tracing::info!("event pump stopped");
    }

    /// Aborts the worker without waiting.
    ///
    /// Pending and later waits fail with `PumpStopped`.
    pub fn abort(&self) {
        match self.worker.try_lock() {
            Ok(mut worker) => {
                if let Some(worker) = worker.take() {
                    let _ = worker.shutdown.send(true);
                    worker.handle.abort();
                }
            }
            // start or stop in progress
            Err(_) => tracing::warn!("event pump busy, marking it stopped"),
        }
        self.core.alive.store(false, Ordering::SeqCst);
    }

    /// Returns true while the worker is polling.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.core.alive.load(Ordering::SeqCst)
    }

    /// Returns the transport the pump reads.
    #[must_use]
    pub fn transport(&self) -> &SharedTransport {
        &self.core.transport
    }

    // ==================== Listeners ====================

    /// Registers a listener. Registering the same listener twice is a no-op.
    pub fn register_listener(&self, listener: Arc<dyn Listener>) {
        self.core.listeners.register(listener);
    }

    /// Removes a listener. Removing an unknown listener is a no-op.
    pub fn remove_listener(&self, listener: &Arc<dyn Listener>) {
        self.core.listeners.remove(listener);
    }

    /// Returns the number of registered listeners, collectors included.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.core.listeners.len()
    }

    // ==================== Waits ====================

    /// Waits for the channel event answering a command with `opcode` and
    /// returns its response code.
    ///
    /// Replies are matched by opcode only. `None` waits indefinitely.
    pub async fn wait_for_ack(&self, opcode: u8, timeout: Option<Duration>) -> Result<ResponseCode> {
        let event = self
            .poll(timeout, || self.core.acks.take(|e| e.message_id() == opcode))
            .await?;
        Ok(event.response_code())
    }

    /// Waits for a message of the given kind.
    pub async fn wait_for_message(
        &self,
        id: MessageId,
        timeout: Option<Duration>,
    ) -> Result<AntMessage> {
        self.wait_for(|message| message.id() == id, timeout).await
    }

    /// Waits for a message matching `predicate`.
    pub async fn wait_for<P>(&self, predicate: P, timeout: Option<Duration>) -> Result<AntMessage>
    where
        P: Fn(&AntMessage) -> bool + Send + Sync,
    {
        self.poll(timeout, || self.core.messages.take(&predicate))
            .await
    }

    /// Drops queued acks matching `predicate`.
    pub fn purge_acks(&self, predicate: impl FnMut(&ChannelEvent) -> bool) {
        self.core.acks.purge(predicate);
    }

    /// Drops queued messages matching `predicate`.
    pub fn purge_messages(&self, predicate: impl FnMut(&AntMessage) -> bool) {
        self.core.messages.purge(predicate);
    }

    async fn poll<T>(
        &self,
        timeout: Option<Duration>,
        mut take: impl FnMut() -> Option<T> + Send,
    ) -> Result<T> {
        let wait = async {
            loop {
                if let Some(found) = take() {
                    return Ok(found);
                }
                if !self.is_running() {
                    return Err(Error::PumpStopped);
                }
                tokio::time::sleep(self.core.poll_interval).await;
            }
        };

        match timeout {
            None => wait.await,
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| Error::Timeout {
                    timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                })?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::variant::{Capabilities, ChannelBroadcastData};
    use crate::transport::{MockHandle, MockTransport, Transport, shared};

    struct Recorder {
        seen: Mutex<Vec<MessageId>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<MessageId> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl Listener for Recorder {
        fn process(&self, message: &AntMessage) -> Result<()> {
            self.seen.lock().unwrap().push(message.id());
            Ok(())
        }
    }

    async fn open_pump(read_chunk: usize) -> (EventPump, MockHandle) {
        let mut transport = MockTransport::new();
        let handle = transport.handle();
        transport.open().await.unwrap();
        let pump = EventPump::new(shared(transport), Duration::from_millis(1), read_chunk);
        (pump, handle)
    }

    #[test]
    fn test_deliver_isolates_failures() {
        let recorder = Recorder::new();
        let failing: Arc<dyn Listener> =
            Arc::new(|_: &AntMessage| -> Result<()> { Err(Error::NoFreeChannel) });
        let panicking: Arc<dyn Listener> =
            Arc::new(|_: &AntMessage| -> Result<()> { panic!("listener bug") });
        let listeners = vec![failing, panicking, Arc::clone(&recorder) as Arc<dyn Listener>];

        let message = AntMessage::from(Capabilities::new(8, 8, 0, 0));
        deliver(&listeners, &message);
        deliver(&listeners, &message);

        assert_eq!(recorder.seen(), vec![MessageId::Capabilities; 2]);
    }

    #[test]
    fn test_listener_set_is_idempotent() {
        let set = ListenerSet::new();
        let recorder: Arc<dyn Listener> = Recorder::new();

        assert!(set.register(Arc::clone(&recorder)));
        assert!(!set.register(Arc::clone(&recorder)));
        assert_eq!(set.len(), 1);

        assert!(set.remove(&recorder));
        assert!(!set.remove(&recorder));
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let (pump, _handle) = open_pump(DEFAULT_READ_CHUNK).await;
        assert!(!pump.is_running());

        pump.start().await;
        pump.start().await;
        assert!(pump.is_running());

        pump.stop().await;
        pump.stop().await;
        assert!(!pump.is_running());
    }

    #[tokio::test]
    async fn test_dispatch_in_registration_order() {
        let (pump, handle) = open_pump(DEFAULT_READ_CHUNK).await;
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let order = Arc::clone(&order);
            pump.register_listener(Arc::new(move |_: &AntMessage| -> Result<()> {
                order.lock().unwrap().push(tag);
                Ok(())
            }));
        }

        pump.start().await;
        handle.push_message(Capabilities::new(8, 8, 0, 0));
        pump.wait_for_message(MessageId::Capabilities, Some(Duration::from_secs(1)))
            .await
            .unwrap();
        pump.stop().await;

        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_wait_for_ack_matches_opcode() {
        let (pump, handle) = open_pump(DEFAULT_READ_CHUNK).await;
        pump.start().await;

        handle.push_message(ChannelEvent::new(0, 0x42, ResponseCode::NoError));
        handle.push_message(ChannelEvent::new(0, 0x4B, ResponseCode::ChannelInWrongState));

        let timeout = Some(Duration::from_secs(1));
        assert_eq!(
            pump.wait_for_ack(0x4B, timeout).await.unwrap(),
            ResponseCode::ChannelInWrongState
        );
        assert_eq!(
            pump.wait_for_ack(0x42, timeout).await.unwrap(),
            ResponseCode::NoError
        );
        pump.stop().await;
    }

    #[tokio::test]
    async fn test_partial_frames_across_reads() {
        let (pump, handle) = open_pump(3).await;
        pump.start().await;

        let data = ChannelBroadcastData::new(1, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let frame = data.encode();
        handle.push_incoming(&frame[..5]);
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.push_incoming(&frame[5..]);

        let received = pump
            .wait_for_message(MessageId::ChannelBroadcastData, Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(received, AntMessage::from(data));
        pump.stop().await;
    }

    #[tokio::test]
    async fn test_resynchronizes_after_corruption() {
        let (pump, handle) = open_pump(DEFAULT_READ_CHUNK).await;
        let recorder = Recorder::new();
        pump.register_listener(Arc::clone(&recorder) as Arc<dyn Listener>);
        pump.start().await;

        // bad checksum, line noise, unknown opcode, truncated channel event,
        // then a good frame
        handle.push_incoming(&[0xA4, 0x03, 0x42, 0x01, 0x02, 0xF3, 0xE5]);
        handle.push_incoming(&[0x00, 0x55]);
        handle.push_message(Message::new(0x99, &[0x00]).unwrap());
        handle.push_message(Message::new(MessageId::ChannelEvent as u8, &[0x00, 0x42]).unwrap());
        handle.push_message(Capabilities::new(4, 2, 0, 0));

        pump.wait_for_message(MessageId::Capabilities, Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(recorder.seen(), vec![MessageId::Capabilities]);
        assert!(matches!(
            pump.wait_for_ack(0x42, Some(Duration::from_millis(20))).await,
            Err(Error::Timeout { .. })
        ));
        pump.stop().await;
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let (pump, _handle) = open_pump(DEFAULT_READ_CHUNK).await;
        pump.start().await;

        let err = pump
            .wait_for_ack(0x4B, Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { timeout_ms: 20 }));
        pump.stop().await;
    }

    #[tokio::test]
    async fn test_wait_on_stopped_pump() {
        let (pump, _handle) = open_pump(DEFAULT_READ_CHUNK).await;
        assert!(matches!(
            pump.wait_for_message(MessageId::Capabilities, None).await,
            Err(Error::PumpStopped)
        ));
    }

    #[tokio::test]
    async fn test_abort_releases_waiters() {
        let (pump, _handle) = open_pump(DEFAULT_READ_CHUNK).await;
        pump.start().await;
        let other = pump.clone();

        let waiter = tokio::spawn(async move { other.wait_for_ack(0x4B, None).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        pump.abort();

        assert!(!pump.is_running());
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(Error::PumpStopped)));
        assert!(matches!(
            pump.wait_for_message(MessageId::Capabilities, None).await,
            Err(Error::PumpStopped)
        ));

        pump.start().await;
        assert!(pump.is_running());
        pump.stop().await;
    }

    #[tokio::test]
    async fn test_transport_error_stops_pump() {
        let (pump, handle) = open_pump(DEFAULT_READ_CHUNK).await;
        pump.start().await;

        handle.disconnect();
        let err = pump.wait_for_ack(0x4B, None).await.unwrap_err();
        assert!(matches!(err, Error::PumpStopped));
        assert!(!pump.is_running());

        // a stopped pump can be restarted once the transport is back
        pump.stop().await;
        pump.transport().lock().await.open().await.unwrap();
        pump.start().await;
        assert!(pump.is_running());
        pump.stop().await;
    }
}
