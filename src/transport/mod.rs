//! Transport layer for ANT communication.
//!
//! A transport moves raw bytes to and from the radio. It carries no
//! protocol logic; framing happens in the event pump. Every transport
//! enforces the same contract: `open` twice fails, I/O or `close` while
//! closed fails, zero-length reads and empty writes fail.

pub mod log;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod serial;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;

use crate::error::Result;

/// Boxed future returned by transport operations.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Trait for transport implementations.
pub trait Transport: Send {
    /// Opens the device.
    fn open(&mut self) -> TransportFuture<'_, ()>;

    /// Closes the device.
    fn close(&mut self) -> TransportFuture<'_, ()>;

    /// Reads up to `count` bytes.
    ///
    /// Waits at most a short, transport-defined time and returns an empty
    /// buffer if nothing arrived.
    fn read(&mut self, count: usize) -> TransportFuture<'_, Bytes>;

    /// Writes `data` and returns the number of bytes written.
    fn write(&mut self, data: Bytes) -> TransportFuture<'_, usize>;

    /// Returns true if the device is open.
    fn is_open(&self) -> bool;
}

/// A transport shared between the event pump and command callers.
pub type SharedTransport = Arc<Mutex<dyn Transport>>;

/// Wraps a transport for sharing.
pub fn shared<T: Transport + 'static>(transport: T) -> SharedTransport {
    Arc::new(Mutex::new(transport))
}

pub use log::{LogEvent, LogReader, LogRecord, LogWriter, LoggingTransport};
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockHandle, MockTransport, StickEmulator};
pub use serial::{SerialConfig, SerialTransport, list_ports};
