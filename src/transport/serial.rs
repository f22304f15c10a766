//! Serial/USB transport implementation.
//!
//! ANT USB sticks enumerate as a USB-serial device (CP210x bridge).

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use crate::error::{Error, Result, TransportError};
use crate::transport::{Transport, TransportFuture};

/// Default baud rate for ANT USB sticks.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default time a read waits for data before returning empty.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Configuration for serial transport.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0" or "COM3").
    pub port: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// How long a read waits for data.
    pub read_timeout: Duration,
}

impl SerialConfig {
    /// Creates a new serial configuration with default settings.
    #[must_use]
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Sets the baud rate.
    #[must_use]
    pub const fn baud_rate(mut self, rate: u32) -> Self {
        self.baud_rate = rate;
        self
    }

    /// Sets the read timeout.
    #[must_use]
    pub const fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

/// Serial transport for ANT USB sticks.
pub struct SerialTransport {
    config: SerialConfig,
    stream: Option<SerialStream>,
}

impl SerialTransport {
    /// Creates a new serial transport with the given configuration.
    #[must_use]
    pub const fn new(config: SerialConfig) -> Self {
        Self {
            config,
            stream: None,
        }
    }

    /// Creates a new serial transport for the given port with default settings.
    #[must_use]
    pub fn with_port(port: impl Into<String>) -> Self {
        Self::new(SerialConfig::new(port))
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &SerialConfig {
        &self.config
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            if self.stream.is_some() {
                return Err(TransportError::AlreadyOpen.into());
            }

            tracing::info!("opening serial port: {}", self.config.port);

            let stream = tokio_serial::new(&self.config.port, self.config.baud_rate)
                .open_native_async()
                .map_err(Error::Serial)?;
            self.stream = Some(stream);

            tracing::info!("serial port open");
            Ok(())
        })
    }

    fn close(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            if self.stream.take().is_none() {
                return Err(TransportError::NotOpen.into());
            }
            tracing::info!("closed serial port: {}", self.config.port);
            Ok(())
        })
    }

    fn read(&mut self, count: usize) -> TransportFuture<'_, Bytes> {
        Box::pin(async move {
            let stream = self.stream.as_mut().ok_or(TransportError::NotOpen)?;
            if count == 0 {
                return Err(TransportError::ZeroLengthRead.into());
            }

            let mut buf = vec![0u8; count];
            match tokio::time::timeout(self.config.read_timeout, stream.read(&mut buf)).await {
                Ok(Ok(n)) => {
                    buf.truncate(n);
                    if n > 0 {
                        tracing::trace!("read {} bytes: {}", n, hex::encode(&buf));
                    }
                    Ok(Bytes::from(buf))
                }
                Ok(Err(e)) => {
                    tracing::error!("serial read error: {}", e);
                    Err(Error::Io(e))
                }
                Err(_) => Ok(Bytes::new()),
            }
        })
    }

    fn write(&mut self, data: Bytes) -> TransportFuture<'_, usize> {
        Box::pin(async move {
            let stream = self.stream.as_mut().ok_or(TransportError::NotOpen)?;
            if data.is_empty() {
                return Err(TransportError::EmptyWrite.into());
            }

            tracing::trace!("writing {} bytes: {}", data.len(), hex::encode(&data));
            stream.write_all(&data).await.map_err(Error::Io)?;
            stream.flush().await.map_err(Error::Io)?;

            Ok(data.len())
        })
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

/// Lists available serial ports.
///
/// # Errors
///
/// Returns an error if the port list cannot be retrieved.
pub fn list_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports().map_err(Error::Serial)?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_config_defaults() {
        let config = SerialConfig::new("/dev/ttyUSB0");
        assert_eq!(config.port, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.read_timeout, DEFAULT_READ_TIMEOUT);
    }

    #[test]
    fn test_serial_config_builder() {
        let config = SerialConfig::new("/dev/ttyUSB0")
            .baud_rate(57_600)
            .read_timeout(Duration::from_millis(50));
        assert_eq!(config.baud_rate, 57_600);
        assert_eq!(config.read_timeout, Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_io_before_open_fails() {
        let mut transport = SerialTransport::with_port("/dev/ttyUSB0");
        assert!(!transport.is_open());
        assert!(matches!(
            transport.read(20).await,
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

    #[test]
    #[ignore = "Requires /sys/class/tty - not available in sandboxed builds"]
    fn test_list_ports() {
        let _ = list_ports();
    }
}
