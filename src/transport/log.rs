//! Transport traffic recording.
//!
//! A log is a stream of MessagePack values. The first value is the header
//! `["ANT-LOG", 1]`; every following value is one event record:
//!
//! ```text
//! [event, unix_seconds]          open (1), close (2)
//! [event, unix_seconds, bytes]   read (3), write (4)
//! ```
//!
//! Reads and writes that moved no bytes are not recorded.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportFuture};

/// Magic string at the start of every log.
pub const LOG_MAGIC: &str = "ANT-LOG";

/// Log format version.
pub const LOG_VERSION: u8 = 1;

/// Kind of transport event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LogEvent {
    Open = 0x01,
    Close = 0x02,
    Read = 0x03,
    Write = 0x04,
}

impl LogEvent {
    /// Attempts to parse an event kind from a byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Open),
            0x02 => Some(Self::Close),
            0x03 => Some(Self::Read),
            0x04 => Some(Self::Write),
            _ => None,
        }
    }
}

/// One recorded transport event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// What happened.
    pub event: LogEvent,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    /// Bytes moved, for reads and writes.
    pub data: Option<Bytes>,
}

impl LogRecord {
    fn now(event: LogEvent, data: Option<Bytes>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self {
            event,
            timestamp,
            data,
        }
    }
}

impl Serialize for LogRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = if self.data.is_some() { 3 } else { 2 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&(self.event as u8))?;
        seq.serialize_element(&self.timestamp)?;
        if let Some(data) = &self.data {
            seq.serialize_element(serde_bytes::Bytes::new(data))?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for LogRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = LogRecord;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a log record [event, timestamp, data?]")
            }

            fn visit_seq<A: SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> std::result::Result<LogRecord, A::Error> {
                let byte: u8 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let event = LogEvent::from_byte(byte).ok_or_else(|| {
                    de::Error::invalid_value(de::Unexpected::Unsigned(byte.into()), &self)
                })?;
                let timestamp: u64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let data = seq
                    .next_element::<serde_bytes::ByteBuf>()?
                    .map(|bytes| Bytes::from(bytes.into_vec()));
                Ok(LogRecord {
                    event,
                    timestamp,
                    data,
                })
            }
        }

        deserializer.deserialize_seq(RecordVisitor)
    }
}

/// Writes transport events to a log.
pub struct LogWriter<W: Write> {
    writer: W,
}

impl LogWriter<BufWriter<File>> {
    /// Creates a log file at `path`, truncating any existing file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(BufWriter::new(File::create(path)?))
    }
}

impl<W: Write> LogWriter<W> {
    /// Starts a log on `writer` by writing the header.
    pub fn new(mut writer: W) -> Result<Self> {
        rmp_serde::encode::write(&mut writer, &(LOG_MAGIC, LOG_VERSION))?;
        writer.flush()?;
        Ok(Self { writer })
    }

    fn record(&mut self, event: LogEvent, data: Option<&[u8]>) -> Result<()> {
        if data.is_some_and(<[u8]>::is_empty) {
            return Ok(());
        }
        let record = LogRecord::now(event, data.map(Bytes::copy_from_slice));
        rmp_serde::encode::write(&mut self.writer, &record)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn log_open(&mut self) -> Result<()> {
        self.record(LogEvent::Open, None)
    }

    pub fn log_close(&mut self) -> Result<()> {
        self.record(LogEvent::Close, None)
    }

    pub fn log_read(&mut self, data: &[u8]) -> Result<()> {
        self.record(LogEvent::Read, Some(data))
    }

    pub fn log_write(&mut self, data: &[u8]) -> Result<()> {
        self.record(LogEvent::Write, Some(data))
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Reads transport events back from a log.
pub struct LogReader<R: Read> {
    deserializer: rmp_serde::Deserializer<rmp_serde::decode::ReadReader<R>>,
}

impl LogReader<BufReader<File>> {
    /// Opens the log file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read> LogReader<R> {
    /// Reads and validates the log header.
    ///
    /// # Errors
    ///
    /// Returns `LogFormat` if the stream does not start with a log header.
    pub fn new(reader: R) -> Result<Self> {
        let mut deserializer = rmp_serde::Deserializer::new(reader);
        let header: (String, u8) =
            Deserialize::deserialize(&mut deserializer).map_err(|e| Error::LogFormat {
                reason: e.to_string(),
            })?;
        if header.0 != LOG_MAGIC || header.1 != LOG_VERSION {
            return Err(Error::LogFormat {
                reason: format!("unknown header [{:?}, {}]", header.0, header.1),
            });
        }
        Ok(Self { deserializer })
    }

    /// Returns the next record, or `None` at the end of the log.
    pub fn next_record(&mut self) -> Result<Option<LogRecord>> {
        match LogRecord::deserialize(&mut self.deserializer) {
            Ok(record) => Ok(Some(record)),
            Err(rmp_serde::decode::Error::InvalidMarkerRead(e))
                if e.kind() == io::ErrorKind::UnexpectedEof =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl<R: Read> Iterator for LogReader<R> {
    type Item = Result<LogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// A transport that records all traffic of an inner transport.
///
/// Recording failures are logged and never affect the I/O result.
pub struct LoggingTransport<T, W: Write> {
    inner: T,
    log: LogWriter<W>,
}

impl<T: Transport, W: Write + Send> LoggingTransport<T, W> {
    /// Wraps `inner`, recording to `log`.
    pub const fn new(inner: T, log: LogWriter<W>) -> Self {
        Self { inner, log }
    }

    /// Unwraps the inner transport and log.
    pub fn into_parts(self) -> (T, LogWriter<W>) {
        (self.inner, self.log)
    }

    fn note(&mut self, result: Result<()>) {
        if let Err(e) = result {
            tracing::warn!("failed to record transport event: {}", e);
        }
    }
}

impl<T: Transport, W: Write + Send> Transport for LoggingTransport<T, W> {
    fn open(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            self.inner.open().await?;
            let result = self.log.log_open();
            self.note(result);
            Ok(())
        })
    }

    fn close(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            self.inner.close().await?;
            let result = self.log.log_close();
            self.note(result);
            Ok(())
        })
    }

    fn read(&mut self, count: usize) -> TransportFuture<'_, Bytes> {
        Box::pin(async move {
            let data = self.inner.read(count).await?;
            let result = self.log.log_read(&data);
            self.note(result);
            Ok(data)
        })
    }

    fn write(&mut self, data: Bytes) -> TransportFuture<'_, usize> {
        Box::pin(async move {
            let written = self.inner.write(data.clone()).await?;
            let result = self.log.log_write(&data[..written.min(data.len())]);
            self.note(result);
            Ok(written)
        })
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
}
