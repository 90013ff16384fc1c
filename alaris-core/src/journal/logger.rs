//! Typed, checksummed event logging
//!
//! Binary frames are `EventHeader` (32 bytes, host layout) followed by
//! the raw payload; the file starts with the `ALARISLOG_V1B` magic. The
//! text variant emits one comma-separated line per event and exists for
//! human consumption only - replay is binary-only.
//!
//! Frames are serialized under the logger mutex and pushed to the OS
//! after every write so co-process readers observe them promptly. A
//! stream in an error state drops frames (reported through tracing and
//! the health flag) while the sequence counter keeps advancing, so the
//! identifiers of subsequent frames stay unambiguous.

use crate::core::time::now_ns;
use crate::ipc::messages::{ControlMessage, MarketDataMessage, TradingSignalMessage};
use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::error;

/// File prefix identifying the binary journal variant.
pub const BINARY_LOG_MAGIC: &[u8; 13] = b"ALARISLOG_V1B";

/// Header lines written at the top of a fresh text-mode journal.
const TEXT_LOG_HEADER: &str = "# Alaris Event Log V1.0 (Text Format)\n\
                               # Timestamp(ns),Sequence,EventType,DataSize,Checksum,Payload\n";

/// Event discriminants persisted in the frame header.
///
/// Unknown discriminants survive round-trips as their raw `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EventKind {
    Unknown = 0,
    MarketDataUpdate = 1,
    TradingSignalGenerated = 2,
    ControlMessageReceived = 3,
    StrategyParameterChange = 4,
    VolatilityModelUpdate = 5,
    PricingEngineRequest = 6,
    PricingEngineResult = 7,
    OrderEventFromExchange = 8,
    SystemStatusChange = 9,
    PerformanceMetric = 10,
    Error = 11,
    Warning = 12,
    Info = 13,
    Debug = 14,
    CustomStrategyEvent = 100,
}

impl EventKind {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::MarketDataUpdate,
            2 => Self::TradingSignalGenerated,
            3 => Self::ControlMessageReceived,
            4 => Self::StrategyParameterChange,
            5 => Self::VolatilityModelUpdate,
            6 => Self::PricingEngineRequest,
            7 => Self::PricingEngineResult,
            8 => Self::OrderEventFromExchange,
            9 => Self::SystemStatusChange,
            10 => Self::PerformanceMetric,
            11 => Self::Error,
            12 => Self::Warning,
            13 => Self::Info,
            14 => Self::Debug,
            100 => Self::CustomStrategyEvent,
            _ => Self::Unknown,
        }
    }

    /// Kinds whose payloads are UTF-8 text rather than record bytes.
    fn is_textual(raw: u32) -> bool {
        matches!(
            Self::from_raw(raw),
            Self::SystemStatusChange
                | Self::PerformanceMetric
                | Self::Error
                | Self::Warning
                | Self::Info
                | Self::Debug
        )
    }
}

/// Fixed-layout frame header persisted before each payload.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct EventHeader {
    /// Wall-clock write time, nanoseconds since the Unix epoch.
    pub timestamp_ns: u64,
    /// Strictly increasing within one logger instance, starting at 0.
    pub sequence: u64,
    /// Raw [`EventKind`] discriminant.
    pub kind: u32,
    /// Payload byte count.
    pub payload_size: u32,
    /// CRC-32 of the payload bytes (CRC of empty input for empty
    /// payloads).
    pub crc: u32,
    _pad: [u8; 4],
}

pub const EVENT_HEADER_SIZE: usize = std::mem::size_of::<EventHeader>();

impl EventHeader {
    /// CRC law: a frame verifies iff its stored CRC matches the payload.
    pub fn verify(&self, payload: &[u8]) -> bool {
        self.payload_size as usize == payload.len() && self.crc == crc32fast::hash(payload)
    }

    pub fn kind(&self) -> EventKind {
        EventKind::from_raw(self.kind)
    }
}

struct LogStream {
    file: File,
    path: PathBuf,
    healthy: bool,
}

/// Append-only event journal with monotone sequence numbering.
pub struct EventLogger {
    stream: Mutex<LogStream>,
    sequence: AtomicU64,
    events_logged: AtomicU64,
    bytes_written: AtomicU64,
    binary: bool,
}

fn open_appending(path: &Path, binary: bool) -> Result<(File, u64)> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open event log {}", path.display()))?;
    let len = file
        .metadata()
        .with_context(|| format!("failed to stat event log {}", path.display()))?
        .len();
    let mut prefix_bytes = 0u64;
    if len == 0 {
        if binary {
            file.write_all(BINARY_LOG_MAGIC)
                .context("failed to write binary log prefix")?;
            prefix_bytes = BINARY_LOG_MAGIC.len() as u64;
        } else {
            file.write_all(TEXT_LOG_HEADER.as_bytes())
                .context("failed to write text log header")?;
            prefix_bytes = TEXT_LOG_HEADER.len() as u64;
        }
        file.flush().ok();
    }
    Ok((file, prefix_bytes))
}

impl EventLogger {
    /// Open (or create) a journal at `path`.
    ///
    /// `binary` selects the replayable binary variant; text mode is a
    /// write-only diagnostic sink.
    pub fn new(path: impl AsRef<Path>, binary: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (file, prefix_bytes) = open_appending(&path, binary)?;
        Ok(Self {
            stream: Mutex::new(LogStream {
                file,
                path,
                healthy: true,
            }),
            sequence: AtomicU64::new(0),
            events_logged: AtomicU64::new(0),
            bytes_written: AtomicU64::new(prefix_bytes),
            binary,
        })
    }

    /// Append one frame. The sequence number advances even when the
    /// frame is dropped because the stream is unhealthy.
    pub fn log_event(&self, kind: EventKind, payload: &[u8]) {
        self.log_raw(kind as u32, payload)
    }

    fn log_raw(&self, kind: u32, payload: &[u8]) {
        let header = EventHeader {
            timestamp_ns: now_ns(),
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            kind,
            payload_size: payload.len() as u32,
            crc: crc32fast::hash(payload),
            _pad: [0; 4],
        };

        let mut stream = self.stream.lock();
        if !stream.healthy {
            error!(
                sequence = header.sequence,
                kind, "event log stream unhealthy, frame dropped"
            );
            return;
        }

        let written = if self.binary {
            self.write_binary(&mut stream, &header, payload)
        } else {
            self.write_text(&mut stream, &header, payload)
        };

        match written {
            Ok(bytes) => {
                // Push the frame to the OS promptly so co-process readers
                // see it; fsync durability is not part of the contract.
                stream.file.flush().ok();
                self.events_logged.fetch_add(1, Ordering::Relaxed);
                self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
            }
            Err(e) => {
                stream.healthy = false;
                error!(
                    path = %stream.path.display(),
                    sequence = header.sequence,
                    error = %e,
                    "event log write failed, frame lost"
                );
            }
        }
    }

    fn write_binary(
        &self,
        stream: &mut LogStream,
        header: &EventHeader,
        payload: &[u8],
    ) -> std::io::Result<u64> {
        stream.file.write_all(bytemuck::bytes_of(header))?;
        if !payload.is_empty() {
            stream.file.write_all(payload)?;
        }
        Ok((EVENT_HEADER_SIZE + payload.len()) as u64)
    }

    fn write_text(
        &self,
        stream: &mut LogStream,
        header: &EventHeader,
        payload: &[u8],
    ) -> std::io::Result<u64> {
        let mut line = format!(
            "{},{},{},{},{},",
            header.timestamp_ns, header.sequence, header.kind, header.payload_size, header.crc
        );
        if !payload.is_empty() {
            if EventKind::is_textual(header.kind) {
                let text = String::from_utf8_lossy(payload);
                let _ = write!(line, "\"{text}\"");
            } else {
                for byte in payload {
                    let _ = write!(line, "{byte:02x}");
                }
            }
        }
        line.push('\n');
        stream.file.write_all(line.as_bytes())?;
        Ok(line.len() as u64)
    }

    // Typed writers for the wire records and common text events.

    pub fn log_market_data(&self, msg: &MarketDataMessage) {
        self.log_event(EventKind::MarketDataUpdate, bytemuck::bytes_of(msg));
    }

    pub fn log_trading_signal(&self, msg: &TradingSignalMessage) {
        self.log_event(EventKind::TradingSignalGenerated, bytemuck::bytes_of(msg));
    }

    pub fn log_control(&self, msg: &ControlMessage) {
        self.log_event(EventKind::ControlMessageReceived, bytemuck::bytes_of(msg));
    }

    pub fn log_system_status(&self, status: &str) {
        self.log_event(EventKind::SystemStatusChange, status.as_bytes());
    }

    pub fn log_performance_metric(&self, name: &str, value: f64) {
        let payload = format!("{name}={value}");
        self.log_event(EventKind::PerformanceMetric, payload.as_bytes());
    }

    pub fn log_error(&self, message: &str) {
        self.log_event(EventKind::Error, message.as_bytes());
    }

    pub fn log_warning(&self, message: &str) {
        self.log_event(EventKind::Warning, message.as_bytes());
    }

    pub fn log_info(&self, message: &str) {
        self.log_event(EventKind::Info, message.as_bytes());
    }

    pub fn log_debug(&self, message: &str) {
        self.log_event(EventKind::Debug, message.as_bytes());
    }

    /// Append a frame with an arbitrary raw discriminant.
    pub fn log_custom(&self, raw_kind: u32, payload: &[u8]) {
        self.log_raw(raw_kind, payload);
    }

    /// Flush buffered bytes to the OS.
    pub fn flush(&self) {
        let mut stream = self.stream.lock();
        stream.file.flush().ok();
    }

    /// Close the current file and continue in `new_path`.
    ///
    /// The prefix is written only when the new file is empty; the
    /// sequence counter is not reset across rotation.
    pub fn rotate(&self, new_path: impl AsRef<Path>) -> Result<()> {
        let new_path = new_path.as_ref().to_path_buf();
        let (file, prefix_bytes) = open_appending(&new_path, self.binary)?;
        let mut stream = self.stream.lock();
        stream.file.flush().ok();
        stream.file = file;
        stream.path = new_path;
        stream.healthy = true;
        self.bytes_written.fetch_add(prefix_bytes, Ordering::Relaxed);
        Ok(())
    }

    pub fn events_logged(&self) -> u64 {
        self.events_logged.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Next sequence number that will be assigned.
    pub fn next_sequence(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    pub fn is_healthy(&self) -> bool {
        self.stream.lock().healthy
    }
}

impl Drop for EventLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    fn read_all(path: &Path) -> Vec<u8> {
        let mut buf = Vec::new();
        File::open(path).unwrap().read_to_end(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_binary_log_starts_with_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.bin");
        let logger = EventLogger::new(&path, true).unwrap();
        logger.log_info("hello");
        drop(logger);

        let bytes = read_all(&path);
        assert!(bytes.starts_with(BINARY_LOG_MAGIC));
    }

    #[test]
    fn test_sequences_are_strictly_increasing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.bin");
        let logger = EventLogger::new(&path, true).unwrap();
        for i in 0..10 {
            logger.log_custom(100, format!("payload {i}").as_bytes());
        }
        assert_eq!(logger.next_sequence(), 10);
        assert_eq!(logger.events_logged(), 10);
        drop(logger);

        // Walk the frames and confirm 0..10 without gaps.
        let bytes = read_all(&path);
        let mut offset = BINARY_LOG_MAGIC.len();
        let mut expected = 0u64;
        while offset + EVENT_HEADER_SIZE <= bytes.len() {
            let header: EventHeader =
                bytemuck::pod_read_unaligned(&bytes[offset..offset + EVENT_HEADER_SIZE]);
            assert_eq!(header.sequence, expected);
            expected += 1;
            offset += EVENT_HEADER_SIZE + header.payload_size as usize;
        }
        assert_eq!(expected, 10);
        assert_eq!(offset, bytes.len());
    }

    #[test]
    fn test_crc_verification_law() {
        let payload = b"checksum me";
        let header = EventHeader {
            timestamp_ns: now_ns(),
            sequence: 0,
            kind: EventKind::Info as u32,
            payload_size: payload.len() as u32,
            crc: crc32fast::hash(payload),
            _pad: [0; 4],
        };
        assert!(header.verify(payload));

        let mut tampered = header;
        tampered.crc ^= 1;
        assert!(!tampered.verify(payload));
        assert!(!header.verify(b"different payload"));
    }

    #[test]
    fn test_empty_payload_crc_is_crc_of_empty_input() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.bin");
        let logger = EventLogger::new(&path, true).unwrap();
        logger.log_event(EventKind::SystemStatusChange, b"");
        drop(logger);

        let bytes = read_all(&path);
        let header: EventHeader = bytemuck::pod_read_unaligned(
            &bytes[BINARY_LOG_MAGIC.len()..BINARY_LOG_MAGIC.len() + EVENT_HEADER_SIZE],
        );
        assert_eq!(header.payload_size, 0);
        assert_eq!(header.crc, crc32fast::hash(b""));
        assert!(header.verify(b""));
    }

    #[test]
    fn test_market_data_frame_payload_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.bin");
        let logger = EventLogger::new(&path, true).unwrap();

        let mut msg = MarketDataMessage::new(11);
        msg.bid = 4.5;
        msg.ask = 4.75;
        msg.underlying_price = 99.0;
        logger.log_market_data(&msg);
        drop(logger);

        let bytes = read_all(&path);
        let start = BINARY_LOG_MAGIC.len();
        let header: EventHeader =
            bytemuck::pod_read_unaligned(&bytes[start..start + EVENT_HEADER_SIZE]);
        assert_eq!(header.kind(), EventKind::MarketDataUpdate);
        assert_eq!(header.payload_size as usize, 128);

        let payload = &bytes[start + EVENT_HEADER_SIZE..start + EVENT_HEADER_SIZE + 128];
        assert!(header.verify(payload));
        let back: MarketDataMessage = bytemuck::pod_read_unaligned(payload);
        assert_eq!(back, msg);
    }

    #[test]
    fn test_append_does_not_rewrite_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.bin");
        {
            let logger = EventLogger::new(&path, true).unwrap();
            logger.log_info("first session");
        }
        let first_len = read_all(&path).len();
        {
            let logger = EventLogger::new(&path, true).unwrap();
            logger.log_info("second session");
        }
        let bytes = read_all(&path);
        assert!(bytes.len() > first_len);
        // Exactly one magic, at the very front.
        assert!(bytes.starts_with(BINARY_LOG_MAGIC));
        let rest = &bytes[1..];
        assert!(!rest
            .windows(BINARY_LOG_MAGIC.len())
            .any(|w| w == BINARY_LOG_MAGIC));
    }

    #[test]
    fn test_rotation_opens_new_file_with_prefix() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("events-1.bin");
        let second = dir.path().join("events-2.bin");

        let logger = EventLogger::new(&first, true).unwrap();
        logger.log_info("before rotation");
        logger.rotate(&second).unwrap();
        logger.log_info("after rotation");
        drop(logger);

        assert!(read_all(&first).starts_with(BINARY_LOG_MAGIC));
        let second_bytes = read_all(&second);
        assert!(second_bytes.starts_with(BINARY_LOG_MAGIC));

        // Sequence numbering continues across the rotation.
        let header: EventHeader = bytemuck::pod_read_unaligned(
            &second_bytes[BINARY_LOG_MAGIC.len()..BINARY_LOG_MAGIC.len() + EVENT_HEADER_SIZE],
        );
        assert_eq!(header.sequence, 1);
    }

    #[test]
    fn test_text_mode_is_human_readable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.log");
        let logger = EventLogger::new(&path, false).unwrap();
        logger.log_system_status("engine up");
        logger.log_custom(100, &[0xDE, 0xAD]);
        drop(logger);

        let text = String::from_utf8(read_all(&path)).unwrap();
        assert!(text.starts_with("# Alaris Event Log V1.0"));
        assert!(text.contains("\"engine up\""));
        assert!(text.contains("dead"));
    }

    #[test]
    fn test_concurrent_writers_keep_unique_sequences() {
        use std::sync::Arc;
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.bin");
        let logger = Arc::new(EventLogger::new(&path, true).unwrap());

        let mut handles = Vec::new();
        for t in 0..4 {
            let logger = Arc::clone(&logger);
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    logger.log_custom(100, format!("t{t} e{i}").as_bytes());
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(logger.events_logged(), 200);
        drop(logger);

        // All 200 sequences present exactly once.
        let bytes = read_all(&path);
        let mut seen = vec![false; 200];
        let mut offset = BINARY_LOG_MAGIC.len();
        while offset + EVENT_HEADER_SIZE <= bytes.len() {
            let header: EventHeader =
                bytemuck::pod_read_unaligned(&bytes[offset..offset + EVENT_HEADER_SIZE]);
            assert!(!seen[header.sequence as usize], "duplicate sequence");
            seen[header.sequence as usize] = true;
            offset += EVENT_HEADER_SIZE + header.payload_size as usize;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_kind_raw_roundtrip() {
        assert_eq!(EventKind::from_raw(1), EventKind::MarketDataUpdate);
        assert_eq!(EventKind::from_raw(100), EventKind::CustomStrategyEvent);
        assert_eq!(EventKind::from_raw(12345), EventKind::Unknown);
    }
}
