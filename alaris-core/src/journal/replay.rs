//! Virtual-time replay of binary event journals
//!
//! The engine opens a journal read-only, verifies the `ALARISLOG_V1B`
//! prefix (an unknown prefix is treated as a legacy/headerless log and
//! read from byte 0), then streams frames to the user callback on a
//! dedicated thread. Dispatch time for an event is
//! `host_start + (event_ts - first_event_ts) / speed`; speed 0 means
//! single-step, pausing the engine after every event.
//!
//! CRC mismatches are logged and replay continues; an over-size payload
//! aborts replay as suspected corruption.

use super::logger::{EventHeader, BINARY_LOG_MAGIC, EVENT_HEADER_SIZE};
use crate::core::time::sleep_until;
use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Payloads above this are treated as corruption and abort replay.
const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Poll interval while the engine is paused.
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Receives each replayed frame in sequence order.
pub type ReplayCallback = Box<dyn FnMut(&EventHeader, &[u8]) + Send>;

/// Single-threaded replay engine with pause/resume/stop control.
pub struct ReplayEngine {
    path: PathBuf,
    callback: Arc<Mutex<ReplayCallback>>,
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    speed_bits: Arc<AtomicU64>,
    current_sequence: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
}

impl ReplayEngine {
    /// Bind a replay engine to a journal file.
    ///
    /// The file must exist and be readable; prefix validation happens
    /// here (and again at every start, since starts re-read from the
    /// beginning).
    pub fn new(path: impl AsRef<Path>, callback: ReplayCallback) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)
            .with_context(|| format!("failed to open event log {}", path.display()))?;
        if !has_binary_prefix(&mut file)? {
            warn!(
                path = %path.display(),
                "binary journal prefix not found, assuming headerless or text log"
            );
        }
        Ok(Self {
            path,
            callback: Arc::new(Mutex::new(callback)),
            running: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            speed_bits: Arc::new(AtomicU64::new(1.0f64.to_bits())),
            current_sequence: Arc::new(AtomicU64::new(0)),
            worker: None,
        })
    }

    /// Start replaying from the first event with `sequence >=
    /// start_sequence`.
    ///
    /// Rejected while a replay is in progress; legal again after `stop`.
    pub fn start(&mut self, start_sequence: u64) -> Result<()> {
        if self.running.load(Ordering::Acquire) {
            bail!("replay already in progress, stop it first");
        }
        // Reap a worker that finished on its own (end of file).
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }

        self.running.store(true, Ordering::Release);
        self.paused.store(false, Ordering::Release);

        let path = self.path.clone();
        let callback = Arc::clone(&self.callback);
        let running = Arc::clone(&self.running);
        let paused = Arc::clone(&self.paused);
        let speed_bits = Arc::clone(&self.speed_bits);
        let current_sequence = Arc::clone(&self.current_sequence);

        let worker = std::thread::Builder::new()
            .name("alaris-replay".into())
            .spawn(move || {
                if let Err(e) = replay_loop(
                    &path,
                    start_sequence,
                    &callback,
                    &running,
                    &paused,
                    &speed_bits,
                    &current_sequence,
                ) {
                    error!(path = %path.display(), error = %e, "replay aborted");
                }
                running.store(false, Ordering::Release);
                paused.store(false, Ordering::Release);
            })?;
        self.worker = Some(worker);
        Ok(())
    }

    /// Pause dispatching; the worker idles until resume or stop.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    /// Stop the replay and join the worker. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.paused.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    /// Set the virtual-time speed factor; negative values clamp to 0
    /// (single-step).
    pub fn set_speed(&self, speed: f64) {
        self.speed_bits
            .store(speed.max(0.0).to_bits(), Ordering::Relaxed);
    }

    pub fn speed(&self) -> f64 {
        f64::from_bits(self.speed_bits.load(Ordering::Relaxed))
    }

    pub fn is_replaying(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Sequence number of the most recently read frame.
    pub fn current_sequence(&self) -> u64 {
        self.current_sequence.load(Ordering::Relaxed)
    }
}

impl Drop for ReplayEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Consume the binary prefix if present; otherwise rewind to byte 0.
fn has_binary_prefix(file: &mut File) -> Result<bool> {
    let mut prefix = [0u8; BINARY_LOG_MAGIC.len()];
    file.seek(SeekFrom::Start(0))?;
    match file.read_exact(&mut prefix) {
        Ok(()) if &prefix == BINARY_LOG_MAGIC => Ok(true),
        _ => {
            file.seek(SeekFrom::Start(0))?;
            Ok(false)
        }
    }
}

/// Read one frame; `Ok(None)` is clean end of stream.
fn read_frame(reader: &mut BufReader<File>) -> Result<Option<(EventHeader, Vec<u8>)>> {
    let mut header_bytes = [0u8; EVENT_HEADER_SIZE];
    match reader.read_exact(&mut header_bytes) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e).context("failed to read frame header"),
    }
    let header: EventHeader = bytemuck::pod_read_unaligned(&header_bytes);

    if header.payload_size > MAX_PAYLOAD_SIZE {
        bail!(
            "payload size {} for sequence {} exceeds the sanity ceiling, log presumed corrupt",
            header.payload_size,
            header.sequence
        );
    }

    let mut payload = vec![0u8; header.payload_size as usize];
    if header.payload_size > 0 {
        reader
            .read_exact(&mut payload)
            .with_context(|| format!("truncated payload for sequence {}", header.sequence))?;
    }

    if !header.verify(&payload) {
        warn!(
            sequence = header.sequence,
            stored_crc = header.crc,
            computed_crc = crc32fast::hash(&payload),
            "checksum mismatch, continuing replay"
        );
    }
    Ok(Some((header, payload)))
}

#[allow(clippy::too_many_arguments)]
fn replay_loop(
    path: &Path,
    start_sequence: u64,
    callback: &Mutex<ReplayCallback>,
    running: &AtomicBool,
    paused: &AtomicBool,
    speed_bits: &AtomicU64,
    current_sequence: &AtomicU64,
) -> Result<()> {
    let mut file = File::open(path)
        .with_context(|| format!("failed to reopen event log {}", path.display()))?;
    has_binary_prefix(&mut file)?;
    let mut reader = BufReader::new(file);

    let mut host_start = Instant::now();
    let mut first_event_ts: Option<u64> = None;
    let mut dispatched = 0u64;

    while running.load(Ordering::Acquire) {
        while paused.load(Ordering::Acquire) && running.load(Ordering::Acquire) {
            std::thread::sleep(PAUSE_POLL_INTERVAL);
        }
        if !running.load(Ordering::Acquire) {
            break;
        }

        let Some((header, payload)) = read_frame(&mut reader)? else {
            break;
        };
        current_sequence.store(header.sequence, Ordering::Relaxed);

        // Seek forward to the requested start; the virtual clock anchors
        // on the first dispatched event.
        if header.sequence < start_sequence {
            continue;
        }
        let first_ts = *first_event_ts.get_or_insert_with(|| {
            host_start = Instant::now();
            header.timestamp_ns
        });

        let speed = f64::from_bits(speed_bits.load(Ordering::Relaxed));
        if speed > 0.0 {
            let original_elapsed_ns = header.timestamp_ns.saturating_sub(first_ts);
            let scaled_ns = (original_elapsed_ns as f64 / speed) as u64;
            sleep_until(host_start + Duration::from_nanos(scaled_ns));
        }

        {
            let mut cb = callback.lock();
            (*cb)(&header, &payload);
        }
        dispatched += 1;

        if speed == 0.0 {
            paused.store(true, Ordering::Release);
        }
    }

    info!(dispatched, "replay finished");
    Ok(())
}
