//! Event-log replay tool
//!
//! Streams a binary Alaris journal to stdout at a configurable virtual
//! speed. Useful for post-mortem inspection and for feeding recorded
//! sessions back into downstream consumers.

use alaris_bins::common::init_logging;
use alaris_core::journal::{EventKind, ReplayEngine};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Replay a binary Alaris event log")]
struct Args {
    /// Path to the binary event log
    log: PathBuf,

    /// Virtual-time speed factor (0 single-steps, 1 realizes original
    /// spacing, larger compresses)
    #[arg(short, long, default_value_t = 1.0)]
    speed: f64,

    /// Skip forward to the first event with this sequence number
    #[arg(long, default_value_t = 0)]
    start_sequence: u64,

    /// Print payload bytes as hex instead of a summary
    #[arg(long)]
    hex: bool,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, false);

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::Release);
        })
        .context("installing signal handler")?;
    }

    let dispatched = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&dispatched);
    let hex = args.hex;
    let mut engine = ReplayEngine::new(
        &args.log,
        Box::new(move |header, payload| {
            counter.fetch_add(1, Ordering::Relaxed);
            let crc_ok = header.verify(payload);
            if hex {
                let bytes: String = payload.iter().map(|b| format!("{b:02x}")).collect();
                println!(
                    "{} seq={} kind={:?} size={} crc_ok={} payload={}",
                    header.timestamp_ns, header.sequence, header.kind(), header.payload_size,
                    crc_ok, bytes
                );
            } else {
                let summary = match header.kind() {
                    EventKind::SystemStatusChange
                    | EventKind::PerformanceMetric
                    | EventKind::Error
                    | EventKind::Warning
                    | EventKind::Info
                    | EventKind::Debug => String::from_utf8_lossy(payload).into_owned(),
                    _ => format!("<{} bytes>", payload.len()),
                };
                println!(
                    "{} seq={} kind={:?} crc_ok={} {}",
                    header.timestamp_ns, header.sequence, header.kind(), crc_ok, summary
                );
            }
        }),
    )
    .with_context(|| format!("opening {}", args.log.display()))?;

    engine.set_speed(args.speed);
    engine.start(args.start_sequence)?;

    while engine.is_replaying() {
        if interrupted.load(Ordering::Acquire) {
            break;
        }
        if engine.is_paused() {
            // Speed 0 single-steps; advance on an interval so the tool
            // stays usable without interactive input.
            std::thread::sleep(Duration::from_millis(250));
            engine.resume();
        } else {
            std::thread::sleep(Duration::from_millis(20));
        }
    }
    engine.stop();

    tracing::info!(
        events = dispatched.load(Ordering::Relaxed),
        "replay complete"
    );
    Ok(())
}
