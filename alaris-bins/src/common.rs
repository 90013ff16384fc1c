//! Common utilities for all binaries
//!
//! Shared initialization, performance setup and status printing.

use alaris_core::ipc::ShmStatus;
use anyhow::Result;

/// Initialize tracing/logging.
pub fn init_logging(level: &str, json_logs: bool) {
    alaris_core::utils::init_logger(level, json_logs);
}

/// Setup CPU affinity and real-time priority.
pub fn setup_performance(cpu_core: Option<usize>, realtime: bool) -> Result<()> {
    if let Some(core) = cpu_core {
        alaris_core::perf::pin_to_core(core)?;
    }

    if realtime {
        alaris_core::perf::set_realtime_priority(50)?;
    }

    Ok(())
}

/// Log a channel status summary.
pub fn log_status(status: &ShmStatus) {
    tracing::info!(
        market_data_depth = status.market_data_depth,
        signal_depth = status.signal_depth,
        control_depth = status.control_depth,
        total_operations = status.total_operations,
        failed_operations = status.failed_operations,
        timeout_events = status.timeout_events,
        healthy = status.healthy,
        "shared memory status"
    );
}
