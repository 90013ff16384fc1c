//! CPU affinity and thread priority
//!
//! The time-triggered worker's jitter budget assumes it is not migrated
//! between cores mid-hyperperiod. Pinning and SCHED_FIFO priority are
//! opt-in via the process configuration.

use anyhow::Result;
use core_affinity::CoreId;

/// Pin the current thread to one CPU core.
pub fn pin_to_core(core: usize) -> Result<()> {
    let core_id = CoreId { id: core };
    if core_affinity::set_for_current(core_id) {
        tracing::info!(core, "pinned thread to core");
        Ok(())
    } else {
        anyhow::bail!("failed to pin thread to core {core}")
    }
}

/// Request SCHED_FIFO scheduling at `priority`.
///
/// Requires CAP_SYS_NICE or root; failure is reported, not fatal.
#[cfg(target_os = "linux")]
pub fn set_realtime_priority(priority: i32) -> Result<()> {
    use libc::{sched_param, sched_setscheduler, SCHED_FIFO};

    // SAFETY: sched_setscheduler with pid 0 affects only the calling
    // thread group and reads the param struct we own.
    unsafe {
        let param = sched_param {
            sched_priority: priority,
        };
        if sched_setscheduler(0, SCHED_FIFO, &param) == 0 {
            tracing::info!(priority, "SCHED_FIFO priority set");
            Ok(())
        } else {
            anyhow::bail!("failed to set real-time priority (needs CAP_SYS_NICE or root)")
        }
    }
}

/// Real-time priority is Linux-only; elsewhere this is a warning no-op.
#[cfg(not(target_os = "linux"))]
pub fn set_realtime_priority(_priority: i32) -> Result<()> {
    tracing::warn!("real-time priority not supported on this platform");
    Ok(())
}

/// Number of CPU cores visible to this process.
pub fn num_cores() -> usize {
    core_affinity::get_core_ids()
        .map(|ids| ids.len())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_num_cores_is_positive() {
        assert!(num_cores() > 0);
    }

    #[test]
    fn test_pin_to_core_does_not_panic() {
        // Pinning may be refused by the platform or permissions; only
        // panics are failures here.
        let _ = pin_to_core(0);
    }
}
