//! Prometheus metrics for the runtime core
//!
//! Gauge and counter families mirroring the internal health counters of
//! the shared-memory channels, the scheduler and the memory pool. There
//! is no HTTP exporter here; the performance-report task gathers the
//! registry and emits it through the journal/tracing.

use crate::ipc::ShmStatus;
use crate::mem::PoolStats;
use crate::sched::TaskMetrics;
use prometheus::{Encoder, Gauge, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use tracing::info;

/// Central registry for all core metric families.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,
    ipc: Arc<IpcMetrics>,
    scheduler: Arc<SchedulerMetrics>,
    memory: Arc<MemoryMetrics>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());
        let ipc = Arc::new(IpcMetrics::new(&registry)?);
        let scheduler = Arc::new(SchedulerMetrics::new(&registry)?);
        let memory = Arc::new(MemoryMetrics::new(&registry)?);
        info!("metrics registry initialized");
        Ok(Self {
            registry,
            ipc,
            scheduler,
            memory,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Mirror a shared-memory status snapshot into the gauge families.
    pub fn record_shm_status(&self, status: &ShmStatus) {
        let m = &self.ipc;
        m.depth.with_label_values(&["market_data"]).set(status.market_data_depth as i64);
        m.depth.with_label_values(&["signals"]).set(status.signal_depth as i64);
        m.depth.with_label_values(&["control"]).set(status.control_depth as i64);
        m.total_writes
            .with_label_values(&["market_data"])
            .set(status.market_data_total_writes as i64);
        m.total_writes
            .with_label_values(&["signals"])
            .set(status.signal_total_writes as i64);
        m.total_writes
            .with_label_values(&["control"])
            .set(status.control_total_writes as i64);
        m.healthy
            .with_label_values(&["market_data"])
            .set(status.market_data_healthy as i64);
        m.healthy
            .with_label_values(&["signals"])
            .set(status.signal_healthy as i64);
        m.healthy
            .with_label_values(&["control"])
            .set(status.control_healthy as i64);
        m.total_operations.set(status.total_operations as i64);
        m.failed_operations.set(status.failed_operations as i64);
        m.timeout_events.set(status.timeout_events as i64);
        m.failure_rate.set(status.failure_rate);
    }

    /// Mirror one task's runtime metrics.
    pub fn record_task_metrics(&self, task: &str, metrics: &TaskMetrics) {
        let m = &self.scheduler;
        m.executions
            .with_label_values(&[task])
            .set(metrics.executions_completed as i64);
        m.deadline_misses
            .with_label_values(&[task])
            .set(metrics.deadline_misses as i64);
        m.last_execution_us
            .with_label_values(&[task])
            .set(metrics.last_execution_time.as_micros() as i64);
        m.max_execution_us
            .with_label_values(&[task])
            .set(metrics.max_execution_time.as_micros() as i64);
    }

    /// Mirror the memory pool statistics.
    pub fn record_pool_stats(&self, stats: &PoolStats) {
        let m = &self.memory;
        m.utilization.set(stats.utilization);
        m.total_allocated.set(stats.total_allocated as i64);
        m.total_free.set(stats.total_free as i64);
        m.allocations.set(stats.allocation_count as i64);
        m.deallocations.set(stats.deallocation_count as i64);
    }

    /// Render every family in the Prometheus text exposition format.
    pub fn gather_text(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        if encoder.encode(&self.registry.gather(), &mut buf).is_err() {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

struct IpcMetrics {
    depth: IntGaugeVec,
    total_writes: IntGaugeVec,
    healthy: IntGaugeVec,
    total_operations: IntGauge,
    failed_operations: IntGauge,
    timeout_events: IntGauge,
    failure_rate: Gauge,
}

impl IpcMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let depth = IntGaugeVec::new(
            Opts::new("ipc_ring_depth", "Records queued per channel").namespace("alaris"),
            &["channel"],
        )?;
        registry.register(Box::new(depth.clone()))?;

        let total_writes = IntGaugeVec::new(
            Opts::new("ipc_ring_writes_total", "Records published per channel")
                .namespace("alaris"),
            &["channel"],
        )?;
        registry.register(Box::new(total_writes.clone()))?;

        let healthy = IntGaugeVec::new(
            Opts::new("ipc_ring_healthy", "1 when the channel meets its health thresholds")
                .namespace("alaris"),
            &["channel"],
        )?;
        registry.register(Box::new(healthy.clone()))?;

        let total_operations = IntGauge::with_opts(
            Opts::new("ipc_operations_total", "Manager operations attempted").namespace("alaris"),
        )?;
        registry.register(Box::new(total_operations.clone()))?;

        let failed_operations = IntGauge::with_opts(
            Opts::new("ipc_operations_failed", "Manager operations failed").namespace("alaris"),
        )?;
        registry.register(Box::new(failed_operations.clone()))?;

        let timeout_events = IntGauge::with_opts(
            Opts::new("ipc_timeouts_total", "Per-message deadline overruns").namespace("alaris"),
        )?;
        registry.register(Box::new(timeout_events.clone()))?;

        let failure_rate = Gauge::with_opts(
            Opts::new("ipc_failure_rate", "Failed operations / total operations")
                .namespace("alaris"),
        )?;
        registry.register(Box::new(failure_rate.clone()))?;

        Ok(Self {
            depth,
            total_writes,
            healthy,
            total_operations,
            failed_operations,
            timeout_events,
            failure_rate,
        })
    }
}

struct SchedulerMetrics {
    executions: IntGaugeVec,
    deadline_misses: IntGaugeVec,
    last_execution_us: IntGaugeVec,
    max_execution_us: IntGaugeVec,
}

impl SchedulerMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let executions = IntGaugeVec::new(
            Opts::new("sched_executions_total", "Completed executions per task")
                .namespace("alaris"),
            &["task"],
        )?;
        registry.register(Box::new(executions.clone()))?;

        let deadline_misses = IntGaugeVec::new(
            Opts::new("sched_deadline_misses_total", "Deadline misses per task")
                .namespace("alaris"),
            &["task"],
        )?;
        registry.register(Box::new(deadline_misses.clone()))?;

        let last_execution_us = IntGaugeVec::new(
            Opts::new("sched_last_execution_us", "Most recent execution time per task")
                .namespace("alaris"),
            &["task"],
        )?;
        registry.register(Box::new(last_execution_us.clone()))?;

        let max_execution_us = IntGaugeVec::new(
            Opts::new("sched_max_execution_us", "Worst observed execution time per task")
                .namespace("alaris"),
            &["task"],
        )?;
        registry.register(Box::new(max_execution_us.clone()))?;

        Ok(Self {
            executions,
            deadline_misses,
            last_execution_us,
            max_execution_us,
        })
    }
}

struct MemoryMetrics {
    utilization: Gauge,
    total_allocated: IntGauge,
    total_free: IntGauge,
    allocations: IntGauge,
    deallocations: IntGauge,
}

impl MemoryMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let utilization = Gauge::with_opts(
            Opts::new("mem_pool_utilization", "Allocated bytes / mapped bytes")
                .namespace("alaris"),
        )?;
        registry.register(Box::new(utilization.clone()))?;

        let total_allocated = IntGauge::with_opts(
            Opts::new("mem_pool_allocated_bytes", "Bytes currently loaned out")
                .namespace("alaris"),
        )?;
        registry.register(Box::new(total_allocated.clone()))?;

        let total_free = IntGauge::with_opts(
            Opts::new("mem_pool_free_bytes", "Bytes on the free lists").namespace("alaris"),
        )?;
        registry.register(Box::new(total_free.clone()))?;

        let allocations = IntGauge::with_opts(
            Opts::new("mem_pool_allocations_total", "Allocations served").namespace("alaris"),
        )?;
        registry.register(Box::new(allocations.clone()))?;

        let deallocations = IntGauge::with_opts(
            Opts::new("mem_pool_deallocations_total", "Releases accepted").namespace("alaris"),
        )?;
        registry.register(Box::new(deallocations.clone()))?;

        Ok(Self {
            utilization,
            total_allocated,
            total_free,
            allocations,
            deallocations,
        })
    }
}
