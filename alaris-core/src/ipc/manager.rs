//! Three-channel shared-memory facade
//!
//! `ShmManager` binds the market-data, trading-signal and control
//! channels to their stable segment names and layers role enforcement,
//! record validation, per-operation deadlines and aggregate health
//! tracking on top of the raw rings.
//!
//! The producer process creates all three segments; the consumer opens
//! them. Publishing from the consumer side (or vice versa) is a user
//! error: it returns `false` and increments the failure counter without
//! touching the rings.

use super::messages::{ControlMessage, MarketDataMessage, TradingSignalMessage};
use super::ring::{Consumer, Producer, RingMetrics};
use super::{
    CONTROL_CAPACITY, CONTROL_SEGMENT, MARKET_DATA_CAPACITY, MARKET_DATA_SEGMENT,
    SIGNAL_CAPACITY, SIGNAL_SEGMENT,
};
use anyhow::{Context, Result};
use bytemuck::Pod;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Which side of the shared-memory channels this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Producer,
    Consumer,
}

/// Tunables for the manager's bounded-time guarantees.
#[derive(Debug, Clone)]
pub struct ShmConfig {
    /// Per-message deadline; operations entered later than this are
    /// counted as timeouts and abandoned before touching the ring.
    pub operation_timeout: Duration,
    /// Upper bound applied to every batch consume.
    pub max_batch_size: usize,
    /// Segment names (tests substitute throwaway names).
    pub market_data_name: String,
    pub signal_name: String,
    pub control_name: String,
}

impl Default for ShmConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_micros(100),
            max_batch_size: 32,
            market_data_name: MARKET_DATA_SEGMENT.to_string(),
            signal_name: SIGNAL_SEGMENT.to_string(),
            control_name: CONTROL_SEGMENT.to_string(),
        }
    }
}

/// One channel endpoint; the variant fixes which index this process may
/// advance.
enum Endpoint<T: Pod, const N: usize> {
    Producer(Producer<T, N>),
    Consumer(Consumer<T, N>),
}

impl<T: Pod, const N: usize> Endpoint<T, N> {
    fn attach(role: Role, name: &str) -> Result<Self> {
        Ok(match role {
            Role::Producer => Endpoint::Producer(Producer::create(name)?),
            Role::Consumer => Endpoint::Consumer(Consumer::open(name)?),
        })
    }

    fn is_producer(&self) -> bool {
        matches!(self, Endpoint::Producer(_))
    }

    fn is_consumer(&self) -> bool {
        matches!(self, Endpoint::Consumer(_))
    }

    fn len(&self) -> usize {
        match self {
            Endpoint::Producer(p) => p.len(),
            Endpoint::Consumer(c) => c.len(),
        }
    }

    fn utilization(&self) -> f64 {
        match self {
            Endpoint::Producer(p) => p.utilization(),
            Endpoint::Consumer(c) => c.utilization(),
        }
    }

    fn metrics(&self) -> RingMetrics {
        match self {
            Endpoint::Producer(p) => p.metrics(),
            Endpoint::Consumer(c) => c.metrics(),
        }
    }

    fn is_healthy(&self) -> bool {
        match self {
            Endpoint::Producer(p) => p.is_healthy(),
            Endpoint::Consumer(c) => c.is_healthy(),
        }
    }

    fn reset_metrics(&mut self) {
        match self {
            Endpoint::Producer(p) => p.reset_metrics(),
            Endpoint::Consumer(c) => c.reset_metrics(),
        }
    }

    fn write(&mut self, item: &T) -> bool {
        match self {
            Endpoint::Producer(p) => p.try_write(item),
            Endpoint::Consumer(_) => false,
        }
    }

    fn read(&mut self) -> Option<T> {
        match self {
            Endpoint::Consumer(c) => c.try_read(),
            Endpoint::Producer(_) => None,
        }
    }

    fn read_batch(&mut self, out: &mut [T]) -> usize {
        match self {
            Endpoint::Consumer(c) => c.try_read_batch(out),
            Endpoint::Producer(_) => 0,
        }
    }
}

/// Aggregate status across the three channels.
#[derive(Debug, Clone)]
pub struct ShmStatus {
    pub market_data_depth: usize,
    pub signal_depth: usize,
    pub control_depth: usize,
    pub market_data_utilization: f64,
    pub signal_utilization: f64,
    pub control_utilization: f64,
    pub market_data_total_writes: u64,
    pub signal_total_writes: u64,
    pub control_total_writes: u64,
    pub total_operations: u64,
    pub failed_operations: u64,
    pub timeout_events: u64,
    pub failure_rate: f64,
    pub market_data_healthy: bool,
    pub signal_healthy: bool,
    pub control_healthy: bool,
    pub healthy: bool,
}

/// Deterministic shared-memory manager for the three Alaris channels.
pub struct ShmManager {
    role: Role,
    process_id: u32,
    config: ShmConfig,
    market_data: Endpoint<MarketDataMessage, MARKET_DATA_CAPACITY>,
    signals: Endpoint<TradingSignalMessage, SIGNAL_CAPACITY>,
    control: Endpoint<ControlMessage, CONTROL_CAPACITY>,
    total_operations: AtomicU64,
    failed_operations: AtomicU64,
    timeout_events: AtomicU64,
}

impl ShmManager {
    /// Attach all three channels in the given role.
    ///
    /// Any channel failing to create/open is a setup error; no partial
    /// manager is retained.
    pub fn new(role: Role, config: ShmConfig) -> Result<Self> {
        let market_data = Endpoint::attach(role, &config.market_data_name)
            .context("market data channel initialization failed")?;
        let signals = Endpoint::attach(role, &config.signal_name)
            .context("signal channel initialization failed")?;
        let control = Endpoint::attach(role, &config.control_name)
            .context("control channel initialization failed")?;
        debug!(?role, "shared memory manager attached to all channels");
        Ok(Self {
            role,
            process_id: std::process::id(),
            config,
            market_data,
            signals,
            control,
            total_operations: AtomicU64::new(0),
            failed_operations: AtomicU64::new(0),
            timeout_events: AtomicU64::new(0),
        })
    }

    /// Attach with default names and tunables.
    pub fn with_role(role: Role) -> Result<Self> {
        Self::new(role, ShmConfig::default())
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    #[inline(always)]
    fn record_outcome(&self, success: bool) -> bool {
        self.total_operations.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed_operations.fetch_add(1, Ordering::Relaxed);
        }
        success
    }

    #[inline(always)]
    fn deadline_exceeded(&self, entered: Instant) -> bool {
        if entered.elapsed() > self.config.operation_timeout {
            self.timeout_events.fetch_add(1, Ordering::Relaxed);
            return true;
        }
        false
    }

    /// Publish one market-data record. Producer side only; the record
    /// must pass its validity predicate.
    pub fn publish_market_data(&mut self, data: &MarketDataMessage) -> bool {
        let entered = Instant::now();
        if !self.market_data.is_producer()
            || !data.is_valid()
            || self.deadline_exceeded(entered)
        {
            return self.record_outcome(false);
        }
        let ok = self.market_data.write(data);
        self.record_outcome(ok)
    }

    /// Consume one market-data record. Consumer side only; invalid
    /// records are discarded and reported as failures.
    pub fn consume_market_data(&mut self) -> Option<MarketDataMessage> {
        let entered = Instant::now();
        if !self.market_data.is_consumer() || self.deadline_exceeded(entered) {
            self.record_outcome(false);
            return None;
        }
        let result = self.market_data.read().filter(|msg| msg.is_valid());
        self.record_outcome(result.is_some());
        result
    }

    /// Batch-consume market data into `out`, bounded by the configured
    /// batch cap. Valid records are compacted to the front; processing
    /// stops at the first invalid record. Returns the valid count.
    pub fn consume_market_data_batch(&mut self, out: &mut [MarketDataMessage]) -> usize {
        let entered = Instant::now();
        if !self.market_data.is_consumer() || self.deadline_exceeded(entered) {
            self.record_outcome(false);
            return 0;
        }
        let cap = out.len().min(self.config.max_batch_size);
        let consumed = self.market_data.read_batch(&mut out[..cap]);

        let mut valid = 0usize;
        for i in 0..consumed {
            if out[i].is_valid() {
                if i != valid {
                    out[valid] = out[i];
                }
                valid += 1;
            } else {
                warn!(index = i, "dropping invalid market data record in batch");
                break;
            }
        }
        self.record_outcome(valid > 0);
        valid
    }

    /// Publish one trading signal. Expired signals are refused outright.
    pub fn publish_signal(&mut self, signal: &TradingSignalMessage) -> bool {
        let entered = Instant::now();
        if !self.signals.is_producer()
            || !signal.is_valid()
            || signal.is_expired()
            || self.deadline_exceeded(entered)
        {
            return self.record_outcome(false);
        }
        let ok = self.signals.write(signal);
        self.record_outcome(ok)
    }

    /// Consume one trading signal, skipping records that are invalid or
    /// already expired.
    pub fn consume_signal(&mut self) -> Option<TradingSignalMessage> {
        let entered = Instant::now();
        if !self.signals.is_consumer() || self.deadline_exceeded(entered) {
            self.record_outcome(false);
            return None;
        }
        let result = self
            .signals
            .read()
            .filter(|sig| sig.is_valid() && !sig.is_expired());
        self.record_outcome(result.is_some());
        result
    }

    /// Batch-consume signals with expiry filtering; same compaction
    /// contract as [`ShmManager::consume_market_data_batch`].
    pub fn consume_signal_batch(&mut self, out: &mut [TradingSignalMessage]) -> usize {
        let entered = Instant::now();
        if !self.signals.is_consumer() || self.deadline_exceeded(entered) {
            self.record_outcome(false);
            return 0;
        }
        let cap = out.len().min(self.config.max_batch_size);
        let consumed = self.signals.read_batch(&mut out[..cap]);

        let mut valid = 0usize;
        for i in 0..consumed {
            if out[i].is_valid() && !out[i].is_expired() {
                if i != valid {
                    out[valid] = out[i];
                }
                valid += 1;
            } else {
                warn!(index = i, "dropping invalid or expired signal in batch");
                break;
            }
        }
        self.record_outcome(valid > 0);
        valid
    }

    /// Publish one control message.
    pub fn publish_control(&mut self, control: &ControlMessage) -> bool {
        let entered = Instant::now();
        if !self.control.is_producer()
            || !control.is_valid()
            || self.deadline_exceeded(entered)
        {
            return self.record_outcome(false);
        }
        let ok = self.control.write(control);
        self.record_outcome(ok)
    }

    /// Consume one control message.
    pub fn consume_control(&mut self) -> Option<ControlMessage> {
        let entered = Instant::now();
        if !self.control.is_consumer() || self.deadline_exceeded(entered) {
            self.record_outcome(false);
            return None;
        }
        let result = self.control.read().filter(|msg| msg.is_valid());
        self.record_outcome(result.is_some());
        result
    }

    pub fn total_operations(&self) -> u64 {
        self.total_operations.load(Ordering::Relaxed)
    }

    pub fn failed_operations(&self) -> u64 {
        self.failed_operations.load(Ordering::Relaxed)
    }

    pub fn timeout_events(&self) -> u64 {
        self.timeout_events.load(Ordering::Relaxed)
    }

    /// All three channels within their health thresholds.
    pub fn is_healthy(&self) -> bool {
        self.market_data.is_healthy() && self.signals.is_healthy() && self.control.is_healthy()
    }

    /// Aggregate status snapshot for monitoring.
    pub fn status(&self) -> ShmStatus {
        let md = self.market_data.metrics();
        let sig = self.signals.metrics();
        let ctl = self.control.metrics();
        let total = self.total_operations();
        let failed = self.failed_operations();

        ShmStatus {
            market_data_depth: self.market_data.len(),
            signal_depth: self.signals.len(),
            control_depth: self.control.len(),
            market_data_utilization: self.market_data.utilization(),
            signal_utilization: self.signals.utilization(),
            control_utilization: self.control.utilization(),
            market_data_total_writes: md.total_writes,
            signal_total_writes: sig.total_writes,
            control_total_writes: ctl.total_writes,
            total_operations: total,
            failed_operations: failed,
            timeout_events: self.timeout_events(),
            failure_rate: if total > 0 {
                failed as f64 / total as f64
            } else {
                0.0
            },
            market_data_healthy: self.market_data.is_healthy(),
            signal_healthy: self.signals.is_healthy(),
            control_healthy: self.control.is_healthy(),
            healthy: self.is_healthy(),
        }
    }

    /// Reset per-buffer and per-manager counters.
    pub fn reset_metrics(&mut self) {
        self.market_data.reset_metrics();
        self.signals.reset_metrics();
        self.control.reset_metrics();
        self.total_operations.store(0, Ordering::Relaxed);
        self.failed_operations.store(0, Ordering::Relaxed);
        self.timeout_events.store(0, Ordering::Relaxed);
    }
}
