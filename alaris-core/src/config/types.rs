//! Plain-data configuration records
//!
//! Everything the supervisor needs at start-up, deserialized from TOML
//! with environment overrides. Validation is a pure function over the
//! record; see [`CoreConfig::validate`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for one Alaris process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub process: ProcessConfig,
    pub scheduler: SchedulerConfig,
    pub ipc: IpcConfig,
    pub journal: JournalConfig,
    pub memory: MemoryConfig,
    pub metrics: MetricsConfig,
}

/// Process identity and host tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Shared-memory role: "producer" or "consumer".
    pub role: String,

    /// Whether trading starts enabled.
    #[serde(default)]
    pub start_trading_enabled: bool,

    /// CPU core to pin the scheduler worker to.
    #[serde(default)]
    pub cpu_core: Option<usize>,

    /// Request SCHED_FIFO real-time priority (needs privileges).
    #[serde(default)]
    pub realtime: bool,
}

/// Task timing layout, all in microseconds / milliseconds as named.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Basic time unit in microseconds.
    #[serde(default = "default_btu_us")]
    pub basic_time_unit_us: u64,

    #[serde(default = "default_market_data_period_ms")]
    pub market_data_period_ms: u64,

    #[serde(default = "default_signal_period_ms")]
    pub signal_period_ms: u64,

    #[serde(default = "default_control_period_ms")]
    pub control_period_ms: u64,

    #[serde(default = "default_heartbeat_period_ms")]
    pub heartbeat_period_ms: u64,

    #[serde(default = "default_report_period_ms")]
    pub report_period_ms: u64,
}

/// Shared-memory channel naming and bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcConfig {
    #[serde(default = "default_market_data_name")]
    pub market_data_name: String,

    #[serde(default = "default_signal_name")]
    pub signal_name: String,

    #[serde(default = "default_control_name")]
    pub control_name: String,

    /// Per-operation deadline in microseconds.
    #[serde(default = "default_operation_timeout_us")]
    pub operation_timeout_us: u64,

    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

/// Event journal location and variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    #[serde(default = "default_journal_path")]
    pub path: PathBuf,

    /// Binary (replayable) or text (diagnostic sink).
    #[serde(default = "default_journal_binary")]
    pub binary: bool,
}

/// Memory pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_pool_bytes")]
    pub initial_pool_bytes: usize,

    #[serde(default = "default_arena_bytes")]
    pub default_arena_bytes: usize,
}

/// Logging knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub json_logs: bool,
}

fn default_btu_us() -> u64 {
    1000
}
fn default_market_data_period_ms() -> u64 {
    10
}
fn default_signal_period_ms() -> u64 {
    100
}
fn default_control_period_ms() -> u64 {
    50
}
fn default_heartbeat_period_ms() -> u64 {
    1000
}
fn default_report_period_ms() -> u64 {
    10_000
}
fn default_market_data_name() -> String {
    crate::ipc::MARKET_DATA_SEGMENT.to_string()
}
fn default_signal_name() -> String {
    crate::ipc::SIGNAL_SEGMENT.to_string()
}
fn default_control_name() -> String {
    crate::ipc::CONTROL_SEGMENT.to_string()
}
fn default_operation_timeout_us() -> u64 {
    100
}
fn default_max_batch_size() -> usize {
    32
}
fn default_journal_path() -> PathBuf {
    PathBuf::from("data/alaris_events.bin")
}
fn default_journal_binary() -> bool {
    true
}
fn default_pool_bytes() -> usize {
    64 * 1024 * 1024
}
fn default_arena_bytes() -> usize {
    4 * 1024 * 1024
}
fn default_log_level() -> String {
    "info".to_string()
}

impl SchedulerConfig {
    pub fn basic_time_unit(&self) -> Duration {
        Duration::from_micros(self.basic_time_unit_us)
    }
}

impl IpcConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_micros(self.operation_timeout_us)
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            process: ProcessConfig {
                role: "producer".to_string(),
                start_trading_enabled: false,
                cpu_core: None,
                realtime: false,
            },
            scheduler: SchedulerConfig {
                basic_time_unit_us: default_btu_us(),
                market_data_period_ms: default_market_data_period_ms(),
                signal_period_ms: default_signal_period_ms(),
                control_period_ms: default_control_period_ms(),
                heartbeat_period_ms: default_heartbeat_period_ms(),
                report_period_ms: default_report_period_ms(),
            },
            ipc: IpcConfig {
                market_data_name: default_market_data_name(),
                signal_name: default_signal_name(),
                control_name: default_control_name(),
                operation_timeout_us: default_operation_timeout_us(),
                max_batch_size: default_max_batch_size(),
            },
            journal: JournalConfig {
                path: default_journal_path(),
                binary: default_journal_binary(),
            },
            memory: MemoryConfig {
                initial_pool_bytes: default_pool_bytes(),
                default_arena_bytes: default_arena_bytes(),
            },
            metrics: MetricsConfig {
                log_level: default_log_level(),
                json_logs: false,
            },
        }
    }
}
