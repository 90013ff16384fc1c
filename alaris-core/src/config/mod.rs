//! Configuration loading and validation

pub mod types;

pub use types::{
    CoreConfig, IpcConfig, JournalConfig, MemoryConfig, MetricsConfig, ProcessConfig,
    SchedulerConfig,
};

use anyhow::{bail, Context, Result};
use config::{Config as ConfigLoader, Environment, File};
use std::path::Path;

impl CoreConfig {
    /// Load configuration from a TOML file with `ALARIS_`-prefixed
    /// environment variable overrides (`ALARIS_PROCESS__ROLE=consumer`).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let loaded = ConfigLoader::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("ALARIS").separator("__"))
            .build()
            .context("failed to build configuration")?;

        let cfg: CoreConfig = loaded
            .try_deserialize()
            .context("failed to deserialize configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from the conventional location.
    pub fn load_default() -> Result<Self> {
        Self::load("config/default.toml")
    }

    /// Pure validation over the record; no I/O, no mutation.
    pub fn validate(&self) -> Result<()> {
        if self.process.role != "producer" && self.process.role != "consumer" {
            bail!(
                "process.role must be 'producer' or 'consumer', got '{}'",
                self.process.role
            );
        }
        if self.scheduler.basic_time_unit_us == 0 {
            bail!("scheduler.basic_time_unit_us must be positive");
        }
        let btu_ns = self.scheduler.basic_time_unit_us as u128 * 1000;
        for (name, period_ms) in [
            ("market_data_period_ms", self.scheduler.market_data_period_ms),
            ("signal_period_ms", self.scheduler.signal_period_ms),
            ("control_period_ms", self.scheduler.control_period_ms),
            ("heartbeat_period_ms", self.scheduler.heartbeat_period_ms),
            ("report_period_ms", self.scheduler.report_period_ms),
        ] {
            if period_ms == 0 {
                bail!("scheduler.{name} must be positive");
            }
            if (period_ms as u128 * 1_000_000) % btu_ns != 0 {
                bail!("scheduler.{name} must be a multiple of the basic time unit");
            }
        }
        for (name, value) in [
            ("market_data_name", &self.ipc.market_data_name),
            ("signal_name", &self.ipc.signal_name),
            ("control_name", &self.ipc.control_name),
        ] {
            if value.is_empty() {
                bail!("ipc.{name} must not be empty");
            }
            if value.contains('/') {
                bail!("ipc.{name} must be a bare segment name, not a path");
            }
        }
        if self.ipc.operation_timeout_us == 0 {
            bail!("ipc.operation_timeout_us must be positive");
        }
        if self.ipc.max_batch_size == 0 {
            bail!("ipc.max_batch_size must be positive");
        }
        if self.memory.initial_pool_bytes == 0 {
            bail!("memory.initial_pool_bytes must be positive");
        }
        if self.memory.default_arena_bytes == 0 {
            bail!("memory.default_arena_bytes must be positive");
        }
        Ok(())
    }
}
