//! Alaris Core - Deterministic Runtime for a Low-Latency Market Maker
//!
//! The runtime core of the Alaris market-making process: four tightly
//! coupled subsystems providing time-triggered execution over
//! shared-memory IPC.
//!
//! ## System Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     SUPERVISOR PROCESS                       │
//! │                                                              │
//! │   ┌──────────────┐  drives   ┌────────────────────────────┐  │
//! │   │ TtScheduler  │──────────▶│ scheduled tasks            │  │
//! │   │ (offline     │           │  market data / signals /   │  │
//! │   │  table, one  │           │  control / heartbeat /     │  │
//! │   │  worker)     │           │  performance report        │  │
//! │   └──────────────┘           └─────┬──────────┬───────────┘  │
//! │                                    │          │              │
//! │            scratch via CycleArena  │          │  audit       │
//! │   ┌──────────────┐◀────────────────┘          ▼              │
//! │   │ MemoryPool   │                  ┌────────────────┐       │
//! │   │ (mmap chunks │                  │ EventLogger    │       │
//! │   │  + free      │                  │ (CRC frames,   │       │
//! │   │  lists)      │                  │  append-only)  │       │
//! │   └──────────────┘                  └────────────────┘       │
//! │                                                              │
//! │   ┌──────────────────────────────────────────────────────┐   │
//! │   │ ShmManager: three SPSC rings over named segments     │   │
//! │   │   /dev/shm/alaris_market_data   (4096 x 128 B)       │   │
//! │   │   /dev/shm/alaris_signals       (1024 x 128 B)       │   │
//! │   │   /dev/shm/alaris_control       ( 256 x 128 B)       │   │
//! │   └───────────────────────┬──────────────────────────────┘   │
//! └───────────────────────────┼──────────────────────────────────┘
//!                             │ identical byte images
//!                             ▼
//!                    CONSUMER PROCESS (opens by name, never unlinks)
//! ```
//!
//! ## Design Principles
//!
//! - **No allocation on hot paths** - ring I/O and scheduled ticks touch
//!   pre-mapped memory only.
//! - **Cache-line isolation** - ring indices live on separate cache
//!   lines; records are 128-byte, fixed-layout `Pod` types.
//! - **Static scheduling** - the task table is computed offline once;
//!   the worker replays it with `sleep_until` pacing and no preemption.
//! - **Degrade, don't die** - steady-state faults become counters and
//!   log entries; only setup errors abort the process.
//!
//! ## Core Modules
//!
//! - [`mem`] - segregated-fit [`mem::MemoryPool`] and per-cycle
//!   [`mem::CycleArena`]
//! - [`ipc`] - shared-memory messages, SPSC rings and the
//!   [`ipc::ShmManager`] facade
//! - [`sched`] - offline schedule construction and the time-triggered
//!   worker
//! - [`journal`] - CRC-checked event log and virtual-time replay
//!
//! ## Supporting
//!
//! - [`config`] - TOML configuration with a pure validator
//! - [`engine`] - traits for the external pricing/strategy collaborators
//! - [`monitoring`] - Prometheus mirrors of the internal counters
//! - [`perf`] - CPU pinning and real-time priority
//! - [`utils`] - tracing initialization

pub mod config;
pub mod core;
pub mod engine;
pub mod ipc;
pub mod journal;
pub mod mem;
pub mod monitoring;
pub mod perf;
pub mod sched;
pub mod utils;

pub use config::CoreConfig;
pub use ipc::{ControlKind, ControlMessage, MarketDataMessage, Role, ShmManager, TradingSignalMessage};
pub use journal::{EventKind, EventLogger, ReplayEngine};
pub use mem::{CycleArena, MemoryPool};
pub use sched::{SchedulabilityReport, TaskDefinition, TaskSetBuilder, TaskSpec, TtScheduler};

// Re-export error types
pub use anyhow::{Error, Result};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::CoreConfig;
    pub use crate::ipc::{
        ControlKind, ControlMessage, MarketDataMessage, Role, ShmConfig, ShmManager,
        TradingSignalMessage,
    };
    pub use crate::journal::{EventKind, EventLogger, ReplayEngine};
    pub use crate::mem::{CycleArena, MemoryPool};
    pub use crate::monitoring::MetricsRegistry;
    pub use crate::sched::{
        SchedulabilityReport, TaskDefinition, TaskSetBuilder, TaskSpec, TtScheduler,
    };
    pub use crate::{Error, Result};
}
