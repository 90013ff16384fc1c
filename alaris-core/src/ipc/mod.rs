//! Shared-memory inter-process communication
//!
//! Fixed-layout 128-byte records move between the producer and consumer
//! processes through named, memory-mapped SPSC ring buffers:
//!
//! - [`messages`] - the three wire record types and their validity
//!   predicates.
//! - [`segment`] - named shared-memory regions with owner/opener
//!   lifecycle.
//! - [`ring`] - the lock-free ring buffer plus its [`ring::Producer`] /
//!   [`ring::Consumer`] role split.
//! - [`manager`] - the three-channel [`manager::ShmManager`] facade with
//!   validation, deadlines and health tracking.

pub mod manager;
pub mod messages;
pub mod ring;
pub mod segment;

pub use manager::{Role, ShmConfig, ShmManager, ShmStatus};
pub use messages::{ControlKind, ControlMessage, MarketDataMessage, TradingSignalMessage};
pub use ring::{Consumer, Producer, RingMetrics};
pub use segment::SharedSegment;

/// Capacity of the market-data channel, in records.
pub const MARKET_DATA_CAPACITY: usize = 4096;

/// Capacity of the trading-signal channel, in records.
pub const SIGNAL_CAPACITY: usize = 1024;

/// Capacity of the control channel, in records.
pub const CONTROL_CAPACITY: usize = 256;

/// Stable segment name of the market-data channel.
pub const MARKET_DATA_SEGMENT: &str = "alaris_market_data";

/// Stable segment name of the trading-signal channel.
pub const SIGNAL_SEGMENT: &str = "alaris_signals";

/// Stable segment name of the control channel.
pub const CONTROL_SEGMENT: &str = "alaris_control";
