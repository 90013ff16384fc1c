//! Append-only event journal and virtual-time replay
//!
//! The [`logger::EventLogger`] writes typed, CRC-checked frames to an
//! append-only file (binary for replay, text as a diagnostic sink). The
//! [`replay::ReplayEngine`] reads a binary journal back and dispatches
//! each event to a callback, pacing dispatches so inter-event spacing
//! matches the original timeline divided by the chosen speed.

pub mod logger;
pub mod replay;

pub use logger::{EventHeader, EventKind, EventLogger, BINARY_LOG_MAGIC};
pub use replay::{ReplayCallback, ReplayEngine};
