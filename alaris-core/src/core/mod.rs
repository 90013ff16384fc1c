//! Core timing primitives shared by the scheduler, IPC layer and journal

pub mod time;

pub use time::{now_ns, ns_since};
