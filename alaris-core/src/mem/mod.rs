//! Bounded-latency memory management
//!
//! Two allocators cooperate here:
//!
//! - [`MemoryPool`] - segregated-fit pool over page-aligned anonymous
//!   mappings. Serves aligned raw allocations from per-size-class free
//!   lists without touching the system allocator on the hot path.
//! - [`CycleArena`] - bump-pointer allocator that borrows whole chunks
//!   from the pool and returns them wholesale at the end of a cycle.
//!
//! The pool is mutex-protected and shared; the arena is single-owner and
//! lives inside one scheduled task.

pub mod arena;
pub mod pool;

pub use arena::CycleArena;
pub use pool::{MemoryPool, PoolStats};
