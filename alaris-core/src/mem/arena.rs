//! Per-cycle bump allocator backed by pool arena chunks
//!
//! A `CycleArena` borrows whole chunks from its parent [`MemoryPool`] and
//! serves monotonically increasing bump allocations out of them. At the
//! end of a scheduling cycle [`CycleArena::reset`] hands every chunk back
//! in one step, invalidating all pointers produced during the cycle.
//!
//! Not thread-safe: each scheduled task that needs scratch space owns its
//! own instance.

use super::pool::MemoryPool;
use std::ptr::NonNull;
use tracing::error;

/// Default arena chunk size (4 MiB).
const DEFAULT_ARENA_SIZE: usize = 4 * 1024 * 1024;

/// Smallest arena ever requested from the pool.
const MIN_ARENA_SIZE: usize = 4096;

/// Fallback alignment when the caller passes a non-power-of-two.
const DEFAULT_ALIGNMENT: usize = 16;

/// Bump allocator over pool-owned arena chunks, reclaimed wholesale.
pub struct CycleArena<'p> {
    pool: &'p MemoryPool,
    /// Base of the arena currently being bumped, null when none.
    current: *mut u8,
    current_size: usize,
    current_used: usize,
    /// Every arena acquired this cycle, for wholesale release on reset.
    arenas: Vec<NonNull<u8>>,
    default_arena_size: usize,
    allocations_this_cycle: usize,
    bytes_allocated_this_cycle: usize,
}

#[inline]
fn padding_for(ptr: *const u8, alignment: usize) -> usize {
    let addr = ptr as usize;
    let rem = addr % alignment;
    if rem == 0 {
        0
    } else {
        alignment - rem
    }
}

impl<'p> CycleArena<'p> {
    /// Create an arena allocator with the default 4 MiB arena size.
    pub fn new(pool: &'p MemoryPool) -> Self {
        Self::with_arena_size(pool, DEFAULT_ARENA_SIZE)
    }

    /// Create an arena allocator with an explicit default arena size
    /// (floored at 4 KiB).
    pub fn with_arena_size(pool: &'p MemoryPool, default_arena_size: usize) -> Self {
        Self {
            pool,
            current: std::ptr::null_mut(),
            current_size: 0,
            current_used: 0,
            arenas: Vec::new(),
            default_arena_size: default_arena_size.max(MIN_ARENA_SIZE),
            allocations_this_cycle: 0,
            bytes_allocated_this_cycle: 0,
        }
    }

    /// Bump-allocate `size` bytes aligned to `alignment`.
    ///
    /// Acquires a fresh arena of `max(size + alignment - 1, default)` when
    /// the current one cannot fit the request. Returns `None` only when
    /// the parent pool cannot map a new arena.
    pub fn allocate(&mut self, size: usize, alignment: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        let alignment = if alignment.is_power_of_two() {
            alignment
        } else {
            DEFAULT_ALIGNMENT
        };

        let mut free_ptr = if self.current.is_null() {
            std::ptr::null_mut()
        } else {
            // SAFETY: current_used <= current_size by construction.
            unsafe { self.current.add(self.current_used) }
        };
        let mut padding = if free_ptr.is_null() {
            0
        } else {
            padding_for(free_ptr, alignment)
        };

        if self.current.is_null() || padding + size > self.current_size - self.current_used {
            let min_needed = size.checked_add(alignment - 1)?;
            if !self.acquire_arena(min_needed) {
                return None;
            }
            free_ptr = self.current;
            padding = padding_for(free_ptr, alignment);
            if padding + size > self.current_size {
                error!(
                    size,
                    arena_size = self.current_size,
                    "cycle arena: fresh arena too small for aligned request"
                );
                return None;
            }
        }

        // SAFETY: padding + size fits in the remaining span of the
        // current arena, checked above.
        let aligned = unsafe { free_ptr.add(padding) };
        self.current_used += padding + size;
        self.allocations_this_cycle += 1;
        self.bytes_allocated_this_cycle += size;
        NonNull::new(aligned)
    }

    /// Whether the current arena can satisfy `size` at `alignment`
    /// without acquiring a new one.
    pub fn has_space_for(&self, size: usize, alignment: usize) -> bool {
        if self.current.is_null() {
            return false;
        }
        // SAFETY: current_used <= current_size.
        let free_ptr = unsafe { self.current.add(self.current_used) };
        let padding = padding_for(free_ptr, alignment.max(1));
        padding + size <= self.current_size - self.current_used
    }

    /// Return every arena acquired this cycle to the pool.
    ///
    /// All pointers handed out since the last reset become invalid.
    pub fn reset(&mut self) {
        for arena in self.arenas.drain(..) {
            self.pool.release_arena(arena);
        }
        self.current = std::ptr::null_mut();
        self.current_size = 0;
        self.current_used = 0;
        self.allocations_this_cycle = 0;
        self.bytes_allocated_this_cycle = 0;
    }

    pub fn allocations_this_cycle(&self) -> usize {
        self.allocations_this_cycle
    }

    pub fn bytes_allocated_this_cycle(&self) -> usize {
        self.bytes_allocated_this_cycle
    }

    /// Number of arenas currently held from the pool.
    pub fn arenas_in_use(&self) -> usize {
        self.arenas.len()
    }

    fn acquire_arena(&mut self, min_size: usize) -> bool {
        let request = min_size.max(self.default_arena_size);
        let Some(base) = self.pool.allocate_arena(request) else {
            error!(request, "cycle arena: parent pool refused arena request");
            return false;
        };
        self.arenas.push(base);
        self.current = base.as_ptr();
        self.current_size = request;
        self.current_used = 0;
        true
    }
}

impl Drop for CycleArena<'_> {
    fn drop(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_allocations_are_aligned_and_disjoint() {
        let pool = MemoryPool::with_initial_size(0);
        let mut arena = CycleArena::new(&pool);

        let mut last_end = 0usize;
        for _ in 0..50 {
            let p = arena.allocate(100, 64).expect("bump allocation");
            let addr = p.as_ptr() as usize;
            assert_eq!(addr % 64, 0);
            assert!(addr >= last_end, "bump pointer went backwards");
            last_end = addr + 100;
        }
        assert_eq!(arena.allocations_this_cycle(), 50);
        assert_eq!(arena.bytes_allocated_this_cycle(), 5000);
        assert_eq!(arena.arenas_in_use(), 1);
    }

    #[test]
    fn test_reset_returns_all_arenas() {
        let pool = MemoryPool::with_initial_size(0);
        let mut arena = CycleArena::with_arena_size(&pool, 4096);

        for _ in 0..10 {
            arena.allocate(1024, 16).unwrap();
        }
        assert!(arena.arenas_in_use() >= 1);

        arena.reset();
        assert_eq!(arena.arenas_in_use(), 0);
        assert_eq!(arena.allocations_this_cycle(), 0);
        assert_eq!(arena.bytes_allocated_this_cycle(), 0);
        assert_eq!(pool.total_allocated(), 0);

        // The next allocation re-acquires exactly one arena.
        let allocs_before = pool.allocation_count();
        arena.allocate(64, 16).unwrap();
        assert_eq!(arena.arenas_in_use(), 1);
        assert_eq!(pool.allocation_count(), allocs_before + 1);
    }

    #[test]
    fn test_oversized_request_gets_dedicated_arena() {
        let pool = MemoryPool::with_initial_size(0);
        let mut arena = CycleArena::with_arena_size(&pool, 4096);

        arena.allocate(64, 16).unwrap();
        assert_eq!(arena.arenas_in_use(), 1);

        // Larger than the default arena: a new arena sized to the request
        // is acquired.
        let p = arena.allocate(64 * 1024, 64).expect("oversized bump");
        assert_eq!(p.as_ptr() as usize % 64, 0);
        assert_eq!(arena.arenas_in_use(), 2);
    }

    #[test]
    fn test_has_space_for() {
        let pool = MemoryPool::with_initial_size(0);
        let mut arena = CycleArena::with_arena_size(&pool, 4096);

        assert!(!arena.has_space_for(1, 1));
        arena.allocate(64, 16).unwrap();
        assert!(arena.has_space_for(1024, 16));
        assert!(!arena.has_space_for(64 * 1024, 16));
    }

    #[test]
    fn test_zero_size_allocation_fails() {
        let pool = MemoryPool::with_initial_size(0);
        let mut arena = CycleArena::new(&pool);
        assert!(arena.allocate(0, 16).is_none());
        assert_eq!(arena.allocations_this_cycle(), 0);
    }

    #[test]
    fn test_drop_releases_arenas() {
        let pool = MemoryPool::with_initial_size(0);
        {
            let mut arena = CycleArena::with_arena_size(&pool, 4096);
            arena.allocate(128, 16).unwrap();
            assert!(pool.total_allocated() > 0);
        }
        assert_eq!(pool.total_allocated(), 0);
    }
}
