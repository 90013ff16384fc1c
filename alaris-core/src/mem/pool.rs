//! Segregated-fit memory pool over anonymous mappings
//!
//! The pool carves page-aligned OS chunks into blocks fronted by an
//! in-place header. Free blocks are threaded through per-size-class
//! singly-linked lists; size classes double from 64 B up to 2 MiB, with
//! the last class acting as a catch-all. Chunks are only returned to the
//! OS at teardown or when an arena chunk is released.
//!
//! Allocation and release run under a single mutex. Statistics counters
//! are advisory and use relaxed atomics.

use memmap2::MmapMut;
use parking_lot::Mutex;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

/// Number of size classes (64 B .. 2 MiB, doubling).
const NUM_SIZE_CLASSES: usize = 16;

/// Minimum allocation granularity and default alignment.
const MIN_ALLOCATION: usize = 64;

/// Default size of a chunk requested from the OS.
const DEFAULT_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Default initial reservation for `MemoryPool::new`.
const DEFAULT_INITIAL_SIZE: usize = 64 * 1024 * 1024;

/// Validation magic stamped into every block header.
const BLOCK_MAGIC: u32 = 0xDEAD_BEEF;

/// In-place header preceding every block's data area.
///
/// Headers live inside mapped chunks and tile each chunk without gaps,
/// which is what makes the sequential walk in `release` sound. Split
/// offsets are kept multiples of 64 so every header stays 8-byte aligned.
#[repr(C)]
struct BlockHeader {
    /// Size of the usable data area that follows this header.
    size: usize,
    /// Size class this block is currently filed under.
    size_class: usize,
    /// Whether the block is on a free list.
    is_free: bool,
    /// Next block in the free list, null when allocated or last.
    next_free: *mut BlockHeader,
    /// Must equal `BLOCK_MAGIC`; traversal stops on mismatch.
    magic: u32,
}

const HEADER_SIZE: usize = std::mem::size_of::<BlockHeader>();

impl BlockHeader {
    #[inline]
    fn is_valid(&self) -> bool {
        self.magic == BLOCK_MAGIC
    }

    /// Pointer to the usable data area, immediately after the header.
    #[inline]
    fn data(header: *mut BlockHeader) -> *mut u8 {
        // SAFETY: the caller guarantees `header` points into a live chunk
        // with at least HEADER_SIZE + size bytes behind it.
        unsafe { (header as *mut u8).add(HEADER_SIZE) }
    }
}

/// A page-aligned anonymous mapping owned by the pool.
struct Chunk {
    map: MmapMut,
    /// Bytes of the mapping managed by block headers (or the whole chunk
    /// for arena chunks).
    used: usize,
    /// Arena chunks bypass the free lists entirely.
    is_arena: bool,
}

impl Chunk {
    fn new(len: usize, is_arena: bool) -> Option<Self> {
        match MmapMut::map_anon(len) {
            Ok(map) => Some(Self {
                map,
                used: 0,
                is_arena,
            }),
            Err(e) => {
                warn!(len, error = %e, "memory pool: anonymous mapping failed");
                None
            }
        }
    }

    #[inline]
    fn base(&self) -> *mut u8 {
        self.map.as_ptr() as *mut u8
    }

    #[inline]
    fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    fn contains(&self, ptr: *const u8) -> bool {
        let base = self.map.as_ptr();
        // SAFETY: base..base+len is the mapped range of this chunk.
        ptr >= base && ptr < unsafe { base.add(self.len()) }
    }
}

/// Pool state mutated under the mutex.
struct PoolInner {
    chunks: Vec<Chunk>,
    free_lists: [*mut BlockHeader; NUM_SIZE_CLASSES],
    default_chunk_size: usize,
    total_allocated: usize,
    total_free: usize,
}

// SAFETY: the raw pointers in `free_lists` (and the headers they reach)
// point exclusively into the chunks owned by this same PoolInner. Chunk
// mappings never move (Vec reallocation moves the Chunk structs, not the
// mapped pages), so transferring the whole PoolInner between threads is
// sound. All mutation happens under the pool mutex.
unsafe impl Send for PoolInner {}

/// Snapshot of pool statistics.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    pub total_allocated: usize,
    pub total_free: usize,
    pub utilization: f64,
    pub allocation_count: usize,
    pub deallocation_count: usize,
}

/// Segregated-fit memory pool with bounded-latency allocation.
///
/// All public operations lock a single mutex; none of them perform I/O or
/// call into the system allocator except when a new chunk must be mapped.
pub struct MemoryPool {
    inner: Mutex<PoolInner>,
    allocation_count: AtomicUsize,
    deallocation_count: AtomicUsize,
}

fn page_size() -> usize {
    // SAFETY: sysconf is always safe to call.
    let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if raw > 0 {
        raw as usize
    } else {
        4096
    }
}

#[inline]
fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

/// Smallest size class whose nominal block size can hold `size` bytes.
fn size_class_for(size: usize) -> usize {
    if size <= MIN_ALLOCATION {
        return 0;
    }
    let mut class_size = MIN_ALLOCATION;
    for sc in 0..NUM_SIZE_CLASSES - 1 {
        if size <= class_size {
            return sc;
        }
        class_size *= 2;
    }
    NUM_SIZE_CLASSES - 1
}

/// Nominal data size served by a size class.
fn class_size(size_class: usize) -> usize {
    MIN_ALLOCATION << size_class.min(NUM_SIZE_CLASSES - 1)
}

impl MemoryPool {
    /// Create a pool with the default 64 MiB initial reservation.
    pub fn new() -> Self {
        Self::with_initial_size(DEFAULT_INITIAL_SIZE)
    }

    /// Create a pool with an explicit initial reservation.
    ///
    /// Passing 0 defers all mapping to the first allocation.
    pub fn with_initial_size(initial_size_bytes: usize) -> Self {
        let mut inner = PoolInner {
            chunks: Vec::new(),
            free_lists: [ptr::null_mut(); NUM_SIZE_CLASSES],
            default_chunk_size: DEFAULT_CHUNK_SIZE,
            total_allocated: 0,
            total_free: 0,
        };
        if initial_size_bytes > 0 {
            inner.add_chunk(initial_size_bytes);
        }
        Self {
            inner: Mutex::new(inner),
            allocation_count: AtomicUsize::new(0),
            deallocation_count: AtomicUsize::new(0),
        }
    }

    /// Allocate `size` bytes aligned to `alignment`.
    ///
    /// `alignment` must be a power of two; anything else falls back to the
    /// 64 B minimum granularity. Returns `None` when no free block fits
    /// and a new chunk cannot be mapped. The returned pointer must be
    /// passed back to [`MemoryPool::release`] unchanged.
    pub fn allocate(&self, size: usize, alignment: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        let alignment = if alignment.is_power_of_two() {
            alignment
        } else {
            MIN_ALLOCATION
        };
        // Request enough extra room that alignment padding always fits
        // inside the returned block's data area.
        let effective = size.checked_add(alignment - 1)?;
        let sc = size_class_for(effective);

        let mut inner = self.inner.lock();
        let header = match inner.take_block(sc, effective) {
            Some(h) => h,
            None => {
                if !inner.add_chunk(effective) {
                    return None;
                }
                inner.take_block(sc, effective)?
            }
        };

        // SAFETY: `header` was just unlinked from a free list, so it
        // points at a valid block inside one of our chunks.
        let block_size = unsafe { (*header).size };
        debug_assert!(block_size >= effective);

        let data = BlockHeader::data(header);
        let padding = data.align_offset(alignment);
        debug_assert!(padding + size <= block_size);

        inner.total_allocated += block_size;
        inner.total_free = inner.total_free.saturating_sub(block_size);
        self.allocation_count.fetch_add(1, Ordering::Relaxed);

        // SAFETY: padding < alignment and block_size >= size + alignment - 1,
        // so the aligned pointer stays inside the block's data area.
        NonNull::new(unsafe { data.add(padding) })
    }

    /// Return an allocation to the pool.
    ///
    /// The owning block is located by walking the containing chunk's
    /// header tiling, gated on the header magic. Double frees and foreign
    /// pointers are silently ignored.
    pub fn release(&self, ptr: NonNull<u8>) {
        let raw = ptr.as_ptr() as *const u8;
        let mut inner = self.inner.lock();

        let mut found: *mut BlockHeader = ptr::null_mut();
        for chunk in inner.chunks.iter().filter(|c| !c.is_arena) {
            if !chunk.contains(raw) {
                continue;
            }
            let base = chunk.base();
            let end = chunk.used;
            let mut offset = 0usize;
            while offset + HEADER_SIZE <= end {
                let header = unsafe { base.add(offset) } as *mut BlockHeader;
                // SAFETY: offset stays within the mapped chunk; the magic
                // gate stops the walk as soon as the tiling is broken.
                let (size, valid) = unsafe { ((*header).size, (*header).is_valid()) };
                if !valid {
                    warn!("memory pool: corrupted block header during release, aborting scan");
                    break;
                }
                let data = BlockHeader::data(header);
                // SAFETY: data + size is within the chunk by construction.
                if raw >= data as *const u8 && raw < unsafe { data.add(size) } as *const u8 {
                    found = header;
                    break;
                }
                offset += HEADER_SIZE + size;
            }
            if !found.is_null() {
                break;
            }
        }

        if found.is_null() {
            return;
        }
        // SAFETY: `found` passed the magic gate and lies inside a chunk we
        // own; the mutex serializes all header mutation.
        unsafe {
            if (*found).is_free {
                return;
            }
            let size = (*found).size;
            inner.total_allocated = inner.total_allocated.saturating_sub(size);
            inner.total_free += size;
            self.deallocation_count.fetch_add(1, Ordering::Relaxed);
            inner.push_free(found);
        }
    }

    /// Map a dedicated chunk for arena-style use.
    ///
    /// Arena chunks bypass the free lists; the caller owns the full span
    /// until [`MemoryPool::release_arena`]. The mapping is rounded up to a
    /// page multiple, so at least `size` bytes are usable.
    pub fn allocate_arena(&self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        let len = align_up(size, page_size());
        let mut inner = self.inner.lock();
        let mut chunk = Chunk::new(len, true)?;
        chunk.used = len;
        let base = chunk.base();
        inner.total_allocated += len;
        inner.chunks.push(chunk);
        self.allocation_count.fetch_add(1, Ordering::Relaxed);
        NonNull::new(base)
    }

    /// Unmap an arena chunk previously obtained from `allocate_arena`.
    ///
    /// Pointers that do not match an arena chunk base are ignored.
    pub fn release_arena(&self, ptr: NonNull<u8>) {
        let mut inner = self.inner.lock();
        let raw = ptr.as_ptr();
        if let Some(idx) = inner
            .chunks
            .iter()
            .position(|c| c.is_arena && c.base() == raw)
        {
            let len = inner.chunks[idx].len();
            inner.total_allocated = inner.total_allocated.saturating_sub(len);
            inner.chunks.remove(idx);
            self.deallocation_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Map an additional chunk up front for deterministic steady-state
    /// behavior.
    pub fn pre_allocate(&self, additional_bytes: usize) {
        let mut inner = self.inner.lock();
        inner.add_chunk(additional_bytes);
    }

    /// Drop every chunk and reset all statistics.
    ///
    /// Dangerous: invalidates every pointer previously handed out.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.chunks.clear();
        inner.free_lists = [ptr::null_mut(); NUM_SIZE_CLASSES];
        inner.total_allocated = 0;
        inner.total_free = 0;
        self.allocation_count.store(0, Ordering::Relaxed);
        self.deallocation_count.store(0, Ordering::Relaxed);
    }

    /// Bytes currently loaned out (block data areas plus live arenas).
    pub fn total_allocated(&self) -> usize {
        self.inner.lock().total_allocated
    }

    /// Bytes sitting on free lists.
    pub fn total_free(&self) -> usize {
        self.inner.lock().total_free
    }

    /// Allocated bytes as a fraction of all mapped memory.
    pub fn utilization(&self) -> f64 {
        let inner = self.inner.lock();
        let mapped: usize = inner.chunks.iter().map(|c| c.len()).sum();
        if mapped == 0 {
            return 0.0;
        }
        inner.total_allocated as f64 / mapped as f64
    }

    pub fn allocation_count(&self) -> usize {
        self.allocation_count.load(Ordering::Relaxed)
    }

    pub fn deallocation_count(&self) -> usize {
        self.deallocation_count.load(Ordering::Relaxed)
    }

    /// Snapshot of the advisory statistics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total_allocated: self.total_allocated(),
            total_free: self.total_free(),
            utilization: self.utilization(),
            allocation_count: self.allocation_count(),
            deallocation_count: self.deallocation_count(),
        }
    }
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolInner {
    /// Map a new chunk able to hold at least `min_data_size` bytes of
    /// block data and file it as one large free block.
    fn add_chunk(&mut self, min_data_size: usize) -> bool {
        let needed = min_data_size.saturating_add(HEADER_SIZE);
        let len = align_up(needed.max(self.default_chunk_size), page_size());
        let Some(mut chunk) = Chunk::new(len, false) else {
            return false;
        };

        let data_size = len - HEADER_SIZE;
        let header = chunk.base() as *mut BlockHeader;
        // SAFETY: the chunk is at least HEADER_SIZE bytes (page-rounded),
        // freshly mapped and exclusively ours.
        unsafe {
            ptr::write(
                header,
                BlockHeader {
                    size: data_size,
                    size_class: size_class_for(data_size),
                    is_free: true,
                    next_free: ptr::null_mut(),
                    magic: BLOCK_MAGIC,
                },
            );
            chunk.used = len;
            self.total_free += data_size;
            self.chunks.push(chunk);
            self.push_free(header);
        }
        true
    }

    /// Push a block onto the free list of its size class.
    ///
    /// # Safety
    /// `header` must point at a valid block header inside one of this
    /// pool's chunks, not currently on any free list.
    unsafe fn push_free(&mut self, header: *mut BlockHeader) {
        debug_assert!((*header).is_valid());
        (*header).is_free = true;
        let sc = (*header).size_class.min(NUM_SIZE_CLASSES - 1);
        (*header).next_free = self.free_lists[sc];
        self.free_lists[sc] = header;
    }

    /// Unlink the first block in `list_class` whose data area holds at
    /// least `required` bytes.
    fn unlink_first_fit(&mut self, list_class: usize, required: usize) -> Option<*mut BlockHeader> {
        // SAFETY: every entry on a free list is a valid header owned by
        // one of our chunks; the walk only follows next_free links.
        unsafe {
            let mut prev: *mut BlockHeader = ptr::null_mut();
            let mut cur = self.free_lists[list_class];
            while !cur.is_null() {
                if (*cur).size >= required {
                    if prev.is_null() {
                        self.free_lists[list_class] = (*cur).next_free;
                    } else {
                        (*prev).next_free = (*cur).next_free;
                    }
                    (*cur).next_free = ptr::null_mut();
                    return Some(cur);
                }
                prev = cur;
                cur = (*cur).next_free;
            }
        }
        None
    }

    /// Obtain a block for `size_class` that fits `required` bytes,
    /// splitting a block from a larger class when necessary. The returned
    /// block is marked allocated.
    fn take_block(&mut self, size_class: usize, required: usize) -> Option<*mut BlockHeader> {
        if size_class >= NUM_SIZE_CLASSES {
            return None;
        }
        if let Some(block) = self.unlink_first_fit(size_class, required) {
            // SAFETY: just unlinked above.
            unsafe {
                (*block).is_free = false;
            }
            return Some(block);
        }
        for larger in size_class + 1..NUM_SIZE_CLASSES {
            if let Some(block) = self.unlink_first_fit(larger, required) {
                // Split target is kept a multiple of the minimum
                // granularity so remainder headers stay 8-byte aligned.
                let split = align_up(class_size(size_class).max(required), MIN_ALLOCATION);
                return Some(self.split_block(block, split));
            }
        }
        None
    }

    /// Carve `required_data_size` bytes off the front of `block`.
    ///
    /// The remainder becomes a new free block if it can host a header
    /// plus the minimum granularity; otherwise the whole block is used.
    fn split_block(
        &mut self,
        block: *mut BlockHeader,
        required_data_size: usize,
    ) -> *mut BlockHeader {
        // SAFETY: `block` is a valid header detached from any free list;
        // its data area spans `size` bytes inside one chunk, so writing a
        // remainder header at data + required_data_size stays in bounds.
        unsafe {
            debug_assert!((*block).is_valid());
            let remaining = (*block).size.saturating_sub(required_data_size);
            if remaining >= HEADER_SIZE + MIN_ALLOCATION {
                let remainder =
                    BlockHeader::data(block).add(required_data_size) as *mut BlockHeader;
                let remainder_size = remaining - HEADER_SIZE;
                ptr::write(
                    remainder,
                    BlockHeader {
                        size: remainder_size,
                        size_class: size_class_for(remainder_size),
                        is_free: true,
                        next_free: ptr::null_mut(),
                        magic: BLOCK_MAGIC,
                    },
                );
                self.push_free(remainder);
                // The new header consumes bytes that used to be free data.
                self.total_free = self.total_free.saturating_sub(HEADER_SIZE);

                (*block).size = required_data_size;
                (*block).size_class = size_class_for(required_data_size);
            }
            (*block).is_free = false;
            (*block).next_free = ptr::null_mut();
            block
        }
    }
}
