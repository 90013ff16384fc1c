//! Lock-free SPSC ring buffer over a named shared segment
//!
//! Layout of the mapped region: `[RingHeader | slot[0] | .. | slot[N-1]]`.
//! The header keeps the two monotonic indices on separate cache lines
//! (via `CachePadded`) so the producer and consumer never false-share,
//! with a third padded line for the stats counters both ends touch with
//! relaxed atomics.
//!
//! Visibility protocol: the producer copies the record bytes, issues a
//! release fence, then release-stores `write_index + 1`. A consumer that
//! acquire-loads `write_index = W` is therefore guaranteed to observe the
//! byte images of all slots below `W`. Delivery is strictly FIFO.
//!
//! The role split is enforced at the type level: only a [`Producer`] can
//! advance `write_index` and only a [`Consumer`] can advance
//! `read_index`.

use super::segment::SharedSegment;
use crate::core::time::now_ns;
use anyhow::{bail, Context, Result};
use bytemuck::Pod;
use crossbeam_utils::CachePadded;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::time::Duration;

/// Value stored in the header once the owner has finished initializing.
const RING_INIT_MAGIC: u64 = 0x414C_5249_4E47_0001; // "ALRING" v1

/// How long an opener waits for the owner to initialize the header.
const INIT_WAIT_TIMEOUT: Duration = Duration::from_millis(100);

/// Poll interval while waiting for initialization.
const INIT_POLL_INTERVAL: Duration = Duration::from_micros(10);

/// Shared counters both endpoints update with relaxed atomics.
#[repr(C)]
struct RingStats {
    total_writes: AtomicU64,
    total_reads: AtomicU64,
    contention_events: AtomicU64,
    max_depth: AtomicU64,
    last_access_ns: AtomicU64,
}

/// Cache-line isolated shared header at the front of the segment.
#[repr(C)]
struct RingHeader {
    /// `RING_INIT_MAGIC` once the owner has initialized the region.
    init: CachePadded<AtomicU64>,
    /// Monotonically increasing; mutated by the producer only.
    write_index: CachePadded<AtomicU64>,
    /// Monotonically increasing; mutated by the consumer only.
    read_index: CachePadded<AtomicU64>,
    stats: CachePadded<RingStats>,
}

const HEADER_BYTES: usize = std::mem::size_of::<RingHeader>();

/// Snapshot of a ring buffer's health counters.
#[derive(Debug, Clone, Copy)]
pub struct RingMetrics {
    pub total_writes: u64,
    pub total_reads: u64,
    pub contention_events: u64,
    pub max_depth: u64,
    pub consecutive_empty_reads: u64,
    pub consecutive_full_writes: u64,
    pub time_since_last_access: Duration,
    pub average_depth: f64,
    pub contention_rate: f64,
}

/// Shared core of [`Producer`] and [`Consumer`].
///
/// Owns the mapped segment and the per-endpoint starvation counters.
struct RawRing<T: Pod, const N: usize> {
    segment: SharedSegment,
    consecutive_empty_reads: u64,
    consecutive_full_writes: u64,
    _record: PhantomData<T>,
}

impl<T: Pod, const N: usize> RawRing<T, N> {
    /// Compile-time contract on the capacity and record type.
    const LAYOUT_OK: () = {
        assert!(N.is_power_of_two(), "ring capacity must be a power of two");
        assert!(N >= 64, "ring capacity must be at least 64");
        assert!(
            std::mem::size_of::<T>() % 64 == 0 && std::mem::size_of::<T>() > 0,
            "record size must be a non-zero multiple of the cache line"
        );
    };

    const MASK: u64 = (N as u64) - 1;

    fn region_len() -> usize {
        HEADER_BYTES + std::mem::size_of::<T>() * N
    }

    /// Create (or fall back to opening) the named ring.
    fn create(name: &str) -> Result<Self> {
        let _ = Self::LAYOUT_OK;
        let segment = SharedSegment::create(name, Self::region_len())?;
        let ring = Self {
            segment,
            consecutive_empty_reads: 0,
            consecutive_full_writes: 0,
            _record: PhantomData,
        };
        if ring.segment.is_owner() {
            // Indices and stats are already zeroed by segment creation;
            // publishing the magic makes that initialization visible.
            ring.header().init.store(RING_INIT_MAGIC, Ordering::Release);
        } else {
            ring.wait_for_init(name)?;
        }
        Ok(ring)
    }

    /// Open the named ring created by another process.
    fn open(name: &str) -> Result<Self> {
        let _ = Self::LAYOUT_OK;
        let segment = SharedSegment::open(name, Self::region_len())?;
        let ring = Self {
            segment,
            consecutive_empty_reads: 0,
            consecutive_full_writes: 0,
            _record: PhantomData,
        };
        ring.wait_for_init(name)?;
        Ok(ring)
    }

    fn wait_for_init(&self, name: &str) -> Result<()> {
        let deadline = std::time::Instant::now() + INIT_WAIT_TIMEOUT;
        while self.header().init.load(Ordering::Acquire) != RING_INIT_MAGIC {
            if std::time::Instant::now() >= deadline {
                bail!("timed out waiting for owner to initialize ring {name}");
            }
            std::thread::sleep(INIT_POLL_INTERVAL);
        }
        Ok(())
    }

    #[inline(always)]
    fn header(&self) -> &RingHeader {
        // SAFETY: the segment is at least region_len() bytes and the
        // header sits at offset 0; RingHeader is repr(C) over atomics,
        // valid for any (zeroed) bit pattern.
        unsafe { &*(self.segment.as_ptr() as *const RingHeader) }
    }

    #[inline(always)]
    fn slot_ptr(&self, index: u64) -> *mut T {
        // SAFETY: slots start right after the header and index is masked
        // below N, so the pointer stays inside the mapped region.
        unsafe {
            (self.segment.as_mut_ptr().add(HEADER_BYTES) as *mut T)
                .add((index & Self::MASK) as usize)
        }
    }

    /// Producer-side non-blocking write.
    #[inline(always)]
    fn try_write(&mut self, item: &T) -> bool {
        let (write, read) = {
            let header = self.header();
            (
                header.write_index.load(Ordering::Relaxed),
                header.read_index.load(Ordering::Acquire),
            )
        };

        if write - read >= N as u64 {
            self.consecutive_full_writes += 1;
            self.header()
                .stats
                .contention_events
                .fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.consecutive_full_writes = 0;

        // SAFETY: the slot at `write` is outside the consumer's visible
        // window until the index store below; volatile keeps the copy to
        // shared memory from being elided or torn by the optimizer.
        unsafe { ptr::write_volatile(self.slot_ptr(write), *item) };
        fence(Ordering::Release);

        let header = self.header();
        header.write_index.store(write + 1, Ordering::Release);
        header.stats.total_writes.fetch_add(1, Ordering::Relaxed);
        header.stats.last_access_ns.store(now_ns(), Ordering::Relaxed);
        let depth = (write + 1).saturating_sub(header.read_index.load(Ordering::Relaxed));
        let mut max = header.stats.max_depth.load(Ordering::Relaxed);
        while depth > max {
            match header.stats.max_depth.compare_exchange_weak(
                max,
                depth,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => max = observed,
            }
        }
        true
    }

    /// Consumer-side non-blocking read.
    #[inline(always)]
    fn try_read(&mut self) -> Option<T> {
        let (read, write) = {
            let header = self.header();
            (
                header.read_index.load(Ordering::Relaxed),
                header.write_index.load(Ordering::Acquire),
            )
        };

        if read == write {
            self.consecutive_empty_reads += 1;
            return None;
        }
        self.consecutive_empty_reads = 0;

        // SAFETY: read < write, so the producer has published this slot;
        // the acquire load above ordered its bytes before this copy.
        let item = unsafe { ptr::read_volatile(self.slot_ptr(read)) };
        fence(Ordering::Acquire);

        let header = self.header();
        header.read_index.store(read + 1, Ordering::Release);
        header.stats.total_reads.fetch_add(1, Ordering::Relaxed);
        header.stats.last_access_ns.store(now_ns(), Ordering::Relaxed);
        Some(item)
    }

    /// Write up to `items.len()` records with one fence and one index
    /// store. Returns the count actually transferred.
    fn try_write_batch(&mut self, items: &[T]) -> usize {
        if items.is_empty() {
            return 0;
        }
        let (write, read) = {
            let header = self.header();
            (
                header.write_index.load(Ordering::Relaxed),
                header.read_index.load(Ordering::Acquire),
            )
        };

        let available = N - (write - read) as usize;
        let count = items.len().min(available);
        if count == 0 {
            self.consecutive_full_writes += 1;
            self.header()
                .stats
                .contention_events
                .fetch_add(1, Ordering::Relaxed);
            return 0;
        }
        self.consecutive_full_writes = 0;

        for (i, item) in items.iter().take(count).enumerate() {
            // SAFETY: every touched slot is in the producer-owned window.
            unsafe { ptr::write_volatile(self.slot_ptr(write + i as u64), *item) };
        }
        fence(Ordering::Release);

        let header = self.header();
        header
            .write_index
            .store(write + count as u64, Ordering::Release);
        header
            .stats
            .total_writes
            .fetch_add(count as u64, Ordering::Relaxed);
        header.stats.last_access_ns.store(now_ns(), Ordering::Relaxed);
        count
    }

    /// Read up to `out.len()` records with one fence and one index store.
    fn try_read_batch(&mut self, out: &mut [T]) -> usize {
        if out.is_empty() {
            return 0;
        }
        let (read, write) = {
            let header = self.header();
            (
                header.read_index.load(Ordering::Relaxed),
                header.write_index.load(Ordering::Acquire),
            )
        };

        let available = (write - read) as usize;
        let count = out.len().min(available);
        if count == 0 {
            self.consecutive_empty_reads += 1;
            return 0;
        }
        self.consecutive_empty_reads = 0;

        for (i, slot) in out.iter_mut().take(count).enumerate() {
            // SAFETY: every touched slot is below the acquired write index.
            *slot = unsafe { ptr::read_volatile(self.slot_ptr(read + i as u64)) };
        }
        fence(Ordering::Acquire);

        let header = self.header();
        header
            .read_index
            .store(read + count as u64, Ordering::Release);
        header
            .stats
            .total_reads
            .fetch_add(count as u64, Ordering::Relaxed);
        header.stats.last_access_ns.store(now_ns(), Ordering::Relaxed);
        count
    }

    fn len(&self) -> usize {
        let header = self.header();
        let write = header.write_index.load(Ordering::Acquire);
        let read = header.read_index.load(Ordering::Acquire);
        (write - read) as usize
    }

    fn metrics(&self) -> RingMetrics {
        let header = self.header();
        let total_writes = header.stats.total_writes.load(Ordering::Relaxed);
        let total_reads = header.stats.total_reads.load(Ordering::Relaxed);
        let contention_events = header.stats.contention_events.load(Ordering::Relaxed);
        let operations = total_writes + total_reads;
        let last_access = header.stats.last_access_ns.load(Ordering::Relaxed);

        RingMetrics {
            total_writes,
            total_reads,
            contention_events,
            max_depth: header.stats.max_depth.load(Ordering::Relaxed),
            consecutive_empty_reads: self.consecutive_empty_reads,
            consecutive_full_writes: self.consecutive_full_writes,
            time_since_last_access: if last_access == 0 {
                Duration::ZERO
            } else {
                Duration::from_nanos(now_ns().saturating_sub(last_access))
            },
            average_depth: self.len() as f64,
            contention_rate: if operations > 0 {
                contention_events as f64 / operations as f64
            } else {
                0.0
            },
        }
    }

    fn reset_metrics(&mut self) {
        let header = self.header();
        header.stats.total_writes.store(0, Ordering::Relaxed);
        header.stats.total_reads.store(0, Ordering::Relaxed);
        header.stats.contention_events.store(0, Ordering::Relaxed);
        header.stats.max_depth.store(0, Ordering::Relaxed);
        header.stats.last_access_ns.store(now_ns(), Ordering::Relaxed);
        self.consecutive_empty_reads = 0;
        self.consecutive_full_writes = 0;
    }

    /// Threshold-based liveness predicate over the health counters.
    fn is_healthy(&self) -> bool {
        let m = self.metrics();
        let low_contention = m.contention_rate < 0.05;
        let reasonable_depth = m.average_depth < (N as f64) * 0.8;
        let recent_activity = m.time_since_last_access < Duration::from_secs(5);
        let no_starvation =
            m.consecutive_empty_reads < 1000 && m.consecutive_full_writes < 1000;
        low_contention && reasonable_depth && recent_activity && no_starvation
    }
}

impl<T: Pod, const N: usize> Drop for RawRing<T, N> {
    fn drop(&mut self) {
        // Let in-flight slot writes land before the segment unmaps.
        fence(Ordering::SeqCst);
    }
}

macro_rules! shared_accessors {
    () => {
        /// Records currently queued.
        pub fn len(&self) -> usize {
            self.ring.len()
        }

        pub fn is_empty(&self) -> bool {
            self.ring.len() == 0
        }

        pub fn is_full(&self) -> bool {
            self.ring.len() >= N
        }

        /// Queue depth as a fraction of capacity.
        pub fn utilization(&self) -> f64 {
            self.ring.len() as f64 / N as f64
        }

        pub const fn capacity(&self) -> usize {
            N
        }

        pub fn metrics(&self) -> RingMetrics {
            self.ring.metrics()
        }

        pub fn reset_metrics(&mut self) {
            self.ring.reset_metrics()
        }

        /// True while the buffer operates within its health thresholds:
        /// contention below 5 %, depth below 80 % of capacity, activity
        /// within 5 s and starvation counters below 1000.
        pub fn is_healthy(&self) -> bool {
            self.ring.is_healthy()
        }
    };
}

/// Writing endpoint of a shared ring. Exactly one per ring.
pub struct Producer<T: Pod, const N: usize> {
    ring: RawRing<T, N>,
}

impl<T: Pod, const N: usize> Producer<T, N> {
    /// Create the named ring and take the producer role.
    pub fn create(name: &str) -> Result<Self> {
        Ok(Self {
            ring: RawRing::create(name).context("producer ring construction failed")?,
        })
    }

    /// Attach as producer to a ring created by the peer process.
    pub fn open(name: &str) -> Result<Self> {
        Ok(Self {
            ring: RawRing::open(name).context("producer ring attach failed")?,
        })
    }

    /// Non-blocking write; `false` means the buffer is full.
    ///
    /// Never blocks, never allocates.
    #[inline(always)]
    pub fn try_write(&mut self, item: &T) -> bool {
        self.ring.try_write(item)
    }

    /// Write up to `items.len()` records; returns the count transferred.
    pub fn try_write_batch(&mut self, items: &[T]) -> usize {
        self.ring.try_write_batch(items)
    }

    pub fn consecutive_full_writes(&self) -> u64 {
        self.ring.consecutive_full_writes
    }

    shared_accessors!();
}

/// Reading endpoint of a shared ring. Exactly one per ring.
pub struct Consumer<T: Pod, const N: usize> {
    ring: RawRing<T, N>,
}

impl<T: Pod, const N: usize> Consumer<T, N> {
    /// Attach as consumer to a ring created by the peer process.
    pub fn open(name: &str) -> Result<Self> {
        Ok(Self {
            ring: RawRing::open(name).context("consumer ring attach failed")?,
        })
    }

    /// Create the named ring and take the consumer role.
    pub fn create(name: &str) -> Result<Self> {
        Ok(Self {
            ring: RawRing::create(name).context("consumer ring construction failed")?,
        })
    }

    /// Non-blocking read; `None` means the buffer is empty.
    ///
    /// Never blocks, never allocates.
    #[inline(always)]
    pub fn try_read(&mut self) -> Option<T> {
        self.ring.try_read()
    }

    /// Read up to `out.len()` records; returns the count transferred.
    pub fn try_read_batch(&mut self, out: &mut [T]) -> usize {
        self.ring.try_read_batch(out)
    }

    pub fn consecutive_empty_reads(&self) -> u64 {
        self.ring.consecutive_empty_reads
    }

    shared_accessors!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::messages::MarketDataMessage;
    use bytemuck::Zeroable;
    use std::sync::atomic::AtomicU32;
    use std::thread;

    fn unique_name(tag: &str) -> String {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        format!(
            "alaris_test_ring_{}_{}_{}",
            std::process::id(),
            tag,
            COUNTER.fetch_add(1, Ordering::Relaxed)
        )
    }

    fn quote(seq: u32) -> MarketDataMessage {
        let mut msg = MarketDataMessage::new(1);
        msg.bid = 99.0;
        msg.ask = 101.0;
        msg.underlying_price = 100.0;
        msg.processing_sequence = seq;
        msg
    }

    #[test]
    fn test_write_then_read_roundtrips_bytes() {
        let name = unique_name("roundtrip");
        let mut producer = Producer::<MarketDataMessage, 64>::create(&name).unwrap();
        let mut consumer = Consumer::<MarketDataMessage, 64>::open(&name).unwrap();

        let msg = quote(7);
        assert!(producer.try_write(&msg));
        let back = consumer.try_read().expect("record available");
        assert_eq!(bytemuck::bytes_of(&back), bytemuck::bytes_of(&msg));
    }

    #[test]
    fn test_empty_read_returns_none_without_index_motion() {
        let name = unique_name("empty");
        let producer = Producer::<MarketDataMessage, 64>::create(&name).unwrap();
        let mut consumer = Consumer::<MarketDataMessage, 64>::open(&name).unwrap();

        assert!(consumer.try_read().is_none());
        assert!(consumer.try_read().is_none());
        assert_eq!(consumer.consecutive_empty_reads(), 2);
        assert_eq!(consumer.len(), 0);
        assert_eq!(producer.metrics().total_reads, 0);
    }

    #[test]
    fn test_exactly_full_boundary() {
        let name = unique_name("full");
        let mut producer = Producer::<MarketDataMessage, 64>::create(&name).unwrap();
        let mut consumer = Consumer::<MarketDataMessage, 64>::open(&name).unwrap();

        for i in 0..64 {
            assert!(producer.try_write(&quote(i)), "write {i} should succeed");
        }
        assert!(producer.is_full());
        assert_eq!(producer.len(), 64);

        // One more write fails and counts contention.
        assert!(!producer.try_write(&quote(64)));
        assert_eq!(producer.metrics().contention_events, 1);
        assert_eq!(producer.consecutive_full_writes(), 1);

        // A read frees a slot; the next write succeeds.
        assert_eq!(consumer.try_read().unwrap().processing_sequence, 0);
        assert!(producer.try_write(&quote(64)));
        assert_eq!(producer.consecutive_full_writes(), 0);
    }

    #[test]
    fn test_fifo_order_single_thread() {
        let name = unique_name("fifo");
        let mut producer = Producer::<MarketDataMessage, 64>::create(&name).unwrap();
        let mut consumer = Consumer::<MarketDataMessage, 64>::open(&name).unwrap();

        for i in 0..50 {
            assert!(producer.try_write(&quote(i)));
        }
        for i in 0..50 {
            assert_eq!(consumer.try_read().unwrap().processing_sequence, i);
        }
        assert!(consumer.try_read().is_none());
    }

    #[test]
    fn test_batch_operations_partial_counts() {
        let name = unique_name("batch");
        let mut producer = Producer::<MarketDataMessage, 64>::create(&name).unwrap();
        let mut consumer = Consumer::<MarketDataMessage, 64>::open(&name).unwrap();

        let items: Vec<_> = (0..100).map(quote).collect();
        // Only 64 slots exist.
        assert_eq!(producer.try_write_batch(&items), 64);
        assert_eq!(producer.len(), 64);

        let mut out = [MarketDataMessage::zeroed(); 40];
        assert_eq!(consumer.try_read_batch(&mut out), 40);
        assert_eq!(out[0].processing_sequence, 0);
        assert_eq!(out[39].processing_sequence, 39);

        // Remaining 24, although 40 were requested.
        assert_eq!(consumer.try_read_batch(&mut out), 24);
        assert_eq!(out[0].processing_sequence, 40);
        assert_eq!(consumer.try_read_batch(&mut out), 0);

        let m = consumer.metrics();
        assert_eq!(m.total_writes, 64);
        assert_eq!(m.total_reads, 64);
    }

    #[test]
    fn test_spsc_threads_deliver_in_order() {
        // Scenario: 10,000 records, batch consumption of 32, capacity
        // ample enough that the producer never observes a full buffer.
        const TOTAL: u32 = 10_000;
        let name = unique_name("spsc");
        let mut producer = Producer::<MarketDataMessage, 16384>::create(&name).unwrap();
        let mut consumer = Consumer::<MarketDataMessage, 16384>::open(&name).unwrap();

        let writer = thread::spawn(move || {
            for i in 0..TOTAL {
                assert!(producer.try_write(&quote(i)), "unexpected full buffer");
            }
            producer
        });

        let mut received = Vec::with_capacity(TOTAL as usize);
        let mut batch = [MarketDataMessage::zeroed(); 32];
        while received.len() < TOTAL as usize {
            let n = consumer.try_read_batch(&mut batch);
            received.extend(batch[..n].iter().map(|m| m.processing_sequence));
            if n == 0 {
                thread::yield_now();
            }
        }

        let producer = writer.join().unwrap();
        assert_eq!(received.len(), TOTAL as usize);
        for (expected, got) in received.iter().enumerate() {
            assert_eq!(*got, expected as u32, "record out of order");
        }
        let m = producer.metrics();
        assert_eq!(m.total_writes, TOTAL as u64);
        assert_eq!(m.total_reads, TOTAL as u64);
        assert_eq!(m.contention_events, 0);
    }

    #[test]
    fn test_backpressure_without_consumer() {
        // Scenario: 5,000 writes into a 4,096-slot ring with no reader.
        let name = unique_name("backpressure");
        let mut producer = Producer::<MarketDataMessage, 4096>::create(&name).unwrap();

        let mut accepted = 0u32;
        let mut rejected = 0u32;
        for i in 0..5_000 {
            if producer.try_write(&quote(i)) {
                accepted += 1;
            } else {
                rejected += 1;
            }
        }
        assert_eq!(accepted, 4_096);
        assert_eq!(rejected, 904);
        assert_eq!(producer.len(), 4_096);

        let m = producer.metrics();
        assert_eq!(m.contention_events, 904);
        assert_eq!(m.max_depth, 4_096);

        let mut consumer = Consumer::<MarketDataMessage, 4096>::open(&name).unwrap();
        assert!(consumer.try_read().is_some());
        assert!(producer.try_write(&quote(5_000)));
    }

    #[test]
    fn test_index_conservation_invariant() {
        let name = unique_name("conservation");
        let mut producer = Producer::<MarketDataMessage, 64>::create(&name).unwrap();
        let mut consumer = Consumer::<MarketDataMessage, 64>::open(&name).unwrap();

        for round in 0..10 {
            for i in 0..32 {
                producer.try_write(&quote(round * 32 + i));
            }
            let m = producer.metrics();
            assert_eq!(m.total_writes - m.total_reads, producer.len() as u64);
            while consumer.try_read().is_some() {}
            let m = consumer.metrics();
            assert_eq!(m.total_writes, m.total_reads);
        }
    }

    #[test]
    fn test_health_predicate() {
        let name = unique_name("health");
        let mut producer = Producer::<MarketDataMessage, 64>::create(&name).unwrap();
        let mut consumer = Consumer::<MarketDataMessage, 64>::open(&name).unwrap();

        producer.try_write(&quote(1));
        consumer.try_read();
        assert!(producer.is_healthy());

        // Saturate: depth pegged at capacity and heavy contention.
        for i in 0..200 {
            producer.try_write(&quote(i));
        }
        assert!(!producer.is_healthy());
    }

    #[test]
    fn test_reset_metrics() {
        let name = unique_name("reset");
        let mut producer = Producer::<MarketDataMessage, 64>::create(&name).unwrap();
        for i in 0..10 {
            producer.try_write(&quote(i));
        }
        assert!(producer.metrics().total_writes > 0);
        producer.reset_metrics();
        let m = producer.metrics();
        assert_eq!(m.total_writes, 0);
        assert_eq!(m.contention_events, 0);
        assert_eq!(m.max_depth, 0);
    }

    #[test]
    fn test_open_missing_ring_fails_fast() {
        let name = unique_name("missing");
        assert!(Consumer::<MarketDataMessage, 64>::open(&name).is_err());
    }

    #[test]
    fn test_open_times_out_when_owner_never_initializes() {
        let name = unique_name("uninit");
        // A raw segment of the right size, but no owner ever publishes
        // the init marker.
        let region = RawRing::<MarketDataMessage, 64>::region_len();
        let _bare = SharedSegment::create(&name, region).unwrap();
        let started = std::time::Instant::now();
        let result = Consumer::<MarketDataMessage, 64>::open(&name);
        assert!(result.is_err());
        assert!(started.elapsed() >= INIT_WAIT_TIMEOUT);
    }
}
