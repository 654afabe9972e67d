//! SPSC byte ring
//!
//! Storage is a power-of-two block of bytes; the input and output offsets
//! are free-running unsigned counters reduced modulo the capacity only when
//! indexing. `available_data = input - output` stays correct across counter
//! wrap because the capacity divides the counter range.

use std::cell::UnsafeCell;
use std::sync::atomic::{fence, AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::warn;

/// Sleep between retries of a starved blocking call.
const RETRY_INTERVAL: Duration = Duration::from_millis(5);

/// Minimum spacing between two starvation records for the same side.
const REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Byte storage shared by the producer and consumer.
///
/// The cells are only ever written by the producer in regions the consumer
/// has not yet been told about (and vice versa), so the interior mutability
/// is never aliased mutably.
struct Storage(Box<[UnsafeCell<u8>]>);

impl Storage {
    fn empty() -> Self {
        Storage(Vec::new().into_boxed_slice())
    }

    fn zeroed(capacity: usize) -> Self {
        Storage((0..capacity).map(|_| UnsafeCell::new(0)).collect())
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn ptr(&self, index: usize) -> *mut u8 {
        self.0[index].get()
    }
}

/// Repeat counter for one starvation side ("no space" or "no data").
///
/// Emitting one record per starved call would flood the log at the 5 ms
/// retry cadence, so repeats accumulate and at most one record per
/// [`REPORT_INTERVAL`] carries the count. The rate limit is part of the
/// ring's contract.
struct StarveReport {
    what: &'static str,
    repeats: AtomicU64,
    last_report: Mutex<Option<Instant>>,
}

impl StarveReport {
    fn new(what: &'static str) -> Self {
        Self {
            what,
            repeats: AtomicU64::new(0),
            last_report: Mutex::new(None),
        }
    }

    fn starved(&self, occupancy: usize, capacity: usize) {
        let repeats = self.repeats.fetch_add(1, Ordering::Relaxed) + 1;

        let mut last = self.last_report.lock();
        let due = last.map_or(true, |at| at.elapsed() >= REPORT_INTERVAL);
        if due {
            *last = Some(Instant::now());
            self.repeats.store(0, Ordering::Relaxed);
            warn!(repeats, occupancy, capacity, "ring starved: {}", self.what);
        }
    }

    fn clear(&self) {
        self.repeats.store(0, Ordering::Relaxed);
        *self.last_report.lock() = None;
    }
}

/// Lock-free single-producer single-consumer byte queue.
///
/// See the crate documentation for the sharing discipline. All methods take
/// `&self`; the queue is meant to live in an `Arc` shared by the producer
/// and consumer threads.
pub struct ByteRing {
    /// Swapped only by `reset`, which the data path excludes via the read
    /// side of the lock. Uncontended in steady state.
    storage: RwLock<Storage>,

    /// Mirror of the storage length, for accessors that must not block.
    capacity: AtomicUsize,

    /// Free-running producer counter. Written only by the producer.
    input: AtomicU64,

    /// Free-running consumer counter. Written only by the consumer.
    output: AtomicU64,

    /// Once set, blocking calls abandon their wait and return short.
    stopped: AtomicBool,

    no_space: StarveReport,
    no_data: StarveReport,
}

// SAFETY: the storage cells are UnsafeCell<u8>, which strips the automatic
// Sync impl. Shared access is sound under the SPSC discipline: the producer
// writes only cells in [input, input + space) which the consumer cannot
// read until the release-store of `input` publishes them, and the consumer
// mirrors that for `output`. `reset` takes the storage write lock, which
// excludes both data paths.
unsafe impl Sync for ByteRing {}

impl ByteRing {
    /// Create a ring with at least `capacity` bytes of storage.
    ///
    /// The effective capacity is the least power of two that is greater
    /// than or equal to `capacity`. A requested capacity of 0 creates an
    /// unallocated, stopped ring (see [`ByteRing::reset`]).
    pub fn new(capacity: usize) -> Self {
        let ring = Self {
            storage: RwLock::new(Storage::empty()),
            capacity: AtomicUsize::new(0),
            input: AtomicU64::new(0),
            output: AtomicU64::new(0),
            stopped: AtomicBool::new(true),
            no_space: StarveReport::new("no space"),
            no_data: StarveReport::new("no data"),
        };
        ring.reset(capacity);
        ring
    }

    /// Re-initialize the ring.
    ///
    /// With `capacity == 0` the storage is released and the ring is marked
    /// stopped. Otherwise the capacity is rounded up to the next power of
    /// two, fresh zeroed storage is allocated, both offsets are cleared,
    /// and the stop flag is cleared.
    ///
    /// Must not race with an in-flight `put`/`get`; callers re-initialize
    /// only while the producer and consumer are parked.
    pub fn reset(&self, capacity: usize) {
        let mut storage = self.storage.write();
        if capacity == 0 {
            *storage = Storage::empty();
            self.capacity.store(0, Ordering::Relaxed);
            self.stopped.store(true, Ordering::Relaxed);
        } else {
            let capacity = capacity.next_power_of_two();
            *storage = Storage::zeroed(capacity);
            self.capacity.store(capacity, Ordering::Relaxed);
            self.stopped.store(false, Ordering::Relaxed);
        }
        self.input.store(0, Ordering::Relaxed);
        self.output.store(0, Ordering::Relaxed);
        self.no_space.clear();
        self.no_data.clear();
    }

    /// Set the stop flag.
    ///
    /// Any blocked `put_blocking`/`get_blocking` exits within one retry
    /// interval and returns the bytes transferred so far.
    pub fn stopping(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    /// Clear the stop flag after a cooperative stop.
    ///
    /// Storage, offsets, and queued bytes are untouched; this is the
    /// restart path, where bytes already queued must survive.
    pub fn resume(&self) {
        if self.capacity.load(Ordering::Relaxed) > 0 {
            self.stopped.store(false, Ordering::Relaxed);
        }
    }

    /// Whether the stop flag is set.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    /// Whether the ring has no storage (capacity 0).
    pub fn is_unallocated(&self) -> bool {
        self.capacity.load(Ordering::Relaxed) == 0
    }

    /// Effective (power-of-two) capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Bytes currently queued.
    pub fn available_data(&self) -> usize {
        let input = self.input.load(Ordering::Relaxed);
        let output = self.output.load(Ordering::Relaxed);
        input.wrapping_sub(output) as usize
    }

    /// Bytes of free space.
    pub fn available_space(&self) -> usize {
        self.capacity().saturating_sub(self.available_data())
    }

    /// Whether no data is queued.
    pub fn is_empty(&self) -> bool {
        self.available_data() == 0
    }

    /// Whether the ring is at capacity.
    pub fn is_full(&self) -> bool {
        self.capacity() > 0 && self.available_data() == self.capacity()
    }

    /// One-shot copy of up to `src.len()` bytes into the ring.
    ///
    /// Copies `min(src.len(), available_space)` bytes, splitting at the
    /// wrap boundary, and returns the count. Returns 0 when the ring is
    /// full or unallocated. Never blocks, never spins.
    ///
    /// Producer-side call.
    pub fn put(&self, src: &[u8]) -> usize {
        let storage = self.storage.read();
        let capacity = storage.len();
        if capacity == 0 {
            return 0;
        }

        let input = self.input.load(Ordering::Relaxed);
        let output = self.output.load(Ordering::Relaxed);
        let space = capacity - input.wrapping_sub(output) as usize;

        let len = src.len().min(space);
        if len == 0 {
            self.no_space.starved(capacity - space, capacity);
            return 0;
        }

        // Sample the consumer's offset before touching storage.
        fence(Ordering::Acquire);

        let write_at = input as usize & (capacity - 1);
        let first = len.min(capacity - write_at);
        // SAFETY: [write_at, write_at + first) and [0, len - first) hold
        // only free cells; the consumer cannot read them until `input` is
        // published below, and no other producer exists.
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), storage.ptr(write_at), first);
            std::ptr::copy_nonoverlapping(src.as_ptr().add(first), storage.ptr(0), len - first);
        }

        // Publish the bytes before the new offset becomes visible.
        fence(Ordering::Release);
        self.input.store(input.wrapping_add(len as u64), Ordering::Relaxed);

        len
    }

    /// One-shot copy of up to `dst.len()` bytes out of the ring.
    ///
    /// Symmetric with [`ByteRing::put`]: copies `min(dst.len(),
    /// available_data)` bytes and returns the count, 0 when empty.
    ///
    /// Consumer-side call.
    pub fn get(&self, dst: &mut [u8]) -> usize {
        let storage = self.storage.read();
        let capacity = storage.len();
        if capacity == 0 {
            return 0;
        }

        let input = self.input.load(Ordering::Relaxed);
        let output = self.output.load(Ordering::Relaxed);
        let available = input.wrapping_sub(output) as usize;

        let len = dst.len().min(available);
        if len == 0 {
            self.no_data.starved(available, capacity);
            return 0;
        }

        // Sample the producer's offset before touching storage.
        fence(Ordering::Acquire);

        let read_at = output as usize & (capacity - 1);
        let first = len.min(capacity - read_at);
        // SAFETY: [read_at, read_at + first) and [0, len - first) hold
        // published bytes the producer will not rewrite until `output` is
        // advanced below, and no other consumer exists.
        unsafe {
            std::ptr::copy_nonoverlapping(storage.ptr(read_at), dst.as_mut_ptr(), first);
            std::ptr::copy_nonoverlapping(storage.ptr(0), dst.as_mut_ptr().add(first), len - first);
        }

        // Release the cells before the new offset becomes visible.
        fence(Ordering::Release);
        self.output.store(output.wrapping_add(len as u64), Ordering::Relaxed);

        len
    }

    /// Copy the next byte without consuming it.
    ///
    /// Consumer-side call.
    pub fn peek(&self) -> Option<u8> {
        let storage = self.storage.read();
        let capacity = storage.len();
        if capacity == 0 {
            return None;
        }

        let input = self.input.load(Ordering::Relaxed);
        let output = self.output.load(Ordering::Relaxed);
        if input.wrapping_sub(output) == 0 {
            return None;
        }

        fence(Ordering::Acquire);
        let read_at = output as usize & (capacity - 1);
        // SAFETY: the cell at read_at is published and not rewritable until
        // `output` advances, which only this consumer can do.
        Some(unsafe { *storage.ptr(read_at) })
    }

    /// Write all of `src`, sleeping 5 ms whenever the ring is full, until
    /// done or the stop flag is observed. Returns the bytes written.
    pub fn put_blocking(&self, src: &[u8]) -> usize {
        let mut written = 0;
        while written < src.len() {
            if self.is_stopped() {
                break;
            }
            let n = self.put(&src[written..]);
            written += n;
            if n == 0 {
                thread::sleep(RETRY_INTERVAL);
            }
        }
        written
    }

    /// Read into all of `dst`, sleeping 5 ms whenever the ring is empty,
    /// until done or the stop flag is observed. Returns the bytes read.
    pub fn get_blocking(&self, dst: &mut [u8]) -> usize {
        let mut read = 0;
        while read < dst.len() {
            if self.is_stopped() {
                break;
            }
            let n = self.get(&mut dst[read..]);
            read += n;
            if n == 0 {
                thread::sleep(RETRY_INTERVAL);
            }
        }
        read
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_capacity_rounds_up_to_power_of_two() {
        assert_eq!(ByteRing::new(1).capacity(), 1);
        assert_eq!(ByteRing::new(5).capacity(), 8);
        assert_eq!(ByteRing::new(8).capacity(), 8);
        assert_eq!(ByteRing::new(1000).capacity(), 1024);
    }

    #[test]
    fn test_unallocated_ring() {
        let ring = ByteRing::new(0);
        assert!(ring.is_unallocated());
        assert!(ring.is_stopped());
        assert_eq!(ring.put(b"x"), 0);

        let mut buf = [0u8; 1];
        assert_eq!(ring.get(&mut buf), 0);
        assert_eq!(ring.peek(), None);
    }

    #[test]
    fn test_reset_to_zero_releases_and_stops() {
        let ring = ByteRing::new(64);
        assert!(!ring.is_stopped());
        assert_eq!(ring.put(b"abc"), 3);

        ring.reset(0);
        assert!(ring.is_unallocated());
        assert!(ring.is_stopped());
        assert_eq!(ring.available_data(), 0);
    }

    #[test]
    fn test_occupancy_accounting() {
        let ring = ByteRing::new(16);
        assert_eq!(ring.available_data(), 0);
        assert_eq!(ring.available_space(), 16);
        assert!(ring.is_empty());
        assert!(!ring.is_full());

        assert_eq!(ring.put(&[7u8; 10]), 10);
        assert_eq!(ring.available_data(), 10);
        assert_eq!(ring.available_space(), 6);

        assert_eq!(ring.put(&[7u8; 10]), 6);
        assert!(ring.is_full());
        assert_eq!(ring.available_space(), 0);
    }

    #[test]
    fn test_small_ring_wrap() {
        // Requested 5 rounds up to 8; reads across the wrap boundary come
        // back in order.
        let ring = ByteRing::new(5);
        assert_eq!(ring.capacity(), 8);

        assert_eq!(ring.put(&[1, 2, 3, 4, 5, 6, 7, 8]), 8);

        let mut buf = [0u8; 5];
        assert_eq!(ring.get(&mut buf), 5);
        assert_eq!(buf, [1, 2, 3, 4, 5]);

        assert_eq!(ring.put(&[9, 10, 11, 12, 13]), 5);

        let mut buf = [0u8; 8];
        assert_eq!(ring.get(&mut buf), 8);
        assert_eq!(buf, [6, 7, 8, 9, 10, 11, 12, 13]);
    }

    #[test]
    fn test_full_ring_backs_off_then_accepts_freed_space() {
        let ring = ByteRing::new(16);
        assert_eq!(ring.put(&[0xAA; 16]), 16);
        assert_eq!(ring.put(&[0xBB; 1]), 0);

        let mut one = [0u8; 1];
        assert_eq!(ring.get(&mut one), 1);
        assert_eq!(one, [0xAA]);

        assert_eq!(ring.put(&[0xBB; 4]), 1);
        assert_eq!(ring.available_data(), 16);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let ring = ByteRing::new(8);
        ring.put(&[42, 43]);
        assert_eq!(ring.peek(), Some(42));
        assert_eq!(ring.peek(), Some(42));

        let mut buf = [0u8; 2];
        assert_eq!(ring.get(&mut buf), 2);
        assert_eq!(buf, [42, 43]);
        assert_eq!(ring.peek(), None);
    }

    #[test]
    fn test_stopping_unblocks_blocked_put() {
        let ring = Arc::new(ByteRing::new(16));
        ring.put(&[0u8; 16]);

        let writer = {
            let ring = Arc::clone(&ring);
            std::thread::spawn(move || ring.put_blocking(&[1u8; 64]))
        };

        std::thread::sleep(Duration::from_millis(20));
        ring.stopping();

        let written = writer.join().expect("writer thread");
        assert_eq!(written, 0);
    }

    #[test]
    fn test_resume_after_stop_preserves_bytes() {
        let ring = ByteRing::new(32);
        ring.put(&[1, 2, 3]);
        ring.stopping();
        assert!(ring.is_stopped());

        ring.resume();
        assert!(!ring.is_stopped());

        let mut buf = [0u8; 3];
        assert_eq!(ring.get(&mut buf), 3);
        assert_eq!(buf, [1, 2, 3]);
    }

    #[test]
    fn test_resume_does_not_revive_unallocated_ring() {
        let ring = ByteRing::new(0);
        ring.resume();
        assert!(ring.is_stopped());
    }

    #[test]
    fn test_concurrent_round_trip_equality() {
        // A deterministic pseudo-random stream pushed through a small ring
        // by racing threads must come out identical.
        const TOTAL: usize = 1 << 20;

        fn xorshift(state: &mut u32) -> u8 {
            *state ^= *state << 13;
            *state ^= *state >> 17;
            *state ^= *state << 5;
            (*state & 0xFF) as u8
        }

        let ring = Arc::new(ByteRing::new(256));

        let producer = {
            let ring = Arc::clone(&ring);
            std::thread::spawn(move || {
                let mut state = 0x1234_5678u32;
                let mut chunk = [0u8; 177];
                let mut sent = 0;
                while sent < TOTAL {
                    let n = chunk.len().min(TOTAL - sent);
                    for byte in &mut chunk[..n] {
                        *byte = xorshift(&mut state);
                    }
                    assert_eq!(ring.put_blocking(&chunk[..n]), n);
                    sent += n;
                }
            })
        };

        let consumer = {
            let ring = Arc::clone(&ring);
            std::thread::spawn(move || {
                let mut state = 0x1234_5678u32;
                let mut chunk = [0u8; 91];
                let mut received = 0;
                while received < TOTAL {
                    let n = chunk.len().min(TOTAL - received);
                    assert_eq!(ring.get_blocking(&mut chunk[..n]), n);
                    for byte in &chunk[..n] {
                        assert_eq!(*byte, xorshift(&mut state));
                    }
                    received += n;
                }
            })
        };

        producer.join().expect("producer thread");
        consumer.join().expect("consumer thread");
        assert!(ring.is_empty());
    }
}
