//! Ring-backed stream source
//!
//! The read-only stream protocol a pane registers with its decoder: reads
//! drain the pane's ring without blocking, size and seeking are
//! unsupported (this is a live byte stream), and close touches nothing.

use std::sync::Arc;

use gridcast_mpv::StreamSource;
use gridcast_ring::ByteRing;

/// Serves decoder pull-reads from a pane's ring.
pub struct RingSource {
    ring: Arc<ByteRing>,
}

impl RingSource {
    /// Wrap a ring as a stream source.
    pub fn new(ring: Arc<ByteRing>) -> Self {
        Self { ring }
    }
}

impl StreamSource for RingSource {
    /// Non-blocking drain; 0 just means the producer is behind and the
    /// decoder should retry.
    fn read(&self, buf: &mut [u8]) -> usize {
        self.ring.get(buf)
    }

    // size and seek stay at the trait's unsupported defaults, and close at
    // the default no-op: the close path must not re-enter the decoder.
}
