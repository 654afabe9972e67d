//! # gridcast-ring
//!
//! Lock-free single-producer single-consumer byte ring used as the hand-off
//! between the file-reader thread and a decoder's pull-mode stream callbacks.
//!
//! This crate is part of the [gridcast](https://github.com/gridcast/gridcast)
//! workspace. Each player pane owns one ring: the fan-out reader writes the
//! source bytes in, the decoder drains them out through the custom stream
//! protocol.
//!
//! # Features
//!
//! - **Lock-Free Hand-Off**: one writer, one reader, no locks on the data path
//! - **Power-Of-Two Capacity**: offsets grow monotonically and are masked at access
//! - **Blocking Variants**: bounded 5 ms back-off with a cooperative stop flag
//! - **Starvation Diagnostics**: rate-limited "no space"/"no data" records
//!
//! # Quick Start
//!
//! ```rust
//! use gridcast_ring::ByteRing;
//!
//! let ring = ByteRing::new(4096);
//! assert_eq!(ring.put(b"hello"), 5);
//!
//! let mut buf = [0u8; 5];
//! assert_eq!(ring.get(&mut buf), 5);
//! assert_eq!(&buf, b"hello");
//! ```
//!
//! # Discipline
//!
//! The ring is safe to share between exactly two threads: one that only
//! calls the `put` family and one that only calls the `get` family. The
//! producer publishes its input offset with a release fence after copying
//! bytes in; the consumer mirrors that on the output offset. Both offsets
//! are read by the other side with an acquire fence before touching
//! storage, so bytes observed by the consumer are exactly the bytes
//! written, in order, with no duplication or loss.
//!
//! Control operations (`reset`, `stopping`, `resume`, the accessors) may be
//! called from any thread.

mod ring;

pub use ring::ByteRing;
