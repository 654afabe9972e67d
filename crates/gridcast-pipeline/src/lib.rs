//! # gridcast-pipeline
//!
//! The per-pane streaming pipeline behind gridcast's tiled player: one
//! source fanned out to N decoder panes, each draining its own lock-free
//! ring through a custom stream protocol, with an adaptive latency
//! controller that speeds playback up to shrink queued backlog.
//!
//! This crate is part of the [gridcast](https://github.com/gridcast/gridcast)
//! workspace and composes [`gridcast_ring`] and [`gridcast_mpv`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       PaneSupervisor                         │
//! │                                                              │
//! │  SourceReader (one thread, file mode)                        │
//! │      │ 32 KiB slices every 40 ms, broadcast in pane order    │
//! │      ▼                                                       │
//! │  ┌───────────── Pane[i] ─────────────────────────────────┐   │
//! │  │  ByteRing ──► RingSource ──► decoder pull callbacks   │   │
//! │  │     │                                                 │   │
//! │  │     └─► LatencyController (bitrate window, speed)     │   │
//! │  │                                                       │   │
//! │  │  event pump thread ◄── wait_event(16 ms)              │   │
//! │  │     • re-emit decoder log lines                       │   │
//! │  │     • detect codec change → in-place restart          │   │
//! │  │     • extract decoded resolution → min-bitrate ladder │   │
//! │  └───────────────────────────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Concurrency Model
//!
//! Parallel OS threads with bounded sleeps; no event loop. Per pane: one
//! event pump thread plus whatever workers the decoder owns internally.
//! Process-global: one fan-out reader thread. Cancellation is cooperative
//! via stop flags on the rings and panes; a pane's `stop()` may be called
//! from the supervisor, from the pump thread itself (restart), and from
//! `Drop`, and detaches instead of joining when the pump is stopping its
//! own pane.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//! use gridcast_pipeline::{PaneSupervisor, SupervisorConfig, PlayerConfig};
//!
//! let config = SupervisorConfig::builder()
//!     .ways(4)
//!     .gpu_ways(2)
//!     .video_url("/data/stream.ts")
//!     .build();
//!
//! let backend = Arc::new(gridcast_mpv::MpvBackend);
//! let supervisor = PaneSupervisor::start(BTreeMap::new(), backend, config)?;
//! // panes are now playing; supervisor shutdown stops everything
//! ```

mod config;
mod error;
mod events;
mod fanout;
mod latency;
mod pane;
mod source;
mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{PlayerConfig, PlayerConfigBuilder, SupervisorConfig, SupervisorConfigBuilder, VALID_WAYS};
pub use error::{PipelineError, Result};
pub use events::{parse_resolution, CODEC_CHANGE_TEXT, VIDEO_SUBSTREAM_PREFIX};
pub use latency::LatencyController;
pub use pane::{ContainerWindow, Pane, PaneState};
pub use source::RingSource;
pub use supervisor::PaneSupervisor;
