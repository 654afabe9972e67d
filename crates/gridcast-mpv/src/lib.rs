//! # gridcast-mpv
//!
//! Typed decoder-handle adapter over libmpv for gridcast panes.
//!
//! This crate is part of the [gridcast](https://github.com/gridcast/gridcast)
//! workspace. It expresses the capability set a pane needs from a media
//! decoder (create, configure, command, properties, log events, custom
//! stream protocol) as object-safe traits, so the streaming pipeline can
//! run against the real libmpv backend or a scripted test double.
//!
//! # Features
//!
//! - **Capability Traits**: [`DecoderBackend`] mints handles, [`DecoderHandle`]
//!   drives one decoder instance
//! - **Tagged Values**: options and properties are a single
//!   [`PropertyValue`] variant type with one dispatch point, not four
//!   overloads
//! - **Pull-Mode Streams**: [`StreamSource`] is the read-only stream
//!   protocol a handle can register under a synthetic URL scheme
//! - **Structured Failures**: every failing call logs the call name, its
//!   arguments, and the decoder's error text, and surfaces a typed error
//!
//! # Requirements
//!
//! The `libmpv` cargo feature links against the system libmpv (the
//! `mpv_create`/`mpv_stream_cb_add_ro` client surface). It is off by
//! default so the workspace builds and tests everywhere; without it the
//! crate provides only the traits and value types.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use gridcast_mpv::{DecoderBackend, MpvBackend, PropertyValue};
//!
//! let backend = MpvBackend;
//! let handle = backend.create_handle()?;
//! handle.set_option("keepaspect", PropertyValue::Text("no".into()))?;
//! handle.initialize()?;
//! handle.command(&["loadfile", "rtsp://camera/stream"])?;
//! ```
//!
//! # Deadlock Contract
//!
//! Stream-source callbacks run on decoder-internal threads while the
//! decoder may hold its own locks. A [`StreamSource`] implementation must
//! never call back into any [`DecoderHandle`] method; doing so deadlocks
//! inside the decoder library.

mod api;
mod error;
mod event;

#[cfg(feature = "libmpv")]
mod mpv;

pub use api::{names, DecoderBackend, DecoderHandle, PropertyFormat, PropertyValue, StreamSource};
pub use error::{DecoderError, Result};
pub use event::{DecoderEvent, LogLevel, LogMessage};

#[cfg(feature = "libmpv")]
pub use mpv::MpvBackend;
