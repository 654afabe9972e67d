//! Decoder capability traits and typed option/property values
//!
//! The pipeline talks to the decoder only through these traits. The real
//! backend wraps libmpv; tests script a fake. Options and properties are
//! typed over four primitive shapes, expressed as one tagged variant with
//! a single dispatch point in each backend.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::event::DecoderEvent;

/// A typed option or property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Boolean flag.
    Flag(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// Double-precision float.
    Double(f64),
    /// UTF-8 string.
    Text(String),
}

impl PropertyValue {
    /// The format tag of this value.
    pub fn format(&self) -> PropertyFormat {
        match self {
            PropertyValue::Flag(_) => PropertyFormat::Flag,
            PropertyValue::Int(_) => PropertyFormat::Int,
            PropertyValue::Double(_) => PropertyFormat::Double,
            PropertyValue::Text(_) => PropertyFormat::Text,
        }
    }

    /// The flag payload, if this is a flag.
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            PropertyValue::Flag(v) => Some(*v),
            _ => None,
        }
    }

    /// The integer payload, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The double payload, if this is a double.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            PropertyValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// The string payload, if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Flag(v) => write!(f, "{v}"),
            PropertyValue::Int(v) => write!(f, "{v}"),
            PropertyValue::Double(v) => write!(f, "{v}"),
            PropertyValue::Text(v) => f.write_str(v),
        }
    }
}

/// Requested shape for a typed property read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyFormat {
    /// Boolean flag.
    Flag,
    /// Signed 64-bit integer.
    Int,
    /// Double-precision float.
    Double,
    /// UTF-8 string.
    Text,
}

/// A pull-mode read-only byte stream the decoder drains.
///
/// Registered under a synthetic URL scheme; the decoder calls `read` from
/// its own demuxer thread whenever it wants more input.
///
/// Implementations must never call back into a [`DecoderHandle`]: the
/// decoder may hold internal locks across these callbacks and re-entry
/// deadlocks inside the library.
pub trait StreamSource: Send + Sync {
    /// Fill `buf` with up to `buf.len()` bytes and return the count.
    ///
    /// May return 0 repeatedly while the producer is starved; the decoder
    /// retries.
    fn read(&self, buf: &mut [u8]) -> usize;

    /// Total stream size, when known. Live streams return `None`
    /// (unsupported).
    fn size(&self) -> Option<u64> {
        None
    }

    /// Reposition the stream. Live streams refuse (`false` = unsupported).
    fn seek(&self, _offset: u64) -> bool {
        false
    }

    /// The decoder is done with the stream. Must not touch the decoder.
    fn close(&self) {}
}

/// One live decoder instance.
///
/// All methods are callable from any thread; the backend is responsible
/// for whatever internal synchronisation its library needs. Dropping the
/// handle terminates and destroys the underlying decoder.
pub trait DecoderHandle: Send + Sync {
    /// Set a pre-initialization option.
    fn set_option(&self, name: &str, value: PropertyValue) -> Result<()>;

    /// Finish construction; options are frozen after this.
    fn initialize(&self) -> Result<()>;

    /// Run a decoder command, e.g. `["loadfile", url]`.
    fn command(&self, args: &[&str]) -> Result<()>;

    /// Read a property in the requested format.
    fn get_property(&self, name: &str, format: PropertyFormat) -> Result<PropertyValue>;

    /// Write a property.
    fn set_property(&self, name: &str, value: PropertyValue) -> Result<()>;

    /// Ask the decoder to queue log messages at `min_level` and above
    /// (decoder spelling, e.g. `"v"`).
    fn request_log_messages(&self, min_level: &str) -> Result<()>;

    /// Register `source` as the read-only stream protocol for `scheme`.
    ///
    /// A later `loadfile scheme://...` routes reads through `source`.
    fn register_stream_source(&self, scheme: &str, source: Arc<dyn StreamSource>) -> Result<()>;

    /// Block up to `timeout` for the next event.
    fn wait_event(&self, timeout: Duration) -> DecoderEvent;
}

/// Factory for decoder handles.
///
/// Panes keep the backend so an in-place restart can mint a fresh handle
/// with the saved configuration.
pub trait DecoderBackend: Send + Sync {
    /// Create an unconfigured, uninitialized handle.
    fn create_handle(&self) -> Result<Arc<dyn DecoderHandle>>;
}

/// Property and command names the pipeline exchanges with the decoder.
///
/// These strings are the external contract with the decoder library; the
/// pipeline never invents others.
pub mod names {
    /// Native window id to embed the video output in.
    pub const WID: &str = "wid";
    /// Configuration profile, e.g. `low-latency`.
    pub const PROFILE: &str = "profile";
    /// Video output driver.
    pub const VO: &str = "vo";
    /// Hardware decoding mode.
    pub const HWDEC: &str = "hwdec";
    /// GPU API backend.
    pub const GPU_API: &str = "gpu-api";
    /// GPU context backend.
    pub const GPU_CONTEXT: &str = "gpu-context";
    /// Whether to letterbox to the source aspect ratio.
    pub const KEEPASPECT: &str = "keepaspect";
    /// Audio mute state.
    pub const MUTE: &str = "mute";
    /// Audio volume, 0-100.
    pub const VOLUME: &str = "volume";
    /// Playback speed multiplier.
    pub const SPEED: &str = "speed";
    /// Decoded video width.
    pub const WIDTH: &str = "width";
    /// Decoded video height.
    pub const HEIGHT: &str = "height";
    /// Bitrate the decoder measures on the video track.
    pub const VIDEO_BITRATE: &str = "video-bitrate";
    /// Decoder's estimate of the video filter frame rate.
    pub const ESTIMATED_VF_FPS: &str = "estimated-vf-fps";

    /// Load and play a URL.
    pub const CMD_LOADFILE: &str = "loadfile";
    /// Resume playback.
    pub const CMD_PLAY: &str = "play";
    /// Pause playback.
    pub const CMD_PAUSE: &str = "pause";
    /// Advance one frame while paused.
    pub const CMD_FRAME_STEP: &str = "frame-step";
    /// Write the current frame to an image file.
    pub const CMD_SCREENSHOT_TO_FILE: &str = "screenshot-to-file";
}
