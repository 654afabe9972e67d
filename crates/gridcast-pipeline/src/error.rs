//! Error types for pipeline operations
//!
//! Transient starvation is not an error: the ring reports it through
//! rate-limited diagnostics and the blocking calls simply back off. The
//! variants here are the failures a caller can actually act on.

use std::path::PathBuf;

use thiserror::Error;

use gridcast_mpv::DecoderError;

/// Errors that can occur while building or driving the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The requested pane count is not a supported grid
    ///
    /// Supported counts are 1, 4, 6, 8, 9 and 16 (see the grid layout
    /// contract).
    #[error("invalid pane count {0}: expected one of 1, 4, 6, 8, 9, 16")]
    InvalidWays(usize),

    /// A configuration value failed validation
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The pane's ring has no storage
    ///
    /// Raised when a stream source would be registered over an
    /// unallocated buffer.
    #[error("pane buffer not allocated")]
    BufferUnallocated,

    /// The decoder refused an option, command, or initialization
    #[error(transparent)]
    Decoder(#[from] DecoderError),

    /// A pane failed during `start`; already-started panes were torn down
    #[error("pane {pane} failed to start")]
    PaneStart {
        /// Index of the failing pane
        pane: usize,
        /// The underlying failure
        #[source]
        source: Box<PipelineError>,
    },

    /// The operation needs a running decoder handle and the pane has none
    #[error("pane is not running")]
    NotRunning,

    /// The decoder accepted the screenshot command but no usable file
    /// appeared within the polling window
    #[error("screenshot not produced at {}", .0.display())]
    ScreenshotTimeout(PathBuf),

    /// Reading the source file failed
    #[error("source read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
