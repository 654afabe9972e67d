//! Command-line surface
//!
//! Flag spellings (with underscores) are part of the external contract;
//! existing deployments pass them from service files and scripts.

use std::path::PathBuf;

use clap::Parser;

/// Low-latency multi-pane video player front-end.
#[derive(Parser, Debug)]
#[command(name = "gridcast", version, about)]
pub struct Args {
    /// Log file path
    #[arg(long = "log_path", default_value = "gridcast.log")]
    pub log_path: PathBuf,

    /// Host log level (trace, debug, info, warn, error)
    #[arg(long = "log_level", default_value = "info")]
    pub log_level: String,

    /// Pane count; one of 1, 4, 6, 8, 9, 16
    #[arg(long = "ways", default_value_t = 1)]
    pub ways: usize,

    /// Panes that use GPU decoding; the rest decode in software
    /// (default: all of them)
    #[arg(long = "gpu_ways")]
    pub gpu_ways: Option<usize>,

    /// Video file path or stream URL (required; empty exits with -1)
    #[arg(long = "video_url", default_value = "")]
    pub video_url: String,

    /// Decoder profile
    #[arg(long = "profile", default_value = "low-latency")]
    pub profile: String,

    /// Decoder video output driver
    #[arg(long = "vo", default_value = "")]
    pub vo: String,

    /// Decoder hardware decoding mode
    #[arg(long = "hwdec", default_value = "auto")]
    pub hwdec: String,

    /// Decoder GPU API
    #[arg(long = "gpu_api", default_value = "")]
    pub gpu_api: String,

    /// Decoder GPU context
    #[arg(long = "gpu_context", default_value = "")]
    pub gpu_context: String,

    /// Minimum decoder log level to forward (decoder spelling)
    #[arg(long = "mpv_log_level", default_value = "v")]
    pub mpv_log_level: String,

    /// Window left position
    #[arg(long = "window_left_pos", default_value_t = 0)]
    pub window_left_pos: i32,

    /// Window top position
    #[arg(long = "window_top_pos", default_value_t = 0)]
    pub window_top_pos: i32,

    /// Window width
    #[arg(long = "window_width", default_value_t = 800)]
    pub window_width: u32,

    /// Window height
    #[arg(long = "window_height", default_value_t = 480)]
    pub window_height: u32,

    /// Per-pane ring capacity in bytes
    #[arg(long = "buffer_size", default_value_t = 10 * 1024 * 1024)]
    pub buffer_size: usize,

    /// Native window ids supplied by an embedding shell, one per pane in
    /// index order; panes without one get the decoder's own window
    #[arg(long = "wids", value_delimiter = ',')]
    pub wids: Vec<i64>,
}
