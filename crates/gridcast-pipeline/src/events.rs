//! Event pump and decoder log classification
//!
//! One pump thread per pane polls the decoder's event queue with a short
//! timeout and handles only log messages: each line is re-emitted into the
//! host log at a mapped severity, checked against the codec-change
//! signature, and scanned for the decoded resolution.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

use gridcast_mpv::{DecoderEvent, DecoderHandle, LogLevel, LogMessage};

use crate::pane::PaneInner;

/// Poll timeout for one `wait_event` call.
pub(crate) const WAIT_EVENT_TIMEOUT: Duration = Duration::from_millis(16);

/// Prefix the decoder uses for its video substream log lines.
pub const VIDEO_SUBSTREAM_PREFIX: &str = "ffmpeg/video";

/// The one recoverable codec event: the decoder cannot continue on the
/// current handle but a fresh handle decodes the stream fine.
pub const CODEC_CHANGE_TEXT: &str = "data partitioning is not implemented";

/// Pump loop body. Runs on a dedicated thread owned by the pane.
///
/// Exits when the pane is gone or stopping, when the decoder announces
/// shutdown, or after triggering a restart (the restart tears this
/// handle down and spawns a new pump for its successor).
pub(crate) fn run_pump(pane: Weak<PaneInner>, handle: Arc<dyn DecoderHandle>, pane_id: usize) {
    debug!(pane = pane_id, "event pump started");

    loop {
        let Some(inner) = pane.upgrade() else { break };
        if inner.is_stopping() {
            break;
        }

        match handle.wait_event(WAIT_EVENT_TIMEOUT) {
            DecoderEvent::Shutdown => break,
            DecoderEvent::Log(message) => {
                emit_decoder_log(pane_id, &message);

                if is_codec_change(&message) {
                    info!(pane = pane_id, "codec change reported, restarting pane");
                    inner.restart();
                    break;
                }

                if let Some((width, height)) = parse_resolution(&message.text) {
                    inner.latency().set_resolution(width, height);
                    info!(pane = pane_id, width, height, "decoded resolution detected");
                }
            }
            DecoderEvent::None | DecoderEvent::Other => {}
        }
    }

    debug!(pane = pane_id, "event pump exited");
}

/// Host log level a decoder message is re-emitted at.
///
/// The host taxonomy tops out at `error`, so FATAL maps there; NONE-level
/// messages are not re-emitted at all.
pub(crate) fn host_level(level: LogLevel) -> Option<tracing::Level> {
    match level {
        LogLevel::Trace => Some(tracing::Level::TRACE),
        LogLevel::Debug => Some(tracing::Level::DEBUG),
        LogLevel::Verbose | LogLevel::Info => Some(tracing::Level::INFO),
        LogLevel::Warn => Some(tracing::Level::WARN),
        LogLevel::Error | LogLevel::Fatal => Some(tracing::Level::ERROR),
        LogLevel::None => None,
    }
}

fn emit_decoder_log(pane_id: usize, message: &LogMessage) {
    let Some(level) = host_level(message.level) else {
        return;
    };
    let text = message.text.trim_end();
    let prefix = message.prefix.as_str();
    if level == tracing::Level::TRACE {
        trace!(pane = pane_id, prefix, "{text}");
    } else if level == tracing::Level::DEBUG {
        debug!(pane = pane_id, prefix, "{text}");
    } else if level == tracing::Level::INFO {
        info!(pane = pane_id, prefix, "{text}");
    } else if level == tracing::Level::WARN {
        warn!(pane = pane_id, prefix, "{text}");
    } else {
        error!(pane = pane_id, prefix, "{text}");
    }
}

/// Whether a log message is the recoverable codec-change event.
///
/// Requires all three: severity at least WARN (the decoder's scale runs
/// lower = more severe), the video substream prefix, and the literal
/// signature text.
pub(crate) fn is_codec_change(message: &LogMessage) -> bool {
    message.level.at_least_as_severe_as(LogLevel::Warn)
        && message.prefix.contains(VIDEO_SUBSTREAM_PREFIX)
        && message.text.contains(CODEC_CHANGE_TEXT)
}

/// Extract the decoded resolution from a decoder log line.
///
/// Two shapes are recognized:
///
/// - `Decoder format: 1920x1080 [0:1] ...`
/// - `reconfig to 720x480 yuv420p ...`
///
/// The width is the integer following the marker, the height the integer
/// following the next `x`; trailing text is ignored.
pub fn parse_resolution(text: &str) -> Option<(u32, u32)> {
    for marker in ["Decoder format: ", "reconfig to "] {
        if let Some(at) = text.find(marker) {
            let rest = &text[at + marker.len()..];
            let width = leading_u32(rest)?;
            let x = rest.find('x')?;
            let height = leading_u32(&rest[x + 1..])?;
            return Some((width, height));
        }
    }
    None
}

fn leading_u32(s: &str) -> Option<u32> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(level: LogLevel, prefix: &str, text: &str) -> LogMessage {
        LogMessage {
            level,
            prefix: prefix.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_codec_change_detection() {
        let hit = message(
            LogLevel::Warn,
            "ffmpeg/video",
            "... data partitioning is not implemented ...",
        );
        assert!(is_codec_change(&hit));

        // More severe than WARN still triggers.
        let error = message(
            LogLevel::Error,
            "ffmpeg/video",
            "data partitioning is not implemented and will fail",
        );
        assert!(is_codec_change(&error));
    }

    #[test]
    fn test_codec_change_requires_severity() {
        let info = message(
            LogLevel::Info,
            "ffmpeg/video",
            "data partitioning is not implemented",
        );
        assert!(!is_codec_change(&info));
    }

    #[test]
    fn test_codec_change_requires_video_prefix() {
        let audio = message(
            LogLevel::Warn,
            "ffmpeg/audio",
            "data partitioning is not implemented",
        );
        assert!(!is_codec_change(&audio));
    }

    #[test]
    fn test_codec_change_requires_signature_text() {
        let other = message(LogLevel::Warn, "ffmpeg/video", "co located POCs unavailable");
        assert!(!is_codec_change(&other));
    }

    #[test]
    fn test_parse_decoder_format_line() {
        let text = "Decoder format: 1920x1080 [0:1] d3d11[nv12] auto/auto CL=mpeg2/4/h264 crop=1920x1080+0+0";
        assert_eq!(parse_resolution(text), Some((1920, 1080)));
    }

    #[test]
    fn test_parse_reconfig_line() {
        let text = "reconfig to 720x480 yuv420p bt.601/bt.601-525/bt.1886/limited/display CL=mpeg2/4/h264";
        assert_eq!(parse_resolution(text), Some((720, 480)));

        // A bracketed prefix before the marker is fine.
        let prefixed = "[vo/gpu] reconfig to 1280x720 yuv420p";
        assert_eq!(parse_resolution(prefixed), Some((1280, 720)));
    }

    #[test]
    fn test_parse_rejects_unrelated_lines() {
        assert_eq!(parse_resolution("Using hardware decoding (d3d11va)."), None);
        assert_eq!(parse_resolution("Decoder format: garbage"), None);
        assert_eq!(parse_resolution(""), None);
    }

    #[test]
    fn test_host_level_mapping() {
        assert_eq!(host_level(LogLevel::Trace), Some(tracing::Level::TRACE));
        assert_eq!(host_level(LogLevel::Debug), Some(tracing::Level::DEBUG));
        assert_eq!(host_level(LogLevel::Verbose), Some(tracing::Level::INFO));
        assert_eq!(host_level(LogLevel::Info), Some(tracing::Level::INFO));
        assert_eq!(host_level(LogLevel::Warn), Some(tracing::Level::WARN));
        assert_eq!(host_level(LogLevel::Error), Some(tracing::Level::ERROR));
        assert_eq!(host_level(LogLevel::Fatal), Some(tracing::Level::ERROR));
        assert_eq!(host_level(LogLevel::None), None);
    }
}
