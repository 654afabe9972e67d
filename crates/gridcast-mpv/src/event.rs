//! Decoder events and log messages
//!
//! The event pump only acts on log messages; everything else the decoder
//! reports is classified as [`DecoderEvent::Other`] and ignored upstream.

use std::fmt;

/// One event drained from the decoder's event queue.
#[derive(Debug, Clone, PartialEq)]
pub enum DecoderEvent {
    /// The wait timed out with nothing queued.
    None,
    /// A diagnostic line from the decoder's logger.
    Log(LogMessage),
    /// The decoder is shutting down; no further events will arrive.
    Shutdown,
    /// Any other event kind; the pipeline does not consume these.
    Other,
}

/// A log line reported by the decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct LogMessage {
    /// Severity on the decoder's own scale.
    pub level: LogLevel,
    /// Module prefix, e.g. `ffmpeg/video` for the video substream.
    pub prefix: String,
    /// Message text, without a trailing newline guarantee either way.
    pub text: String,
}

/// Decoder log severity.
///
/// Numeric values follow the decoder's scale where a *lower* value is
/// *more* severe; `None` means "no messages" and never appears on an
/// actual message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum LogLevel {
    /// No messages requested.
    None = 0,
    /// The decoder cannot continue.
    Fatal = 10,
    /// An operation failed.
    Error = 20,
    /// Something unexpected that playback survives.
    Warn = 30,
    /// Informational.
    Info = 40,
    /// Verbose informational ("v" on the decoder's CLI scale).
    Verbose = 50,
    /// Debugging noise.
    Debug = 60,
    /// Extremely noisy tracing.
    Trace = 70,
}

impl LogLevel {
    /// Map a raw decoder level to the enum.
    ///
    /// Unknown values are clamped to the nearest defined level below them
    /// so a newer decoder cannot make classification panic.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            i32::MIN..=9 => LogLevel::None,
            10..=19 => LogLevel::Fatal,
            20..=29 => LogLevel::Error,
            30..=39 => LogLevel::Warn,
            40..=49 => LogLevel::Info,
            50..=59 => LogLevel::Verbose,
            60..=69 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// Whether this level is at least as severe as `other`.
    ///
    /// Severity runs opposite to the numeric value: `Fatal` (10) is more
    /// severe than `Warn` (30).
    pub fn at_least_as_severe_as(self, other: LogLevel) -> bool {
        (self as i32) <= (other as i32)
    }

    /// The decoder's string spelling of the level, as accepted by
    /// `request_log_messages`.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::None => "no",
            LogLevel::Fatal => "fatal",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Verbose => "v",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_known_values() {
        assert_eq!(LogLevel::from_raw(0), LogLevel::None);
        assert_eq!(LogLevel::from_raw(10), LogLevel::Fatal);
        assert_eq!(LogLevel::from_raw(30), LogLevel::Warn);
        assert_eq!(LogLevel::from_raw(50), LogLevel::Verbose);
        assert_eq!(LogLevel::from_raw(70), LogLevel::Trace);
    }

    #[test]
    fn test_from_raw_clamps_unknown_values() {
        assert_eq!(LogLevel::from_raw(35), LogLevel::Warn);
        assert_eq!(LogLevel::from_raw(-3), LogLevel::None);
        assert_eq!(LogLevel::from_raw(90), LogLevel::Trace);
    }

    #[test]
    fn test_severity_ordering_is_inverted() {
        assert!(LogLevel::Fatal.at_least_as_severe_as(LogLevel::Warn));
        assert!(LogLevel::Warn.at_least_as_severe_as(LogLevel::Warn));
        assert!(!LogLevel::Info.at_least_as_severe_as(LogLevel::Warn));
    }
}
