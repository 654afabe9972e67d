//! Adaptive latency control
//!
//! The controller watches the producer side of a pane's ring, keeps a
//! running bitrate estimate over a 2 s window, and nudges the decoder's
//! playback speed up whenever the queued backlog exceeds a few seconds of
//! video. That speed-up is the mechanism that keeps a pane "low latency"
//! under jitter or a burst of input.
//!
//! # Overview
//!
//! Every successful producer write feeds the controller:
//!
//! 1. Bytes accumulate in the current measurement window. When the window
//!    is old enough, the estimated bitrate flushes out of it, normalized
//!    by the estimated baseline speed (`ceil(fps / 25)`, floored at 1.0)
//!    so a speed-up doesn't inflate the next estimate.
//! 2. `lag_seconds = ring_occupancy / estimated_bitrate` picks a playback
//!    speed from a ladder: under 6 s plays at the baseline, then 1.4,
//!    1.6, 1.8 and finally 2.0 at 12 s and beyond.
//! 3. A resolution-derived minimum bitrate gates the whole ladder:
//!    speeding up a starving stream only makes the starvation worse.
//!
//! Speed is only pushed to the decoder when the chosen value differs from
//! the decoder's current reading and exceeds the baseline, so a stable
//! stream sees no property churn.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use gridcast_mpv::{names, DecoderHandle, PropertyFormat, PropertyValue};

/// Length of one bitrate measurement window.
const BITRATE_WINDOW: Duration = Duration::from_secs(2);

/// Nominal frame rate the baseline speed is measured against.
const NOMINAL_FPS: f64 = 25.0;

/// Producer-side accumulator for the current measurement window.
struct InputWindow {
    bytes: u64,
    since: Instant,
}

/// Running bitrate estimate and speed ladder for one pane.
///
/// The window accumulator is owned by the producer thread (behind an
/// uncontended mutex); the estimate, baseline, resolution, and minimum
/// bitrate are atomics written by the producer and event-pump threads.
/// Control-surface readers accept eventual consistency.
pub struct LatencyController {
    window: Mutex<InputWindow>,

    /// Estimated input bitrate in bytes per second; 0 until the first flush.
    estimated_bitrate: AtomicU64,

    /// Ladder gate derived from the decoded resolution; 0 until known.
    min_bitrate: AtomicU64,

    /// Baseline playback speed as f64 bits, `max(1.0, ceil(fps / 25))`.
    baseline_bits: AtomicU64,

    /// Decoded dimensions; 0 until the event pump extracts them.
    width: AtomicU32,
    height: AtomicU32,
}

impl Default for LatencyController {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyController {
    /// Create a controller with no estimate and a baseline speed of 1.0.
    pub fn new() -> Self {
        Self {
            window: Mutex::new(InputWindow {
                bytes: 0,
                since: Instant::now(),
            }),
            estimated_bitrate: AtomicU64::new(0),
            min_bitrate: AtomicU64::new(0),
            baseline_bits: AtomicU64::new(1.0f64.to_bits()),
            width: AtomicU32::new(0),
            height: AtomicU32::new(0),
        }
    }

    /// Reset the per-start state: decoded resolution, baseline speed, and
    /// the window timestamp. The bitrate estimate survives a restart.
    pub fn reset_for_start(&self) {
        self.width.store(0, Ordering::Relaxed);
        self.height.store(0, Ordering::Relaxed);
        self.baseline_bits.store(1.0f64.to_bits(), Ordering::Relaxed);
        self.window.lock().since = Instant::now();
    }

    /// Feed one successful producer write.
    ///
    /// `occupancy` is the ring's queued byte count after the write.
    /// Called from the producer thread only.
    pub fn on_producer_write(&self, len: usize, occupancy: usize, handle: &dyn DecoderHandle) {
        self.estimate_bitrate(len, handle);
        self.reduce_latency(occupancy, handle);
    }

    /// Record the decoded resolution and derive the minimum-bitrate gate.
    ///
    /// Called from the event-pump thread when a resolution message parses.
    pub fn set_resolution(&self, width: u32, height: u32) {
        self.width.store(width, Ordering::Relaxed);
        self.height.store(height, Ordering::Relaxed);
        let min = min_bitrate_for(width, height);
        self.min_bitrate.store(min, Ordering::Relaxed);
        debug!(width, height, min_bitrate = min, "minimum bitrate derived from resolution");
    }

    /// Estimated input bitrate in bytes per second; 0 before the first
    /// window flush.
    pub fn estimated_bitrate(&self) -> u64 {
        self.estimated_bitrate.load(Ordering::Relaxed)
    }

    /// Minimum bitrate gate in bytes per second; 0 before the resolution
    /// is known.
    pub fn min_bitrate(&self) -> u64 {
        self.min_bitrate.load(Ordering::Relaxed)
    }

    /// Estimated baseline speed, `max(1.0, ceil(fps / 25))`.
    pub fn baseline_speed(&self) -> f64 {
        f64::from_bits(self.baseline_bits.load(Ordering::Relaxed))
    }

    /// Decoded dimensions once the event pump has extracted them.
    pub fn resolution(&self) -> Option<(u32, u32)> {
        let width = self.width.load(Ordering::Relaxed);
        let height = self.height.load(Ordering::Relaxed);
        if width > 0 && height > 0 {
            Some((width, height))
        } else {
            None
        }
    }

    fn estimate_bitrate(&self, len: usize, handle: &dyn DecoderHandle) {
        let mut window = self.window.lock();
        window.bytes += len as u64;

        let elapsed = window.since.elapsed();
        if elapsed < BITRATE_WINDOW {
            return;
        }

        let baseline = (read_fps(handle) / NOMINAL_FPS).ceil().max(1.0);
        self.baseline_bits.store(baseline.to_bits(), Ordering::Relaxed);

        let elapsed_ms = elapsed.as_millis() as u64;
        let bitrate = (window.bytes as f64 * 1000.0 / elapsed_ms as f64 / baseline).round() as u64;
        self.estimated_bitrate.store(bitrate, Ordering::Relaxed);

        debug!(
            bitrate,
            baseline,
            window_bytes = window.bytes,
            elapsed_ms,
            "bitrate window flushed"
        );

        window.bytes = 0;
        window.since = Instant::now();
    }

    fn reduce_latency(&self, occupancy: usize, handle: &dyn DecoderHandle) {
        let bitrate = self.effective_bitrate(handle);
        if bitrate == 0 {
            return;
        }

        let lag_seconds = occupancy as f64 / bitrate as f64;
        let baseline = self.baseline_speed();
        let gated = bitrate >= self.min_bitrate();

        let target = if gated { speed_for_lag(lag_seconds) } else { None };

        let current = match handle.get_property(names::SPEED, PropertyFormat::Double) {
            Ok(PropertyValue::Double(v)) => v,
            _ => return,
        };

        match target {
            Some(speed) => {
                // A baseline already at or above the ladder step means the
                // stream is meant to play that fast; don't fight it.
                if baseline < speed && (speed - current).abs() > f64::EPSILON {
                    let _ = handle.set_property(names::SPEED, PropertyValue::Double(speed));
                }
            }
            None => {
                if (baseline - current).abs() > f64::EPSILON {
                    let _ = handle.set_property(names::SPEED, PropertyValue::Double(baseline));
                }
            }
        }
    }

    /// The estimate when available, else the decoder's own measure.
    fn effective_bitrate(&self, handle: &dyn DecoderHandle) -> u64 {
        let estimated = self.estimated_bitrate();
        if estimated > 0 {
            return estimated;
        }
        match handle.get_property(names::VIDEO_BITRATE, PropertyFormat::Int) {
            Ok(PropertyValue::Int(v)) if v > 0 => v as u64,
            _ => 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn force_estimated_bitrate(&self, bitrate: u64) {
        self.estimated_bitrate.store(bitrate, Ordering::Relaxed);
    }

    #[cfg(test)]
    pub(crate) fn backdate_window(&self, by: Duration) {
        self.window.lock().since = Instant::now() - by;
    }
}

/// Decoder's frame-rate estimate, defaulting to the nominal 25 when the
/// property is unavailable.
fn read_fps(handle: &dyn DecoderHandle) -> f64 {
    match handle.get_property(names::ESTIMATED_VF_FPS, PropertyFormat::Int) {
        Ok(PropertyValue::Int(v)) if v >= 0 => v as f64,
        _ => NOMINAL_FPS,
    }
}

/// The lag-to-speed ladder. `None` below the 6 s threshold: play at the
/// baseline.
fn speed_for_lag(lag_seconds: f64) -> Option<f64> {
    if lag_seconds >= 12.0 {
        Some(2.0)
    } else if lag_seconds >= 10.0 {
        Some(1.8)
    } else if lag_seconds >= 8.0 {
        Some(1.6)
    } else if lag_seconds >= 6.0 {
        Some(1.4)
    } else {
        None
    }
}

/// Minimum-bitrate gate (bytes/s) for a decoded resolution.
pub(crate) fn min_bitrate_for(width: u32, height: u32) -> u64 {
    let area = u64::from(width) * u64::from(height);
    if area >= 3840 * 2160 {
        1600 * 1024 / 4
    } else if area >= 2560 * 1440 {
        800 * 1024 / 4
    } else if area >= 1920 * 1080 {
        400 * 1024 / 4
    } else if area >= 1280 * 720 {
        200 * 1024 / 4
    } else {
        100 * 1024 / 4
    }
}
