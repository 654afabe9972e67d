//! Pane pipeline
//!
//! One pane composes a decoder handle, a ring, a latency controller, and
//! an event pump thread, and owns their shared lifecycle:
//!
//! ```text
//! Fresh → Running → (Restarting → Running)* → Stopped
//! ```
//!
//! `Stopped` is terminal unless the caller starts the pane again. The
//! restart transition is triggered by the pump thread on the recoverable
//! codec-change event and preserves the pane's identity, configuration,
//! container window, and every byte already queued in the ring.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, error, info};

use gridcast_mpv::{names, DecoderBackend, DecoderHandle, PropertyFormat, PropertyValue};
use gridcast_ring::ByteRing;

use crate::config::PlayerConfig;
use crate::error::{PipelineError, Result};
use crate::events;
use crate::latency::LatencyController;
use crate::source::RingSource;

/// Synthetic URL scheme the ring-backed stream source registers under.
pub(crate) const STREAM_SCHEME: &str = "myprotocol";

/// The URL that routes the decoder onto the registered stream source.
pub(crate) const STREAM_URL: &str = "myprotocol://fake";

/// Producer poll interval while a restart is in flight.
const RESTART_POLL: Duration = Duration::from_millis(5);

const SCREENSHOT_TIMEOUT: Duration = Duration::from_secs(3);
const SCREENSHOT_POLL: Duration = Duration::from_millis(100);
/// Anything smaller is an encoder artifact still being written.
const SCREENSHOT_MIN_BYTES: u64 = 1024;

/// A native window a pane renders into.
///
/// The grid toolkit that owns real windows is a collaborator outside this
/// crate; the pipeline only needs the native id to hand to the decoder and
/// a visibility toggle around start/stop.
pub trait ContainerWindow: Send + Sync {
    /// Platform window id, as the decoder's `wid` option expects it.
    fn native_id(&self) -> i64;

    /// Show or hide the window.
    fn set_visible(&self, visible: bool);
}

/// Observable pane lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneState {
    /// Constructed, never started.
    Fresh,
    /// Decoder handle live, pump running.
    Running,
    /// Between codec-change teardown and re-initialization.
    Restarting,
    /// Stopped; terminal unless started again.
    Stopped,
}

/// Everything `start` needs again on a restart.
#[derive(Clone)]
struct SavedStart {
    window: Option<Arc<dyn ContainerWindow>>,
    url: String,
    options: PlayerConfig,
}

/// One player pane.
///
/// The supervisor owns panes; the fan-out reader writes through a weak
/// reference to the pane's producer endpoint; the pump thread borrows the
/// pane to trigger restarts. Dropping the pane stops it.
pub struct Pane {
    inner: Arc<PaneInner>,
}

impl Pane {
    /// Create a pane with its ring allocated at `ring_capacity` bytes.
    ///
    /// `id` is the pane's identity, assigned by the supervisor.
    pub fn new(id: usize, backend: Arc<dyn DecoderBackend>, ring_capacity: usize) -> Self {
        Self {
            inner: Arc::new(PaneInner {
                id,
                backend,
                ring: Arc::new(ByteRing::new(ring_capacity)),
                latency: LatencyController::new(),
                stopping: AtomicBool::new(false),
                restarting: AtomicBool::new(false),
                started_once: AtomicBool::new(false),
                handle: Mutex::new(None),
                pump: Mutex::new(None),
                saved: Mutex::new(None),
            }),
        }
    }

    /// Pane identity.
    pub fn id(&self) -> usize {
        self.inner.id
    }

    /// Start playback.
    ///
    /// Runs the full bring-up sequence: handle creation, options, log
    /// request, initialization, pump spawn, ring reset, stream-mode
    /// selection (existing file → ring-fed custom protocol, anything else
    /// → direct URL), and finally shows the container window. Any failing
    /// step tears the pane back down and surfaces that step's error.
    pub fn start(
        &self,
        window: Option<Arc<dyn ContainerWindow>>,
        url: &str,
        options: &PlayerConfig,
    ) -> Result<()> {
        *self.inner.saved.lock() = Some(SavedStart {
            window,
            url: url.to_string(),
            options: options.clone(),
        });
        self.inner.start_from_saved()
    }

    /// Stop playback. Idempotent.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PaneState {
        self.inner.state()
    }

    /// Producer endpoint: write all of `buf` into the ring.
    ///
    /// Backs off in 5 ms steps while a restart is in flight, refuses with
    /// `false` once the pane is stopping, and otherwise feeds the latency
    /// controller after the bytes land.
    pub fn write(&self, buf: &[u8]) -> bool {
        self.inner.write(buf)
    }

    /// Consumer endpoint: non-blocking drain of the ring.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        self.inner.ring.get(buf)
    }

    /// Bytes currently queued in the ring.
    pub fn ring_occupancy(&self) -> usize {
        self.inner.ring.available_data()
    }

    /// The latency controller's view of this pane.
    pub fn latency(&self) -> &LatencyController {
        &self.inner.latency
    }

    /// Resume playback.
    pub fn play(&self) -> Result<()> {
        self.handle()?.command(&[names::CMD_PLAY])?;
        Ok(())
    }

    /// Pause playback.
    pub fn pause(&self) -> Result<()> {
        self.handle()?.command(&[names::CMD_PAUSE])?;
        Ok(())
    }

    /// Advance one frame while paused.
    pub fn frame_step(&self) -> Result<()> {
        self.handle()?.command(&[names::CMD_FRAME_STEP])?;
        Ok(())
    }

    /// Current mute state.
    pub fn mute(&self) -> Result<bool> {
        let value = self.handle()?.get_property(names::MUTE, PropertyFormat::Flag)?;
        Ok(value.as_flag().unwrap_or(false))
    }

    /// Set the mute state.
    pub fn set_mute(&self, mute: bool) -> Result<()> {
        self.handle()?.set_property(names::MUTE, PropertyValue::Flag(mute))?;
        Ok(())
    }

    /// Current volume, 0-100.
    pub fn volume(&self) -> Result<i64> {
        let value = self.handle()?.get_property(names::VOLUME, PropertyFormat::Double)?;
        Ok(value.as_double().unwrap_or(0.0) as i64)
    }

    /// Set the volume.
    pub fn set_volume(&self, volume: i64) -> Result<()> {
        self.handle()?
            .set_property(names::VOLUME, PropertyValue::Double(volume as f64))?;
        Ok(())
    }

    /// Decoded resolution: the cached dimensions once the event pump has
    /// seen them, else the decoder's `width`/`height` properties.
    pub fn resolution(&self) -> Result<(i64, i64)> {
        if let Some((width, height)) = self.inner.latency.resolution() {
            return Ok((i64::from(width), i64::from(height)));
        }
        let handle = self.handle()?;
        let width = handle.get_property(names::WIDTH, PropertyFormat::Int)?;
        let height = handle.get_property(names::HEIGHT, PropertyFormat::Int)?;
        Ok((width.as_int().unwrap_or(0), height.as_int().unwrap_or(0)))
    }

    /// Current playback speed.
    pub fn speed(&self) -> Result<f64> {
        let value = self.handle()?.get_property(names::SPEED, PropertyFormat::Double)?;
        Ok(value.as_double().unwrap_or(1.0))
    }

    /// Set the playback speed.
    pub fn set_speed(&self, speed: f64) -> Result<()> {
        self.handle()?
            .set_property(names::SPEED, PropertyValue::Double(speed))?;
        Ok(())
    }

    /// Input bitrate in bytes per second: the controller's estimate when
    /// it has one, else the decoder's own `video-bitrate` measure, else 0.
    pub fn bitrate(&self) -> i64 {
        let estimated = self.inner.latency.estimated_bitrate();
        if estimated > 0 {
            return estimated as i64;
        }
        match self.handle() {
            Ok(handle) => handle
                .get_property(names::VIDEO_BITRATE, PropertyFormat::Int)
                .ok()
                .and_then(|v| v.as_int())
                .unwrap_or(0),
            Err(_) => 0,
        }
    }

    /// Decoder frame-rate estimate, defaulting to the nominal 25.
    pub fn fps(&self) -> i64 {
        match self.handle() {
            Ok(handle) => match handle.get_property(names::ESTIMATED_VF_FPS, PropertyFormat::Int) {
                Ok(PropertyValue::Int(v)) if v >= 0 => v,
                _ => 25,
            },
            Err(_) => 25,
        }
    }

    /// Grab the current frame to `<temp>/<epoch_ms>.jpeg`.
    ///
    /// The decoder writes the file asynchronously, so the produced path is
    /// polled every 100 ms for up to 3 s until it reaches a plausible size.
    pub fn screenshot(&self) -> Result<PathBuf> {
        let handle = self.handle()?;

        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let path = std::env::temp_dir().join(format!("{epoch_ms}.jpeg"));
        let path_arg = path.to_string_lossy().into_owned();
        handle.command(&[names::CMD_SCREENSHOT_TO_FILE, &path_arg])?;

        let deadline = Instant::now() + SCREENSHOT_TIMEOUT;
        while Instant::now() < deadline {
            if let Ok(meta) = std::fs::metadata(&path) {
                if meta.len() >= SCREENSHOT_MIN_BYTES {
                    return Ok(path);
                }
            }
            thread::sleep(SCREENSHOT_POLL);
        }
        Err(PipelineError::ScreenshotTimeout(path))
    }

    /// Flag the pane as stopping and wake anything blocked on its ring,
    /// without joining threads.
    pub(crate) fn signal_stop(&self) {
        self.inner.signal_stop();
    }

    /// Non-owning producer endpoint for the fan-out reader.
    pub(crate) fn writer(&self) -> Weak<PaneInner> {
        Arc::downgrade(&self.inner)
    }

    fn handle(&self) -> Result<Arc<dyn DecoderHandle>> {
        self.inner.handle.lock().clone().ok_or(PipelineError::NotRunning)
    }
}

impl Drop for Pane {
    fn drop(&mut self) {
        self.inner.stop();
    }
}

/// Shared pane state: the supervisor owns it through [`Pane`], the pump
/// thread and fan-out reader borrow it weakly.
pub(crate) struct PaneInner {
    id: usize,
    backend: Arc<dyn DecoderBackend>,
    ring: Arc<ByteRing>,
    latency: LatencyController,
    stopping: AtomicBool,
    restarting: AtomicBool,
    started_once: AtomicBool,
    handle: Mutex<Option<Arc<dyn DecoderHandle>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    saved: Mutex<Option<SavedStart>>,
}

impl PaneInner {
    pub(crate) fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Relaxed)
    }

    pub(crate) fn latency(&self) -> &LatencyController {
        &self.latency
    }

    /// In-place restart on the recoverable codec event. Runs on the pump
    /// thread, which is why `stop` detaches rather than joins it.
    pub(crate) fn restart(self: &Arc<Self>) {
        self.restarting.store(true, Ordering::Relaxed);
        self.stop();
        if let Err(error) = self.start_from_saved() {
            error!(pane = self.id, %error, "restart failed, pane left stopped");
        }
        self.restarting.store(false, Ordering::Relaxed);
    }

    pub(crate) fn write(&self, buf: &[u8]) -> bool {
        while self.restarting.load(Ordering::Relaxed) {
            thread::sleep(RESTART_POLL);
        }
        if self.stopping.load(Ordering::Relaxed) {
            return false;
        }

        self.ring.put_blocking(buf);
        if self.stopping.load(Ordering::Relaxed) {
            return false;
        }

        let handle = self.handle.lock().clone();
        if let Some(handle) = handle {
            self.latency
                .on_producer_write(buf.len(), self.ring.available_data(), handle.as_ref());
        }
        true
    }

    pub(crate) fn signal_stop(&self) {
        self.stopping.store(true, Ordering::Relaxed);
        self.ring.stopping();
    }

    fn state(&self) -> PaneState {
        if self.restarting.load(Ordering::Relaxed) {
            PaneState::Restarting
        } else if self.handle.lock().is_some() && !self.stopping.load(Ordering::Relaxed) {
            PaneState::Running
        } else if self.started_once.load(Ordering::Relaxed) {
            PaneState::Stopped
        } else {
            PaneState::Fresh
        }
    }

    fn start_from_saved(self: &Arc<Self>) -> Result<()> {
        let result = self.try_start();
        if result.is_err() {
            self.stop();
        }
        result
    }

    fn try_start(self: &Arc<Self>) -> Result<()> {
        let saved = self
            .saved
            .lock()
            .clone()
            .ok_or(PipelineError::NotRunning)?;
        let restarting = self.restarting.load(Ordering::Relaxed);
        let options = &saved.options;

        self.started_once.store(true, Ordering::Relaxed);
        self.latency.reset_for_start();

        let handle = self.backend.create_handle()?;

        if let Some(window) = &saved.window {
            handle.set_option(names::WID, PropertyValue::Int(window.native_id()))?;
        }

        for (name, value) in [
            (names::PROFILE, &options.profile),
            (names::VO, &options.vo),
            (names::HWDEC, &options.hwdec),
        ] {
            if !value.is_empty() {
                handle.set_option(name, PropertyValue::Text(value.clone()))?;
            }
        }

        // "auto" is the decoder's own default for these two; setting it
        // explicitly changes probing order on some builds.
        for (name, value) in [
            (names::GPU_API, &options.gpu_api),
            (names::GPU_CONTEXT, &options.gpu_context),
        ] {
            if !value.is_empty() && value != "auto" {
                handle.set_option(name, PropertyValue::Text(value.clone()))?;
            }
        }

        handle.set_option(names::KEEPASPECT, PropertyValue::Text("no".to_string()))?;

        if !options.decoder_log_level.is_empty() {
            handle.request_log_messages(&options.decoder_log_level)?;
        }

        handle.initialize()?;

        *self.handle.lock() = Some(handle.clone());
        self.stopping.store(false, Ordering::Relaxed);

        let pump = {
            let pane = Arc::downgrade(self);
            let handle = handle.clone();
            let id = self.id;
            thread::Builder::new()
                .name(format!("pane-{id}-pump"))
                .spawn(move || events::run_pump(pane, handle, id))?
        };
        *self.pump.lock() = Some(pump);

        if restarting {
            // Bytes queued before the codec change must survive, so only
            // the stop flag is cleared.
            self.ring.resume();
        } else {
            self.ring.reset(options.ring_capacity);
        }
        if self.ring.is_unallocated() {
            return Err(PipelineError::BufferUnallocated);
        }

        if Path::new(&saved.url).is_file() {
            handle.register_stream_source(
                STREAM_SCHEME,
                Arc::new(RingSource::new(self.ring.clone())),
            )?;
            handle.command(&[names::CMD_LOADFILE, STREAM_URL])?;
        } else {
            handle.command(&[names::CMD_LOADFILE, &saved.url])?;
        }

        if let Some(window) = &saved.window {
            window.set_visible(true);
        }

        info!(pane = self.id, url = %saved.url, restarting, "pane started");
        Ok(())
    }

    fn stop(&self) {
        let restarting = self.restarting.load(Ordering::Relaxed);

        self.stopping.store(true, Ordering::Relaxed);
        self.ring.stopping();

        let pump = self.pump.lock().take();
        if let Some(pump) = pump {
            if restarting {
                // The pump thread is stopping its own pane; joining here
                // would self-join. Dropping the handle detaches it.
                drop(pump);
            } else {
                let _ = pump.join();
            }
        }

        // Last Arc drop terminates and destroys the decoder.
        *self.handle.lock() = None;

        if restarting {
            return;
        }

        if let Some(saved) = self.saved.lock().take() {
            if let Some(window) = &saved.window {
                window.set_visible(false);
            }
        }
        debug!(pane = self.id, "pane stopped");
    }
}
