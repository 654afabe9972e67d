//! Pipeline configuration
//!
//! Plain structs with defaults, fluent builders, and a `validate()` that
//! reports every issue at once.

use crate::error::{PipelineError, Result};

/// Pane counts the grid layout supports.
///
/// Non-square counts reserve a larger first cell: 6 tiles as 3×3 with a
/// 2×2 first cell, 8 as 4×4 with a 3×3 first cell.
pub const VALID_WAYS: [usize; 6] = [1, 4, 6, 8, 9, 16];

/// Per-pane decoder and buffering options.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Decoder configuration profile (default: `low-latency`)
    pub profile: String,

    /// Video output driver (default: empty = decoder's choice)
    pub vo: String,

    /// Hardware decoding mode (default: `auto`)
    ///
    /// The supervisor clears this on panes beyond `gpu_ways`, which fall
    /// back to software decoding.
    pub hwdec: String,

    /// GPU API backend (default: empty; the literal `auto` is also
    /// treated as "don't set")
    pub gpu_api: String,

    /// GPU context backend (default: empty; `auto` treated as above)
    pub gpu_context: String,

    /// Minimum decoder log level to request, decoder spelling
    /// (default: `v`)
    pub decoder_log_level: String,

    /// Per-pane ring capacity in bytes, rounded up to a power of two
    /// (default: 10 MiB)
    pub ring_capacity: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            profile: "low-latency".to_string(),
            vo: String::new(),
            hwdec: "auto".to_string(),
            gpu_api: String::new(),
            gpu_context: String::new(),
            decoder_log_level: "v".to_string(),
            ring_capacity: 10 * 1024 * 1024,
        }
    }
}

impl PlayerConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> PlayerConfigBuilder {
        PlayerConfigBuilder::default()
    }

    /// Validate configuration and return any issues.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.ring_capacity == 0 {
            issues.push("ring_capacity must be at least 1 byte".to_string());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// Builder for [`PlayerConfig`].
#[derive(Debug, Clone, Default)]
pub struct PlayerConfigBuilder {
    profile: Option<String>,
    vo: Option<String>,
    hwdec: Option<String>,
    gpu_api: Option<String>,
    gpu_context: Option<String>,
    decoder_log_level: Option<String>,
    ring_capacity: Option<usize>,
}

impl PlayerConfigBuilder {
    /// Set the decoder profile.
    #[must_use]
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Set the video output driver.
    #[must_use]
    pub fn vo(mut self, vo: impl Into<String>) -> Self {
        self.vo = Some(vo.into());
        self
    }

    /// Set the hardware decoding mode.
    #[must_use]
    pub fn hwdec(mut self, hwdec: impl Into<String>) -> Self {
        self.hwdec = Some(hwdec.into());
        self
    }

    /// Set the GPU API backend.
    #[must_use]
    pub fn gpu_api(mut self, gpu_api: impl Into<String>) -> Self {
        self.gpu_api = Some(gpu_api.into());
        self
    }

    /// Set the GPU context backend.
    #[must_use]
    pub fn gpu_context(mut self, gpu_context: impl Into<String>) -> Self {
        self.gpu_context = Some(gpu_context.into());
        self
    }

    /// Set the minimum decoder log level (decoder spelling).
    #[must_use]
    pub fn decoder_log_level(mut self, level: impl Into<String>) -> Self {
        self.decoder_log_level = Some(level.into());
        self
    }

    /// Set the per-pane ring capacity in bytes.
    #[must_use]
    pub fn ring_capacity(mut self, bytes: usize) -> Self {
        self.ring_capacity = Some(bytes);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> PlayerConfig {
        let defaults = PlayerConfig::default();

        PlayerConfig {
            profile: self.profile.unwrap_or(defaults.profile),
            vo: self.vo.unwrap_or(defaults.vo),
            hwdec: self.hwdec.unwrap_or(defaults.hwdec),
            gpu_api: self.gpu_api.unwrap_or(defaults.gpu_api),
            gpu_context: self.gpu_context.unwrap_or(defaults.gpu_context),
            decoder_log_level: self.decoder_log_level.unwrap_or(defaults.decoder_log_level),
            ring_capacity: self.ring_capacity.unwrap_or(defaults.ring_capacity),
        }
    }
}

/// Supervisor-level configuration: pane counts, the source, and the
/// per-pane options.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Total pane count; must be one of [`VALID_WAYS`] (default: 1)
    pub ways: usize,

    /// Panes that keep the configured `hwdec`; the remainder decode in
    /// software (default: `None` = all of them)
    pub gpu_ways: Option<usize>,

    /// Video file path or network URL
    pub video_url: String,

    /// Per-pane options
    pub player: PlayerConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            ways: 1,
            gpu_ways: None,
            video_url: String::new(),
            player: PlayerConfig::default(),
        }
    }
}

impl SupervisorConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> SupervisorConfigBuilder {
        SupervisorConfigBuilder::default()
    }

    /// Panes that decode on the GPU, clamped to `ways`.
    pub fn effective_gpu_ways(&self) -> usize {
        self.gpu_ways.unwrap_or(self.ways).min(self.ways)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !VALID_WAYS.contains(&self.ways) {
            return Err(PipelineError::InvalidWays(self.ways));
        }
        if self.video_url.is_empty() {
            return Err(PipelineError::Config("video_url must not be empty".to_string()));
        }
        if let Err(issues) = self.player.validate() {
            return Err(PipelineError::Config(issues.join(", ")));
        }
        Ok(())
    }
}

/// Builder for [`SupervisorConfig`].
#[derive(Debug, Clone, Default)]
pub struct SupervisorConfigBuilder {
    ways: Option<usize>,
    gpu_ways: Option<usize>,
    video_url: Option<String>,
    player: Option<PlayerConfig>,
}

impl SupervisorConfigBuilder {
    /// Set the total pane count.
    #[must_use]
    pub fn ways(mut self, ways: usize) -> Self {
        self.ways = Some(ways);
        self
    }

    /// Set how many panes decode on the GPU.
    #[must_use]
    pub fn gpu_ways(mut self, gpu_ways: usize) -> Self {
        self.gpu_ways = Some(gpu_ways);
        self
    }

    /// Set the video file path or network URL.
    #[must_use]
    pub fn video_url(mut self, url: impl Into<String>) -> Self {
        self.video_url = Some(url.into());
        self
    }

    /// Set the per-pane options.
    #[must_use]
    pub fn player(mut self, player: PlayerConfig) -> Self {
        self.player = Some(player);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> SupervisorConfig {
        let defaults = SupervisorConfig::default();

        SupervisorConfig {
            ways: self.ways.unwrap_or(defaults.ways),
            gpu_ways: self.gpu_ways.or(defaults.gpu_ways),
            video_url: self.video_url.unwrap_or(defaults.video_url),
            player: self.player.unwrap_or(defaults.player),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_defaults() {
        let config = PlayerConfig::default();
        assert_eq!(config.profile, "low-latency");
        assert_eq!(config.hwdec, "auto");
        assert_eq!(config.decoder_log_level, "v");
        assert_eq!(config.ring_capacity, 10 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_player_builder() {
        let config = PlayerConfig::builder()
            .profile("fast")
            .vo("gpu")
            .hwdec("")
            .ring_capacity(1 << 20)
            .build();
        assert_eq!(config.profile, "fast");
        assert_eq!(config.vo, "gpu");
        assert!(config.hwdec.is_empty());
        assert_eq!(config.ring_capacity, 1 << 20);
    }

    #[test]
    fn test_zero_ring_capacity_rejected() {
        let config = PlayerConfig {
            ring_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_supervisor_validation() {
        let config = SupervisorConfig::builder()
            .ways(4)
            .video_url("rtsp://camera/main")
            .build();
        assert!(config.validate().is_ok());

        let bad_ways = SupervisorConfig::builder()
            .ways(5)
            .video_url("rtsp://camera/main")
            .build();
        assert!(matches!(
            bad_ways.validate(),
            Err(PipelineError::InvalidWays(5))
        ));

        let no_url = SupervisorConfig::builder().ways(1).build();
        assert!(matches!(no_url.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_gpu_ways_defaults_to_all() {
        let config = SupervisorConfig::builder()
            .ways(9)
            .video_url("x")
            .build();
        assert_eq!(config.effective_gpu_ways(), 9);

        let mixed = SupervisorConfig::builder()
            .ways(9)
            .gpu_ways(4)
            .video_url("x")
            .build();
        assert_eq!(mixed.effective_gpu_ways(), 4);

        let clamped = SupervisorConfig::builder()
            .ways(4)
            .gpu_ways(16)
            .video_url("x")
            .build();
        assert_eq!(clamped.effective_gpu_ways(), 4);
    }
}
