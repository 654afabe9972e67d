//! Pane supervisor
//!
//! Owns the panes and the fan-out reader. Construction is transactional:
//! panes come up in index order and the first failure tears down whatever
//! already started, in reverse. Shutdown wakes every producer, joins the
//! reader, then stops the panes: the reader only ever holds weak
//! references, so panes strictly outlive its iteration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info};

use gridcast_mpv::DecoderBackend;

use crate::config::SupervisorConfig;
use crate::error::{PipelineError, Result};
use crate::fanout::SourceReader;
use crate::pane::{ContainerWindow, Pane};

/// Supervises N panes playing one source.
pub struct PaneSupervisor {
    panes: Vec<Pane>,
    reader: Option<SourceReader>,
}

impl PaneSupervisor {
    /// Validate the configuration, start every pane, and (in file mode)
    /// spawn the fan-out reader.
    ///
    /// `windows` maps pane index to its container window; panes without
    /// an entry run with the decoder's own window. The first `gpu_ways`
    /// panes keep the configured `hwdec`, the remainder decode in
    /// software.
    pub fn start(
        windows: BTreeMap<usize, Arc<dyn ContainerWindow>>,
        backend: Arc<dyn DecoderBackend>,
        config: SupervisorConfig,
    ) -> Result<Self> {
        config.validate()?;
        let gpu_ways = config.effective_gpu_ways();
        info!(
            ways = config.ways,
            gpu_ways,
            url = %config.video_url,
            "starting pane supervisor"
        );

        let mut panes: Vec<Pane> = Vec::with_capacity(config.ways);
        for index in 0..config.ways {
            let mut options = config.player.clone();
            if index >= gpu_ways {
                options.hwdec.clear();
            }

            let pane = Pane::new(index, Arc::clone(&backend), options.ring_capacity);
            let window = windows.get(&index).cloned();
            if let Err(source) = pane.start(window, &config.video_url, &options) {
                error!(pane = index, error = %source, "pane start failed, tearing down");
                for started in panes.iter().rev() {
                    started.stop();
                }
                return Err(PipelineError::PaneStart {
                    pane: index,
                    source: Box::new(source),
                });
            }
            panes.push(pane);
        }

        let reader = if Path::new(&config.video_url).is_file() {
            let writers = panes.iter().map(Pane::writer).collect();
            match SourceReader::spawn(PathBuf::from(&config.video_url), writers) {
                Ok(reader) => Some(reader),
                Err(source) => {
                    for started in panes.iter().rev() {
                        started.stop();
                    }
                    return Err(PipelineError::Io(source));
                }
            }
        } else {
            None
        };

        info!(panes = panes.len(), file_mode = reader.is_some(), "supervisor started");
        Ok(Self { panes, reader })
    }

    /// The pane at `index`, if it exists.
    pub fn pane(&self, index: usize) -> Option<&Pane> {
        self.panes.get(index)
    }

    /// All panes, in index order.
    pub fn panes(&self) -> &[Pane] {
        &self.panes
    }

    /// Stop everything: wake producers, join the reader, stop panes.
    /// Idempotent.
    pub fn stop(&mut self) {
        for pane in &self.panes {
            pane.signal_stop();
        }
        if let Some(mut reader) = self.reader.take() {
            reader.shutdown();
        }
        for pane in self.panes.iter().rev() {
            pane.stop();
        }
        self.panes.clear();
    }
}

impl Drop for PaneSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlayerConfig;
    use crate::pane::PaneState;
    use crate::testing::{wait_for, ScriptedBackend};
    use gridcast_mpv::names;
    use std::io::Write as _;
    use std::time::{Duration, Instant};

    fn temp_source(len: usize) -> (tempfile::NamedTempFile, String) {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(&vec![3u8; len]).expect("write");
        let url = file.path().to_string_lossy().into_owned();
        (file, url)
    }

    #[test]
    fn test_starts_panes_with_mixed_decode_policy() {
        let (_file, url) = temp_source(128);
        let backend = ScriptedBackend::new();
        let config = SupervisorConfig::builder()
            .ways(4)
            .gpu_ways(2)
            .video_url(&url)
            .player(PlayerConfig::builder().ring_capacity(1 << 16).build())
            .build();

        let mut supervisor =
            PaneSupervisor::start(BTreeMap::new(), Arc::new(backend.clone()), config)
                .expect("supervisor start");

        assert_eq!(supervisor.panes().len(), 4);
        for index in 0..2 {
            assert!(
                backend.handle(index).has_option(names::HWDEC),
                "pane {index} should decode on the GPU"
            );
        }
        for index in 2..4 {
            assert!(
                !backend.handle(index).has_option(names::HWDEC),
                "pane {index} should decode in software"
            );
        }

        supervisor.stop();
        assert!(supervisor.panes().is_empty());
    }

    #[test]
    fn test_invalid_ways_rejected_before_any_pane() {
        let backend = ScriptedBackend::new();
        let config = SupervisorConfig::builder()
            .ways(7)
            .video_url("rtsp://camera/main")
            .build();

        let result = PaneSupervisor::start(BTreeMap::new(), Arc::new(backend.clone()), config);
        assert!(matches!(result, Err(PipelineError::InvalidWays(7))));
        assert_eq!(backend.created(), 0);
    }

    #[test]
    fn test_pane_failure_tears_down_started_panes() {
        let backend = ScriptedBackend::new();
        backend.fail_initialize_for(2);
        let config = SupervisorConfig::builder()
            .ways(4)
            .video_url("rtsp://camera/main")
            .build();

        let error = PaneSupervisor::start(BTreeMap::new(), Arc::new(backend.clone()), config)
            .err()
            .expect("supervisor start must fail");
        match error {
            PipelineError::PaneStart { pane, .. } => assert_eq!(pane, 2),
            other => panic!("expected PaneStart error, got {other}"),
        }
        // Construction stopped at the failing pane.
        assert_eq!(backend.created(), 3);
    }

    #[test]
    fn test_network_mode_has_no_reader() {
        let backend = ScriptedBackend::new();
        let config = SupervisorConfig::builder()
            .ways(1)
            .video_url("rtsp://camera/main")
            .build();

        let supervisor =
            PaneSupervisor::start(BTreeMap::new(), Arc::new(backend.clone()), config)
                .expect("supervisor start");

        assert!(supervisor.reader.is_none());
        assert_eq!(
            backend.handle(0).commands(),
            vec![vec![
                names::CMD_LOADFILE.to_string(),
                "rtsp://camera/main".to_string()
            ]]
        );
    }

    #[test]
    fn test_file_mode_broadcast_reaches_every_pane() {
        let (_file, url) = temp_source(2048);
        let backend = ScriptedBackend::new();
        let config = SupervisorConfig::builder()
            .ways(4)
            .video_url(&url)
            .player(PlayerConfig::builder().ring_capacity(1 << 16).build())
            .build();

        let supervisor =
            PaneSupervisor::start(BTreeMap::new(), Arc::new(backend.clone()), config)
                .expect("supervisor start");

        assert!(
            wait_for(Duration::from_secs(2), || supervisor
                .panes()
                .iter()
                .all(|p| p.ring_occupancy() == 2048)),
            "broadcast did not reach every pane"
        );
    }

    #[test]
    fn test_stop_with_blocked_producer_completes_promptly() {
        // Rings much smaller than the source, so the reader is parked in a
        // blocking put when stop arrives.
        let (_file, url) = temp_source(512 * 1024);
        let backend = ScriptedBackend::new();
        let config = SupervisorConfig::builder()
            .ways(4)
            .video_url(&url)
            .player(PlayerConfig::builder().ring_capacity(4096).build())
            .build();

        let mut supervisor =
            PaneSupervisor::start(BTreeMap::new(), Arc::new(backend.clone()), config)
                .expect("supervisor start");

        assert!(wait_for(Duration::from_secs(1), || supervisor
            .panes()
            .iter()
            .any(|p| p.ring_occupancy() > 0)));

        let begin = Instant::now();
        supervisor.stop();
        assert!(
            begin.elapsed() < Duration::from_secs(2),
            "stop took {:?} with a blocked producer",
            begin.elapsed()
        );
        assert!(supervisor.panes().is_empty());
    }

    #[test]
    fn test_source_eof_flags_every_pane() {
        let (_file, url) = temp_source(256);
        let backend = ScriptedBackend::new();
        let config = SupervisorConfig::builder()
            .ways(4)
            .video_url(&url)
            .player(PlayerConfig::builder().ring_capacity(1 << 16).build())
            .build();

        let supervisor =
            PaneSupervisor::start(BTreeMap::new(), Arc::new(backend.clone()), config)
                .expect("supervisor start");

        // One 256-byte slice, then EOF: the reader exits on its own and
        // flags every pane on the way out.
        assert!(
            wait_for(Duration::from_secs(2), || supervisor
                .panes()
                .iter()
                .all(|p| p.state() != PaneState::Running)),
            "EOF did not propagate to the panes"
        );
    }
}
