//! gridcast binary
//!
//! Wiring only: parse the CLI, install the log subscriber, compute the
//! grid geometry, and hand everything to the pane supervisor. Exit codes:
//! 0 normal, -1 empty video URL, -2 pane construction failed.

mod cli;
mod grid;
mod logging;

use std::collections::BTreeMap;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use gridcast_pipeline::{ContainerWindow, PlayerConfig, SupervisorConfig};

use cli::Args;

fn main() {
    let args = Args::parse();

    // Keep the non-blocking writer alive for the process lifetime.
    let _log_guard = match logging::init(&args.log_path, &args.log_level) {
        Ok(guard) => Some(guard),
        Err(error) => {
            eprintln!("gridcast: log setup failed: {error:#}");
            None
        }
    };

    info!(?args, "gridcast starting");

    if args.video_url.is_empty() {
        error!("empty video_url not allowed");
        std::process::exit(-1);
    }

    std::process::exit(run(args));
}

fn run(args: Args) -> i32 {
    let cells = match grid::layout(args.ways) {
        Ok(cells) => cells,
        Err(error) => {
            error!(%error, "unsupported grid");
            return -2;
        }
    };
    let rects = grid::pixel_rects(
        &cells,
        args.window_left_pos,
        args.window_top_pos,
        args.window_width,
        args.window_height,
    );
    for (index, rect) in rects.iter().enumerate() {
        info!(pane = index, ?rect, "pane cell");
    }

    let mut windows: BTreeMap<usize, Arc<dyn ContainerWindow>> = BTreeMap::new();
    for (index, wid) in args.wids.iter().enumerate().take(cells.len()) {
        let window: Arc<dyn ContainerWindow> = grid::BoundWindow::new(index, *wid, rects[index]);
        windows.insert(index, window);
    }

    let mut builder = SupervisorConfig::builder()
        .ways(args.ways)
        .video_url(args.video_url)
        .player(
            PlayerConfig::builder()
                .profile(args.profile)
                .vo(args.vo)
                .hwdec(args.hwdec)
                .gpu_api(args.gpu_api)
                .gpu_context(args.gpu_context)
                .decoder_log_level(args.mpv_log_level)
                .ring_capacity(args.buffer_size)
                .build(),
        );
    if let Some(gpu_ways) = args.gpu_ways {
        builder = builder.gpu_ways(gpu_ways);
    }

    play(windows, builder.build())
}

#[cfg(feature = "libmpv")]
fn play(windows: BTreeMap<usize, Arc<dyn ContainerWindow>>, config: SupervisorConfig) -> i32 {
    use gridcast_pipeline::{PaneState, PaneSupervisor};

    let backend = Arc::new(gridcast_mpv::MpvBackend);
    let supervisor = match PaneSupervisor::start(windows, backend, config) {
        Ok(supervisor) => supervisor,
        Err(error) => {
            error!(%error, "pane construction failed");
            return -2;
        }
    };

    // File sources end on EOF; network sources play until the process is
    // terminated. Restarting panes count as alive.
    loop {
        std::thread::sleep(std::time::Duration::from_millis(200));
        let all_stopped = supervisor
            .panes()
            .iter()
            .all(|pane| pane.state() == PaneState::Stopped);
        if all_stopped {
            break;
        }
    }

    drop(supervisor);
    info!("gridcast exiting");
    0
}

#[cfg(not(feature = "libmpv"))]
fn play(_windows: BTreeMap<usize, Arc<dyn ContainerWindow>>, _config: SupervisorConfig) -> i32 {
    error!("this build has no decoder backend; rebuild with the `libmpv` feature enabled");
    -2
}
