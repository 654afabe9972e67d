//! Fan-out source reader
//!
//! Active only when the source is a local file. One thread reads the file
//! once and replicates each slice into every pane's ring, paced at one
//! 32 KiB read per 40 ms, roughly the nominal 25 Hz frame cadence, which
//! bounds how far ahead of real time any pane's ring can run.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::pane::PaneInner;

/// Pacing interval for one broadcast slice.
const READ_SLICE: Duration = Duration::from_millis(40);

/// Bytes read from the source per slice.
const READ_CHUNK: usize = 32 * 1024;

/// The one fan-out reader thread.
///
/// Holds only weak references to the panes' producer endpoints; the
/// supervisor guarantees panes outlive the reader by joining it first.
pub(crate) struct SourceReader {
    stopping: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SourceReader {
    /// Spawn the reader over `path`, broadcasting to `writers` in order.
    pub(crate) fn spawn(path: PathBuf, writers: Vec<Weak<PaneInner>>) -> std::io::Result<Self> {
        let stopping = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stopping);
        let thread = thread::Builder::new()
            .name("source-reader".to_string())
            .spawn(move || read_loop(&path, &writers, &flag))?;
        Ok(Self {
            stopping,
            thread: Some(thread),
        })
    }

    /// Signal the reader and join it.
    pub(crate) fn shutdown(&mut self) {
        self.stopping.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SourceReader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn read_loop(path: &Path, writers: &[Weak<PaneInner>], stopping: &AtomicBool) {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(error) => {
            error!(path = %path.display(), %error, "source open failed");
            signal_all(writers);
            return;
        }
    };

    info!(path = %path.display(), panes = writers.len(), "fan-out reader started");

    let mut buf = vec![0u8; READ_CHUNK];
    'read: while !stopping.load(Ordering::Relaxed) {
        let begin = Instant::now();

        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(error) => {
                error!(path = %path.display(), %error, "source read failed");
                break;
            }
        };

        for writer in writers {
            let Some(pane) = writer.upgrade() else {
                break 'read;
            };
            if !pane.write(&buf[..n]) {
                break 'read;
            }
            if stopping.load(Ordering::Relaxed) {
                break 'read;
            }
        }

        let elapsed = begin.elapsed();
        if elapsed < READ_SLICE {
            thread::sleep(READ_SLICE - elapsed);
        }
    }

    // Wake every pump thread and blocked producer.
    signal_all(writers);
    info!(path = %path.display(), "fan-out reader exited");
}

fn signal_all(writers: &[Weak<PaneInner>]) {
    for writer in writers {
        if let Some(pane) = writer.upgrade() {
            pane.signal_stop();
        }
    }
}
