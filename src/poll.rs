//! # Stat Polling
//!
//! Change detection for paths the engine cannot watch, by calling `stat` at
//! a fixed interval.
//!
//! ```text
//! poll thread ──▶ stat(path) every interval ──▶ mtime differs? ──▶ queue
//!                                                                  │
//!                                 dispatcher thread ◀──────────────┘ listener(curr, prev)
//! ```
//!
//! A missing path reads as an all-zero [`Stats`], so creation and deletion
//! show up as a change of `mtime_ms` to or from zero. Listeners run on the
//! same [`Dispatcher`] as watch callbacks and follow the same rules: one at
//! a time, panics logged, nothing delivered after
//! [`close`](StatWatcher::close) returns.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::convert::to_stats;
use crate::dispatch::Dispatcher;
use crate::ffi::RawStats;
use crate::{FileSystem, FsError, Stats};

/// Poll interval used when the caller has no preference.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5007);

const POLL_THREAD_NAME: &str = "fs-stat-poll";

type Listener = Box<dyn FnMut(&Stats, &Stats) + Send + 'static>;

/// A polling watch on one path.
///
/// Created by [`FileSystem::watch_file`]. Owns a poll thread and the
/// listener. Closing is idempotent, works from any thread including the
/// listener itself, and happens on drop.
pub struct StatWatcher {
    shared: Arc<Shared>,
    stop: Mutex<Option<Sender<()>>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    path: PathBuf,
    closed: AtomicBool,
    listener: Mutex<Listener>,
    dispatcher: Dispatcher,
}

/// Stats reported for a path that cannot be stat'ed.
fn absent() -> Stats {
    to_stats(&RawStats::default())
}

impl StatWatcher {
    pub(crate) fn start(
        fs: &FileSystem,
        path: &Path,
        interval: Duration,
        listener: Listener,
    ) -> Result<Self, FsError> {
        if interval.is_zero() {
            return Err(FsError::InvalidArgument {
                operation: "watch_file",
                details: "poll interval must be non-zero".into(),
            });
        }
        let dispatcher = fs.dispatcher().clone();
        if dispatcher.is_stopped() {
            return Err(FsError::DispatcherStopped);
        }

        let initial = match fs.stat(path) {
            Ok(stats) => stats,
            Err(e) if e.is_native() => absent(),
            Err(e) => return Err(e),
        };

        let shared = Arc::new(Shared {
            path: path.to_path_buf(),
            closed: AtomicBool::new(false),
            listener: Mutex::new(listener),
            dispatcher,
        });
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(0);
        let poller = {
            let (fs, shared) = (fs.clone(), Arc::clone(&shared));
            thread::Builder::new()
                .name(POLL_THREAD_NAME.to_string())
                .spawn(move || poll(&fs, &shared, interval, &stop_rx, initial))
                .map_err(FsError::Spawn)?
        };

        debug!(path = %path.display(), ?interval, "stat watcher started");
        Ok(Self {
            shared,
            stop: Mutex::new(Some(stop_tx)),
            poller: Mutex::new(Some(poller)),
        })
    }

    /// Stop polling.
    ///
    /// When this returns the poll thread has exited and no listener call for
    /// this watcher is running or will run (a call in flight on another
    /// thread is waited for).
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            // Dropping the sender wakes the poll thread.
            drop(self.stop.lock().take());
            debug!(path = %self.shared.path.display(), "stat watcher closed");
        }
        if let Some(poller) = self.poller.lock().take() {
            if poller.join().is_err() {
                error!(path = %self.shared.path.display(), "stat poll thread panicked");
            }
        }
        if !self.shared.dispatcher.is_dispatch_thread() {
            drop(self.shared.listener.lock());
        }
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// The polled path as given by the caller.
    pub fn path(&self) -> &Path {
        &self.shared.path
    }
}

impl Drop for StatWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for StatWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatWatcher")
            .field("path", &self.shared.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Shared {
    fn deliver(&self, curr: &Stats, prev: &Stats) {
        let mut listener = self.listener.lock();
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if panic::catch_unwind(AssertUnwindSafe(|| (*listener)(curr, prev))).is_err() {
            error!(path = %self.path.display(), "stat listener panicked");
        }
    }
}

fn poll(fs: &FileSystem, shared: &Arc<Shared>, interval: Duration, stop: &Receiver<()>, mut prev: Stats) {
    loop {
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        if shared.closed.load(Ordering::Acquire) {
            break;
        }

        let curr = fs.stat(&shared.path).unwrap_or_else(|e| {
            trace!(path = %shared.path.display(), %e, "stat poll failed");
            absent()
        });
        if curr.mtime_ms == prev.mtime_ms {
            continue;
        }

        let (target, previous) = (Arc::clone(shared), prev);
        if !shared
            .dispatcher
            .submit(Box::new(move || target.deliver(&curr, &previous)))
        {
            warn!(path = %shared.path.display(), "dispatcher stopped, ending stat polling");
            break;
        }
        prev = curr;
    }
    trace!(path = %shared.path.display(), "stat poll thread exiting");
}
