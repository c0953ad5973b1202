//! # Callback Dispatcher
//!
//! The one place where native-thread events re-enter caller code.
//!
//! ## Overview
//!
//! Watch events arrive on threads owned by the native engine. Instead of
//! calling the caller's closure there, the watch trampoline enqueues a job on
//! a [`Dispatcher`], whose single dedicated thread drains the queue in order.
//! Callbacks therefore never run concurrently with each other and never run
//! on an engine thread.
//!
//! ```text
//! engine thread ──▶ trampoline ──▶ queue ──▶ dispatcher thread ──▶ callback
//! ```
//!
//! A dispatcher is created explicitly and handed to
//! [`FileSystem::new`](crate::FileSystem::new); there is no process-wide
//! instance. Clones share the same thread. The thread stops when
//! [`shutdown`](Dispatcher::shutdown) is called or the last clone is dropped.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::FsError;

/// A unit of work run on the dispatcher thread.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    Stop,
}

/// Settings for the dispatcher thread.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DispatcherConfig {
    /// Name given to the delivery thread.
    pub thread_name: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            thread_name: "fs-watch-dispatch".to_string(),
        }
    }
}

/// Handle to the callback delivery thread.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    tx: Sender<Message>,
    thread_id: ThreadId,
    thread_name: String,
    handle: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Dispatcher {
    /// Start a dispatcher with default settings.
    pub fn start() -> Result<Self, FsError> {
        Self::with_config(DispatcherConfig::default())
    }

    /// Start a dispatcher thread.
    pub fn with_config(config: DispatcherConfig) -> Result<Self, FsError> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || run(rx))
            .map_err(FsError::Spawn)?;
        debug!(thread = %config.thread_name, "callback dispatcher started");

        Ok(Self {
            inner: Arc::new(Inner {
                tx,
                thread_id: handle.thread().id(),
                thread_name: config.thread_name,
                handle: Mutex::new(Some(handle)),
                stopped: AtomicBool::new(false),
            }),
        })
    }

    /// Returns `true` when called from the dispatcher thread itself.
    pub fn is_dispatch_thread(&self) -> bool {
        thread::current().id() == self.inner.thread_id
    }

    /// Returns `true` once the dispatcher no longer accepts work.
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Stop the thread after it drains the work queued so far.
    ///
    /// Blocks until the thread exits, unless called from the dispatcher
    /// thread. Calling it again is a no-op.
    pub fn shutdown(&self) {
        self.inner.stop();
    }

    /// Queue a job. Returns `false` if the dispatcher is stopped.
    pub(crate) fn submit(&self, job: Job) -> bool {
        if self.is_stopped() {
            return false;
        }
        self.inner.tx.send(Message::Run(job)).is_ok()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("thread", &self.inner.thread_name)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl Inner {
    fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.tx.send(Message::Stop);
        let handle = self.handle.lock().take();
        // Joining from the dispatcher thread would wait on itself.
        if thread::current().id() == self.thread_id {
            return;
        }
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!(thread = %self.thread_name, "callback dispatcher thread panicked");
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(rx: Receiver<Message>) {
    for message in rx {
        match message {
            Message::Run(job) => {
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!("dispatched job panicked");
                }
            }
            Message::Stop => break,
        }
    }
    debug!("callback dispatcher stopped");
}
