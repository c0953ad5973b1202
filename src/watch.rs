//! # Watch Sessions
//!
//! One live change subscription on one path.
//!
//! ## Lifecycle
//!
//! ```text
//! FileSystem::watch ──▶ engine.watch(path, context, trampoline)
//!                            │
//!        engine thread ──────┘ trampoline(context, path, code)
//!                                   │ enqueue
//!                                   ▼
//!                       dispatcher thread ──▶ callback(ChangeEvent)
//!
//! WatchSession::close ──▶ closed flag ──▶ engine.unwatch ──▶ wait for in-flight callback
//! ```
//!
//! The `context` pointer handed to the engine owns one strong reference to
//! the session state. It is reclaimed after `unwatch` returns, when the
//! engine contract guarantees the trampoline can no longer run.
//!
//! ## Delivery Guarantees
//!
//! - callbacks run only on the [`Dispatcher`] thread, one at a time;
//! - a panicking callback is logged and the session keeps delivering;
//! - once [`close`](WatchSession::close) returns, the callback never runs
//!   again, even for events that were already queued.

use std::ffi::{CStr, c_char, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::dispatch::Dispatcher;
use crate::error::Target;
use crate::ffi::{NativeFsApi, Watcher};
use crate::{ChangeEvent, ChangeKind, FsError};

type Callback = Box<dyn FnMut(ChangeEvent) + Send + 'static>;

/// A live watch on one path.
///
/// Created by [`FileSystem::watch`](crate::FileSystem::watch). Owns the
/// native watcher handle and the callback. Closing is idempotent and safe
/// from any thread, including from inside the session's own callback.
/// Dropping the session closes it.
pub struct WatchSession {
    api: &'static NativeFsApi,
    handle: AtomicPtr<Watcher>,
    shared: Arc<Shared>,
}

struct Shared {
    path: PathBuf,
    closed: AtomicBool,
    // Held for the whole callback; `close` takes it to wait out a delivery.
    callback: Mutex<Callback>,
    dispatcher: Dispatcher,
}

impl WatchSession {
    pub(crate) fn open(
        api: &'static NativeFsApi,
        dispatcher: &Dispatcher,
        path: &Path,
        native_path: &CStr,
        callback: Callback,
        last_error: impl FnOnce() -> Option<i32>,
    ) -> Result<Self, FsError> {
        if dispatcher.is_stopped() {
            return Err(FsError::DispatcherStopped);
        }

        let shared = Arc::new(Shared {
            path: path.to_path_buf(),
            closed: AtomicBool::new(false),
            callback: Mutex::new(callback),
            dispatcher: dispatcher.clone(),
        });
        let context = Arc::into_raw(Arc::clone(&shared)).cast_mut().cast::<c_void>();

        // SAFETY: `native_path` is NUL-terminated; `context` stays valid until
        // the matching `unwatch` returns.
        let handle = unsafe { (api.watch)(native_path.as_ptr(), context, on_native_event) };
        if handle.is_null() {
            let code = last_error();
            // SAFETY: no watcher exists, so the engine kept no reference.
            unsafe { Arc::decrement_strong_count(context.cast::<Shared>().cast_const()) };
            return Err(FsError::native("watch", Target::path(path), code));
        }

        debug!(path = %path.display(), "watch session opened");
        Ok(Self {
            api,
            handle: AtomicPtr::new(handle),
            shared,
        })
    }

    /// Stop watching.
    ///
    /// Releases the native watcher on the first call. When this returns no
    /// callback for this session is running or will run. If a callback is
    /// in flight on the dispatcher thread, this waits for it to finish
    /// (unless called from the dispatcher thread itself).
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            let handle = self.handle.swap(ptr::null_mut(), Ordering::AcqRel);
            if !handle.is_null() {
                // SAFETY: swapped out, so released exactly once.
                unsafe { (self.api.unwatch)(handle) };
                // SAFETY: after `unwatch` the engine drops its context
                // pointer; this returns the reference taken in `open`.
                unsafe { Arc::decrement_strong_count(Arc::as_ptr(&self.shared)) };
            }
            debug!(path = %self.shared.path.display(), "watch session closed");
        }

        // The dispatcher thread may be inside this session's callback right
        // now; there it already holds the lock.
        if !self.shared.dispatcher.is_dispatch_thread() {
            drop(self.shared.callback.lock());
        }
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// The watched path as given by the caller.
    pub fn path(&self) -> &Path {
        &self.shared.path
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for WatchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSession")
            .field("path", &self.shared.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Shared {
    fn deliver(&self, event: ChangeEvent) {
        let mut callback = self.callback.lock();
        if self.closed.load(Ordering::Acquire) {
            trace!(path = %self.path.display(), "dropping event for closed watch");
            return;
        }
        let kind = event.kind;
        if panic::catch_unwind(AssertUnwindSafe(|| (*callback)(event))).is_err() {
            error!(path = %self.path.display(), %kind, "watch callback panicked");
        }
    }
}

/// Entry point the engine calls from its own thread.
unsafe extern "C" fn on_native_event(context: *mut c_void, path: *const c_char, code: c_int) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        if context.is_null() {
            return;
        }
        let context = context.cast::<Shared>().cast_const();
        // SAFETY: the engine only calls us between `watch` and `unwatch`,
        // while the reference owned by `context` is alive.
        let shared = unsafe { &*context };
        if shared.closed.load(Ordering::Acquire) {
            return;
        }

        let path = if path.is_null() {
            String::new()
        } else {
            // SAFETY: engine paths are NUL-terminated and valid for the call.
            unsafe { CStr::from_ptr(path) }
                .to_string_lossy()
                .into_owned()
        };
        let event = ChangeEvent {
            kind: ChangeKind::from_native(code),
            path,
        };

        // SAFETY: `context` came from `Arc::into_raw` and is still counted.
        let session = unsafe {
            Arc::increment_strong_count(context);
            Arc::from_raw(context)
        };
        let dispatcher = session.dispatcher.clone();
        if !dispatcher.submit(Box::new(move || session.deliver(event))) {
            warn!(path = %shared.path.display(), "dispatcher stopped, dropping watch event");
        }
    }));
    if outcome.is_err() {
        error!("watch trampoline panicked");
    }
}
