//! # FileSystem Facade
//!
//! Synchronous filesystem API over the native engine.
//!
//! ## Call Shape
//!
//! Every operation follows the same steps:
//!
//! ```text
//! resolve path ──▶ marshal (CString, region, position) ──▶ engine call
//!                                                              │
//!            Ok(unmarshalled value) ◀── success ◀── check sentinel
//!            Err(FsError naming operation + path/fd) ◀── failure
//! ```
//!
//! Preconditions (buffer regions, positions, interior NULs) are checked
//! before the engine is called, so a rejected request has no native side
//! effects.
//!
//! ## Thread Safety
//!
//! [`FileSystem`] is `Send + Sync` and cheap to clone. Calls block the
//! calling thread and are not serialized by the facade.

use std::ffi::{CStr, CString, c_char, c_int};
use std::io::{IoSlice, IoSliceMut};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::convert::{take_buffer, take_string, to_stats};
use crate::dispatch::{Dispatcher, DispatcherConfig};
use crate::error::Target;
use crate::ffi::{NativeFsApi, RawIovec, RawStats, StatFn, VectorFn};
use crate::{
    ChangeEvent, DirectoryIterator, Fd, FileHandle, FsError, OpenFlags, PathResolver, Resolved,
    StatWatcher, Stats, WatchSession,
};

#[cfg(feature = "linked")]
static LINKED_API: NativeFsApi = NativeFsApi::LINKED;

/// Filesystem operations backed by a native engine.
///
/// # Example
///
/// ```rust,ignore
/// use native_fs_facade::{Dispatcher, FileSystem, OpenFlags};
///
/// let fs = FileSystem::linked(Dispatcher::start()?);
/// let fd = fs.open("/tmp/a", OpenFlags::WRITE, 0o644)?;
/// assert_eq!(fs.write(fd, b"hi", 0, 2, None)?, 2);
/// fs.close(fd);
/// assert_eq!(fs.stat("/tmp/a")?.size, 2.0);
/// ```
#[derive(Clone)]
pub struct FileSystem {
    api: &'static NativeFsApi,
    dispatcher: Dispatcher,
    resolver: Option<Arc<dyn PathResolver>>,
}

/// Builder for a [`FileSystem`] with optional parts.
///
/// Created by [`FileSystem::builder`].
pub struct FileSystemBuilder {
    api: &'static NativeFsApi,
    dispatcher: Option<Dispatcher>,
    dispatcher_config: DispatcherConfig,
    resolver: Option<Arc<dyn PathResolver>>,
}

impl FileSystemBuilder {
    /// Route URI-form paths through `resolver`.
    pub fn resolver(mut self, resolver: impl PathResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Deliver watch callbacks on an existing dispatcher.
    pub fn dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Settings for the dispatcher started by [`build`](Self::build) when
    /// none was supplied.
    pub fn dispatcher_config(mut self, config: DispatcherConfig) -> Self {
        self.dispatcher_config = config;
        self
    }

    /// Finish the facade.
    ///
    /// # Errors
    ///
    /// - [`FsError::Spawn`] if a dispatcher had to be started and its
    ///   thread could not be spawned
    pub fn build(self) -> Result<FileSystem, FsError> {
        let dispatcher = match self.dispatcher {
            Some(dispatcher) => dispatcher,
            None => Dispatcher::with_config(self.dispatcher_config)?,
        };
        Ok(FileSystem {
            api: self.api,
            dispatcher,
            resolver: self.resolver,
        })
    }
}

impl FileSystem {
    /// Wrap an engine table.
    ///
    /// # Safety
    ///
    /// Every function in `api` must honor the contract documented on
    /// [`NativeFsApi`], in particular: no watch callback is running or
    /// starts after the matching `unwatch` returns.
    pub unsafe fn new(api: &'static NativeFsApi, dispatcher: Dispatcher) -> Self {
        Self {
            api,
            dispatcher,
            resolver: None,
        }
    }

    /// Start building a facade over `api`.
    ///
    /// # Safety
    ///
    /// Same contract as [`new`](Self::new).
    pub unsafe fn builder(api: &'static NativeFsApi) -> FileSystemBuilder {
        FileSystemBuilder {
            api,
            dispatcher: None,
            dispatcher_config: DispatcherConfig::default(),
            resolver: None,
        }
    }

    /// Facade over the engine linked into this binary.
    #[cfg(feature = "linked")]
    pub fn linked(dispatcher: Dispatcher) -> Self {
        // SAFETY: the linked engine is built against this ABI contract.
        unsafe { Self::new(&LINKED_API, dispatcher) }
    }

    /// The dispatcher watch callbacks run on.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    // ---------------------------------------------------------------------
    // Descriptors and byte I/O
    // ---------------------------------------------------------------------

    /// Open `path` and return a descriptor.
    ///
    /// `mode` applies only when the file is created.
    pub fn open(&self, path: impl AsRef<Path>, flags: OpenFlags, mode: u32) -> Result<Fd, FsError> {
        self.open_raw(path, flags.bits(), mode)
    }

    /// Open `path` with a raw `O_*` flag word.
    ///
    /// A resolver that yields a descriptor short-circuits the engine call.
    pub fn open_raw(&self, path: impl AsRef<Path>, flags: c_int, mode: u32) -> Result<Fd, FsError> {
        let path = path.as_ref();
        let native = match self.locate(path)? {
            Resolved::Descriptor(fd) => return Ok(fd),
            Resolved::Path(resolved) => c_path(&resolved)?,
        };
        let mode = c_int::try_from(mode).map_err(|_| FsError::InvalidArgument {
            operation: "open",
            details: format!("mode {mode:#o} out of range"),
        })?;
        // SAFETY: `native` is NUL-terminated and outlives the call.
        let fd = unsafe { (self.api.open)(native.as_ptr(), flags, mode) };
        if fd < 0 {
            return Err(self.failure("open", Target::path(path)));
        }
        Ok(Fd(fd))
    }

    /// Open `path` as a [`FileHandle`] implementing `Read`, `Write` and `Seek`.
    ///
    /// The handle closes the descriptor when dropped. With
    /// [`OpenFlags::append`] set, writes go to the end of the file.
    pub fn open_file(
        &self,
        path: impl AsRef<Path>,
        flags: OpenFlags,
        mode: u32,
    ) -> Result<FileHandle, FsError> {
        let path = path.as_ref();
        let fd = self.open(path, flags, mode)?;
        Ok(FileHandle::opened(self, fd, path, flags.append))
    }

    /// Close a descriptor. The engine reports no failure.
    pub fn close(&self, fd: Fd) {
        // SAFETY: any integer is acceptable to the engine's close.
        unsafe { (self.api.close)(fd.raw()) };
    }

    /// Read into `buf[offset..offset + length]`.
    ///
    /// `position` is the file offset to read at; `None` reads at the
    /// descriptor's current offset. Returns the number of bytes read (0 at
    /// end of file).
    ///
    /// # Errors
    ///
    /// - [`FsError::BufferTooSmall`] if the region does not fit in `buf`;
    ///   the engine is not called
    /// - [`FsError::InvalidArgument`] if `position` exceeds `i64::MAX`
    pub fn read(
        &self,
        fd: Fd,
        buf: &mut [u8],
        offset: usize,
        length: usize,
        position: Option<u64>,
    ) -> Result<usize, FsError> {
        let range = region("read", buf.len(), offset, length)?;
        let position = native_position("read", position)?;
        let region = &mut buf[range];
        // SAFETY: the region is in bounds and exclusively borrowed.
        let n = unsafe { (self.api.read)(fd.raw(), region.as_mut_ptr(), region.len(), position) };
        self.transferred("read", n, fd)
    }

    /// Write `buf[offset..offset + length]`.
    ///
    /// Same region and position rules as [`read`](Self::read).
    pub fn write(
        &self,
        fd: Fd,
        buf: &[u8],
        offset: usize,
        length: usize,
        position: Option<u64>,
    ) -> Result<usize, FsError> {
        let range = region("write", buf.len(), offset, length)?;
        let position = native_position("write", position)?;
        let region = &buf[range];
        // SAFETY: the region is in bounds and borrowed for the call.
        let n = unsafe { (self.api.write)(fd.raw(), region.as_ptr(), region.len(), position) };
        self.transferred("write", n, fd)
    }

    /// Scatter read: fill `bufs` in order from one contiguous file region.
    ///
    /// Empty buffers are skipped. If nothing is left to fill, returns 0
    /// without calling the engine.
    pub fn readv(
        &self,
        fd: Fd,
        bufs: &mut [IoSliceMut<'_>],
        position: Option<u64>,
    ) -> Result<usize, FsError> {
        let iov: Vec<RawIovec> = bufs
            .iter_mut()
            .filter(|buf| !buf.is_empty())
            .map(|buf| RawIovec {
                base: buf.as_mut_ptr(),
                len: buf.len(),
            })
            .collect();
        self.vectored("readv", self.api.readv, fd, &iov, position)
    }

    /// Gather write: write `bufs` in order to one contiguous file region.
    pub fn writev(
        &self,
        fd: Fd,
        bufs: &[IoSlice<'_>],
        position: Option<u64>,
    ) -> Result<usize, FsError> {
        let iov: Vec<RawIovec> = bufs
            .iter()
            .filter(|buf| !buf.is_empty())
            .map(|buf| RawIovec {
                // The engine only reads through writev segments.
                base: buf.as_ptr().cast_mut(),
                len: buf.len(),
            })
            .collect();
        self.vectored("writev", self.api.writev, fd, &iov, position)
    }

    // ---------------------------------------------------------------------
    // Metadata
    // ---------------------------------------------------------------------

    /// Metadata for `path`, following symlinks.
    pub fn stat(&self, path: impl AsRef<Path>) -> Result<Stats, FsError> {
        self.stat_with("stat", self.api.stat, path.as_ref())
    }

    /// Metadata for `path` itself, not following a final symlink.
    pub fn lstat(&self, path: impl AsRef<Path>) -> Result<Stats, FsError> {
        self.stat_with("lstat", self.api.lstat, path.as_ref())
    }

    /// Metadata for an open descriptor.
    pub fn fstat(&self, fd: Fd) -> Result<Stats, FsError> {
        let mut raw = RawStats::default();
        // SAFETY: `raw` is a valid out-pointer for the call.
        let rc = unsafe { (self.api.fstat)(fd.raw(), &mut raw) };
        self.check("fstat", rc, || Target::Descriptor(fd))?;
        Ok(to_stats(&raw))
    }

    /// Check accessibility with a mask built from [`constants`](crate::constants).
    pub fn access(&self, path: impl AsRef<Path>, mode: c_int) -> Result<(), FsError> {
        // SAFETY: every `path_call` closure receives a live NUL-terminated path.
        self.path_call("access", path.as_ref(), |p| unsafe {
            (self.api.access)(p.as_ptr(), mode)
        })
    }

    /// Set the length of the file at `path`.
    pub fn truncate(&self, path: impl AsRef<Path>, len: u64) -> Result<(), FsError> {
        self.path_call("truncate", path.as_ref(), |p| unsafe {
            (self.api.truncate)(p.as_ptr(), len)
        })
    }

    /// Set the length of an open file.
    pub fn ftruncate(&self, fd: Fd, len: u64) -> Result<(), FsError> {
        // SAFETY: plain value arguments.
        let rc = unsafe { (self.api.ftruncate)(fd.raw(), len) };
        self.check("ftruncate", rc, || Target::Descriptor(fd))
    }

    /// Flush file data and metadata to storage.
    pub fn fsync(&self, fd: Fd) -> Result<(), FsError> {
        self.sync("fsync", fd)
    }

    /// Flush file data to storage. The engine implements this as `fsync`.
    pub fn fdatasync(&self, fd: Fd) -> Result<(), FsError> {
        self.sync("fdatasync", fd)
    }

    /// Change permission bits, following symlinks.
    pub fn chmod(&self, path: impl AsRef<Path>, mode: u32) -> Result<(), FsError> {
        self.path_call("chmod", path.as_ref(), |p| unsafe {
            (self.api.chmod)(p.as_ptr(), mode)
        })
    }

    /// Change permission bits of a symlink itself.
    pub fn lchmod(&self, path: impl AsRef<Path>, mode: u32) -> Result<(), FsError> {
        self.path_call("lchmod", path.as_ref(), |p| unsafe {
            (self.api.lchmod)(p.as_ptr(), mode)
        })
    }

    /// Change permission bits of an open file.
    pub fn fchmod(&self, fd: Fd, mode: u32) -> Result<(), FsError> {
        // SAFETY: plain value arguments.
        let rc = unsafe { (self.api.fchmod)(fd.raw(), mode) };
        self.check("fchmod", rc, || Target::Descriptor(fd))
    }

    /// Change ownership, following symlinks.
    pub fn chown(&self, path: impl AsRef<Path>, uid: u32, gid: u32) -> Result<(), FsError> {
        self.path_call("chown", path.as_ref(), |p| unsafe {
            (self.api.chown)(p.as_ptr(), uid, gid)
        })
    }

    /// Change ownership of a symlink itself.
    pub fn lchown(&self, path: impl AsRef<Path>, uid: u32, gid: u32) -> Result<(), FsError> {
        self.path_call("lchown", path.as_ref(), |p| unsafe {
            (self.api.lchown)(p.as_ptr(), uid, gid)
        })
    }

    /// Change ownership of an open file.
    pub fn fchown(&self, fd: Fd, uid: u32, gid: u32) -> Result<(), FsError> {
        // SAFETY: plain value arguments.
        let rc = unsafe { (self.api.fchown)(fd.raw(), uid, gid) };
        self.check("fchown", rc, || Target::Descriptor(fd))
    }

    /// Set access and modification times, in seconds since the epoch.
    pub fn utimes(&self, path: impl AsRef<Path>, atime: f64, mtime: f64) -> Result<(), FsError> {
        self.path_call("utimes", path.as_ref(), |p| unsafe {
            (self.api.utimes)(p.as_ptr(), atime, mtime)
        })
    }

    /// Like [`utimes`](Self::utimes) without following a final symlink.
    pub fn lutimes(&self, path: impl AsRef<Path>, atime: f64, mtime: f64) -> Result<(), FsError> {
        self.path_call("lutimes", path.as_ref(), |p| unsafe {
            (self.api.lutimes)(p.as_ptr(), atime, mtime)
        })
    }

    /// Set times of an open file.
    pub fn futimes(&self, fd: Fd, atime: f64, mtime: f64) -> Result<(), FsError> {
        // SAFETY: plain value arguments.
        let rc = unsafe { (self.api.futimes)(fd.raw(), atime, mtime) };
        self.check("futimes", rc, || Target::Descriptor(fd))
    }

    // ---------------------------------------------------------------------
    // Links and names
    // ---------------------------------------------------------------------

    /// Create a hard link `new` to `existing`.
    pub fn link(&self, existing: impl AsRef<Path>, new: impl AsRef<Path>) -> Result<(), FsError> {
        self.two_path_call("link", existing.as_ref(), new.as_ref(), |from, to| unsafe {
            (self.api.link)(from.as_ptr(), to.as_ptr())
        })
    }

    /// Create a symlink at `path` pointing to `target`.
    ///
    /// `target` is stored verbatim and never resolved.
    pub fn symlink(&self, target: impl AsRef<Path>, path: impl AsRef<Path>) -> Result<(), FsError> {
        let (target, path) = (target.as_ref(), path.as_ref());
        let native_target = c_path(target)?;
        let native_path = self.native_path("symlink", path)?;
        // SAFETY: both strings are NUL-terminated and outlive the call.
        let rc = unsafe { (self.api.symlink)(native_target.as_ptr(), native_path.as_ptr()) };
        self.check("symlink", rc, || Target::paths(target, path))
    }

    /// Read the target of a symlink.
    pub fn readlink(&self, path: impl AsRef<Path>) -> Result<PathBuf, FsError> {
        self.path_string("readlink", path.as_ref(), self.api.readlink)
    }

    /// Canonical absolute form of `path`.
    pub fn realpath(&self, path: impl AsRef<Path>) -> Result<PathBuf, FsError> {
        self.path_string("realpath", path.as_ref(), self.api.realpath)
    }

    // ---------------------------------------------------------------------
    // Tree manipulation
    // ---------------------------------------------------------------------

    /// Remove a file.
    pub fn unlink(&self, path: impl AsRef<Path>) -> Result<(), FsError> {
        self.path_call("unlink", path.as_ref(), |p| unsafe {
            (self.api.unlink)(p.as_ptr())
        })
    }

    /// Rename `from` to `to`.
    pub fn rename(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<(), FsError> {
        self.two_path_call("rename", from.as_ref(), to.as_ref(), |from, to| unsafe {
            (self.api.rename)(from.as_ptr(), to.as_ptr())
        })
    }

    /// Create a directory, and its parents when `recursive`.
    pub fn mkdir(&self, path: impl AsRef<Path>, mode: u32, recursive: bool) -> Result<(), FsError> {
        self.path_call("mkdir", path.as_ref(), |p| unsafe {
            (self.api.mkdir)(p.as_ptr(), mode, recursive)
        })
    }

    /// Remove an empty directory.
    pub fn rmdir(&self, path: impl AsRef<Path>) -> Result<(), FsError> {
        self.path_call("rmdir", path.as_ref(), |p| unsafe {
            (self.api.rmdir)(p.as_ptr())
        })
    }

    /// Remove a file or directory, with its contents when `recursive`.
    pub fn rm(&self, path: impl AsRef<Path>, recursive: bool) -> Result<(), FsError> {
        self.path_call("rm", path.as_ref(), |p| unsafe {
            (self.api.rm)(p.as_ptr(), recursive)
        })
    }

    /// Copy a file. `flags` takes the `COPYFILE_*` [`constants`](crate::constants).
    pub fn copy_file(
        &self,
        src: impl AsRef<Path>,
        dest: impl AsRef<Path>,
        flags: c_int,
    ) -> Result<(), FsError> {
        self.two_path_call("copy_file", src.as_ref(), dest.as_ref(), |src, dest| unsafe {
            (self.api.copy_file)(src.as_ptr(), dest.as_ptr(), flags)
        })
    }

    /// Create a unique directory whose name starts with `prefix`.
    pub fn mkdtemp(&self, prefix: impl AsRef<Path>) -> Result<PathBuf, FsError> {
        self.path_string("mkdtemp", prefix.as_ref(), self.api.mkdtemp)
    }

    /// The engine's temporary directory.
    pub fn get_temp_path(&self) -> Result<PathBuf, FsError> {
        // SAFETY: no arguments; the result is an engine string or null.
        let ptr = unsafe { (self.api.get_temp_dir)() };
        // SAFETY: engine strings are released with `free_string`.
        unsafe { take_string(ptr, self.api.free_string) }
            .map(PathBuf::from)
            .ok_or_else(|| self.failure("get_temp_path", Target::None))
    }

    // ---------------------------------------------------------------------
    // Directories and whole files
    // ---------------------------------------------------------------------

    /// All entry names of a directory, in engine order.
    ///
    /// The native iterator is released before returning, on success and on
    /// error.
    pub fn readdir(&self, path: impl AsRef<Path>) -> Result<Vec<String>, FsError> {
        let mut dir = self.open_dir("readdir", path.as_ref())?;
        let mut names = Vec::new();
        while let Some(name) = dir.try_next()? {
            names.push(name);
        }
        Ok(names)
    }

    /// Open a lazy cursor over a directory.
    pub fn opendir(&self, path: impl AsRef<Path>) -> Result<DirectoryIterator, FsError> {
        self.open_dir("opendir", path.as_ref())
    }

    /// Entire contents of a file. NUL bytes are preserved.
    pub fn read_file(&self, path: impl AsRef<Path>) -> Result<Vec<u8>, FsError> {
        let path = path.as_ref();
        let native = self.native_path("read_file", path)?;
        let mut len = 0usize;
        // SAFETY: `len` is a valid out-pointer for the call.
        let ptr = unsafe { (self.api.read_file)(native.as_ptr(), &mut len) };
        // SAFETY: the buffer is engine-owned with `len` bytes.
        unsafe { take_buffer(ptr, len, self.api.read_file_free) }
            .ok_or_else(|| self.failure("read_file", Target::path(path)))
    }

    /// Replace the contents of a file, creating it if needed.
    pub fn write_file(&self, path: impl AsRef<Path>, data: &[u8]) -> Result<(), FsError> {
        self.path_call("write_file", path.as_ref(), |p| unsafe {
            (self.api.write_file)(p.as_ptr(), data.as_ptr(), data.len())
        })
    }

    // ---------------------------------------------------------------------
    // Watching
    // ---------------------------------------------------------------------

    /// Watch `path` for changes.
    ///
    /// `callback` runs on the dispatcher thread, never concurrently with
    /// itself. The subscription lasts until the returned session is closed
    /// or dropped.
    ///
    /// # Errors
    ///
    /// - [`FsError::DispatcherStopped`] if the dispatcher was shut down
    /// - a native error if the engine refuses the watch
    pub fn watch<F>(&self, path: impl AsRef<Path>, callback: F) -> Result<WatchSession, FsError>
    where
        F: FnMut(ChangeEvent) + Send + 'static,
    {
        let path = path.as_ref();
        let native = self.native_path("watch", path)?;
        WatchSession::open(
            self.api,
            &self.dispatcher,
            path,
            &native,
            Box::new(callback),
            || self.last_error(),
        )
    }

    /// Poll `path` with `stat` every `interval` and report changes.
    ///
    /// `listener` receives `(current, previous)` stats whenever `mtime_ms`
    /// changes, including creation and deletion (a missing path reads as
    /// all-zero stats). It runs on the dispatcher thread like watch
    /// callbacks. See [`DEFAULT_POLL_INTERVAL`](crate::DEFAULT_POLL_INTERVAL).
    ///
    /// # Errors
    ///
    /// - [`FsError::InvalidArgument`] for a zero interval
    /// - [`FsError::DispatcherStopped`] if the dispatcher was shut down
    /// - path or resolver errors raised before the engine is reached
    pub fn watch_file<F>(
        &self,
        path: impl AsRef<Path>,
        interval: Duration,
        listener: F,
    ) -> Result<StatWatcher, FsError>
    where
        F: FnMut(&Stats, &Stats) + Send + 'static,
    {
        StatWatcher::start(self, path.as_ref(), interval, Box::new(listener))
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    fn locate(&self, path: &Path) -> Result<Resolved, FsError> {
        if let (Some(resolver), Some(text)) = (&self.resolver, path.to_str()) {
            if resolver.matches(text) {
                return resolver.resolve(text);
            }
        }
        Ok(Resolved::Path(path.to_path_buf()))
    }

    /// Resolve and marshal a path for an operation that needs a real path.
    fn native_path(&self, operation: &'static str, path: &Path) -> Result<CString, FsError> {
        match self.locate(path)? {
            Resolved::Path(resolved) => c_path(&resolved),
            Resolved::Descriptor(fd) => {
                self.close(fd);
                Err(FsError::NotSupported { operation })
            }
        }
    }

    fn last_error(&self) -> Option<i32> {
        // SAFETY: the hook takes no arguments and only reads thread state.
        self.api.last_error.map(|last_error| unsafe { last_error() })
    }

    /// Build the error for a failure sentinel. Must run before any other
    /// engine call so `last_error` still describes this failure.
    fn failure(&self, operation: &'static str, target: Target) -> FsError {
        let code = self.last_error();
        debug!(operation, %target, ?code, "native call failed");
        FsError::native(operation, target, code)
    }

    fn check(
        &self,
        operation: &'static str,
        rc: c_int,
        target: impl FnOnce() -> Target,
    ) -> Result<(), FsError> {
        if rc == 0 {
            Ok(())
        } else {
            Err(self.failure(operation, target()))
        }
    }

    fn transferred(&self, operation: &'static str, n: isize, fd: Fd) -> Result<usize, FsError> {
        usize::try_from(n).map_err(|_| self.failure(operation, Target::Descriptor(fd)))
    }

    fn path_call(
        &self,
        operation: &'static str,
        path: &Path,
        call: impl FnOnce(&CStr) -> c_int,
    ) -> Result<(), FsError> {
        let native = self.native_path(operation, path)?;
        let rc = call(&native);
        self.check(operation, rc, || Target::path(path))
    }

    fn two_path_call(
        &self,
        operation: &'static str,
        from: &Path,
        to: &Path,
        call: impl FnOnce(&CStr, &CStr) -> c_int,
    ) -> Result<(), FsError> {
        let native_from = self.native_path(operation, from)?;
        let native_to = self.native_path(operation, to)?;
        let rc = call(&native_from, &native_to);
        self.check(operation, rc, || Target::paths(from, to))
    }

    fn path_string(
        &self,
        operation: &'static str,
        path: &Path,
        call: unsafe extern "C" fn(*const c_char) -> *mut c_char,
    ) -> Result<PathBuf, FsError> {
        let native = self.native_path(operation, path)?;
        // SAFETY: `native` is NUL-terminated; the result is an engine string
        // released by `free_string`.
        let value = unsafe { take_string(call(native.as_ptr()), self.api.free_string) };
        value
            .map(PathBuf::from)
            .ok_or_else(|| self.failure(operation, Target::path(path)))
    }

    fn stat_with(&self, operation: &'static str, call: StatFn, path: &Path) -> Result<Stats, FsError> {
        let resolved = match self.locate(path)? {
            Resolved::Path(resolved) => resolved,
            Resolved::Descriptor(fd) => {
                let mut raw = RawStats::default();
                // SAFETY: `raw` is a valid out-pointer for the call.
                let rc = unsafe { (self.api.fstat)(fd.raw(), &mut raw) };
                let checked = self.check(operation, rc, || Target::path(path));
                self.close(fd);
                return checked.map(|()| to_stats(&raw));
            }
        };
        let native = c_path(&resolved)?;
        let mut raw = RawStats::default();
        // SAFETY: `native` is NUL-terminated and `raw` is a valid out-pointer.
        let rc = unsafe { call(native.as_ptr(), &mut raw) };
        self.check(operation, rc, || Target::path(path))?;
        Ok(to_stats(&raw))
    }

    fn sync(&self, operation: &'static str, fd: Fd) -> Result<(), FsError> {
        // SAFETY: plain value argument.
        let rc = unsafe { (self.api.fsync)(fd.raw()) };
        self.check(operation, rc, || Target::Descriptor(fd))
    }

    fn vectored(
        &self,
        operation: &'static str,
        call: VectorFn,
        fd: Fd,
        iov: &[RawIovec],
        position: Option<u64>,
    ) -> Result<usize, FsError> {
        let position = native_position(operation, position)?;
        if iov.is_empty() {
            return Ok(0);
        }
        let count = c_int::try_from(iov.len()).map_err(|_| FsError::InvalidArgument {
            operation,
            details: format!("{} buffers exceed the engine limit", iov.len()),
        })?;
        // SAFETY: every segment points into a buffer borrowed for the call.
        let n = unsafe { call(fd.raw(), iov.as_ptr(), count, position) };
        self.transferred(operation, n, fd)
    }

    fn open_dir(&self, operation: &'static str, path: &Path) -> Result<DirectoryIterator, FsError> {
        let native = self.native_path(operation, path)?;
        // SAFETY: `native` is NUL-terminated and outlives the call.
        let iter = unsafe { (self.api.readdir_open)(native.as_ptr()) };
        let iter = NonNull::new(iter).ok_or_else(|| self.failure(operation, Target::path(path)))?;
        // SAFETY: a fresh handle owned by nobody else.
        Ok(unsafe { DirectoryIterator::from_raw(self.api, iter, path.to_path_buf()) })
    }
}

impl std::fmt::Debug for FileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystem")
            .field("dispatcher", &self.dispatcher)
            .field(
                "resolver",
                &self.resolver.as_ref().map(|resolver| resolver.scheme()),
            )
            .finish()
    }
}

fn c_path(path: &Path) -> Result<CString, FsError> {
    CString::new(path.as_os_str().as_encoded_bytes()).map_err(|_| FsError::InvalidPath {
        path: path.to_path_buf(),
    })
}

fn region(
    operation: &'static str,
    capacity: usize,
    offset: usize,
    length: usize,
) -> Result<Range<usize>, FsError> {
    match offset.checked_add(length) {
        Some(end) if end <= capacity => Ok(offset..end),
        _ => Err(FsError::BufferTooSmall {
            operation,
            offset,
            length,
            capacity,
        }),
    }
}

// -1 asks the engine for the descriptor's current offset.
fn native_position(operation: &'static str, position: Option<u64>) -> Result<i64, FsError> {
    match position {
        None => Ok(-1),
        Some(position) => i64::try_from(position).map_err(|_| FsError::InvalidArgument {
            operation,
            details: format!("position {position} exceeds i64::MAX"),
        }),
    }
}
