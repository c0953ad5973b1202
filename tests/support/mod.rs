//! A C-ABI test engine over the host filesystem.
//!
//! Every entry point is an `unsafe extern "C" fn` with the same shape as the
//! production engine's exports. File operations go to disk (through `libc`,
//! or `std::fs` where the POSIX call is awkward); watches are scripted:
//! nothing fires until a test calls [`emit`], which invokes the registered
//! callbacks from a fresh "engine" thread.
//!
//! Per-thread counters let tests assert how many engine calls an operation
//! made and whether directory cursors were released.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::VecDeque;
use std::ffi::{CStr, CString, OsStr, c_char, c_int, c_void};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use native_fs_facade::ffi::{DirIter, NativeFsApi, RawIovec, RawStats, WatchCallback, Watcher};
use native_fs_facade::{Dispatcher, FileSystem};
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

// =============================================================================
// Bookkeeping
// =============================================================================

thread_local! {
    static LAST_ERROR: Cell<c_int> = const { Cell::new(0) };
    static CALLS: Cell<usize> = const { Cell::new(0) };
    static LIVE_DIRS: Cell<isize> = const { Cell::new(0) };
}

/// Engine calls made on this thread so far.
pub fn calls() -> usize {
    CALLS.with(Cell::get)
}

/// Directory cursors opened and not yet closed on this thread.
pub fn live_dirs() -> isize {
    LIVE_DIRS.with(Cell::get)
}

fn count() {
    CALLS.with(|c| c.set(c.get() + 1));
}

fn set_error(code: c_int) {
    LAST_ERROR.with(|e| e.set(code));
}

fn errno() -> c_int {
    io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or(libc::EIO)
}

/// Record errno and return the status failure sentinel.
fn failed() -> c_int {
    set_error(errno());
    -1
}

fn failed_count() -> isize {
    set_error(errno());
    -1
}

fn io_status(result: io::Result<()>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(err) => {
            set_error(err.raw_os_error().unwrap_or(libc::EIO));
            -1
        }
    }
}

fn libc_status(rc: c_int) -> c_int {
    if rc == 0 { 0 } else { failed() }
}

unsafe fn path<'a>(raw: *const c_char) -> &'a Path {
    Path::new(OsStr::from_bytes(unsafe { CStr::from_ptr(raw) }.to_bytes()))
}

fn into_engine_string(bytes: &[u8]) -> *mut c_char {
    match CString::new(bytes) {
        Ok(s) => s.into_raw(),
        Err(_) => {
            set_error(libc::EINVAL);
            ptr::null_mut()
        }
    }
}

fn path_result(result: io::Result<std::path::PathBuf>) -> *mut c_char {
    match result {
        Ok(p) => into_engine_string(p.as_os_str().as_bytes()),
        Err(err) => {
            set_error(err.raw_os_error().unwrap_or(libc::EIO));
            ptr::null_mut()
        }
    }
}

fn raw_stats(st: &libc::stat) -> RawStats {
    let ms = |secs: i64, nanos: i64| secs * 1000 + nanos / 1_000_000;
    RawStats {
        dev: st.st_dev as u64,
        ino: st.st_ino as u64,
        mode: st.st_mode as u64,
        nlink: st.st_nlink as u64,
        uid: st.st_uid as u64,
        gid: st.st_gid as u64,
        rdev: st.st_rdev as u64,
        size: st.st_size as u64,
        blksize: st.st_blksize as u64,
        blocks: st.st_blocks as u64,
        atime_ms: ms(st.st_atime as i64, st.st_atime_nsec as i64),
        mtime_ms: ms(st.st_mtime as i64, st.st_mtime_nsec as i64),
        ctime_ms: ms(st.st_ctime as i64, st.st_ctime_nsec as i64),
        birthtime_ms: ms(st.st_ctime as i64, st.st_ctime_nsec as i64),
    }
}

fn timespec(secs: f64) -> libc::timespec {
    let whole = secs.floor();
    libc::timespec {
        tv_sec: whole as libc::time_t,
        tv_nsec: ((secs - whole) * 1e9) as libc::c_long,
    }
}

// =============================================================================
// Descriptors and byte I/O
// =============================================================================

unsafe extern "C" fn engine_open(path: *const c_char, flags: c_int, mode: c_int) -> c_int {
    count();
    let fd = unsafe { libc::open(path, flags | libc::O_CLOEXEC, mode as libc::c_uint) };
    if fd < 0 { failed() } else { fd }
}

unsafe extern "C" fn engine_close(fd: c_int) {
    count();
    unsafe { libc::close(fd) };
}

unsafe extern "C" fn engine_read(fd: c_int, buf: *mut u8, len: usize, position: i64) -> isize {
    count();
    let n = if position < 0 {
        unsafe { libc::read(fd, buf.cast(), len) }
    } else {
        unsafe { libc::pread(fd, buf.cast(), len, position as libc::off_t) }
    };
    if n < 0 { failed_count() } else { n }
}

unsafe extern "C" fn engine_write(fd: c_int, buf: *const u8, len: usize, position: i64) -> isize {
    count();
    let n = if position < 0 {
        unsafe { libc::write(fd, buf.cast(), len) }
    } else {
        unsafe { libc::pwrite(fd, buf.cast(), len, position as libc::off_t) }
    };
    if n < 0 { failed_count() } else { n }
}

unsafe extern "C" fn engine_readv(
    fd: c_int,
    iov: *const RawIovec,
    iovcnt: c_int,
    position: i64,
) -> isize {
    count();
    let iov = iov.cast::<libc::iovec>();
    let n = if position < 0 {
        unsafe { libc::readv(fd, iov, iovcnt) }
    } else {
        unsafe { libc::preadv(fd, iov, iovcnt, position as libc::off_t) }
    };
    if n < 0 { failed_count() } else { n }
}

unsafe extern "C" fn engine_writev(
    fd: c_int,
    iov: *const RawIovec,
    iovcnt: c_int,
    position: i64,
) -> isize {
    count();
    let iov = iov.cast::<libc::iovec>();
    let n = if position < 0 {
        unsafe { libc::writev(fd, iov, iovcnt) }
    } else {
        unsafe { libc::pwritev(fd, iov, iovcnt, position as libc::off_t) }
    };
    if n < 0 { failed_count() } else { n }
}

// =============================================================================
// Metadata
// =============================================================================

unsafe extern "C" fn engine_stat(path: *const c_char, out: *mut RawStats) -> c_int {
    count();
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    if unsafe { libc::stat(path, &mut st) } != 0 {
        return failed();
    }
    unsafe { *out = raw_stats(&st) };
    0
}

unsafe extern "C" fn engine_lstat(path: *const c_char, out: *mut RawStats) -> c_int {
    count();
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    if unsafe { libc::lstat(path, &mut st) } != 0 {
        return failed();
    }
    unsafe { *out = raw_stats(&st) };
    0
}

unsafe extern "C" fn engine_fstat(fd: c_int, out: *mut RawStats) -> c_int {
    count();
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    if unsafe { libc::fstat(fd, &mut st) } != 0 {
        return failed();
    }
    unsafe { *out = raw_stats(&st) };
    0
}

unsafe extern "C" fn engine_access(path: *const c_char, mode: c_int) -> c_int {
    count();
    libc_status(unsafe { libc::access(path, mode) })
}

unsafe extern "C" fn engine_truncate(path: *const c_char, len: u64) -> c_int {
    count();
    libc_status(unsafe { libc::truncate(path, len as libc::off_t) })
}

unsafe extern "C" fn engine_ftruncate(fd: c_int, len: u64) -> c_int {
    count();
    libc_status(unsafe { libc::ftruncate(fd, len as libc::off_t) })
}

unsafe extern "C" fn engine_fsync(fd: c_int) -> c_int {
    count();
    libc_status(unsafe { libc::fsync(fd) })
}

unsafe extern "C" fn engine_chmod(path: *const c_char, mode: u32) -> c_int {
    count();
    libc_status(unsafe { libc::chmod(path, mode as libc::mode_t) })
}

// Linux has no lchmod; symlink permission bits are not meaningful there.
unsafe extern "C" fn engine_lchmod(path: *const c_char, mode: u32) -> c_int {
    count();
    libc_status(unsafe { libc::fchmodat(libc::AT_FDCWD, path, mode as libc::mode_t, 0) })
}

unsafe extern "C" fn engine_fchmod(fd: c_int, mode: u32) -> c_int {
    count();
    libc_status(unsafe { libc::fchmod(fd, mode as libc::mode_t) })
}

unsafe extern "C" fn engine_chown(path: *const c_char, uid: u32, gid: u32) -> c_int {
    count();
    libc_status(unsafe { libc::chown(path, uid, gid) })
}

unsafe extern "C" fn engine_lchown(path: *const c_char, uid: u32, gid: u32) -> c_int {
    count();
    libc_status(unsafe { libc::lchown(path, uid, gid) })
}

unsafe extern "C" fn engine_fchown(fd: c_int, uid: u32, gid: u32) -> c_int {
    count();
    libc_status(unsafe { libc::fchown(fd, uid, gid) })
}

unsafe extern "C" fn engine_utimes(path: *const c_char, atime: f64, mtime: f64) -> c_int {
    count();
    let times = [timespec(atime), timespec(mtime)];
    libc_status(unsafe { libc::utimensat(libc::AT_FDCWD, path, times.as_ptr(), 0) })
}

unsafe extern "C" fn engine_lutimes(path: *const c_char, atime: f64, mtime: f64) -> c_int {
    count();
    let times = [timespec(atime), timespec(mtime)];
    libc_status(unsafe {
        libc::utimensat(
            libc::AT_FDCWD,
            path,
            times.as_ptr(),
            libc::AT_SYMLINK_NOFOLLOW,
        )
    })
}

unsafe extern "C" fn engine_futimes(fd: c_int, atime: f64, mtime: f64) -> c_int {
    count();
    let times = [timespec(atime), timespec(mtime)];
    libc_status(unsafe { libc::futimens(fd, times.as_ptr()) })
}

// =============================================================================
// Links and names
// =============================================================================

unsafe extern "C" fn engine_link(from: *const c_char, to: *const c_char) -> c_int {
    count();
    libc_status(unsafe { libc::link(from, to) })
}

unsafe extern "C" fn engine_symlink(target: *const c_char, path: *const c_char) -> c_int {
    count();
    libc_status(unsafe { libc::symlink(target, path) })
}

unsafe extern "C" fn engine_readlink(raw: *const c_char) -> *mut c_char {
    count();
    path_result(std::fs::read_link(unsafe { path(raw) }))
}

unsafe extern "C" fn engine_realpath(raw: *const c_char) -> *mut c_char {
    count();
    path_result(std::fs::canonicalize(unsafe { path(raw) }))
}

// =============================================================================
// Tree manipulation
// =============================================================================

unsafe extern "C" fn engine_unlink(path: *const c_char) -> c_int {
    count();
    libc_status(unsafe { libc::unlink(path) })
}

unsafe extern "C" fn engine_rename(from: *const c_char, to: *const c_char) -> c_int {
    count();
    libc_status(unsafe { libc::rename(from, to) })
}

unsafe extern "C" fn engine_mkdir(raw: *const c_char, mode: u32, recursive: bool) -> c_int {
    count();
    if recursive {
        io_status(
            std::fs::DirBuilder::new()
                .recursive(true)
                .mode(mode)
                .create(unsafe { path(raw) }),
        )
    } else {
        libc_status(unsafe { libc::mkdir(raw, mode as libc::mode_t) })
    }
}

unsafe extern "C" fn engine_rmdir(path: *const c_char) -> c_int {
    count();
    libc_status(unsafe { libc::rmdir(path) })
}

unsafe extern "C" fn engine_rm(raw: *const c_char, recursive: bool) -> c_int {
    count();
    let path = unsafe { path(raw) };
    io_status(std::fs::symlink_metadata(path).and_then(|meta| {
        if !meta.is_dir() {
            std::fs::remove_file(path)
        } else if recursive {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_dir(path)
        }
    }))
}

unsafe extern "C" fn engine_copy_file(
    src: *const c_char,
    dest: *const c_char,
    flags: c_int,
) -> c_int {
    count();
    let (src, dest) = unsafe { (path(src), path(dest)) };
    if flags & native_fs_facade::constants::COPYFILE_EXCL != 0 && dest.exists() {
        set_error(libc::EEXIST);
        return -1;
    }
    io_status(std::fs::copy(src, dest).map(drop))
}

unsafe extern "C" fn engine_mkdtemp(prefix: *const c_char) -> *mut c_char {
    count();
    let mut template = unsafe { CStr::from_ptr(prefix) }.to_bytes().to_vec();
    template.extend_from_slice(b"XXXXXX\0");
    if unsafe { libc::mkdtemp(template.as_mut_ptr().cast()) }.is_null() {
        set_error(errno());
        return ptr::null_mut();
    }
    template.pop();
    into_engine_string(&template)
}

unsafe extern "C" fn engine_get_temp_dir() -> *mut c_char {
    count();
    into_engine_string(std::env::temp_dir().as_os_str().as_bytes())
}

// =============================================================================
// Directory cursors
// =============================================================================

/// Name that makes a listing fail: entries sorted after it are never
/// returned and the cursor reports `EIO` instead of the end.
pub const POISON_ENTRY: &str = "poison";

struct Listing {
    entries: VecDeque<CString>,
    poisoned: bool,
    error: c_int,
}

unsafe extern "C" fn engine_readdir_open(raw: *const c_char) -> *mut DirIter {
    count();
    let read = std::fs::read_dir(unsafe { path(raw) }).and_then(|dir| {
        dir.map(|entry| entry.map(|e| e.file_name()))
            .collect::<io::Result<Vec<_>>>()
    });
    let mut names = match read {
        Ok(names) => names,
        Err(err) => {
            set_error(err.raw_os_error().unwrap_or(libc::EIO));
            return ptr::null_mut();
        }
    };
    names.sort();

    let mut entries = VecDeque::new();
    let mut poisoned = false;
    for name in names {
        if name == POISON_ENTRY {
            poisoned = true;
            break;
        }
        entries.extend(CString::new(name.as_bytes()).ok());
    }

    LIVE_DIRS.with(|n| n.set(n.get() + 1));
    Box::into_raw(Box::new(Listing {
        entries,
        poisoned,
        error: 0,
    }))
    .cast()
}

unsafe extern "C" fn engine_readdir_next(iter: *mut DirIter) -> *mut c_char {
    count();
    let listing = unsafe { &mut *iter.cast::<Listing>() };
    match listing.entries.pop_front() {
        Some(name) => name.into_raw(),
        None => {
            if listing.poisoned {
                listing.error = libc::EIO;
            }
            ptr::null_mut()
        }
    }
}

unsafe extern "C" fn engine_readdir_error(iter: *mut DirIter) -> c_int {
    count();
    unsafe { &*iter.cast::<Listing>() }.error
}

unsafe extern "C" fn engine_readdir_close(iter: *mut DirIter) {
    count();
    drop(unsafe { Box::from_raw(iter.cast::<Listing>()) });
    LIVE_DIRS.with(|n| n.set(n.get() - 1));
}

// =============================================================================
// Whole files and strings
// =============================================================================

unsafe extern "C" fn engine_read_file(raw: *const c_char, out_len: *mut usize) -> *mut u8 {
    count();
    match std::fs::read(unsafe { path(raw) }) {
        Ok(data) => {
            let data = data.into_boxed_slice();
            unsafe { *out_len = data.len() };
            Box::into_raw(data).cast()
        }
        Err(err) => {
            set_error(err.raw_os_error().unwrap_or(libc::EIO));
            ptr::null_mut()
        }
    }
}

unsafe extern "C" fn engine_read_file_free(buf: *mut u8, len: usize) {
    count();
    drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(buf, len)) });
}

unsafe extern "C" fn engine_write_file(raw: *const c_char, buf: *const u8, len: usize) -> c_int {
    count();
    let data = unsafe { std::slice::from_raw_parts(buf, len) };
    io_status(std::fs::write(unsafe { path(raw) }, data))
}

unsafe extern "C" fn engine_free_string(s: *mut c_char) {
    count();
    drop(unsafe { CString::from_raw(s) });
}

// =============================================================================
// Scripted watches
// =============================================================================

struct Registration {
    id: usize,
    path: String,
    context: usize,
    callback: WatchCallback,
}

// Held while callbacks run, so `unwatch` waits out an in-flight event.
static WATCHES: Mutex<Vec<Registration>> = parking_lot::const_mutex(Vec::new());
static NEXT_WATCH: AtomicUsize = AtomicUsize::new(1);

unsafe extern "C" fn engine_watch(
    raw: *const c_char,
    context: *mut c_void,
    callback: WatchCallback,
) -> *mut Watcher {
    count();
    let path = unsafe { CStr::from_ptr(raw) }
        .to_string_lossy()
        .into_owned();
    if path.starts_with("/nonexistent") {
        set_error(libc::ENOENT);
        return ptr::null_mut();
    }
    let id = NEXT_WATCH.fetch_add(1, Ordering::Relaxed);
    WATCHES.lock().push(Registration {
        id,
        path,
        context: context as usize,
        callback,
    });
    Box::into_raw(Box::new(id)).cast()
}

unsafe extern "C" fn engine_unwatch(watcher: *mut Watcher) {
    count();
    let id = unsafe { Box::from_raw(watcher.cast::<usize>()) };
    WATCHES.lock().retain(|r| r.id != *id);
}

/// Fire one event at every watcher of `watched`, from a new engine thread.
///
/// Returns how many watchers were invoked.
pub fn emit(watched: &Path, event_path: &str, code: c_int) -> usize {
    let watched = watched.to_string_lossy().into_owned();
    let event_path = CString::new(event_path).expect("event path without NUL");
    thread::Builder::new()
        .name("engine-watch".into())
        .spawn(move || {
            let registry = WATCHES.lock();
            let mut fired = 0;
            for registration in registry.iter().filter(|r| r.path == watched) {
                unsafe {
                    (registration.callback)(
                        registration.context as *mut c_void,
                        event_path.as_ptr(),
                        code,
                    )
                };
                fired += 1;
            }
            fired
        })
        .expect("spawn engine thread")
        .join()
        .expect("engine thread panicked")
}

/// Number of live native watchers on `watched`.
pub fn watchers(watched: &Path) -> usize {
    let watched = watched.to_string_lossy();
    WATCHES.lock().iter().filter(|r| r.path == watched).count()
}

// =============================================================================
// Tables and facades
// =============================================================================

unsafe extern "C" fn engine_last_error() -> c_int {
    LAST_ERROR.with(Cell::get)
}

const ENGINE_TABLE: NativeFsApi = NativeFsApi {
    open: engine_open,
    close: engine_close,
    read: engine_read,
    write: engine_write,
    readv: engine_readv,
    writev: engine_writev,
    stat: engine_stat,
    lstat: engine_lstat,
    fstat: engine_fstat,
    access: engine_access,
    truncate: engine_truncate,
    ftruncate: engine_ftruncate,
    fsync: engine_fsync,
    chmod: engine_chmod,
    lchmod: engine_lchmod,
    fchmod: engine_fchmod,
    chown: engine_chown,
    lchown: engine_lchown,
    fchown: engine_fchown,
    utimes: engine_utimes,
    lutimes: engine_lutimes,
    futimes: engine_futimes,
    link: engine_link,
    symlink: engine_symlink,
    readlink: engine_readlink,
    realpath: engine_realpath,
    unlink: engine_unlink,
    rename: engine_rename,
    mkdir: engine_mkdir,
    rmdir: engine_rmdir,
    rm: engine_rm,
    copy_file: engine_copy_file,
    mkdtemp: engine_mkdtemp,
    get_temp_dir: engine_get_temp_dir,
    readdir_open: engine_readdir_open,
    readdir_next: engine_readdir_next,
    readdir_close: engine_readdir_close,
    read_file: engine_read_file,
    read_file_free: engine_read_file_free,
    write_file: engine_write_file,
    free_string: engine_free_string,
    watch: engine_watch,
    unwatch: engine_unwatch,
    last_error: Some(engine_last_error),
    readdir_error: Some(engine_readdir_error),
};

/// The test engine with both optional hooks.
pub static ENGINE: NativeFsApi = ENGINE_TABLE;

/// The test engine without `last_error` and `readdir_error`.
pub static BARE_ENGINE: NativeFsApi = NativeFsApi {
    last_error: None,
    readdir_error: None,
    ..ENGINE_TABLE
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Facade over [`ENGINE`] with its own dispatcher.
pub fn facade() -> FileSystem {
    init_tracing();
    let dispatcher = Dispatcher::start().expect("start dispatcher");
    unsafe { FileSystem::new(&ENGINE, dispatcher) }
}

/// Facade over [`BARE_ENGINE`].
pub fn bare_facade() -> FileSystem {
    init_tracing();
    let dispatcher = Dispatcher::start().expect("start dispatcher");
    unsafe { FileSystem::new(&BARE_ENGINE, dispatcher) }
}
