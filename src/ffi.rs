//! # Native ABI
//!
//! The flat C surface of the native filesystem engine.
//!
//! ## Overview
//!
//! The engine is reached only through plain functions over opaque handles.
//! [`NativeFsApi`] collects those functions into one `#[repr(C)]` table of
//! `extern "C"` function pointers, so the facade can be pointed at any engine
//! (the linked `rn_fs_*` symbols, a test engine, a sandboxed shim) without
//! recompiling.
//!
//! ## Failure Sentinels
//!
//! | Shape | Failure |
//! |-------|---------|
//! | descriptor / byte count | negative |
//! | status code | non-zero |
//! | allocated string, buffer, handle | null |
//!
//! ## Memory
//!
//! Every string returned by the engine must be released with
//! [`free_string`](NativeFsApi::free_string), every buffer from
//! [`read_file`](NativeFsApi::read_file) with
//! [`read_file_free`](NativeFsApi::read_file_free), each exactly once.

use std::ffi::{c_char, c_int, c_void};
use std::marker::{PhantomData, PhantomPinned};

/// Native event code for structural changes (create, delete, rename).
pub const EVENT_RENAME: c_int = 1;

/// Native event code for content or metadata changes.
pub const EVENT_CHANGE: c_int = 2;

/// Fixed-layout stat record filled in by the engine.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[allow(missing_docs)]
pub struct RawStats {
    pub dev: u64,
    pub ino: u64,
    pub mode: u64,
    pub nlink: u64,
    pub uid: u64,
    pub gid: u64,
    pub rdev: u64,
    pub size: u64,
    pub blksize: u64,
    pub blocks: u64,
    /// Milliseconds since the Unix epoch (negative before it).
    pub atime_ms: i64,
    pub mtime_ms: i64,
    pub ctime_ms: i64,
    pub birthtime_ms: i64,
}

/// One scatter/gather segment. Layout-compatible with POSIX `struct iovec`.
///
/// For `writev` the engine must treat `base` as read-only.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawIovec {
    /// Start of the segment.
    pub base: *mut u8,
    /// Length of the segment in bytes.
    pub len: usize,
}

/// Opaque directory cursor owned by the engine.
#[repr(C)]
pub struct DirIter {
    _data: [u8; 0],
    _marker: PhantomData<(*mut u8, PhantomPinned)>,
}

/// Opaque change subscription owned by the engine.
#[repr(C)]
pub struct Watcher {
    _data: [u8; 0],
    _marker: PhantomData<(*mut u8, PhantomPinned)>,
}

/// Callback the engine invokes, on a thread it owns, for every change event.
///
/// `context` is the pointer that was passed to [`NativeFsApi::watch`].
pub type WatchCallback =
    unsafe extern "C" fn(context: *mut c_void, path: *const c_char, event: c_int);

type PathFn = unsafe extern "C" fn(path: *const c_char) -> c_int;
type TwoPathFn = unsafe extern "C" fn(from: *const c_char, to: *const c_char) -> c_int;
type PathStringFn = unsafe extern "C" fn(path: *const c_char) -> *mut c_char;
pub(crate) type StatFn = unsafe extern "C" fn(path: *const c_char, out: *mut RawStats) -> c_int;
pub(crate) type VectorFn =
    unsafe extern "C" fn(fd: c_int, iov: *const RawIovec, count: c_int, position: i64) -> isize;
type ModeFn = unsafe extern "C" fn(path: *const c_char, mode: u32) -> c_int;
type OwnerFn = unsafe extern "C" fn(path: *const c_char, uid: u32, gid: u32) -> c_int;
type TimesFn = unsafe extern "C" fn(path: *const c_char, atime: f64, mtime: f64) -> c_int;

/// Function table of the native filesystem engine.
///
/// All path arguments are NUL-terminated byte strings. Positions are byte
/// offsets; a negative position means "the descriptor's current offset".
/// Times are seconds since the Unix epoch.
///
/// # Contract
///
/// Handing a table to [`FileSystem::new`](crate::FileSystem::new) promises
/// that every function behaves as documented here. In particular:
///
/// - handles may be used from any thread, but never concurrently;
/// - after [`unwatch`](Self::unwatch) returns, the engine neither runs nor
///   starts a callback for that watcher.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
#[allow(missing_docs)]
pub struct NativeFsApi {
    pub open: unsafe extern "C" fn(path: *const c_char, flags: c_int, mode: c_int) -> c_int,
    pub close: unsafe extern "C" fn(fd: c_int),
    pub read: unsafe extern "C" fn(fd: c_int, buf: *mut u8, len: usize, position: i64) -> isize,
    pub write:
        unsafe extern "C" fn(fd: c_int, buf: *const u8, len: usize, position: i64) -> isize,
    pub readv: VectorFn,
    pub writev: VectorFn,

    pub stat: StatFn,
    pub lstat: StatFn,
    pub fstat: unsafe extern "C" fn(fd: c_int, out: *mut RawStats) -> c_int,

    pub access: unsafe extern "C" fn(path: *const c_char, mode: c_int) -> c_int,
    pub truncate: unsafe extern "C" fn(path: *const c_char, len: u64) -> c_int,
    pub ftruncate: unsafe extern "C" fn(fd: c_int, len: u64) -> c_int,
    pub fsync: unsafe extern "C" fn(fd: c_int) -> c_int,

    pub chmod: ModeFn,
    pub lchmod: ModeFn,
    pub fchmod: unsafe extern "C" fn(fd: c_int, mode: u32) -> c_int,
    pub chown: OwnerFn,
    pub lchown: OwnerFn,
    pub fchown: unsafe extern "C" fn(fd: c_int, uid: u32, gid: u32) -> c_int,
    pub utimes: TimesFn,
    pub lutimes: TimesFn,
    pub futimes: unsafe extern "C" fn(fd: c_int, atime: f64, mtime: f64) -> c_int,

    pub link: TwoPathFn,
    pub symlink: TwoPathFn,
    pub readlink: PathStringFn,
    pub realpath: PathStringFn,

    pub unlink: PathFn,
    pub rename: TwoPathFn,
    pub mkdir: unsafe extern "C" fn(path: *const c_char, mode: u32, recursive: bool) -> c_int,
    pub rmdir: PathFn,
    pub rm: unsafe extern "C" fn(path: *const c_char, recursive: bool) -> c_int,
    pub copy_file:
        unsafe extern "C" fn(src: *const c_char, dest: *const c_char, flags: c_int) -> c_int,
    pub mkdtemp: PathStringFn,
    pub get_temp_dir: unsafe extern "C" fn() -> *mut c_char,

    pub readdir_open: unsafe extern "C" fn(path: *const c_char) -> *mut DirIter,
    /// Null means the listing is exhausted (or failed, see `readdir_error`).
    pub readdir_next: unsafe extern "C" fn(iter: *mut DirIter) -> *mut c_char,
    pub readdir_close: unsafe extern "C" fn(iter: *mut DirIter),

    pub read_file: unsafe extern "C" fn(path: *const c_char, out_len: *mut usize) -> *mut u8,
    pub read_file_free: unsafe extern "C" fn(buf: *mut u8, len: usize),
    pub write_file: unsafe extern "C" fn(path: *const c_char, buf: *const u8, len: usize) -> c_int,
    pub free_string: unsafe extern "C" fn(s: *mut c_char),

    pub watch: unsafe extern "C" fn(
        path: *const c_char,
        context: *mut c_void,
        callback: WatchCallback,
    ) -> *mut Watcher,
    pub unwatch: unsafe extern "C" fn(watcher: *mut Watcher),

    /// Optional: errno-style code of the calling thread's most recent failure.
    pub last_error: Option<unsafe extern "C" fn() -> c_int>,
    /// Optional: non-zero when the last null from `readdir_next` was an error
    /// rather than the end of the listing.
    pub readdir_error: Option<unsafe extern "C" fn(iter: *mut DirIter) -> c_int>,
}

#[cfg(feature = "linked")]
mod linked {
    use super::*;

    unsafe extern "C" {
        fn rn_fs_open(path: *const c_char, flags: c_int, mode: c_int) -> c_int;
        fn rn_fs_close(fd: c_int);
        fn rn_fs_read(fd: c_int, buf: *mut u8, len: usize, position: i64) -> isize;
        fn rn_fs_write(fd: c_int, buf: *const u8, len: usize, position: i64) -> isize;
        fn rn_fs_readv(fd: c_int, iov: *const RawIovec, count: c_int, position: i64) -> isize;
        fn rn_fs_writev(fd: c_int, iov: *const RawIovec, count: c_int, position: i64) -> isize;
        fn rn_fs_stat(path: *const c_char, out: *mut RawStats) -> c_int;
        fn rn_fs_lstat(path: *const c_char, out: *mut RawStats) -> c_int;
        fn rn_fs_fstat(fd: c_int, out: *mut RawStats) -> c_int;
        fn rn_fs_access(path: *const c_char, mode: c_int) -> c_int;
        fn rn_fs_truncate(path: *const c_char, len: u64) -> c_int;
        fn rn_fs_ftruncate(fd: c_int, len: u64) -> c_int;
        fn rn_fs_fsync(fd: c_int) -> c_int;
        fn rn_fs_chmod(path: *const c_char, mode: u32) -> c_int;
        fn rn_fs_lchmod(path: *const c_char, mode: u32) -> c_int;
        fn rn_fs_fchmod(fd: c_int, mode: u32) -> c_int;
        fn rn_fs_chown(path: *const c_char, uid: u32, gid: u32) -> c_int;
        fn rn_fs_lchown(path: *const c_char, uid: u32, gid: u32) -> c_int;
        fn rn_fs_fchown(fd: c_int, uid: u32, gid: u32) -> c_int;
        fn rn_fs_utimes(path: *const c_char, atime: f64, mtime: f64) -> c_int;
        fn rn_fs_lutimes(path: *const c_char, atime: f64, mtime: f64) -> c_int;
        fn rn_fs_futimes(fd: c_int, atime: f64, mtime: f64) -> c_int;
        fn rn_fs_link(from: *const c_char, to: *const c_char) -> c_int;
        fn rn_fs_symlink(target: *const c_char, path: *const c_char) -> c_int;
        fn rn_fs_readlink(path: *const c_char) -> *mut c_char;
        fn rn_fs_realpath(path: *const c_char) -> *mut c_char;
        fn rn_fs_unlink(path: *const c_char) -> c_int;
        fn rn_fs_rename(from: *const c_char, to: *const c_char) -> c_int;
        fn rn_fs_mkdir(path: *const c_char, mode: u32, recursive: bool) -> c_int;
        fn rn_fs_rmdir(path: *const c_char) -> c_int;
        fn rn_fs_rm(path: *const c_char, recursive: bool) -> c_int;
        fn rn_fs_copy_file(src: *const c_char, dest: *const c_char, flags: c_int) -> c_int;
        fn rn_fs_mkdtemp(prefix: *const c_char) -> *mut c_char;
        fn rn_fs_get_temp_dir() -> *mut c_char;
        fn rn_fs_readdir_open(path: *const c_char) -> *mut DirIter;
        fn rn_fs_readdir_next(iter: *mut DirIter) -> *mut c_char;
        fn rn_fs_readdir_close(iter: *mut DirIter);
        fn rn_fs_read_file(path: *const c_char, out_len: *mut usize) -> *mut u8;
        fn rn_fs_read_file_free(buf: *mut u8, len: usize);
        fn rn_fs_write_file(path: *const c_char, buf: *const u8, len: usize) -> c_int;
        fn rn_fs_free_string(s: *mut c_char);
        fn rn_fs_watch(
            path: *const c_char,
            context: *mut c_void,
            callback: WatchCallback,
        ) -> *mut Watcher;
        fn rn_fs_unwatch(watcher: *mut Watcher);
    }

    impl NativeFsApi {
        /// The engine linked into the final binary through its `rn_fs_*` exports.
        pub const LINKED: NativeFsApi = NativeFsApi {
            open: rn_fs_open,
            close: rn_fs_close,
            read: rn_fs_read,
            write: rn_fs_write,
            readv: rn_fs_readv,
            writev: rn_fs_writev,
            stat: rn_fs_stat,
            lstat: rn_fs_lstat,
            fstat: rn_fs_fstat,
            access: rn_fs_access,
            truncate: rn_fs_truncate,
            ftruncate: rn_fs_ftruncate,
            fsync: rn_fs_fsync,
            chmod: rn_fs_chmod,
            lchmod: rn_fs_lchmod,
            fchmod: rn_fs_fchmod,
            chown: rn_fs_chown,
            lchown: rn_fs_lchown,
            fchown: rn_fs_fchown,
            utimes: rn_fs_utimes,
            lutimes: rn_fs_lutimes,
            futimes: rn_fs_futimes,
            link: rn_fs_link,
            symlink: rn_fs_symlink,
            readlink: rn_fs_readlink,
            realpath: rn_fs_realpath,
            unlink: rn_fs_unlink,
            rename: rn_fs_rename,
            mkdir: rn_fs_mkdir,
            rmdir: rn_fs_rmdir,
            rm: rn_fs_rm,
            copy_file: rn_fs_copy_file,
            mkdtemp: rn_fs_mkdtemp,
            get_temp_dir: rn_fs_get_temp_dir,
            readdir_open: rn_fs_readdir_open,
            readdir_next: rn_fs_readdir_next,
            readdir_close: rn_fs_readdir_close,
            read_file: rn_fs_read_file,
            read_file_free: rn_fs_read_file_free,
            write_file: rn_fs_write_file,
            free_string: rn_fs_free_string,
            watch: rn_fs_watch,
            unwatch: rn_fs_unwatch,
            last_error: None,
            readdir_error: None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, size_of};

    #[test]
    fn raw_iovec_matches_libc_iovec() {
        assert_eq!(size_of::<RawIovec>(), size_of::<libc::iovec>());
        assert_eq!(align_of::<RawIovec>(), align_of::<libc::iovec>());
    }

    #[test]
    fn raw_stats_is_fixed_width() {
        assert_eq!(size_of::<RawStats>(), 14 * 8);
    }

    #[test]
    fn opaque_handles_are_zero_sized() {
        assert_eq!(size_of::<DirIter>(), 0);
        assert_eq!(size_of::<Watcher>(), 0);
    }

    #[test]
    fn event_codes_are_distinct() {
        assert_ne!(EVENT_RENAME, EVENT_CHANGE);
    }
}
