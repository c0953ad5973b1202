//! Conversion of native records and engine-owned memory into owned values.
//!
//! Every engine allocation that passes through here is copied and released
//! before the function returns.

use std::ffi::{CStr, c_char};

use crate::Stats;
use crate::ffi::RawStats;

/// Widen a native stat record into [`Stats`].
pub(crate) fn to_stats(raw: &RawStats) -> Stats {
    Stats {
        dev: raw.dev as f64,
        ino: raw.ino as f64,
        mode: raw.mode as f64,
        nlink: raw.nlink as f64,
        uid: raw.uid as f64,
        gid: raw.gid as f64,
        rdev: raw.rdev as f64,
        size: raw.size as f64,
        blksize: raw.blksize as f64,
        blocks: raw.blocks as f64,
        atime_ms: raw.atime_ms as f64,
        mtime_ms: raw.mtime_ms as f64,
        ctime_ms: raw.ctime_ms as f64,
        birthtime_ms: raw.birthtime_ms as f64,
    }
}

/// Copy an engine-allocated string and free it.
///
/// Returns `None` (freeing nothing) for a null pointer. Invalid UTF-8 is
/// replaced lossily.
///
/// # Safety
///
/// `ptr` must be null or a NUL-terminated string allocated by the engine
/// that `free` releases, not yet freed.
pub(crate) unsafe fn take_string(
    ptr: *mut c_char,
    free: unsafe extern "C" fn(*mut c_char),
) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: non-null and NUL-terminated per the caller's contract.
    let owned = unsafe { CStr::from_ptr(ptr) }
        .to_string_lossy()
        .into_owned();
    // SAFETY: released exactly once, after the last read.
    unsafe { free(ptr) };
    Some(owned)
}

/// Copy an engine-allocated byte buffer and free it.
///
/// # Safety
///
/// `ptr` must be null or point to `len` readable bytes allocated by the
/// engine that `free` releases, not yet freed.
pub(crate) unsafe fn take_buffer(
    ptr: *mut u8,
    len: usize,
    free: unsafe extern "C" fn(*mut u8, usize),
) -> Option<Vec<u8>> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: `len` readable bytes per the caller's contract.
    let owned = unsafe { std::slice::from_raw_parts(ptr, len) }.to_vec();
    // SAFETY: released exactly once, after the copy.
    unsafe { free(ptr, len) };
    Some(owned)
}
