//! Live directory cursor over one native iterator handle.

use std::iter::FusedIterator;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use tracing::{debug, trace};

use crate::FsError;
use crate::convert::take_string;
use crate::error::Target;
use crate::ffi::{DirIter, NativeFsApi};

/// Cursor over the entries of one directory.
///
/// Returned by [`FileSystem::opendir`](crate::FileSystem::opendir). Owns a
/// single native iterator handle, released on the first
/// [`close`](Self::close) or when the iterator is dropped.
///
/// Iterating yields entry names in engine order. Exhaustion is a normal end
/// state: [`next`](Iterator::next) returns `None` once the listing is done,
/// after a close, and (since the plain iterator cannot report errors) after a
/// mid-stream engine failure. Use [`try_next`](Self::try_next) to tell the
/// last two apart when the engine supports it.
///
/// # Example
///
/// ```rust,ignore
/// let mut dir = fs.opendir("/data")?;
/// for name in &mut dir {
///     println!("{name}");
/// }
/// dir.close();
/// ```
pub struct DirectoryIterator {
    api: &'static NativeFsApi,
    iter: Option<NonNull<DirIter>>,
    path: PathBuf,
    done: bool,
}

// SAFETY: the engine contract lets a handle move between threads as long as
// it is never used concurrently, which `&mut self` guarantees.
unsafe impl Send for DirectoryIterator {}

impl DirectoryIterator {
    /// # Safety
    ///
    /// `iter` must be a live handle from `api.readdir_open`, owned by nobody else.
    pub(crate) unsafe fn from_raw(
        api: &'static NativeFsApi,
        iter: NonNull<DirIter>,
        path: PathBuf,
    ) -> Self {
        debug!(path = %path.display(), "directory iterator opened");
        Self {
            api,
            iter: Some(iter),
            path,
            done: false,
        }
    }

    /// Advance the cursor, reporting mid-stream failures.
    ///
    /// Returns `Ok(None)` at the end of the listing or after a close. If the
    /// engine provides the optional `readdir_error` hook and it flags the
    /// last null entry as a failure, returns `Err` once; the cursor is then
    /// finished. Without the hook a failure looks like the end.
    pub fn try_next(&mut self) -> Result<Option<String>, FsError> {
        let Some(iter) = self.iter else {
            return Ok(None);
        };
        if self.done {
            return Ok(None);
        }

        // SAFETY: `iter` is live until `close` takes it out of `self.iter`.
        let name = unsafe { (self.api.readdir_next)(iter.as_ptr()) };
        // SAFETY: entries are engine strings released by `free_string`.
        if let Some(name) = unsafe { take_string(name, self.api.free_string) } {
            return Ok(Some(name));
        }

        self.done = true;
        // SAFETY: same live handle.
        let code = self
            .api
            .readdir_error
            .map_or(0, |readdir_error| unsafe { readdir_error(iter.as_ptr()) });
        if code != 0 {
            return Err(FsError::native(
                "readdir",
                Target::Path(self.path.clone()),
                Some(code),
            ));
        }
        Ok(None)
    }

    /// Release the native handle. Later calls do nothing.
    pub fn close(&mut self) {
        if let Some(iter) = self.iter.take() {
            // SAFETY: taken out of `self.iter`, so released exactly once.
            unsafe { (self.api.readdir_close)(iter.as_ptr()) };
            debug!(path = %self.path.display(), "directory iterator closed");
        }
    }

    /// Returns `true` once the native handle has been released.
    pub fn is_closed(&self) -> bool {
        self.iter.is_none()
    }

    /// The directory being listed.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Iterator for DirectoryIterator {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.try_next().unwrap_or_else(|err| {
            trace!(%err, "directory listing ended on error");
            None
        })
    }
}

impl FusedIterator for DirectoryIterator {}

impl Drop for DirectoryIterator {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for DirectoryIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryIterator")
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}
