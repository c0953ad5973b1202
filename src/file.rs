//! # File Handles
//!
//! A descriptor-owning cursor that implements [`Read`], [`Write`] and
//! [`Seek`] on top of [`FileSystem::read`] and [`FileSystem::write`].
//!
//! The handle tracks its own position and passes it to every transfer, so
//! the engine's file offset is never relied on. An optional inclusive end
//! limits how far reads go. In append mode writes always land at the end of
//! the file and leave the tracked position alone.
//!
//! ```rust,ignore
//! use std::io::{Read, Write};
//! use native_fs_facade::OpenFlags;
//!
//! let mut out = fs.open_file("/tmp/log", OpenFlags::APPEND, 0o644)?;
//! out.write_all(b"line\n")?;
//!
//! let mut head = String::new();
//! fs.open_file("/tmp/log", OpenFlags::READ, 0)?
//!     .with_end(99)
//!     .read_to_string(&mut head)?;
//! ```

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{Fd, FileSystem, FsError, Stats};

/// An open file descriptor with a tracked position.
///
/// Created by [`FileSystem::open_file`] or adopted with
/// [`from_fd`](Self::from_fd). The descriptor is closed by
/// [`close`](Self::close) or on drop, unless
/// [`auto_close(false)`](Self::auto_close) was set.
pub struct FileHandle {
    fs: FileSystem,
    fd: Option<Fd>,
    path: Option<PathBuf>,
    pos: u64,
    end: Option<u64>,
    append: bool,
    auto_close: bool,
    bytes_read: u64,
    bytes_written: u64,
}

impl FileHandle {
    pub(crate) fn opened(fs: &FileSystem, fd: Fd, path: &Path, append: bool) -> Self {
        let mut handle = Self::from_fd(fs, fd);
        handle.path = Some(path.to_path_buf());
        handle.append = append;
        handle
    }

    /// Take ownership of an already open descriptor.
    pub fn from_fd(fs: &FileSystem, fd: Fd) -> Self {
        Self {
            fs: fs.clone(),
            fd: Some(fd),
            path: None,
            pos: 0,
            end: None,
            append: false,
            auto_close: true,
            bytes_read: 0,
            bytes_written: 0,
        }
    }

    /// Start reading and writing at `start` instead of offset 0.
    pub fn with_start(mut self, start: u64) -> Self {
        self.pos = start;
        self
    }

    /// Stop reads after the byte at offset `end` (inclusive).
    pub fn with_end(mut self, end: u64) -> Self {
        self.end = Some(end);
        self
    }

    /// Whether dropping the handle closes the descriptor. Defaults to `true`.
    pub fn auto_close(mut self, auto_close: bool) -> Self {
        self.auto_close = auto_close;
        self
    }

    /// The descriptor, or `None` once closed.
    pub fn fd(&self) -> Option<Fd> {
        self.fd
    }

    /// The path the handle was opened from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Offset of the next read or positioned write.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Total bytes returned by [`Read::read`].
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Total bytes accepted by [`Write::write`].
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Returns `true` once the descriptor has been closed or released.
    pub fn is_closed(&self) -> bool {
        self.fd.is_none()
    }

    /// Metadata of the open file.
    pub fn metadata(&self) -> Result<Stats, FsError> {
        self.fs.fstat(self.live("fstat")?)
    }

    /// Flush file contents and metadata to storage.
    pub fn sync_all(&self) -> Result<(), FsError> {
        self.fs.fsync(self.live("fsync")?)
    }

    /// Truncate or extend the file to `len` bytes.
    pub fn set_len(&self, len: u64) -> Result<(), FsError> {
        self.fs.ftruncate(self.live("ftruncate")?, len)
    }

    /// Close the descriptor. Later calls are no-ops.
    pub fn close(&mut self) {
        if let Some(fd) = self.fd.take() {
            self.fs.close(fd);
            debug!(%fd, "file handle closed");
        }
    }

    /// Give up ownership of the descriptor without closing it.
    pub fn into_fd(mut self) -> Option<Fd> {
        self.fd.take()
    }

    fn live(&self, operation: &'static str) -> Result<Fd, FsError> {
        self.fd.ok_or_else(|| FsError::InvalidArgument {
            operation,
            details: "file handle is closed".into(),
        })
    }

    /// Bytes a read may return before passing `end`.
    fn readable(&self, want: usize) -> usize {
        match self.end {
            None => want,
            Some(end) if self.pos > end => 0,
            Some(end) => {
                let left = (end - self.pos).saturating_add(1);
                want.min(usize::try_from(left).unwrap_or(usize::MAX))
            }
        }
    }
}

impl Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let fd = self.live("read")?;
        let want = self.readable(buf.len());
        if want == 0 {
            return Ok(0);
        }
        let n = self.fs.read(fd, buf, 0, want, Some(self.pos))?;
        self.pos += n as u64;
        self.bytes_read += n as u64;
        Ok(n)
    }
}

impl Write for FileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let fd = self.live("write")?;
        if buf.is_empty() {
            return Ok(0);
        }
        let position = if self.append { None } else { Some(self.pos) };
        let n = self.fs.write(fd, buf, 0, buf.len(), position)?;
        if !self.append {
            self.pos += n as u64;
        }
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for FileHandle {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        let fd = self.live("seek")?;
        let pos = match target {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
            SeekFrom::End(delta) => (self.fs.fstat(fd)?.size as u64).checked_add_signed(delta),
        };
        let pos = pos.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative or overflowing position",
            )
        })?;
        self.pos = pos;
        Ok(pos)
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if self.auto_close {
            self.close();
        }
    }
}

impl std::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandle")
            .field("fd", &self.fd)
            .field("path", &self.path)
            .field("position", &self.pos)
            .field("end", &self.end)
            .field("append", &self.append)
            .finish()
    }
}
