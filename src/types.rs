//! Core value types crossing the facade boundary.

use std::ffi::c_int;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::FsError;
use crate::ffi::EVENT_CHANGE;

/// Opaque file descriptor returned by [`FileSystem::open`](crate::FileSystem::open).
///
/// The value is only meaningful to the native engine. The facade never
/// tracks whether a descriptor is still open; using one after
/// [`close`](crate::FileSystem::close) is the caller's bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Fd(pub c_int);

impl Fd {
    /// The raw native value.
    #[inline]
    pub const fn raw(self) -> c_int {
        self.0
    }
}

impl fmt::Display for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd {}", self.0)
    }
}

/// Snapshot of file metadata.
///
/// Every field is an `f64` to match a host runtime with a single numeric
/// type. Integer fields larger than 2^53 (device ids, inode numbers on some
/// filesystems, very large sizes) are rounded to the nearest representable
/// value. Timestamps are milliseconds since the Unix epoch and may be
/// negative.
///
/// Only produced by converting the engine's stat record.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
#[allow(missing_docs)]
pub struct Stats {
    pub dev: f64,
    pub ino: f64,
    pub mode: f64,
    pub nlink: f64,
    pub uid: f64,
    pub gid: f64,
    pub rdev: f64,
    pub size: f64,
    pub blksize: f64,
    pub blocks: f64,
    pub atime_ms: f64,
    pub mtime_ms: f64,
    pub ctime_ms: f64,
    pub birthtime_ms: f64,
}

impl Stats {
    fn format(&self) -> u32 {
        (self.mode as u32) & (libc::S_IFMT as u32)
    }

    /// Returns `true` if this is a regular file.
    #[inline]
    pub fn is_file(&self) -> bool {
        self.format() == libc::S_IFREG as u32
    }

    /// Returns `true` if this is a directory.
    #[inline]
    pub fn is_dir(&self) -> bool {
        self.format() == libc::S_IFDIR as u32
    }

    /// Returns `true` if this is a symbolic link (only seen through `lstat`).
    #[inline]
    pub fn is_symlink(&self) -> bool {
        self.format() == libc::S_IFLNK as u32
    }

    /// The file type encoded in `mode`.
    pub fn file_type(&self) -> FileType {
        if self.is_file() {
            FileType::File
        } else if self.is_dir() {
            FileType::Directory
        } else if self.is_symlink() {
            FileType::Symlink
        } else {
            FileType::Other
        }
    }
}

/// Type of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Device, FIFO, socket.
    Other,
}

/// A directory entry returned from
/// [`FsExt::read_dir_entries`](crate::FsExt::read_dir_entries).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DirEntry {
    /// Name of the entry (filename only, not full path).
    pub name: String,
    /// Full path to the entry.
    pub path: PathBuf,
    /// Type of the entry, not following symlinks.
    pub file_type: FileType,
}

/// Coarse kind of a filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ChangeKind {
    /// Structural change: create, delete or rename.
    Rename,
    /// Content or metadata change.
    Change,
}

impl ChangeKind {
    /// Translate a native event code. Anything but [`EVENT_CHANGE`] is a rename.
    pub const fn from_native(code: c_int) -> Self {
        if code == EVENT_CHANGE {
            ChangeKind::Change
        } else {
            ChangeKind::Rename
        }
    }

    /// The event name as the host runtime spells it.
    pub const fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Rename => "rename",
            ChangeKind::Change => "change",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One change notification delivered to a watch callback.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChangeEvent {
    /// What kind of change happened.
    pub kind: ChangeKind,
    /// The path the engine reported.
    pub path: String,
}

/// Flags for opening a file.
///
/// Converted to the platform's `O_*` bits with [`bits`](OpenFlags::bits).
/// Also parses the usual mode strings:
///
/// ```rust
/// use native_fs_facade::OpenFlags;
///
/// let flags: OpenFlags = "a+".parse().unwrap();
/// assert!(flags.read && flags.append && flags.create);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    /// Open for reading.
    pub read: bool,
    /// Open for writing.
    pub write: bool,
    /// Create file if it doesn't exist.
    pub create: bool,
    /// Truncate file to zero length.
    pub truncate: bool,
    /// Append to end of file.
    pub append: bool,
    /// Fail if the file already exists (with `create`).
    pub exclusive: bool,
}

impl OpenFlags {
    /// Read-only access (`r`).
    pub const READ: Self = Self {
        read: true,
        write: false,
        create: false,
        truncate: false,
        append: false,
        exclusive: false,
    };

    /// Write access with create and truncate (`w`).
    pub const WRITE: Self = Self {
        read: false,
        write: true,
        create: true,
        truncate: true,
        append: false,
        exclusive: false,
    };

    /// Read and write access (`r+`).
    pub const READ_WRITE: Self = Self {
        read: true,
        write: true,
        create: false,
        truncate: false,
        append: false,
        exclusive: false,
    };

    /// Append mode - writes go to end of file (`a`).
    pub const APPEND: Self = Self {
        read: false,
        write: true,
        create: true,
        truncate: false,
        append: true,
        exclusive: false,
    };

    /// The raw flag word passed to the engine's `open`.
    pub fn bits(&self) -> c_int {
        let mut bits = match (self.read, self.write) {
            (true, true) => libc::O_RDWR,
            (false, true) => libc::O_WRONLY,
            _ => libc::O_RDONLY,
        };
        if self.create {
            bits |= libc::O_CREAT;
        }
        if self.truncate {
            bits |= libc::O_TRUNC;
        }
        if self.append {
            bits |= libc::O_APPEND;
        }
        if self.exclusive {
            bits |= libc::O_EXCL;
        }
        bits
    }
}

impl FromStr for OpenFlags {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, exclusive) = match s {
            "r" | "rs" | "sr" => (Self::READ, false),
            "r+" | "rs+" | "sr+" => (Self::READ_WRITE, false),
            "w" => (Self::WRITE, false),
            "wx" | "xw" => (Self::WRITE, true),
            "w+" => (
                Self {
                    read: true,
                    ..Self::WRITE
                },
                false,
            ),
            "wx+" | "xw+" => (
                Self {
                    read: true,
                    ..Self::WRITE
                },
                true,
            ),
            "a" => (Self::APPEND, false),
            "ax" | "xa" => (Self::APPEND, true),
            "a+" => (
                Self {
                    read: true,
                    ..Self::APPEND
                },
                false,
            ),
            "ax+" | "xa+" => (
                Self {
                    read: true,
                    ..Self::APPEND
                },
                true,
            ),
            other => {
                return Err(FsError::InvalidArgument {
                    operation: "open",
                    details: format!("unknown open flags {other:?}"),
                });
            }
        };
        Ok(Self { exclusive, ..base })
    }
}

/// Raw constants accepted by the facade's integer arguments.
pub mod constants {
    use std::ffi::c_int;

    /// `access`: the path exists.
    pub const F_OK: c_int = libc::F_OK;
    /// `access`: readable.
    pub const R_OK: c_int = libc::R_OK;
    /// `access`: writable.
    pub const W_OK: c_int = libc::W_OK;
    /// `access`: executable.
    pub const X_OK: c_int = libc::X_OK;

    /// `copy_file`: fail if the destination exists.
    pub const COPYFILE_EXCL: c_int = 1;
    /// `copy_file`: try a copy-on-write clone, fall back to copying.
    pub const COPYFILE_FICLONE: c_int = 2;
    /// `copy_file`: clone or fail.
    pub const COPYFILE_FICLONE_FORCE: c_int = 4;
}
