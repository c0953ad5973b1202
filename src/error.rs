//! Error types for the native filesystem facade.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::Fd;

/// What a failed operation was acting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The operation takes no path or descriptor.
    None,
    /// A single path.
    Path(PathBuf),
    /// A source and destination path (link, rename, copy).
    Paths(PathBuf, PathBuf),
    /// An open descriptor.
    Descriptor(Fd),
}

impl Target {
    pub(crate) fn path(path: &Path) -> Self {
        Target::Path(path.to_path_buf())
    }

    pub(crate) fn paths(from: &Path, to: &Path) -> Self {
        Target::Paths(from.to_path_buf(), to.to_path_buf())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::None => Ok(()),
            Target::Path(path) => write!(f, "{}", path.display()),
            Target::Paths(from, to) => write!(f, "{} -> {}", from.display(), to.display()),
            Target::Descriptor(fd) => write!(f, "fd {}", fd.raw()),
        }
    }
}

// ": <target>" or nothing, so messages read "stat failed: /x" and "get_temp_dir failed".
fn suffix(target: &Target) -> String {
    match target {
        Target::None => String::new(),
        other => format!(": {other}"),
    }
}

/// Facade error type with contextual variants.
///
/// Native failures always name the operation and the path or descriptor
/// involved. When the engine reports an errno-style code, common codes are
/// lifted into [`NotFound`](FsError::NotFound),
/// [`PermissionDenied`](FsError::PermissionDenied) and
/// [`AlreadyExists`](FsError::AlreadyExists); the rest keep the code as the
/// error [`source`](std::error::Error::source).
///
/// # Examples
///
/// ```rust
/// use native_fs_facade::{FsError, Target};
/// use std::path::PathBuf;
///
/// let err = FsError::Native {
///     operation: "stat",
///     target: Target::Path(PathBuf::from("/missing")),
///     source: None,
/// };
/// assert_eq!(err.to_string(), "stat failed: /missing");
/// ```
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    // Native failures
    /// The engine reported that the target does not exist.
    #[error("{operation}: not found{}", suffix(.target))]
    NotFound {
        /// The operation that failed.
        operation: &'static str,
        /// What the operation acted on.
        target: Target,
    },

    /// The engine refused the operation.
    #[error("{operation}: permission denied{}", suffix(.target))]
    PermissionDenied {
        /// The operation that failed.
        operation: &'static str,
        /// What the operation acted on.
        target: Target,
    },

    /// The target already exists.
    #[error("{operation}: already exists{}", suffix(.target))]
    AlreadyExists {
        /// The operation that failed.
        operation: &'static str,
        /// What the operation acted on.
        target: Target,
    },

    /// Any other native failure sentinel.
    #[error("{operation} failed{}", suffix(.target))]
    Native {
        /// The operation that failed.
        operation: &'static str,
        /// What the operation acted on.
        target: Target,
        /// The engine's error code, when it reports one.
        #[source]
        source: Option<io::Error>,
    },

    // Precondition violations, raised before any native call
    /// The requested region does not fit in the caller's buffer.
    #[error("{operation}: region {offset}+{length} exceeds buffer of {capacity} bytes")]
    BufferTooSmall {
        /// The operation that was rejected.
        operation: &'static str,
        /// Start of the requested region.
        offset: usize,
        /// Length of the requested region.
        length: usize,
        /// Size of the buffer supplied.
        capacity: usize,
    },

    /// An argument cannot be represented at the native boundary.
    #[error("{operation}: invalid argument ({details})")]
    InvalidArgument {
        /// The operation that was rejected.
        operation: &'static str,
        /// What was wrong.
        details: String,
    },

    /// The path contains an interior NUL byte.
    #[error("invalid path (interior NUL): {}", .path.display())]
    InvalidPath {
        /// The offending path.
        path: PathBuf,
    },

    // Data errors
    /// File content is not in the expected format.
    #[error("invalid data: {} ({details})", .path.display())]
    InvalidData {
        /// The path with invalid data.
        path: PathBuf,
        /// Details about the invalid data.
        details: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    // Facade errors
    /// The operation cannot act on what the path resolver produced.
    #[error("operation not supported: {operation}")]
    NotSupported {
        /// The unsupported operation.
        operation: &'static str,
    },

    /// A sandboxed URI could not be resolved.
    #[error("cannot resolve {uri}: {reason}")]
    Resolve {
        /// The URI as given by the caller.
        uri: String,
        /// Why resolution failed.
        reason: String,
    },

    /// The callback dispatcher has been shut down.
    #[error("callback dispatcher is stopped")]
    DispatcherStopped,

    /// The dispatcher thread could not be started.
    #[error("failed to spawn dispatcher thread: {0}")]
    Spawn(#[source] io::Error),
}

impl FsError {
    /// Build the error for a native failure sentinel.
    ///
    /// `code` is the engine's errno-style code, if it reported one.
    pub(crate) fn native(operation: &'static str, target: Target, code: Option<i32>) -> Self {
        let source = code.filter(|c| *c != 0).map(io::Error::from_raw_os_error);
        match source.as_ref().map(io::Error::kind) {
            Some(io::ErrorKind::NotFound) => FsError::NotFound { operation, target },
            Some(io::ErrorKind::PermissionDenied) => {
                FsError::PermissionDenied { operation, target }
            }
            Some(io::ErrorKind::AlreadyExists) => FsError::AlreadyExists { operation, target },
            _ => FsError::Native {
                operation,
                target,
                source,
            },
        }
    }

    /// The operation that failed, when the error came from one.
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            FsError::NotFound { operation, .. }
            | FsError::PermissionDenied { operation, .. }
            | FsError::AlreadyExists { operation, .. }
            | FsError::Native { operation, .. }
            | FsError::BufferTooSmall { operation, .. }
            | FsError::InvalidArgument { operation, .. }
            | FsError::NotSupported { operation } => Some(*operation),
            _ => None,
        }
    }

    /// The path or descriptor a native failure acted on.
    pub fn target(&self) -> Option<&Target> {
        match self {
            FsError::NotFound { target, .. }
            | FsError::PermissionDenied { target, .. }
            | FsError::AlreadyExists { target, .. }
            | FsError::Native { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Returns `true` if the engine returned a failure sentinel.
    pub fn is_native(&self) -> bool {
        self.target().is_some()
    }

    /// Closest [`io::ErrorKind`] for this error.
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            FsError::NotFound { .. } => io::ErrorKind::NotFound,
            FsError::PermissionDenied { .. } => io::ErrorKind::PermissionDenied,
            FsError::AlreadyExists { .. } => io::ErrorKind::AlreadyExists,
            FsError::Native {
                source: Some(source),
                ..
            } => source.kind(),
            FsError::BufferTooSmall { .. }
            | FsError::InvalidArgument { .. }
            | FsError::InvalidPath { .. } => io::ErrorKind::InvalidInput,
            FsError::InvalidData { .. } | FsError::Deserialization(_) => {
                io::ErrorKind::InvalidData
            }
            FsError::NotSupported { .. } => io::ErrorKind::Unsupported,
            _ => io::ErrorKind::Other,
        }
    }
}

impl From<FsError> for io::Error {
    fn from(error: FsError) -> Self {
        io::Error::new(error.kind(), error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_error_names_operation_and_path() {
        let err = FsError::native("stat", Target::path(Path::new("/missing")), None);
        assert_eq!(err.to_string(), "stat failed: /missing");
        assert!(matches!(err, FsError::Native { source: None, .. }));
    }

    #[test]
    fn native_error_without_target_has_no_suffix() {
        let err = FsError::native("get_temp_dir", Target::None, None);
        assert_eq!(err.to_string(), "get_temp_dir failed");
    }

    #[test]
    fn native_error_for_descriptor() {
        let err = FsError::native("fstat", Target::Descriptor(Fd(7)), None);
        assert_eq!(err.to_string(), "fstat failed: fd 7");
    }

    #[test]
    fn native_error_for_two_paths() {
        let err = FsError::native(
            "rename",
            Target::paths(Path::new("/a"), Path::new("/b")),
            None,
        );
        assert_eq!(err.to_string(), "rename failed: /a -> /b");
    }

    #[test]
    fn enoent_becomes_not_found() {
        let err = FsError::native("unlink", Target::path(Path::new("/x")), Some(libc::ENOENT));
        assert!(matches!(err, FsError::NotFound { .. }));
        assert_eq!(err.to_string(), "unlink: not found: /x");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn eacces_becomes_permission_denied() {
        let err = FsError::native("open", Target::path(Path::new("/root")), Some(libc::EACCES));
        assert!(matches!(err, FsError::PermissionDenied { .. }));
    }

    #[test]
    fn eexist_becomes_already_exists() {
        let err = FsError::native("mkdir", Target::path(Path::new("/d")), Some(libc::EEXIST));
        assert!(matches!(err, FsError::AlreadyExists { .. }));
    }

    #[test]
    fn other_codes_are_kept_as_source() {
        let err = FsError::native("rmdir", Target::path(Path::new("/d")), Some(libc::ENOTEMPTY));
        let FsError::Native { source, .. } = &err else {
            panic!("expected Native, got {err:?}");
        };
        assert_eq!(source.as_ref().and_then(io::Error::raw_os_error), Some(libc::ENOTEMPTY));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn zero_code_is_ignored() {
        let err = FsError::native("fsync", Target::Descriptor(Fd(3)), Some(0));
        assert!(matches!(err, FsError::Native { source: None, .. }));
        assert_eq!(err.kind(), io::ErrorKind::Other);
    }

    #[test]
    fn buffer_too_small_display() {
        let err = FsError::BufferTooSmall {
            operation: "read",
            offset: 4,
            length: 8,
            capacity: 10,
        };
        assert_eq!(err.to_string(), "read: region 4+8 exceeds buffer of 10 bytes");
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(!err.is_native());
    }

    #[test]
    fn accessors_expose_structure() {
        let err = FsError::native("chmod", Target::path(Path::new("/f")), None);
        assert_eq!(err.operation(), Some("chmod"));
        assert_eq!(err.target(), Some(&Target::Path(PathBuf::from("/f"))));
        assert!(err.is_native());

        assert_eq!(FsError::DispatcherStopped.operation(), None);
    }

    #[test]
    fn converts_into_io_error() {
        let err = FsError::NotSupported { operation: "unlink" };
        let io_err = io::Error::from(err);
        assert_eq!(io_err.kind(), io::ErrorKind::Unsupported);
        assert!(io_err.to_string().contains("unlink"));
    }
}
