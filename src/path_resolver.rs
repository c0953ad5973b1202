//! # PathResolver Trait
//!
//! Strategy trait for sandboxed-URI path resolution.
//!
//! ## Responsibility
//! - Turn a URI-form path (for example a `bookmark://` token) into something
//!   the native engine can act on: a physical path or an open descriptor.
//!
//! ## Dependencies
//! - [`Fd`] for descriptor results
//! - [`FsError`] for error handling
//!
//! ## How the Facade Uses It
//!
//! ```text
//! path matches "<scheme>://"?
//!     no  → passed to the engine unchanged
//!     yes → resolve(path)
//!             Path(p)        → engine operates on p
//!             Descriptor(fd) → open: returned as-is
//!                              stat/lstat: fstat(fd), then close(fd)
//!                              anything else: FsError::NotSupported
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use native_fs_facade::{FsError, PathResolver, Resolved};
//! use std::path::PathBuf;
//!
//! struct ContainerResolver {
//!     root: PathBuf,
//! }
//!
//! impl PathResolver for ContainerResolver {
//!     fn scheme(&self) -> &str {
//!         "container"
//!     }
//!
//!     fn resolve(&self, uri: &str) -> Result<Resolved, FsError> {
//!         let rest = uri.strip_prefix("container://").ok_or_else(|| FsError::Resolve {
//!             uri: uri.to_string(),
//!             reason: "wrong scheme".into(),
//!         })?;
//!         Ok(Resolved::Path(self.root.join(rest)))
//!     }
//! }
//!
//! let resolver = ContainerResolver { root: PathBuf::from("/var/app") };
//! assert!(resolver.matches("container://notes.txt"));
//! assert!(!resolver.matches("/tmp/notes.txt"));
//! ```

use std::path::PathBuf;

use crate::{Fd, FsError};

/// What a sandboxed URI resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// A physical path the engine can open.
    Path(PathBuf),
    /// A descriptor already opened by the platform. Ownership passes to the
    /// facade (and, for `open`, on to the caller).
    Descriptor(Fd),
}

/// Strategy trait for resolving URI-form paths.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: the facade is shared across
/// threads and consults the resolver on the calling thread.
///
/// # Object Safety
///
/// Stored as `Arc<dyn PathResolver>` inside
/// [`FileSystem`](crate::FileSystem).
pub trait PathResolver: Send + Sync {
    /// URI scheme handled by this resolver, without `://`.
    fn scheme(&self) -> &str;

    /// Resolve a URI that [`matches`](Self::matches).
    ///
    /// # Errors
    ///
    /// - [`FsError::Resolve`] if the URI is malformed or stale
    fn resolve(&self, uri: &str) -> Result<Resolved, FsError>;

    /// Returns `true` if `path` is in this resolver's URI form.
    fn matches(&self, path: &str) -> bool {
        path.strip_prefix(self.scheme())
            .is_some_and(|rest| rest.starts_with("://"))
    }
}
