//! # native-fs-facade
//!
//! Synchronous filesystem API over a **native engine reached through a flat
//! C ABI**.
//!
//! The engine owns the real work (POSIX calls, directory cursors, change
//! notification). This crate marshals arguments across the boundary, checks
//! the engine's failure sentinels, converts results into owned Rust values,
//! owns the lifetime of native handles, and delivers watch events from the
//! engine's threads onto one dispatcher thread.
//!
//! ---
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use native_fs_facade::{Dispatcher, FileSystem, FsError, OpenFlags};
//!
//! fn demo() -> Result<(), FsError> {
//!     let fs = FileSystem::linked(Dispatcher::start()?);
//!
//!     let fd = fs.open("/tmp/a", OpenFlags::WRITE, 0o644)?;
//!     fs.write(fd, b"hi", 0, 2, None)?;
//!     fs.close(fd);
//!     assert_eq!(fs.stat("/tmp/a")?.size, 2.0);
//!
//!     for name in fs.opendir("/tmp")? {
//!         println!("{name}");
//!     }
//!
//!     let session = fs.watch("/tmp", |event| println!("{} {}", event.kind, event.path))?;
//!     session.close();
//!     Ok(())
//! }
//! ```
//!
//! ---
//!
//! ## Core Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`FileSystem`] | Every filesystem operation, one engine call each |
//! | [`DirectoryIterator`] | Lazy cursor over one directory |
//! | [`WatchSession`] | One live change subscription |
//! | [`FileHandle`] | Descriptor with `Read`/`Write`/`Seek` and a tracked position |
//! | [`StatWatcher`] | Change detection by polling `stat` |
//! | [`Dispatcher`] | Thread that runs watch callbacks |
//! | [`PathResolver`] | Maps sandboxed URIs to paths or descriptors |
//! | [`FsError`] | Error type naming the operation and its target |
//! | [`NativeFsApi`](ffi::NativeFsApi) | The engine's function table |
//!
//! ---
//!
//! ## Error Handling
//!
//! All operations return `Result<T, FsError>`. Native failures name the
//! operation and what it acted on:
//!
//! ```rust
//! use native_fs_facade::{FsError, Target};
//! use std::path::PathBuf;
//!
//! let err = FsError::NotFound {
//!     operation: "unlink",
//!     target: Target::Path(PathBuf::from("/missing.txt")),
//! };
//! assert_eq!(err.to_string(), "unlink: not found: /missing.txt");
//! ```
//!
//! Buffer regions, positions and interior NULs are validated before the
//! engine is called.
//!
//! ---
//!
//! ## Thread Safety
//!
//! [`FileSystem`] is `Send + Sync`; calls block the calling thread.
//! [`DirectoryIterator`] is `Send` but used through `&mut self`, so a cursor
//! is never touched concurrently. Watch callbacks run on the
//! [`Dispatcher`] thread, one at a time.
//!
//! ---
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `serde` | Serialization for [`Stats`], [`ChangeEvent`], [`DirEntry`], [`DispatcherConfig`]; enables `FsExtJson` |
//! | `linked` | Bind the engine's exported `rn_fs_*` symbols and add `FileSystem::linked` |

// Private modules
mod convert;
mod dir;
mod dispatch;
mod error;
mod ext;
mod facade;
mod file;
mod path_resolver;
mod poll;
mod types;
mod watch;

// Public modules
pub mod ffi;

// Public re-exports - error types
pub use error::{FsError, Target};

// Public re-exports - core types
pub use types::{
    ChangeEvent, ChangeKind, DirEntry, Fd, FileType, OpenFlags, Stats, constants,
};

// Public re-exports - facade and handles
pub use dir::DirectoryIterator;
pub use facade::{FileSystem, FileSystemBuilder};
pub use file::FileHandle;
pub use poll::{DEFAULT_POLL_INTERVAL, StatWatcher};
pub use watch::WatchSession;

// Public re-exports - delivery
pub use dispatch::{Dispatcher, DispatcherConfig};

// Public re-exports - path resolution
pub use path_resolver::{PathResolver, Resolved};

// Public re-exports - infrastructure
pub use ext::FsExt;

// Conditional re-exports
#[cfg(feature = "serde")]
pub use ext::FsExtJson;
