//! # Extension Traits
//!
//! Convenience methods built on top of [`FileSystem`].
//!
//! ## Overview
//!
//! [`FsExt`] collects helpers that combine several native operations. They
//! are default methods with a blanket implementation, so anything that can
//! lend a `&FileSystem` (the facade itself, an `Arc<FileSystem>`, an app
//! struct implementing `AsRef<FileSystem>`) gets them for free.
//!
//! ## Available Methods
//!
//! | Method | Description |
//! |--------|-------------|
//! | [`exists`](FsExt::exists) | Check if a path exists |
//! | [`is_file`](FsExt::is_file) | Check if path is a regular file |
//! | [`is_dir`](FsExt::is_dir) | Check if path is a directory |
//! | [`is_symlink`](FsExt::is_symlink) | Check if path is a symlink |
//! | [`file_size`](FsExt::file_size) | Size of a file in bytes |
//! | [`read_to_string`](FsExt::read_to_string) | Read a UTF-8 file |
//! | [`append_file`](FsExt::append_file) | Append bytes to a file |
//! | [`read_dir_entries`](FsExt::read_dir_entries) | List a directory with types |
//! | [`remove_dir_all`](FsExt::remove_dir_all) | Remove a directory and its contents |
//!
//! ## JSON Support (Feature-Gated)
//!
//! With the `serde` feature enabled, `FsExtJson` adds `read_json` and
//! `write_json`.

use std::path::Path;

use crate::{DirEntry, FileSystem, FsError, OpenFlags};

/// Returns `true` for errors that mean "nothing usable at this path".
///
/// Any failure the engine reports counts, with or without an errno, so the
/// answer is the same whether or not the engine has a `last_error` hook.
/// Errors raised before the engine is reached (bad path, resolver failure)
/// do not.
fn is_absent(err: &FsError) -> bool {
    err.is_native()
}

/// Extension methods for anything that lends a [`FileSystem`].
///
/// # Example
///
/// ```rust,ignore
/// use native_fs_facade::{FileSystem, FsError, FsExt};
///
/// fn load(fs: &FileSystem) -> Result<Option<String>, FsError> {
///     if fs.is_file("/config.toml")? {
///         return fs.read_to_string("/config.toml").map(Some);
///     }
///     Ok(None)
/// }
/// ```
pub trait FsExt: AsRef<FileSystem> {
    /// Check if anything exists at `path` (symlinks are not followed).
    ///
    /// Every engine-reported failure of the lookup, including permission
    /// denied or a file used as a directory, answers `Ok(false)`. `Err` is
    /// only returned when the engine is never reached, for example for an
    /// interior NUL or a failing [`PathResolver`](crate::PathResolver).
    fn exists(&self, path: impl AsRef<Path>) -> Result<bool, FsError> {
        match self.as_ref().lstat(path) {
            Ok(_) => Ok(true),
            Err(e) if is_absent(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Check if the path points to a regular file.
    ///
    /// Returns `Ok(false)` when the engine cannot stat the path, like
    /// [`exists`](Self::exists).
    fn is_file(&self, path: impl AsRef<Path>) -> Result<bool, FsError> {
        match self.as_ref().stat(path) {
            Ok(stats) => Ok(stats.is_file()),
            Err(e) if is_absent(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Check if the path points to a directory.
    ///
    /// Returns `Ok(false)` when the engine cannot stat the path.
    fn is_dir(&self, path: impl AsRef<Path>) -> Result<bool, FsError> {
        match self.as_ref().stat(path) {
            Ok(stats) => Ok(stats.is_dir()),
            Err(e) if is_absent(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Check if the path itself is a symbolic link.
    fn is_symlink(&self, path: impl AsRef<Path>) -> Result<bool, FsError> {
        match self.as_ref().lstat(path) {
            Ok(stats) => Ok(stats.is_symlink()),
            Err(e) if is_absent(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Get the size of a file in bytes.
    fn file_size(&self, path: impl AsRef<Path>) -> Result<u64, FsError> {
        Ok(self.as_ref().stat(path)?.size as u64)
    }

    /// Read a whole file as UTF-8.
    ///
    /// # Errors
    ///
    /// - [`FsError::InvalidData`] if the content is not valid UTF-8
    fn read_to_string(&self, path: impl AsRef<Path>) -> Result<String, FsError> {
        let path = path.as_ref();
        let data = self.as_ref().read_file(path)?;
        String::from_utf8(data).map_err(|e| FsError::InvalidData {
            path: path.to_path_buf(),
            details: e.utf8_error().to_string(),
        })
    }

    /// Append `data` to a file, creating it with mode `0o666` if needed.
    ///
    /// The descriptor is closed on success and on error.
    fn append_file(&self, path: impl AsRef<Path>, data: &[u8]) -> Result<(), FsError> {
        let fs = self.as_ref();
        let fd = fs.open(path, OpenFlags::APPEND, 0o666)?;
        let mut written = 0;
        let result = loop {
            if written == data.len() {
                break Ok(());
            }
            match fs.write(fd, data, written, data.len() - written, None) {
                Ok(0) => {
                    break Err(FsError::InvalidArgument {
                        operation: "append_file",
                        details: "engine accepted no bytes".into(),
                    });
                }
                Ok(n) => written += n,
                Err(e) => break Err(e),
            }
        };
        fs.close(fd);
        result
    }

    /// Remove a directory and everything below it.
    ///
    /// The recursive form of [`rmdir`](FileSystem::rmdir). It is a single
    /// engine `rm` call, so failures name the `rm` operation.
    fn remove_dir_all(&self, path: impl AsRef<Path>) -> Result<(), FsError> {
        self.as_ref().rm(path, true)
    }

    /// List a directory with the type of each entry (not following symlinks).
    fn read_dir_entries(&self, path: impl AsRef<Path>) -> Result<Vec<DirEntry>, FsError> {
        let fs = self.as_ref();
        let path = path.as_ref();
        fs.readdir(path)?
            .into_iter()
            .map(|name| {
                let entry_path = path.join(&name);
                let file_type = fs.lstat(&entry_path)?.file_type();
                Ok(DirEntry {
                    name,
                    path: entry_path,
                    file_type,
                })
            })
            .collect()
    }
}

impl<T: AsRef<FileSystem> + ?Sized> FsExt for T {}

impl AsRef<FileSystem> for FileSystem {
    fn as_ref(&self) -> &FileSystem {
        self
    }
}

// =============================================================================
// JSON Support (Feature-Gated)
// =============================================================================

#[cfg(feature = "serde")]
mod json {
    use super::*;
    use serde::{Serialize, de::DeserializeOwned};

    /// JSON serialization extension methods.
    ///
    /// Available when the `serde` feature is enabled.
    pub trait FsExtJson: FsExt {
        /// Read a file and deserialize it as JSON.
        ///
        /// # Errors
        ///
        /// - `FsError::InvalidData` if the file isn't valid UTF-8
        /// - `FsError::Deserialization` if JSON parsing failed
        fn read_json<T: DeserializeOwned>(&self, path: impl AsRef<Path>) -> Result<T, FsError> {
            let data = self.read_to_string(path)?;
            serde_json::from_str(&data).map_err(|e| FsError::Deserialization(e.to_string()))
        }

        /// Serialize a value and write it as pretty-printed JSON.
        fn write_json<T: Serialize>(&self, path: impl AsRef<Path>, value: &T) -> Result<(), FsError> {
            let json = serde_json::to_string_pretty(value)
                .map_err(|e| FsError::Serialization(e.to_string()))?;
            self.as_ref().write_file(path, json.as_bytes())
        }
    }

    impl<T: FsExt + ?Sized> FsExtJson for T {}
}

#[cfg(feature = "serde")]
pub use json::FsExtJson;
