//! File handlers for the transflect lifecycle.
//!
//! Each handler serves one kind of request against a root directory:
//! [`ReadFile`] streams a file out, [`WriteFile`] streams the request
//! body into a file, [`ListDir`] renders a directory listing and
//! [`Unlink`] deletes a file. [`Route`] picks one of them from the
//! request method and path.
//!
//! Request paths are resolved under [`FsOptions::root`]; a path that
//! would escape it fails with `PermissionDenied`.

mod file;
mod list;
mod read;
mod root;
mod route;
mod unlink;
mod write;

use std::path::PathBuf;

use transflect_core::DEFAULT_CHUNK_SIZE;

pub use file::{FileHandle, Mode};
pub use list::{ListDir, render};
pub use read::{ReadFile, content_type};
pub use root::resolve;
pub use route::Route;
pub use unlink::Unlink;
pub use write::WriteFile;

/// Settings shared by every file handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsOptions {
    /// Directory request paths are resolved against.
    pub root: PathBuf,
    /// Read size when streaming a file out.
    pub chunk_size: usize,
}

impl FsOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}
