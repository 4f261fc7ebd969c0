//! An open file as a lifecycle resource.
//!
//! The file is opened by the readiness future and parked in a shared
//! slot. Hooks borrow it with [`FileHandle::checkout`] and hand it back
//! with [`FileHandle::checkin`], so no lock is held across an await.
//! Releasing the resource closes the parked file; a file returned after
//! release is closed on the spot.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use tokio::fs::{File, OpenOptions};
use tracing::debug;

use transflect_core::{Failure, ReadHandle, Readiness, WriteHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    /// Create or truncate.
    Write,
}

enum Slot {
    Unopened,
    Open(File),
    InUse,
    Released,
}

/// Shared handle to a file opened on behalf of one request.
#[derive(Clone)]
pub struct FileHandle {
    path: PathBuf,
    mode: Mode,
    slot: Arc<Mutex<Slot>>,
}

impl FileHandle {
    pub fn new(path: impl Into<PathBuf>, mode: Mode) -> Self {
        Self {
            path: path.into(),
            mode,
            slot: Arc::new(Mutex::new(Slot::Unopened)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_released(&self) -> bool {
        matches!(*self.lock(), Slot::Released)
    }

    /// Take the open file out of the slot.
    pub fn checkout(&self) -> io::Result<File> {
        let mut slot = self.lock();
        match std::mem::replace(&mut *slot, Slot::InUse) {
            Slot::Open(file) => Ok(file),
            other => {
                let state = match other {
                    Slot::Unopened => "not open",
                    Slot::InUse => "already in use",
                    _ => "released",
                };
                *slot = other;
                Err(io::Error::other(format!(
                    "{}: file {state}",
                    self.path.display()
                )))
            }
        }
    }

    /// Return a file taken with [`checkout`](Self::checkout).
    pub fn checkin(&self, file: File) {
        let mut slot = self.lock();
        if matches!(*slot, Slot::InUse) {
            *slot = Slot::Open(file);
        } else {
            debug!(path = %self.path.display(), "file returned after release, closing");
        }
    }

    fn ready(&self) -> Readiness {
        let handle = self.clone();
        async move {
            let file = handle.open().await.map_err(|err| {
                Failure::with_kind(err.kind(), format!("{}: {err}", handle.path.display()))
            })?;

            let mut slot = handle.lock();
            match *slot {
                Slot::Unopened => {
                    debug!(path = %handle.path.display(), mode = ?handle.mode, "file open");
                    *slot = Slot::Open(file);
                }
                _ => debug!(path = %handle.path.display(), "released while opening, closing"),
            }
            Ok(())
        }
        .boxed()
    }

    async fn open(&self) -> io::Result<File> {
        match self.mode {
            Mode::Read => {
                let file = File::open(&self.path).await?;
                if file.metadata().await?.is_dir() {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "is a directory",
                    ));
                }
                Ok(file)
            }
            Mode::Write => {
                OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&self.path)
                    .await
            }
        }
    }

    fn close(&self) {
        let mut slot = self.lock();
        if matches!(*slot, Slot::Open(_)) {
            debug!(path = %self.path.display(), "closing file");
        }
        *slot = Slot::Released;
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ReadHandle for FileHandle {
    fn readable(&self) -> Readiness {
        self.ready()
    }

    fn release(&self) {
        self.close();
    }
}

impl WriteHandle for FileHandle {
    fn writable(&self) -> Readiness {
        self.ready()
    }

    fn release(&self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn readable_opens_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "hello").unwrap();

        let handle = FileHandle::new(&path, Mode::Read);
        handle.readable().await.unwrap();
        let file = handle.checkout().unwrap();
        assert!(handle.checkout().is_err());
        handle.checkin(file);
        assert!(handle.checkout().is_ok());
    }

    #[tokio::test]
    async fn missing_file_keeps_not_found_kind() {
        let dir = tempfile::tempdir().unwrap();
        let handle = FileHandle::new(dir.path().join("missing"), Mode::Read);

        let failure = handle.readable().await.unwrap_err();
        assert_eq!(failure.kind(), Some(io::ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn directory_is_not_readable() {
        let dir = tempfile::tempdir().unwrap();
        let handle = FileHandle::new(dir.path(), Mode::Read);

        let failure = handle.readable().await.unwrap_err();
        assert_eq!(failure.kind(), Some(io::ErrorKind::InvalidInput));
    }

    #[tokio::test]
    async fn writable_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        std::fs::write(&path, "old contents").unwrap();

        let handle = FileHandle::new(&path, Mode::Write);
        handle.writable().await.unwrap();
        let mut file = handle.checkout().unwrap();
        file.write_all(b"new").await.unwrap();
        file.flush().await.unwrap();
        handle.checkin(file);
        WriteHandle::release(&handle);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    }

    #[tokio::test]
    async fn release_closes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "x").unwrap();

        let handle = FileHandle::new(&path, Mode::Read);
        handle.readable().await.unwrap();
        let file = handle.checkout().unwrap();
        ReadHandle::release(&handle);
        assert!(handle.is_released());

        handle.checkin(file);
        assert!(handle.is_released());
        assert!(handle.checkout().is_err());
    }

    #[tokio::test]
    async fn released_before_ready_drops_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "x").unwrap();

        let handle = FileHandle::new(&path, Mode::Read);
        let ready = handle.readable();
        ReadHandle::release(&handle);
        ready.await.unwrap();

        assert!(handle.is_released());
    }
}
