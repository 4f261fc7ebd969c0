use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use transflect_core::{Completion, Exchange, HookError, Opened, Resource, Source, Transflect};

use crate::FsOptions;
use crate::file::{FileHandle, Mode};
use crate::root::resolve;

/// Writes the request body to a file (`PUT`), creating or truncating it.
///
/// An aborted upload closes the file but leaves whatever was written in
/// place.
pub struct WriteFile {
    options: FsOptions,
    file: Option<FileHandle>,
    written: u64,
}

impl WriteFile {
    pub fn new(options: FsOptions) -> Self {
        Self {
            options,
            file: None,
            written: 0,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl Transflect for WriteFile {
    fn open(&mut self, source: &Source) -> Result<Opened, HookError> {
        let path = resolve(&self.options.root, source.path())?;
        let handle = FileHandle::new(path, Mode::Write);
        self.file = Some(handle.clone());
        Ok(Resource::writable(handle).into())
    }

    fn transflect<'a>(&'a mut self, chunk: Bytes, _cx: &'a mut Exchange<'_>) -> Completion<'a> {
        let Some(handle) = self.file.clone() else {
            return Completion::fail("no file opened");
        };

        Completion::pending(async move {
            let mut file = handle.checkout()?;
            file.write_all(&chunk).await?;
            file.flush().await?;
            handle.checkin(file);
            self.written += chunk.len() as u64;
            Ok(None)
        })
    }

    fn end<'a>(&'a mut self, cx: &'a mut Exchange<'_>) -> Completion<'a> {
        let Some(handle) = self.file.clone() else {
            return Completion::fail("no file opened");
        };

        Completion::pending(async move {
            let mut file = handle.checkout()?;
            file.flush().await?;
            handle.checkin(file);

            debug!(path = %handle.path().display(), bytes = self.written, "file written");
            cx.set_status(201)?;
            Ok(None)
        })
    }
}
