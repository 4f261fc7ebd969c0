use std::path::Path;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tracing::debug;

use transflect_core::{Completion, Exchange, HookError, Opened, Resource, Source, Transflect};

use crate::FsOptions;
use crate::file::{FileHandle, Mode};
use crate::root::resolve;

/// Streams a file to the destination (`GET`), or only its head (`HEAD`).
pub struct ReadFile {
    options: FsOptions,
    file: Option<FileHandle>,
}

impl ReadFile {
    pub fn new(options: FsOptions) -> Self {
        Self {
            options,
            file: None,
        }
    }
}

impl Transflect for ReadFile {
    fn open(&mut self, source: &Source) -> Result<Opened, HookError> {
        let path = resolve(&self.options.root, source.path())?;
        let handle = FileHandle::new(path, Mode::Read);
        self.file = Some(handle.clone());
        Ok(Resource::readable(handle).into())
    }

    fn end<'a>(&'a mut self, cx: &'a mut Exchange<'_>) -> Completion<'a> {
        let Some(handle) = self.file.clone() else {
            return Completion::fail("no file opened");
        };
        let chunk_size = self.options.chunk_size.max(1);

        Completion::pending(async move {
            cx.set_header("content-type", content_type(handle.path()))?;
            let mut file = handle.checkout()?;

            if cx.source().method() == "HEAD" {
                let len = file.metadata().await?.len();
                handle.checkin(file);
                cx.set_header("content-length", len.to_string())?;
                return Ok(None);
            }

            let mut buf = vec![0u8; chunk_size];
            let mut total = 0usize;
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                total += n;
                cx.push(Bytes::copy_from_slice(&buf[..n])).await?;
            }
            handle.checkin(file);

            debug!(path = %handle.path().display(), bytes = total, "file streamed");
            Ok(None)
        })
    }
}

/// Content type from the file extension.
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("html" | "htm") => "text/html",
        Some("css") => "text/css",
        Some("js" | "mjs") => "text/javascript",
        Some("json") => "application/json",
        Some("txt" | "md" | "log") => "text/plain",
        Some("xml") => "application/xml",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("pdf") => "application/pdf",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}
