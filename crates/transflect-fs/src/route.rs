use bytes::Bytes;

use transflect_core::{Completion, Exchange, HookError, Opened, Source, Transflect, Unrouted};

use crate::{FsOptions, ListDir, ReadFile, Unlink, WriteFile};

/// The handler chosen for a request.
///
/// | Request | Handler |
/// |---|---|
/// | path ends with `/` | [`ListDir`] |
/// | `GET`, `HEAD` | [`ReadFile`] |
/// | `PUT` | [`WriteFile`] |
/// | `DELETE` | [`Unlink`] |
/// | anything else | [`Unrouted`] |
pub enum Route {
    ListDir(ListDir),
    ReadFile(ReadFile),
    WriteFile(WriteFile),
    Unlink(Unlink),
    Unrouted(Unrouted),
}

impl Route {
    pub fn for_source(source: &Source, options: &FsOptions) -> Self {
        let options = options.clone();
        if source.path().ends_with('/') {
            return Self::ListDir(ListDir::new(options));
        }
        match source.method() {
            "GET" | "HEAD" => Self::ReadFile(ReadFile::new(options)),
            "PUT" => Self::WriteFile(WriteFile::new(options)),
            "DELETE" => Self::Unlink(Unlink::new(options)),
            _ => Self::Unrouted(Unrouted),
        }
    }

    fn handler(&mut self) -> &mut dyn Transflect {
        match self {
            Self::ListDir(h) => h,
            Self::ReadFile(h) => h,
            Self::WriteFile(h) => h,
            Self::Unlink(h) => h,
            Self::Unrouted(h) => h,
        }
    }
}

impl Transflect for Route {
    fn name(&self) -> &'static str {
        match self {
            Self::ListDir(h) => h.name(),
            Self::ReadFile(h) => h.name(),
            Self::WriteFile(h) => h.name(),
            Self::Unlink(h) => h.name(),
            Self::Unrouted(h) => h.name(),
        }
    }

    fn open(&mut self, source: &Source) -> Result<Opened, HookError> {
        self.handler().open(source)
    }

    fn transflect<'a>(&'a mut self, chunk: Bytes, cx: &'a mut Exchange<'_>) -> Completion<'a> {
        self.handler().transflect(chunk, cx)
    }

    fn end<'a>(&'a mut self, cx: &'a mut Exchange<'_>) -> Completion<'a> {
        self.handler().end(cx)
    }
}
