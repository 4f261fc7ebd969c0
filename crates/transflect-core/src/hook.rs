//! The handler contract: three overridable hooks.
//!
//! A handler implements [`Transflect`] and overrides whichever of
//! `open`, `transflect` and `end` its operation needs. The defaults
//! describe a handler that needs no resources, cannot accept a body,
//! and never finishes a response, so a handler that forgets a hook the
//! request actually needs fails with an error naming it.

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::destination::{Destination, OutputPort};
use crate::error::{HookError, TransflectError, TransflectResult};
use crate::head::ResponseHead;
use crate::header::HeaderMap;
use crate::resource::Resource;
use crate::source::Source;

/// What a transform or finalize step produced: an optional value to
/// push downstream.
pub type HookResult = Result<Option<Bytes>, HookError>;

/// Completion of a transform or finalize step.
///
/// A hook either completes synchronously with [`Completion::Ready`] or
/// hands back a future with [`Completion::Pending`]. Both forms mean the
/// same thing to the lifecycle; a hook that panics is treated as one
/// that completed with an error.
pub enum Completion<'a> {
    Ready(HookResult),
    Pending(BoxFuture<'a, HookResult>),
}

impl<'a> Completion<'a> {
    /// Success without a value.
    pub fn done() -> Self {
        Self::Ready(Ok(None))
    }

    /// Success with a value to push downstream.
    pub fn value(value: impl Into<Bytes>) -> Self {
        Self::Ready(Ok(Some(value.into())))
    }

    pub fn fail(error: impl Into<HookError>) -> Self {
        Self::Ready(Err(error.into()))
    }

    pub fn pending(fut: impl Future<Output = HookResult> + Send + 'a) -> Self {
        Self::Pending(fut.boxed())
    }
}

impl From<HookResult> for Completion<'_> {
    fn from(result: HookResult) -> Self {
        Self::Ready(result)
    }
}

/// Resources returned by the open hook: none, one, or many.
#[derive(Debug, Default)]
pub struct Opened(Vec<Resource>);

impl Opened {
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn one(resource: Resource) -> Self {
        Self(vec![resource])
    }

    pub fn many(resources: impl IntoIterator<Item = Resource>) -> Self {
        Self(resources.into_iter().collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn into_vec(self) -> Vec<Resource> {
        self.0
    }
}

impl From<Resource> for Opened {
    fn from(resource: Resource) -> Self {
        Self::one(resource)
    }
}

impl From<Option<Resource>> for Opened {
    fn from(resource: Option<Resource>) -> Self {
        Self(resource.into_iter().collect())
    }
}

impl From<Vec<Resource>> for Opened {
    fn from(resources: Vec<Resource>) -> Self {
        Self(resources)
    }
}

/// A hook's view of the exchange in progress: the request metadata,
/// the buffered response head, and the destination.
pub struct Exchange<'s> {
    source: &'s Source,
    head: &'s mut ResponseHead,
    port: &'s mut OutputPort,
}

impl<'s> Exchange<'s> {
    pub(crate) fn new(
        source: &'s Source,
        head: &'s mut ResponseHead,
        port: &'s mut OutputPort,
    ) -> Self {
        Self { source, head, port }
    }

    pub fn source(&self) -> &Source {
        self.source
    }

    pub fn status(&self) -> u16 {
        self.head.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    pub fn output_started(&self) -> bool {
        self.port.output_started()
    }

    pub fn set_header(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> TransflectResult<()> {
        let started = self.port.output_started();
        self.head.set_header(started, name, value)
    }

    pub fn set_status(&mut self, status: u16) -> TransflectResult<()> {
        let started = self.port.output_started();
        self.head.set_status(started, status)
    }

    /// Set the status and overlay `headers` onto the buffered headers.
    /// Fails with [`TransflectError::HeadersSent`] once output has begun,
    /// leaving the buffered head untouched.
    pub fn write_head(&mut self, status: u16, headers: HeaderMap) -> TransflectResult<()> {
        let started = self.port.output_started();
        self.head.write_head(started, status, headers)
    }

    /// Push a chunk downstream, committing the head first if needed.
    /// Waits while the destination applies backpressure.
    pub async fn push(&mut self, chunk: impl Into<Bytes>) -> TransflectResult<()> {
        self.port.push(self.head, chunk.into()).await
    }

    /// The single destination.
    pub fn pipes(&mut self) -> TransflectResult<&mut (dyn Destination + 'static)> {
        self.port.pipes()
    }
}

/// A request handler: the operation a lifecycle performs.
pub trait Transflect: Send {
    /// Name used in errors and logs. Defaults to the type's name.
    fn name(&self) -> &'static str {
        let full = std::any::type_name::<Self>();
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base)
    }

    /// Acquire the resources the operation needs. Every resource
    /// returned here is released exactly once when the lifecycle is
    /// destroyed, however it ends.
    fn open(&mut self, _source: &Source) -> Result<Opened, HookError> {
        Ok(Opened::none())
    }

    /// Handle one body chunk. The next chunk is not pulled until this
    /// step completes.
    fn transflect<'a>(&'a mut self, _chunk: Bytes, _cx: &'a mut Exchange<'_>) -> Completion<'a> {
        Completion::fail(TransflectError::UnsupportedOperation {
            handler: self.name(),
        })
    }

    /// Finish the response, after the last chunk (or immediately for an
    /// empty body).
    fn end<'a>(&'a mut self, _cx: &'a mut Exchange<'_>) -> Completion<'a> {
        Completion::fail(TransflectError::MissingFinalize {
            handler: self.name(),
        })
    }
}

/// The base handler, reached when nothing else could serve a request.
/// Finalizing it always fails with [`TransflectError::Unrouted`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Unrouted;

impl Transflect for Unrouted {
    fn name(&self) -> &'static str {
        "transflect"
    }

    fn end<'a>(&'a mut self, _cx: &'a mut Exchange<'_>) -> Completion<'a> {
        Completion::fail(TransflectError::Unrouted)
    }
}
