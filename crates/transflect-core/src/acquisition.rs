//! Memoized "all resources ready" future.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::future::{self, BoxFuture, Shared};
use futures_util::FutureExt;

use crate::error::{Stage, TransflectError};
use crate::resource::FutureResource;

type Inner = Shared<BoxFuture<'static, Result<Vec<Bytes>, TransflectError>>>;

/// The outcome of the acquisition phase, shared by every caller.
///
/// Resolves to the values produced by future resources (in registration
/// order) once every resource is ready, or to the first readiness
/// failure. Cloning is cheap; all clones observe the same outcome.
#[derive(Clone)]
pub struct PendingAcquisition {
    inner: Inner,
}

impl PendingAcquisition {
    pub(crate) fn join(handler: &'static str, readiness: Vec<FutureResource>) -> Self {
        let fut: BoxFuture<'static, _> = if readiness.is_empty() {
            future::ready(Ok(Vec::new())).boxed()
        } else {
            future::try_join_all(readiness)
                .map(move |result| match result {
                    Ok(values) => Ok(values.into_iter().flatten().collect()),
                    Err(cause) => Err(Stage::Open.wrap(handler, cause)),
                })
                .boxed()
        };
        Self {
            inner: fut.shared(),
        }
    }

    pub(crate) fn failed(error: TransflectError) -> Self {
        Self {
            inner: future::ready(Err(error)).boxed().shared(),
        }
    }

    /// The settled outcome, if acquisition has finished.
    pub fn peek(&self) -> Option<&Result<Vec<Bytes>, TransflectError>> {
        self.inner.peek()
    }

    pub fn is_settled(&self) -> bool {
        self.peek().is_some()
    }

    /// Whether two handles refer to the same pending acquisition.
    pub fn same_as(&self, other: &Self) -> bool {
        self.inner.ptr_eq(&other.inner)
    }
}

impl Future for PendingAcquisition {
    type Output = Result<Vec<Bytes>, TransflectError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}
