//! Resources acquired by the open hook.
//!
//! A [`Resource`] is tagged with its kind when it is returned from
//! [`Transflect::open`](crate::Transflect::open). The kind fixes how the
//! core waits for readiness and how it releases the resource:
//!
//! | Kind | Ready when | Released by |
//! |---|---|---|
//! | Readable | [`ReadHandle::readable`] resolves | [`ReadHandle::release`] |
//! | Writable | [`WriteHandle::writable`] resolves | [`WriteHandle::release`] |
//! | Future | the future resolves (its value is emitted) | aborting the future |
//! | Generic | immediately | [`Release::release`] |
//!
//! The [`Registry`] owns every registered resource and guarantees each
//! one is released exactly once.

use std::fmt;

use bytes::Bytes;
use futures_util::future::{self, AbortHandle, BoxFuture};
use futures_util::FutureExt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::error::{Failure, TransflectError};
use crate::signal::Signal;

/// Readiness future returned by a handle.
pub type Readiness = BoxFuture<'static, Result<(), Failure>>;

/// A future resource: resolves to an optional value forwarded downstream.
pub type FutureResource = BoxFuture<'static, Result<Option<Bytes>, Failure>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Readable,
    Writable,
    Future,
    Generic,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Readable => "readable",
            Self::Writable => "writable",
            Self::Future => "future",
            Self::Generic => "generic",
        })
    }
}

/// A resource that becomes ready once it is readable.
pub trait ReadHandle: Send + Sync {
    /// Resolves on initial readability.
    fn readable(&self) -> Readiness;

    fn release(&self);

    /// Called once at registration with a sink for failures the resource
    /// notices outside of its readiness future.
    fn observe(&self, _faults: FaultSink) {}
}

/// A resource that becomes ready once it accepts writes.
pub trait WriteHandle: Send + Sync {
    /// Resolves when the resource is ready to accept writes.
    fn writable(&self) -> Readiness;

    fn release(&self);

    fn observe(&self, _faults: FaultSink) {}
}

/// A resource with no readiness signal, only a release operation.
pub trait Release: Send + Sync {
    fn release(&self);

    fn observe(&self, _faults: FaultSink) {}
}

/// A resource handle returned by the open hook.
pub enum Resource {
    Readable(Box<dyn ReadHandle>),
    Writable(Box<dyn WriteHandle>),
    Future(FutureResource),
    Generic(Box<dyn Release>),
}

impl Resource {
    pub fn readable(handle: impl ReadHandle + 'static) -> Self {
        Self::Readable(Box::new(handle))
    }

    pub fn writable(handle: impl WriteHandle + 'static) -> Self {
        Self::Writable(Box::new(handle))
    }

    pub fn future<F, E>(fut: F) -> Self
    where
        F: Future<Output = Result<Option<Bytes>, E>> + Send + 'static,
        E: Into<Failure>,
    {
        Self::Future(fut.map(|r| r.map_err(Into::into)).boxed())
    }

    pub fn generic(handle: impl Release + 'static) -> Self {
        Self::Generic(Box::new(handle))
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Readable(_) => ResourceKind::Readable,
            Self::Writable(_) => ResourceKind::Writable,
            Self::Future(_) => ResourceKind::Future,
            Self::Generic(_) => ResourceKind::Generic,
        }
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Resource").field(&self.kind()).finish()
    }
}

/// Forwards resource-level failures into the lifecycle's destroy path.
#[derive(Clone)]
pub struct FaultSink {
    handler: &'static str,
    kind: ResourceKind,
    tx: UnboundedSender<Signal>,
}

impl FaultSink {
    /// Report a failure. The lifecycle is destroyed with a
    /// [`TransflectError::Resource`] error; reports after the first
    /// failure are dropped.
    pub fn report(&self, cause: impl Into<Failure>) {
        let error = TransflectError::Resource {
            handler: self.handler,
            kind: self.kind,
            cause: cause.into(),
        };
        if self.tx.send(Signal::Fail(error)).is_err() {
            debug!(handler = self.handler, "fault reported after lifecycle ended");
        }
    }
}

enum Releaser {
    Read(Box<dyn ReadHandle>),
    Write(Box<dyn WriteHandle>),
    Abort(AbortHandle),
    Generic(Box<dyn Release>),
}

struct Tracked {
    kind: ResourceKind,
    releaser: Releaser,
    released: bool,
}

/// Tracks every resource registered on one lifecycle.
#[derive(Default)]
pub(crate) struct Registry {
    entries: Vec<Tracked>,
}

impl Registry {
    /// Take ownership of `resources` and return one readiness future per
    /// resource, in registration order. Each future resolves to the value
    /// a future resource produced (`None` for every other kind).
    pub fn register(
        &mut self,
        resources: Vec<Resource>,
        handler: &'static str,
        tx: &UnboundedSender<Signal>,
    ) -> Vec<FutureResource> {
        let mut readiness = Vec::with_capacity(resources.len());

        for resource in resources {
            let kind = resource.kind();
            let faults = FaultSink {
                handler,
                kind,
                tx: tx.clone(),
            };

            let (ready, releaser): (FutureResource, Releaser) = match resource {
                Resource::Readable(handle) => {
                    handle.observe(faults);
                    (handle.readable().map(|r| r.map(|()| None)).boxed(), Releaser::Read(handle))
                }
                Resource::Writable(handle) => {
                    handle.observe(faults);
                    (handle.writable().map(|r| r.map(|()| None)).boxed(), Releaser::Write(handle))
                }
                Resource::Future(fut) => {
                    let (fut, abort) = future::abortable(fut);
                    let ready = fut
                        .map(|r| r.unwrap_or_else(|_| Err(Failure::new("future resource aborted"))))
                        .boxed();
                    (ready, Releaser::Abort(abort))
                }
                Resource::Generic(handle) => {
                    handle.observe(faults);
                    (future::ready(Ok(None)).boxed(), Releaser::Generic(handle))
                }
            };

            debug!(handler, %kind, index = self.entries.len(), "registered resource");
            self.entries.push(Tracked {
                kind,
                releaser,
                released: false,
            });
            readiness.push(ready);
        }

        readiness
    }

    /// Release every resource not yet released. Returns how many were
    /// released by this call.
    pub fn release_all(&mut self) -> usize {
        let mut count = 0;
        for (index, entry) in self.entries.iter_mut().enumerate() {
            if entry.released {
                continue;
            }
            entry.released = true;
            count += 1;
            match &entry.releaser {
                Releaser::Read(handle) => handle.release(),
                Releaser::Write(handle) => handle.release(),
                Releaser::Abort(abort) => abort.abort(),
                Releaser::Generic(handle) => handle.release(),
            }
            debug!(index, kind = %entry.kind, "released resource");
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn unreleased(&self) -> usize {
        self.entries.iter().filter(|e| !e.released).count()
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        let leaked = self.release_all();
        if leaked > 0 {
            warn!(leaked, "lifecycle dropped without destroy; released resources");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::mpsc;

    struct Counting(Arc<AtomicUsize>);

    impl Release for Counting {
        fn release(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl ReadHandle for Counting {
        fn readable(&self) -> Readiness {
            future::ready(Ok(())).boxed()
        }

        fn release(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn kinds_are_tagged() {
        let counter = Arc::new(AtomicUsize::new(0));
        assert_eq!(
            Resource::generic(Counting(counter.clone())).kind(),
            ResourceKind::Generic
        );
        assert_eq!(Resource::readable(Counting(counter)).kind(), ResourceKind::Readable);
        assert_eq!(
            Resource::future(async { Ok::<_, Failure>(None) }).kind(),
            ResourceKind::Future
        );
    }

    #[test]
    fn release_all_is_exactly_once() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::default();
        registry.register(
            vec![
                Resource::generic(Counting(counter.clone())),
                Resource::readable(Counting(counter.clone())),
            ],
            "Test",
            &tx,
        );

        assert_eq!(registry.release_all(), 2);
        assert_eq!(registry.release_all(), 0);
        drop(registry);

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn drop_releases_unreleased_resources() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::default();
        registry.register(vec![Resource::generic(Counting(counter.clone()))], "Test", &tx);
        assert_eq!(registry.unreleased(), 1);

        drop(registry);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn released_future_resource_is_aborted() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut registry = Registry::default();
        let mut ready = registry.register(
            vec![Resource::future(future::pending::<Result<Option<Bytes>, Failure>>())],
            "Test",
            &tx,
        );

        registry.release_all();
        let result = ready.remove(0).await;
        assert_eq!(result, Err(Failure::new("future resource aborted")));
    }

    #[tokio::test]
    async fn future_resource_value_is_forwarded() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut registry = Registry::default();
        let mut ready = registry.register(
            vec![Resource::future(async { Ok::<_, Failure>(Some(Bytes::from("tick"))) })],
            "Test",
            &tx,
        );

        assert_eq!(ready.remove(0).await, Ok(Some(Bytes::from("tick"))));
    }

    #[tokio::test]
    async fn fault_sink_sends_resource_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = FaultSink {
            handler: "WriteFile",
            kind: ResourceKind::Writable,
            tx,
        };
        sink.report("disk full");

        match rx.recv().await {
            Some(Signal::Fail(TransflectError::Resource { handler, kind, cause })) => {
                assert_eq!(handler, "WriteFile");
                assert_eq!(kind, ResourceKind::Writable);
                assert_eq!(cause.message(), "disk full");
            }
            _ => panic!("expected a resource failure"),
        }
    }
}
