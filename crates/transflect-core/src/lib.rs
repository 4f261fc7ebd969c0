//! Transflect lifecycle core.
//!
//! A request handler implements [`Transflect`]: an `open` hook that
//! acquires resources, a `transflect` hook that handles each body chunk,
//! and an `end` hook that finishes the response. A [`LifecycleStream`]
//! drives one request through those hooks and writes the result to a
//! single [`Destination`].
//!
//! # Lifecycle
//!
//! 1. [`LifecycleStream::attach`] binds the [`Request`] and starts
//!    acquisition. The open hook runs once; its [`Resource`]s are
//!    registered and awaited together as a memoized
//!    [`PendingAcquisition`].
//! 2. Once every resource is ready, body chunks are handed to the
//!    transform hook one at a time. The next chunk is not pulled until
//!    the previous step completes.
//! 3. After the last chunk (immediately for an empty body) the finalize
//!    hook runs.
//! 4. However the run ends, [`LifecycleStream::destroy`] fires exactly
//!    once and releases every registered resource exactly once.
//!
//! # Response head
//!
//! Status and headers are buffered in a [`ResponseHead`] until the first
//! chunk is pushed. After the destination reports that output has begun,
//! every head mutation fails with [`TransflectError::HeadersSent`].

mod acquisition;
pub(crate) mod body;
mod destination;
mod error;
mod head;
mod header;
mod hook;
mod lifecycle;
mod resource;
mod signal;
mod source;

pub use acquisition::PendingAcquisition;
pub use body::{ByteStream, DEFAULT_CHUNK_SIZE};
pub use destination::{ChannelDestination, Collected, Destination, Emission, OutputPort, Outlet};
pub use error::{Failure, HookError, TransflectError, TransflectResult};
pub use head::ResponseHead;
pub use header::{Header, HeaderMap};
pub use hook::{Completion, Exchange, HookResult, Opened, Transflect, Unrouted};
pub use lifecycle::{LifecycleStream, Outcome, State};
pub use resource::{
    FaultSink, FutureResource, ReadHandle, Readiness, Release, Resource, ResourceKind, WriteHandle,
};
pub use signal::Interrupt;
pub use source::{Request, Source};
