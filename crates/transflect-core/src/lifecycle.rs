//! The lifecycle state machine.
//!
//! ```text
//! Idle ──attach──▶ Acquiring ──ready──▶ Ready ⇄ Consuming
//!                                         │
//!                                         ▼
//!                                    Finalizing ──▶ Destroyed(Completed)
//!
//! any state ──failure──▶ Destroyed(Failed)
//! any state ──end signal──▶ Destroyed(Ended)
//! ```
//!
//! [`LifecycleStream::run`] drives one request through acquisition, the
//! chunk loop and finalization while listening for external signals and
//! resource faults. Exactly one step is in flight at a time. Whatever
//! ends the run, [`LifecycleStream::destroy`] fires exactly once,
//! releases every registered resource, and schedules the outcome for
//! the destination. The scheduled outcome is delivered only after the
//! in-flight step has been dropped, so a hook never observes its own
//! failure being reported.

use std::panic::{self, AssertUnwindSafe};

use bytes::Bytes;
use futures_util::{FutureExt, StreamExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::acquisition::PendingAcquisition;
use crate::body::ByteStream;
use crate::destination::{Destination, OutputPort};
use crate::error::{Failure, HookError, Stage, TransflectError, TransflectResult};
use crate::head::ResponseHead;
use crate::header::HeaderMap;
use crate::hook::{Completion, Exchange, HookResult, Transflect};
use crate::resource::Registry;
use crate::signal::{Interrupt, Signal};
use crate::source::{Request, Source};

/// How a destroyed lifecycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Finalize succeeded.
    Completed,
    /// Ended from outside without an error.
    Ended,
    Failed(TransflectError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Idle,
    Acquiring,
    Ready,
    Consuming,
    Finalizing,
    Destroyed(Outcome),
}

/// One request's trip through a [`Transflect`] handler.
pub struct LifecycleStream<H> {
    handler: H,
    state: State,
    source: Option<Source>,
    body: Option<ByteStream>,
    acquisition: Option<PendingAcquisition>,
    registry: Registry,
    head: ResponseHead,
    port: OutputPort,
    scheduled: Option<Outcome>,
    signal_tx: UnboundedSender<Signal>,
    signal_rx: Option<UnboundedReceiver<Signal>>,
}

impl<H: Transflect> LifecycleStream<H> {
    pub fn new(handler: H) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        Self {
            handler,
            state: State::Idle,
            source: None,
            body: None,
            acquisition: None,
            registry: Registry::default(),
            head: ResponseHead::default(),
            port: OutputPort::default(),
            scheduled: None,
            signal_tx,
            signal_rx: Some(signal_rx),
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(self.state, State::Destroyed(_))
    }

    /// The error that destroyed this lifecycle, if any.
    pub fn error(&self) -> Option<&TransflectError> {
        match &self.state {
            State::Destroyed(Outcome::Failed(error)) => Some(error),
            _ => None,
        }
    }

    /// Number of resources registered by the open hook.
    pub fn resource_count(&self) -> usize {
        self.registry.len()
    }

    /// A handle for ending or failing this lifecycle from outside.
    pub fn interrupt(&self) -> Interrupt {
        Interrupt::new(self.signal_tx.clone())
    }

    /// Attach the destination. Only one destination may ever be attached.
    pub fn pipe(&mut self, destination: impl Destination + 'static) -> TransflectResult<()> {
        self.port.attach(Box::new(destination))
    }

    /// The single destination.
    pub fn pipes(&mut self) -> TransflectResult<&mut (dyn Destination + 'static)> {
        self.port.pipes()
    }

    /// Bind the request and start acquisition.
    ///
    /// A second call fails with [`TransflectError::AlreadyAttached`] and
    /// leaves the first binding untouched.
    pub fn attach(&mut self, request: Request) -> TransflectResult<()> {
        if self.source.is_some() {
            return Err(TransflectError::AlreadyAttached);
        }
        let (source, body) = request.into_parts();
        debug!(
            handler = self.handler.name(),
            method = source.method(),
            path = source.path(),
            query = ?source.query(),
            headers = ?source.headers(),
            "source attached"
        );
        self.source = Some(source);
        self.body = Some(body);
        self.acquire().map(drop)
    }

    /// Run the open hook (once) and return the shared acquisition.
    ///
    /// Every call returns the same [`PendingAcquisition`]; the open hook
    /// is never invoked a second time.
    pub fn acquire(&mut self) -> TransflectResult<PendingAcquisition> {
        if let Some(pending) = &self.acquisition {
            debug!(settled = pending.is_settled(), "reusing acquisition");
            return Ok(pending.clone());
        }
        let source = self.source.as_ref().ok_or(TransflectError::NotAttached)?;
        let name = self.handler.name();
        let handler = &mut self.handler;

        let pending = match panic::catch_unwind(AssertUnwindSafe(|| handler.open(source))) {
            Ok(Ok(opened)) => {
                let resources = opened.into_vec();
                debug!(handler = name, count = resources.len(), "open returned resources");
                let readiness = self.registry.register(resources, name, &self.signal_tx);
                PendingAcquisition::join(name, readiness)
            }
            Ok(Err(error)) => {
                debug!(handler = name, %error, "open failed");
                PendingAcquisition::failed(error.escalate(Stage::Open, name))
            }
            Err(payload) => {
                let cause = Failure::panicked(payload);
                debug!(handler = name, %cause, "open panicked");
                PendingAcquisition::failed(Stage::Open.wrap(name, cause))
            }
        };

        if self.state == State::Idle {
            self.state = State::Acquiring;
        }
        self.acquisition = Some(pending.clone());
        Ok(pending)
    }

    pub fn status(&self) -> u16 {
        self.head.status
    }

    /// Buffered headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    /// Replace the buffered headers.
    pub fn set_headers(&mut self, headers: HeaderMap) -> TransflectResult<()> {
        let started = self.port.output_started();
        self.head.set_headers(started, headers)
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

    /// Set the status and overlay `headers`. Fails with
    /// [`TransflectError::HeadersSent`] once the destination reports that
    /// output has begun, without touching the buffered head.
    pub fn write_head(&mut self, status: u16, headers: HeaderMap) -> TransflectResult<()> {
        let started = self.port.output_started();
        self.head.write_head(started, status, headers)
    }

    /// Tear the lifecycle down. Idempotent: returns `false` if it was
    /// already destroyed.
    ///
    /// Releases every registered resource that has not been released and
    /// schedules the outcome for the destination; the scheduled signal is
    /// delivered by [`run`](Self::run) or [`settle`](Self::settle).
    pub fn destroy(&mut self, error: Option<TransflectError>) -> bool {
        self.teardown(error.map_or(Outcome::Ended, Outcome::Failed))
    }

    fn teardown(&mut self, outcome: Outcome) -> bool {
        if self.is_destroyed() {
            debug!(?outcome, "already destroyed, dropping signal");
            return false;
        }
        let name = self.handler.name();
        let released = self.registry.release_all();
        self.body = None;

        match &outcome {
            Outcome::Failed(error) => {
                warn!(handler = name, %error, released, "lifecycle destroyed with error");
            }
            _ => debug!(handler = name, ?outcome, released, "lifecycle destroyed"),
        }

        self.scheduled = Some(outcome.clone());
        self.state = State::Destroyed(outcome);
        true
    }

    /// Deliver the scheduled outcome to the destination, if any.
    pub async fn settle(&mut self) {
        let Some(outcome) = self.scheduled.take() else {
            return;
        };
        tokio::task::yield_now().await;

        let delivered = match outcome {
            Outcome::Completed | Outcome::Ended => self.port.close(&self.head).await,
            Outcome::Failed(error) => self.port.fail(error).await,
        };
        if let Err(error) = delivered {
            debug!(%error, "outcome not delivered");
        }
    }

    /// Drive the request to completion.
    ///
    /// Returns the error that destroyed the lifecycle, if any. Calling
    /// `run` on a destroyed lifecycle delivers any scheduled outcome and
    /// returns the recorded result.
    pub async fn run(&mut self) -> TransflectResult<()> {
        if !self.is_destroyed() {
            if let Some(mut signals) = self.signal_rx.take() {
                let outcome = tokio::select! {
                    biased;
                    Some(signal) = signals.recv() => match signal {
                        Signal::End => {
                            debug!("end signal received");
                            Outcome::Ended
                        }
                        Signal::Fail(error) => Outcome::Failed(error),
                    },
                    result = self.pipeline() => match result {
                        Ok(()) => Outcome::Completed,
                        Err(error) => Outcome::Failed(error),
                    },
                };
                self.teardown(outcome);
            }
        }

        self.settle().await;
        match self.error() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn pipeline(&mut self) -> TransflectResult<()> {
        if !self.port.is_attached() {
            return Err(TransflectError::NoDestination);
        }
        let acquisition = self.acquire()?;
        let emitted = acquisition.await?;
        self.state = State::Ready;
        debug!(handler = self.handler.name(), emitted = emitted.len(), "resources ready");

        for value in emitted {
            self.port.push(&self.head, value).await?;
        }

        let mut body = self.body.take().ok_or(TransflectError::NotAttached)?;
        while let Some(chunk) = body.next().await {
            self.consume(chunk?).await?;
        }

        self.finalize().await
    }

    async fn consume(&mut self, chunk: Bytes) -> TransflectResult<()> {
        self.state = State::Consuming;
        let name = self.handler.name();
        debug!(handler = name, len = chunk.len(), "transform");

        let source = self.source.as_ref().ok_or(TransflectError::NotAttached)?;
        let handler = &mut self.handler;
        let mut cx = Exchange::new(source, &mut self.head, &mut self.port);
        let cx = &mut cx;
        let result = complete(move || {
            let (handler, cx) = (handler, cx);
            handler.transflect(chunk, cx)
        })
        .await;
        let value = result.map_err(|error| error.escalate(Stage::Transform, name))?;

        if let Some(value) = value {
            self.port.push(&self.head, value).await?;
        }
        self.state = State::Ready;
        Ok(())
    }

    async fn finalize(&mut self) -> TransflectResult<()> {
        self.state = State::Finalizing;
        let name = self.handler.name();
        debug!(handler = name, "finalize");

        let source = self.source.as_ref().ok_or(TransflectError::NotAttached)?;
        let handler = &mut self.handler;
        let mut cx = Exchange::new(source, &mut self.head, &mut self.port);
        let cx = &mut cx;
        let result = complete(move || {
            let (handler, cx) = (handler, cx);
            handler.end(cx)
        })
        .await;
        let value = result.map_err(|error| error.escalate(Stage::Finalize, name))?;

        if let Some(value) = value {
            self.port.push(&self.head, value).await?;
        }
        Ok(())
    }
}

/// Run a hook and wait for its completion, treating a panic (during
/// the call or while its future is polled) as a failed completion.
async fn complete<'a, F>(hook: F) -> HookResult
where
    F: FnOnce() -> Completion<'a>,
{
    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(Completion::Ready(result)) => result,
        Ok(Completion::Pending(fut)) => match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(HookError::Failed(Failure::panicked(payload))),
        },
        Err(payload) => Err(HookError::Failed(Failure::panicked(payload))),
    }
}
