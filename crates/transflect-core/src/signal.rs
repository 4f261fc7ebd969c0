//! External signals delivered to a running lifecycle.

use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::error::TransflectError;

pub(crate) enum Signal {
    /// The upstream ended early; tear down without an error.
    End,
    /// A failure from outside the in-flight step.
    Fail(TransflectError),
}

/// Cloneable handle for ending or failing a lifecycle from outside.
///
/// Signals are queued and handled by
/// [`LifecycleStream::run`](crate::LifecycleStream::run) between polls of
/// the in-flight step, so they never re-enter a hook. Only the first
/// signal has an effect.
#[derive(Clone)]
pub struct Interrupt {
    tx: UnboundedSender<Signal>,
}

impl Interrupt {
    pub(crate) fn new(tx: UnboundedSender<Signal>) -> Self {
        Self { tx }
    }

    /// End the lifecycle without an error (e.g. the client went away).
    pub fn end(&self) {
        self.send(Signal::End);
    }

    /// Destroy the lifecycle with `error`.
    pub fn fail(&self, error: TransflectError) {
        self.send(Signal::Fail(error));
    }

    fn send(&self, signal: Signal) {
        if self.tx.send(signal).is_err() {
            debug!("interrupt after lifecycle ended");
        }
    }
}
