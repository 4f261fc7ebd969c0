//! The downstream side: a single destination behind an output port.
//!
//! [`Destination`] is the sink a lifecycle writes to. [`OutputPort`]
//! holds at most one destination and rejects a second attachment, so
//! the exactly-one-sink rule is enforced when the sink is attached
//! rather than discovered when it is used.
//!
//! [`ChannelDestination`] is a bounded-channel destination whose
//! receiving half, [`Outlet`], yields [`Emission`]s. Pushes wait for
//! channel capacity, so a slow consumer slows the lifecycle down.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, Stream};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{TransflectError, TransflectResult};
use crate::head::ResponseHead;

/// A downstream sink accepting pushed output.
pub trait Destination: Send {
    /// Commit status and headers. Called once, before the first chunk
    /// (or before `close` when there is no output).
    fn commit_head(&mut self, head: ResponseHead) -> BoxFuture<'_, TransflectResult<()>>;

    fn push(&mut self, chunk: Bytes) -> BoxFuture<'_, TransflectResult<()>>;

    /// Whether output (including the head) has begun.
    fn output_started(&self) -> bool;

    /// Normal end of output.
    fn close(&mut self) -> BoxFuture<'_, TransflectResult<()>>;

    /// Abnormal end of output. The destination decides how to present
    /// `error` (e.g. map it to a status code if the head is not sent).
    fn fail(&mut self, error: TransflectError) -> BoxFuture<'_, ()>;
}

/// Single-slot holder for the lifecycle's destination.
#[derive(Default)]
pub struct OutputPort {
    destination: Option<Box<dyn Destination>>,
}

impl OutputPort {
    /// Attach the destination. A second attachment fails with
    /// [`TransflectError::MultiDestination`] and leaves the first in place.
    pub fn attach(&mut self, destination: Box<dyn Destination>) -> TransflectResult<()> {
        if self.destination.is_some() {
            return Err(TransflectError::MultiDestination);
        }
        self.destination = Some(destination);
        Ok(())
    }

    pub fn is_attached(&self) -> bool {
        self.destination.is_some()
    }

    /// The single destination.
    pub fn pipes(&mut self) -> TransflectResult<&mut (dyn Destination + 'static)> {
        self.destination
            .as_deref_mut()
            .ok_or(TransflectError::NoDestination)
    }

    pub fn output_started(&self) -> bool {
        self.destination
            .as_ref()
            .is_some_and(|d| d.output_started())
    }

    pub(crate) async fn push(&mut self, head: &ResponseHead, chunk: Bytes) -> TransflectResult<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        let destination = self.pipes()?;
        if !destination.output_started() {
            destination.commit_head(head.clone()).await?;
        }
        destination.push(chunk).await
    }

    pub(crate) async fn close(&mut self, head: &ResponseHead) -> TransflectResult<()> {
        let destination = self.pipes()?;
        if !destination.output_started() {
            destination.commit_head(head.clone()).await?;
        }
        destination.close().await
    }

    pub(crate) async fn fail(&mut self, error: TransflectError) -> TransflectResult<()> {
        self.pipes()?.fail(error).await;
        Ok(())
    }
}

/// What a [`ChannelDestination`] delivers to its [`Outlet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emission {
    Head(ResponseHead),
    Data(Bytes),
    End,
    Failed(TransflectError),
}

/// A destination backed by a bounded channel.
pub struct ChannelDestination {
    tx: mpsc::Sender<Emission>,
    started: bool,
}

impl ChannelDestination {
    /// Create a destination and its outlet. `capacity` bounds how many
    /// emissions may be buffered before pushes wait.
    pub fn new(capacity: usize) -> (Self, Outlet) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, started: false }, Outlet { rx })
    }

    async fn send(&self, emission: Emission) -> TransflectResult<()> {
        self.tx
            .send(emission)
            .await
            .map_err(|_| TransflectError::Closed)
    }
}

impl Destination for ChannelDestination {
    fn commit_head(&mut self, head: ResponseHead) -> BoxFuture<'_, TransflectResult<()>> {
        self.started = true;
        async move { self.send(Emission::Head(head)).await }.boxed()
    }

    fn push(&mut self, chunk: Bytes) -> BoxFuture<'_, TransflectResult<()>> {
        async move { self.send(Emission::Data(chunk)).await }.boxed()
    }

    fn output_started(&self) -> bool {
        self.started
    }

    fn close(&mut self) -> BoxFuture<'_, TransflectResult<()>> {
        async move { self.send(Emission::End).await }.boxed()
    }

    fn fail(&mut self, error: TransflectError) -> BoxFuture<'_, ()> {
        async move {
            if self.send(Emission::Failed(error)).await.is_err() {
                debug!("outlet dropped before failure was delivered");
            }
        }
        .boxed()
    }
}

/// Receiving half of a [`ChannelDestination`].
pub struct Outlet {
    rx: mpsc::Receiver<Emission>,
}

/// Everything an [`Outlet`] received, gathered by [`Outlet::collect`].
#[derive(Debug, Default)]
pub struct Collected {
    pub head: Option<ResponseHead>,
    pub chunks: Vec<Bytes>,
    /// `Some(Ok(()))` for a normal close, `Some(Err(_))` for a failure,
    /// `None` if the destination was dropped without either.
    pub outcome: Option<Result<(), TransflectError>>,
}

impl Collected {
    /// All chunks concatenated.
    pub fn body(&self) -> Bytes {
        let mut body = BytesMut::new();
        for chunk in &self.chunks {
            body.extend_from_slice(chunk);
        }
        body.freeze()
    }
}

impl Outlet {
    pub async fn recv(&mut self) -> Option<Emission> {
        self.rx.recv().await
    }

    /// Drain the outlet until the destination closes, fails, or is dropped.
    pub async fn collect(mut self) -> Collected {
        let mut collected = Collected::default();
        while let Some(emission) = self.rx.recv().await {
            match emission {
                Emission::Head(head) => collected.head = Some(head),
                Emission::Data(chunk) => collected.chunks.push(chunk),
                Emission::End => {
                    collected.outcome = Some(Ok(()));
                    break;
                }
                Emission::Failed(error) => {
                    collected.outcome = Some(Err(error));
                    break;
                }
            }
        }
        collected
    }
}

impl Stream for Outlet {
    type Item = Emission;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_attachment_is_rejected() {
        let (first, _outlet1) = ChannelDestination::new(4);
        let (second, _outlet2) = ChannelDestination::new(4);

        let mut port = OutputPort::default();
        port.attach(Box::new(first)).unwrap();
        let err = port.attach(Box::new(second)).unwrap_err();

        assert_eq!(err, TransflectError::MultiDestination);
        assert!(port.is_attached());
    }

    #[test]
    fn pipes_without_destination_fails() {
        let mut port = OutputPort::default();
        assert_eq!(port.pipes().err(), Some(TransflectError::NoDestination));
        assert!(!port.output_started());
    }

    #[tokio::test]
    async fn head_is_committed_before_first_chunk() {
        let (destination, outlet) = ChannelDestination::new(8);
        let mut port = OutputPort::default();
        port.attach(Box::new(destination)).unwrap();

        let mut head = ResponseHead::default();
        head.status = 201;
        port.push(&head, Bytes::from("a")).await.unwrap();
        port.push(&head, Bytes::new()).await.unwrap();
        port.push(&head, Bytes::from("b")).await.unwrap();
        assert!(port.output_started());
        port.close(&head).await.unwrap();

        let collected = outlet.collect().await;
        assert_eq!(collected.head.map(|h| h.status), Some(201));
        assert_eq!(collected.chunks, vec!["a", "b"]);
        assert_eq!(collected.outcome, Some(Ok(())));
    }

    #[tokio::test]
    async fn close_without_output_still_commits_head() {
        let (destination, outlet) = ChannelDestination::new(8);
        let mut port = OutputPort::default();
        port.attach(Box::new(destination)).unwrap();

        let mut head = ResponseHead::default();
        head.status = 204;
        port.close(&head).await.unwrap();

        let collected = outlet.collect().await;
        assert_eq!(collected.head.map(|h| h.status), Some(204));
        assert!(collected.chunks.is_empty());
    }

    #[tokio::test]
    async fn push_to_dropped_outlet_is_closed() {
        let (destination, outlet) = ChannelDestination::new(1);
        drop(outlet);
        let mut port = OutputPort::default();
        port.attach(Box::new(destination)).unwrap();

        let err = port
            .push(&ResponseHead::default(), Bytes::from("x"))
            .await
            .unwrap_err();
        assert_eq!(err, TransflectError::Closed);
    }

    #[tokio::test]
    async fn failure_is_delivered() {
        let (destination, outlet) = ChannelDestination::new(1);
        let mut port = OutputPort::default();
        port.attach(Box::new(destination)).unwrap();

        port.fail(TransflectError::Unrouted).await.unwrap();

        let collected = outlet.collect().await;
        assert!(collected.head.is_none());
        assert_eq!(collected.outcome, Some(Err(TransflectError::Unrouted)));
    }
}
