//! HTTP front end.
//!
//! Each request gets its own [`LifecycleStream`] running on a spawned
//! task, writing to a [`ChannelDestination`]. The connection task waits
//! for the first emission: a committed head becomes a streaming
//! response, a failure before any output becomes a plain-text error
//! response with a mapped status. A failure after the head has gone out
//! aborts the response body.

use std::convert::Infallible;
use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use futures_util::stream;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Response};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Body, Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use transflect_core::{
    ChannelDestination, Emission, Interrupt, LifecycleStream, Outlet, ResponseHead,
    TransflectError,
};
use transflect_fs::{FsOptions, Route};

use crate::config::ServerConfig;
use crate::convert::{headers_to_http, into_request, status_for_error, status_from_u16};

pub type ResponseBody = UnsyncBoxBody<Bytes, TransflectError>;

/// Ends the lifecycle if the response is dropped before it finished.
struct EndOnDrop(Interrupt);

impl Drop for EndOnDrop {
    fn drop(&mut self) {
        self.0.end();
    }
}

/// The file server.
pub struct Server {
    bind_addr: SocketAddr,
    options: FsOptions,
    channel_capacity: usize,
}

impl Server {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            bind_addr: config.bind,
            options: config.fs_options(),
            channel_capacity: config.channel_capacity,
        }
    }

    pub fn options(&self) -> &FsOptions {
        &self.options
    }

    /// Run one request through its route.
    pub async fn handle<B>(&self, req: hyper::Request<B>) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Display,
    {
        let request = into_request(req);
        let route = Route::for_source(request.source(), &self.options);
        let method = request.source().method().to_string();
        let path = request.source().path().to_string();

        let (destination, mut outlet) = ChannelDestination::new(self.channel_capacity);
        let mut lifecycle = LifecycleStream::new(route);
        if let Err(err) = lifecycle.pipe(destination) {
            return fail_soft(&err);
        }
        if let Err(err) = lifecycle.attach(request) {
            return fail_soft(&err);
        }
        let guard = EndOnDrop(lifecycle.interrupt());

        tokio::spawn(async move {
            match lifecycle.run().await {
                Ok(()) => debug!(%method, %path, "request complete"),
                Err(err) => debug!(%method, %path, error = %err, "request failed"),
            }
        });

        match outlet.recv().await {
            Some(Emission::Head(head)) => streaming(head, outlet, guard),
            Some(Emission::Failed(err)) => fail_soft(&err),
            Some(other) => {
                warn!(emission = ?other, "output before head");
                fail_soft(&TransflectError::Closed)
            }
            None => fail_soft(&TransflectError::Closed),
        }
    }

    /// Bind the configured address and serve until `shutdown` fires.
    pub async fn serve(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind_addr)
            .await
            .with_context(|| format!("failed to bind {}", self.bind_addr))?;
        self.serve_listener(listener, shutdown).await
    }

    /// Serve connections from `listener` until `shutdown` fires.
    ///
    /// Spawns a tokio task per connection using HTTP/1.1.
    pub async fn serve_listener(
        self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let addr = listener.local_addr().context("listener has no address")?;
        info!(%addr, root = %self.options.root.display(), "transflectd listening");
        let server = Arc::new(self);

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    let (stream, peer_addr) = accept_result.context("accept failed")?;
                    let server = server.clone();

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let svc = service_fn(move |req: hyper::Request<Incoming>| {
                            let server = server.clone();
                            async move { Ok::<_, Infallible>(server.handle(req).await) }
                        });

                        if let Err(e) = http1::Builder::new().serve_connection(io, svc).await {
                            error!(%peer_addr, error = %e, "connection error");
                        }
                    });
                }
                _ = shutdown.changed() => {
                    info!("transflectd shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// A response streaming the remaining emissions as body frames.
fn streaming(head: ResponseHead, outlet: Outlet, guard: EndOnDrop) -> Response<ResponseBody> {
    let mut response = Response::new(body_from(outlet, guard));
    *response.status_mut() = status_from_u16(head.status);
    *response.headers_mut() = headers_to_http(&head.headers);
    response
}

fn body_from(outlet: Outlet, guard: EndOnDrop) -> ResponseBody {
    let frames = stream::unfold(Some((outlet, guard)), |state| async move {
        let (mut outlet, guard) = state?;
        loop {
            match outlet.recv().await {
                Some(Emission::Data(chunk)) => {
                    return Some((Ok(Frame::data(chunk)), Some((outlet, guard))));
                }
                Some(Emission::Head(_)) => continue,
                Some(Emission::End) => return None,
                Some(Emission::Failed(err)) => {
                    warn!(error = %err, "aborting response body");
                    return Some((Err(err), None));
                }
                None => return Some((Err(TransflectError::Closed), None)),
            }
        }
    });
    StreamBody::new(frames).boxed_unsync()
}

/// A plain-text error response for a failure before any output.
fn fail_soft(error: &TransflectError) -> Response<ResponseBody> {
    let status = status_for_error(error);
    warn!(%status, %error, "request failed before output");

    let body = Full::new(Bytes::from(error.to_string()))
        .map_err(|never| match never {})
        .boxed_unsync();
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}
