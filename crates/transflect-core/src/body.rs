//! Request body streams.
//!
//! The core pulls body chunks one at a time from a [`ByteStream`]; the
//! next chunk is only polled after the previous one has been fully
//! handled, which is what gives the lifecycle its backpressure.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;

use crate::error::TransflectError;

/// Default chunk size for splitting buffered bodies (64 KB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// A type-erased, fallible async stream of body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransflectError>> + Send>>;

/// Yields a `Bytes` buffer in fixed-size chunks without copying.
///
/// Chunks are `Bytes::slice()` views into the original allocation.
pub(crate) struct ChunkedBytesStream {
    buf: Bytes,
    chunk_size: usize,
    offset: usize,
}

impl ChunkedBytesStream {
    pub fn new(buf: Bytes, chunk_size: usize) -> Self {
        Self {
            buf,
            chunk_size: chunk_size.max(1),
            offset: 0,
        }
    }
}

impl Stream for ChunkedBytesStream {
    type Item = Result<Bytes, TransflectError>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.offset >= this.buf.len() {
            return Poll::Ready(None);
        }
        let end = std::cmp::min(this.offset + this.chunk_size, this.buf.len());
        let chunk = this.buf.slice(this.offset..end);
        this.offset = end;
        Poll::Ready(Some(Ok(chunk)))
    }
}

/// A body with no chunks.
pub(crate) struct EmptyBody;

impl Stream for EmptyBody {
    type Item = Result<Bytes, TransflectError>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(None)
    }
}
