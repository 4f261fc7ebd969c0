//! Inbound request: read-only metadata plus a streamed body.

use bytes::Bytes;
use futures_util::Stream;
use tracing::debug;

use crate::body::{ByteStream, ChunkedBytesStream, EmptyBody, DEFAULT_CHUNK_SIZE};
use crate::error::TransflectError;
use crate::header::HeaderMap;

/// Read-only request metadata handed to the open hook and exposed to
/// the other hooks through [`Exchange::source`](crate::Exchange::source).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    method: String,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
}

impl Source {
    /// Build source metadata from a method, a request target and headers.
    ///
    /// The target may be origin-form (`/a/b?x=1`) or absolute-form
    /// (`http://host/a/b?x=1`). The path is percent-decoded; a path that
    /// does not decode to UTF-8 is kept verbatim.
    pub fn parse(method: impl Into<String>, uri: &str, headers: HeaderMap) -> Self {
        let target = match uri.split_once("://") {
            Some((_, rest)) => rest.find(['/', '?']).map_or("", |i| &rest[i..]),
            None => uri,
        };
        let (raw_path, raw_query) = target.split_once('?').unwrap_or((target, ""));
        let raw_path = if raw_path.is_empty() { "/" } else { raw_path };

        let path = urlencoding::decode(raw_path)
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| raw_path.to_string());

        let query = serde_urlencoded::from_str::<Vec<(String, String)>>(raw_query)
            .unwrap_or_else(|err| {
                debug!(query = raw_query, error = %err, "ignoring malformed query string");
                Vec::new()
            });

        Self {
            method: method.into(),
            path,
            query,
            headers,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Decoded request path, always starting with `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment (empty for a path ending in `/`).
    pub fn base(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// First query value for `name`.
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

enum RequestBody {
    Buffered(Bytes),
    Streaming(ByteStream),
}

/// An inbound request: [`Source`] metadata plus a body that is either
/// buffered or streamed.
///
/// Buffered bodies are split into chunks of [`DEFAULT_CHUNK_SIZE`] (or
/// the size set with [`with_chunk_size`](Request::with_chunk_size)) when
/// the request is attached to a lifecycle.
pub struct Request {
    source: Source,
    body: RequestBody,
    chunk_size: usize,
}

impl Request {
    /// Create a request with a buffered body.
    pub fn new(
        method: impl Into<String>,
        uri: &str,
        headers: HeaderMap,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            source: Source::parse(method, uri, headers),
            body: RequestBody::Buffered(body.into()),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Create a request with an empty body.
    pub fn empty(method: impl Into<String>, uri: &str, headers: HeaderMap) -> Self {
        Self::new(method, uri, headers, Bytes::new())
    }

    /// Create a request whose body arrives as a stream of chunks.
    pub fn streaming(
        method: impl Into<String>,
        uri: &str,
        headers: HeaderMap,
        body: impl Stream<Item = Result<Bytes, TransflectError>> + Send + 'static,
    ) -> Self {
        Self {
            source: Source::parse(method, uri, headers),
            body: RequestBody::Streaming(Box::pin(body)),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Chunk size used when splitting a buffered body.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Split into metadata and body stream.
    pub fn into_parts(self) -> (Source, ByteStream) {
        let body: ByteStream = match self.body {
            RequestBody::Buffered(bytes) if bytes.is_empty() => Box::pin(EmptyBody),
            RequestBody::Buffered(bytes) => {
                Box::pin(ChunkedBytesStream::new(bytes, self.chunk_size))
            }
            RequestBody::Streaming(stream) => stream,
        };
        (self.source, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[test]
    fn parse_origin_form() {
        let mut headers = HeaderMap::new();
        headers.append("Host", "example.com");

        let source = Source::parse("GET", "/files/report.txt?page=2&raw", headers);
        assert_eq!(source.method(), "GET");
        assert_eq!(source.path(), "/files/report.txt");
        assert_eq!(source.base(), "report.txt");
        assert_eq!(source.query_value("page"), Some("2"));
        assert_eq!(source.query_value("raw"), Some(""));
        assert_eq!(source.headers().get("host"), Some("example.com"));
    }

    #[test]
    fn parse_absolute_form() {
        let source = Source::parse("GET", "http://localhost:3000/a/b?x=1", HeaderMap::new());
        assert_eq!(source.path(), "/a/b");
        assert_eq!(source.query(), &[("x".to_string(), "1".to_string())]);
    }

    #[test]
    fn parse_absolute_form_without_path() {
        let source = Source::parse("GET", "http://localhost:3000", HeaderMap::new());
        assert_eq!(source.path(), "/");
    }

    #[test]
    fn parse_absolute_form_with_query_but_no_path() {
        let source = Source::parse("GET", "http://localhost:3000?x=1&y=two", HeaderMap::new());
        assert_eq!(source.path(), "/");
        assert_eq!(source.query_value("x"), Some("1"));
        assert_eq!(source.query_value("y"), Some("two"));
    }

    #[test]
    fn path_is_percent_decoded() {
        let source = Source::parse("GET", "/my%20docs/a%2Bb.txt", HeaderMap::new());
        assert_eq!(source.path(), "/my docs/a+b.txt");
    }

    #[test]
    fn directory_path_has_empty_base() {
        let source = Source::parse("GET", "/photos/", HeaderMap::new());
        assert_eq!(source.base(), "");
    }

    #[test]
    fn query_is_form_decoded() {
        let source = Source::parse("GET", "/?name=a+b&tag=x%26y", HeaderMap::new());
        assert_eq!(source.query_value("name"), Some("a b"));
        assert_eq!(source.query_value("tag"), Some("x&y"));
        assert_eq!(source.query_value("missing"), None);
    }

    #[tokio::test]
    async fn buffered_body_is_chunked() {
        let request =
            Request::new("PUT", "/f", HeaderMap::new(), vec![7u8; 2500]).with_chunk_size(1000);
        let (_, body) = request.into_parts();
        let chunks: Vec<Bytes> = body.map(|c| c.expect("chunk")).collect().await;

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].len(), 500);
    }

    #[tokio::test]
    async fn empty_body_has_no_chunks() {
        let (_, body) = Request::empty("GET", "/", HeaderMap::new()).into_parts();
        assert_eq!(body.count().await, 0);
    }

    #[tokio::test]
    async fn streaming_body_passes_through() {
        let chunks = vec![Ok(Bytes::from("a")), Ok(Bytes::from("b"))];
        let request = Request::streaming(
            "POST",
            "/",
            HeaderMap::new(),
            futures_util::stream::iter(chunks),
        );
        let (source, body) = request.into_parts();
        let collected: Vec<Bytes> = body.map(|c| c.expect("chunk")).collect().await;

        assert_eq!(source.method(), "POST");
        assert_eq!(collected, vec!["a", "b"]);
    }
}
