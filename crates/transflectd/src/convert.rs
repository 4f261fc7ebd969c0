//! Conversions between hyper/http types and transflect types.

use std::fmt::Display;
use std::io;

use bytes::Bytes;
use futures_util::{StreamExt, future};
use http::{HeaderName, HeaderValue, StatusCode, Uri};
use http_body_util::BodyStream;
use hyper::body::Body;

use transflect_core::{HeaderMap, Request, TransflectError};

/// Convert a status code from u16.
pub fn status_from_u16(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// The status a failure is reported with when no output has been sent.
pub fn status_for_error(error: &TransflectError) -> StatusCode {
    match error {
        TransflectError::UnsupportedOperation { .. } | TransflectError::MissingFinalize { .. } => {
            return StatusCode::METHOD_NOT_ALLOWED;
        }
        TransflectError::Unrouted => return StatusCode::NOT_IMPLEMENTED,
        _ => {}
    }
    match error.io_kind() {
        Some(io::ErrorKind::NotFound) => StatusCode::NOT_FOUND,
        Some(io::ErrorKind::PermissionDenied) => StatusCode::FORBIDDEN,
        Some(io::ErrorKind::AlreadyExists) => StatusCode::CONFLICT,
        Some(io::ErrorKind::InvalidInput) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert http headers, keeping repeated names. Values that are not
/// visible ASCII are decoded lossily.
pub fn headers_from_http(headers: &http::HeaderMap) -> HeaderMap {
    headers
        .iter()
        .map(|(name, value)| {
            let value = match value.to_str() {
                Ok(value) => value.to_string(),
                Err(_) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
            };
            (name.as_str().to_string(), value)
        })
        .collect()
}

/// Convert buffered headers to http headers, skipping invalid entries.
pub fn headers_to_http(headers: &HeaderMap) -> http::HeaderMap {
    let mut map = http::HeaderMap::new();
    for header in headers.iter() {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(header.name.as_bytes()),
            HeaderValue::from_str(&header.value),
        ) {
            map.append(name, value);
        }
    }
    map
}

/// Extract the path and query from a URI.
pub fn uri_path_and_query(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string())
}

/// Convert an inbound hyper request into a streaming transflect request.
///
/// Data frames become body chunks; trailers are dropped. A body error
/// ends the stream with [`TransflectError::Source`].
pub fn into_request<B>(req: hyper::Request<B>) -> Request
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Display,
{
    let (parts, body) = req.into_parts();
    let target = uri_path_and_query(&parts.uri);
    let headers = headers_from_http(&parts.headers);

    let chunks = BodyStream::new(body).filter_map(|frame| {
        future::ready(match frame {
            Ok(frame) => frame.into_data().ok().map(Ok),
            Err(err) => Some(Err(TransflectError::Source(err.to_string()))),
        })
    });

    Request::streaming(parts.method.as_str(), &target, headers, chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;
    use http_body_util::Full;
    use transflect_core::Failure;

    #[test]
    fn status_from_valid_code() {
        assert_eq!(status_from_u16(201), StatusCode::CREATED);
        assert_eq!(status_from_u16(9999), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn io_kinds_map_to_statuses() {
        let failed = |kind| TransflectError::Acquisition {
            handler: "ReadFile",
            cause: Failure::with_kind(kind, "x"),
        };
        assert_eq!(
            status_for_error(&failed(io::ErrorKind::NotFound)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for_error(&failed(io::ErrorKind::PermissionDenied)),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for_error(&failed(io::ErrorKind::AlreadyExists)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for_error(&failed(io::ErrorKind::InvalidInput)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for_error(&failed(io::ErrorKind::Other)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn core_errors_map_to_statuses() {
        assert_eq!(
            status_for_error(&TransflectError::UnsupportedOperation { handler: "ListDir" }),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            status_for_error(&TransflectError::MissingFinalize { handler: "X" }),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            status_for_error(&TransflectError::Unrouted),
            StatusCode::NOT_IMPLEMENTED
        );
        assert_eq!(
            status_for_error(&TransflectError::Closed),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn headers_roundtrip() {
        let mut original = http::HeaderMap::new();
        original.insert("content-type", "text/plain".parse().unwrap());
        original.append("x-tag", "a".parse().unwrap());
        original.append("x-tag", "b".parse().unwrap());

        let converted = headers_from_http(&original);
        assert_eq!(converted.get("content-type"), Some("text/plain"));
        assert_eq!(converted.get_all("x-tag"), vec!["a", "b"]);

        let restored = headers_to_http(&converted);
        assert_eq!(restored, original);
    }

    #[test]
    fn invalid_headers_are_skipped() {
        let headers: HeaderMap = [("bad name", "v"), ("ok", "fine")].into_iter().collect();
        let converted = headers_to_http(&headers);
        assert_eq!(converted.len(), 1);
        assert_eq!(converted.get("ok").unwrap(), "fine");
    }

    #[tokio::test]
    async fn request_body_is_streamed() {
        let req = hyper::Request::builder()
            .method("PUT")
            .uri("http://localhost:3000/dir/a%20b.txt?x=1")
            .header("content-type", "text/plain")
            .body(Full::new(Bytes::from("payload")))
            .unwrap();

        let request = into_request(req);
        assert_eq!(request.source().method(), "PUT");
        assert_eq!(request.source().path(), "/dir/a b.txt");
        assert_eq!(request.source().query_value("x"), Some("1"));
        assert_eq!(request.source().headers().get("content-type"), Some("text/plain"));

        let (_, body) = request.into_parts();
        let chunks: Vec<Bytes> = body.try_collect().await.unwrap();
        assert_eq!(chunks, vec![Bytes::from("payload")]);
    }
}
