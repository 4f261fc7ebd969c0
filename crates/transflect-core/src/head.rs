//! Buffered status and headers.
//!
//! The head is kept on the lifecycle rather than written through, since
//! the destination may not exist yet when a handler sets a header, and
//! the head must be final before the first byte is emitted. Every
//! mutator takes the destination's "output begun" flag and refuses to
//! touch anything once it is set.

use crate::error::{TransflectError, TransflectResult};
use crate::header::HeaderMap;

/// Status and headers of the response being produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: HeaderMap,
}

impl Default for ResponseHead {
    fn default() -> Self {
        Self {
            status: 200,
            headers: HeaderMap::new(),
        }
    }
}

impl ResponseHead {
    pub(crate) fn set_header(
        &mut self,
        started: bool,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> TransflectResult<()> {
        guard(started)?;
        self.headers.set(name, value);
        Ok(())
    }

    pub(crate) fn set_status(&mut self, started: bool, status: u16) -> TransflectResult<()> {
        guard(started)?;
        self.status = status;
        Ok(())
    }

    pub(crate) fn set_headers(&mut self, started: bool, headers: HeaderMap) -> TransflectResult<()> {
        guard(started)?;
        self.headers = headers;
        Ok(())
    }

    pub(crate) fn write_head(
        &mut self,
        started: bool,
        status: u16,
        headers: HeaderMap,
    ) -> TransflectResult<()> {
        guard(started)?;
        self.status = status;
        self.headers.merge(headers);
        Ok(())
    }
}

fn guard(started: bool) -> TransflectResult<()> {
    if started {
        Err(TransflectError::HeadersSent)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_ok() {
        let head = ResponseHead::default();
        assert_eq!(head.status, 200);
        assert!(head.headers.is_empty());
    }

    #[test]
    fn write_head_merges_headers() {
        let mut head = ResponseHead::default();
        head.set_header(false, "Content-Type", "text/plain").unwrap();
        head.set_header(false, "X-Keep", "1").unwrap();

        let overlay: HeaderMap = [("content-type", "text/html")].into_iter().collect();
        head.write_head(false, 201, overlay).unwrap();

        assert_eq!(head.status, 201);
        assert_eq!(head.headers.get("Content-Type"), Some("text/html"));
        assert_eq!(head.headers.get("X-Keep"), Some("1"));
    }

    #[test]
    fn rejected_write_head_leaves_state_unchanged() {
        let mut head = ResponseHead::default();
        head.set_header(false, "Content-Type", "text/plain").unwrap();
        let before = head.clone();

        let overlay: HeaderMap = [("Content-Type", "text/html")].into_iter().collect();
        let err = head.write_head(true, 500, overlay).unwrap_err();

        assert_eq!(err, TransflectError::HeadersSent);
        assert_eq!(head, before);
    }

    #[test]
    fn every_mutator_is_guarded() {
        let mut head = ResponseHead::default();
        assert!(head.set_header(true, "A", "1").is_err());
        assert!(head.set_status(true, 204).is_err());
        assert!(head.set_headers(true, HeaderMap::new()).is_err());
        assert_eq!(head, ResponseHead::default());
    }
}
