//! Error types for the lifecycle core.

use std::any::Any;
use std::fmt;
use std::io;

use thiserror::Error;

use crate::resource::ResourceKind;

/// Result type alias for lifecycle operations.
pub type TransflectResult<T> = Result<T, TransflectError>;

/// A plain failure reported by a hook or a resource.
///
/// Carries a human-readable message and, when the failure came from
/// an I/O operation, the original [`io::ErrorKind`] so a destination can
/// translate it into a user-visible outcome (e.g. a status code).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    message: String,
    kind: Option<io::ErrorKind>,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
        }
    }

    pub fn with_kind(kind: io::ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: Some(kind),
        }
    }

    pub(crate) fn panicked(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "hook panicked".to_string()
        };
        Self::new(message)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> Option<io::ErrorKind> {
        self.kind
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Failure {}

impl From<io::Error> for Failure {
    fn from(err: io::Error) -> Self {
        Self::with_kind(err.kind(), err.to_string())
    }
}

impl From<String> for Failure {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Failure {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Errors that can end a [`LifecycleStream`](crate::LifecycleStream).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransflectError {
    #[error("{handler}: a resource failed to become ready: {cause}")]
    Acquisition {
        handler: &'static str,
        #[source]
        cause: Failure,
    },

    #[error("{handler}: {kind} resource failed: {cause}")]
    Resource {
        handler: &'static str,
        kind: ResourceKind,
        #[source]
        cause: Failure,
    },

    #[error("{handler}: transform failed: {cause}")]
    Transform {
        handler: &'static str,
        #[source]
        cause: Failure,
    },

    #[error("{handler}: finalize failed: {cause}")]
    Finalization {
        handler: &'static str,
        #[source]
        cause: Failure,
    },

    #[error("{handler} has no transform hook and cannot accept a request body")]
    UnsupportedOperation { handler: &'static str },

    #[error("{handler} has no finalize hook to close the response")]
    MissingFinalize { handler: &'static str },

    #[error(
        "reached the base handler: no other handler was able to respond to this request"
    )]
    Unrouted,

    #[error("cannot be piped to multiple destinations")]
    MultiDestination,

    #[error("no destination attached")]
    NoDestination,

    #[error("a source is already attached")]
    AlreadyAttached,

    #[error("no source attached")]
    NotAttached,

    #[error("cannot write head after output has begun")]
    HeadersSent,

    #[error("request body failed: {0}")]
    Source(String),

    #[error("destination closed before output completed")]
    Closed,
}

impl TransflectError {
    /// The I/O error kind behind this error, if any.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Acquisition { cause, .. }
            | Self::Resource { cause, .. }
            | Self::Transform { cause, .. }
            | Self::Finalization { cause, .. } => cause.kind(),
            _ => None,
        }
    }
}

/// The error a hook returns.
///
/// Plain failures are attributed to the lifecycle step that produced
/// them; core errors (e.g. [`TransflectError::HeadersSent`] propagated
/// out of [`Exchange::push`](crate::Exchange::push) with `?`) pass
/// through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    #[error(transparent)]
    Failed(#[from] Failure),

    #[error(transparent)]
    Core(Box<TransflectError>),
}

impl HookError {
    pub(crate) fn escalate(self, stage: Stage, handler: &'static str) -> TransflectError {
        match self {
            Self::Core(err) => *err,
            Self::Failed(cause) => stage.wrap(handler, cause),
        }
    }
}

impl From<TransflectError> for HookError {
    fn from(err: TransflectError) -> Self {
        Self::Core(Box::new(err))
    }
}

impl From<io::Error> for HookError {
    fn from(err: io::Error) -> Self {
        Self::Failed(err.into())
    }
}

impl From<String> for HookError {
    fn from(s: String) -> Self {
        Self::Failed(s.into())
    }
}

impl From<&str> for HookError {
    fn from(s: &str) -> Self {
        Self::Failed(s.into())
    }
}

/// The lifecycle step a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Open,
    Transform,
    Finalize,
}

impl Stage {
    pub(crate) fn wrap(self, handler: &'static str, cause: Failure) -> TransflectError {
        match self {
            Self::Open => TransflectError::Acquisition { handler, cause },
            Self::Transform => TransflectError::Transform { handler, cause },
            Self::Finalize => TransflectError::Finalization { handler, cause },
        }
    }
}
