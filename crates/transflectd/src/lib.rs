//! transflectd: serves a directory over HTTP through transflect handlers.
//!
//! Every request is routed to a file handler
//! ([`Route`](transflect_fs::Route)) and driven by its own lifecycle.
//! Failures before any output are answered with a status code and the
//! error message; failures after the head has been sent abort the body.

pub mod config;
pub mod convert;
pub mod server;

pub use config::{ConfigError, DaemonConfig, ServerConfig};
pub use server::{ResponseBody, Server};
