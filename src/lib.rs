//! A diagnostic HTTP endpoint that reflects each request back as an HTML page.
//!
//! Point a proxy or load balancer at [`HttpEchoServer`] to see exactly which
//! URI, method, headers and body reach the backend. The `status_code` query
//! parameter picks the response status, and with fault injection enabled
//! `throw` and `die` simulate a crashing backend.

use crate::http::codec::CodecError;
use thiserror::Error;

/// Error types for the reqecho library
#[derive(Error, Debug)]
pub enum EchoError {
    /// Socket errors (bind, accept, connect, read, write)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP framing errors
    #[error("HTTP codec error: {0}")]
    Codec(CodecError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// The peer closed the connection before answering
    #[error("connection closed before a response was received")]
    ConnectionClosed,
}

impl From<CodecError> for EchoError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => EchoError::Io(e),
            other => EchoError::Codec(other),
        }
    }
}

/// Result type for the reqecho library
pub type Result<T> = std::result::Result<T, EchoError>;

pub mod common;
pub mod http;

// Re-export main types for convenience
pub use crate::http::{
    EchoHandler, EchoOptions, EchoRequest, HttpConfig, HttpEchoClient, HttpEchoServer, HttpServer,
    RequestHandler,
};
