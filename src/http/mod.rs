//! HTTP echo server implementation
//!
//! This module provides an HTTP/1.x server that answers every request with an
//! HTML page describing it, plus the codec and client it is built and tested
//! with.

pub mod client;
pub mod codec;
pub mod config;
pub mod handler;
pub mod query;
pub mod request;
pub mod server;


pub use client::{ClientConfig, HttpEchoClient};
pub use codec::{ClientCodec, CodecError, RequestFrame, ServerCodec};
pub use config::{EchoOptions, HttpConfig};
pub use handler::{EchoHandler, HandlerFault, RequestHandler};
pub use query::EchoQuery;
pub use request::{ConnectionInfo, EchoRequest};
pub use server::HttpServer;

/// Type alias for the server running the echo handler
pub type HttpEchoServer = HttpServer<EchoHandler>;
