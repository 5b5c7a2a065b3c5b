use super::codec::ClientCodec;
use super::request::EchoRequest;
use crate::{EchoError, Result};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http::{Method, Response};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;

/// Configuration for HTTP echo clients
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Read timeout for responses
    pub read_timeout: Duration,
    /// Write timeout for requests
    pub write_timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Maximum response size to prevent memory exhaustion
    pub max_response_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_response_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Minimal HTTP/1.1 client for talking to an echo server
///
/// Requests are sent over one persistent connection.
///
/// # Examples
///
/// ```no_run
/// use reqecho::http::HttpEchoClient;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let addr = "127.0.0.1:8080".parse()?;
///     let mut client = HttpEchoClient::connect(addr).await?;
///
///     let response = client.post("/submit?status_code=201", "Hello, echo!").await?;
///     println!("{}", String::from_utf8_lossy(response.body()));
///     Ok(())
/// }
/// ```
pub struct HttpEchoClient {
    framed: Framed<TcpStream, ClientCodec>,
    config: ClientConfig,
}

impl HttpEchoClient {
    /// Connects with the default client configuration
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::connect_with_config(addr, ClientConfig::default()).await
    }

    /// Connects with a custom configuration
    pub async fn connect_with_config(addr: SocketAddr, config: ClientConfig) -> Result<Self> {
        let stream = timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| EchoError::Timeout(format!("connecting to {addr}")))??;
        Ok(Self {
            framed: Framed::new(stream, ClientCodec::new(config.max_response_size)),
            config,
        })
    }

    /// Sends `request` and waits for the matching response
    pub async fn send(&mut self, request: EchoRequest) -> Result<Response<Bytes>> {
        timeout(self.config.write_timeout, self.framed.send(request))
            .await
            .map_err(|_| EchoError::Timeout("sending request".to_string()))??;

        match timeout(self.config.read_timeout, self.framed.next()).await {
            Err(_) => Err(EchoError::Timeout("waiting for response".to_string())),
            Ok(None) => Err(EchoError::ConnectionClosed),
            Ok(Some(response)) => Ok(response?),
        }
    }

    /// Sends a bodiless GET for `target`
    pub async fn get(&mut self, target: &str) -> Result<Response<Bytes>> {
        self.send(EchoRequest::new(Method::GET, target)).await
    }

    /// Sends a POST for `target` carrying `body`
    pub async fn post(&mut self, target: &str, body: impl Into<Bytes>) -> Result<Response<Bytes>> {
        self.send(EchoRequest::new(Method::POST, target).with_body(body))
            .await
    }
}
