use crate::{EchoError, Result};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Switches that select which flavour of echo page is produced
///
/// All options are off by default, which yields the plain page: headers in
/// the order they were received and no fault injection.
///
/// # Examples
///
/// ```rust
/// use reqecho::http::EchoOptions;
///
/// let options = EchoOptions {
///     sort_headers: true,
///     ..EchoOptions::default()
/// };
/// assert!(!options.enable_fault_injection);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EchoOptions {
    /// List headers by case-sensitive ascending name instead of arrival order
    pub sort_headers: bool,
    /// Prepend REMOTE_ADDR, REMOTE_PORT, SERVER_ADDR, SERVER_NAME and SERVER_PORT
    pub include_connection_fields: bool,
    /// Honour the `throw` and `die` query flags
    pub enable_fault_injection: bool,
}

/// Configuration for the HTTP echo server
///
/// # Examples
///
/// ```rust
/// use reqecho::http::{EchoOptions, HttpConfig};
/// use std::time::Duration;
///
/// let config = HttpConfig {
///     bind_addr: "127.0.0.1:8080".parse().unwrap(),
///     max_connections: 100,
///     max_request_size: 1024 * 1024,
///     read_timeout: Duration::from_secs(30),
///     write_timeout: Duration::from_secs(30),
///     server_name: Some("echo.local".to_string()),
///     echo: EchoOptions::default(),
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Network address to bind to
    pub bind_addr: SocketAddr,
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Upper bound for request head plus body, in bytes
    pub max_request_size: usize,
    /// Read timeout for connections
    pub read_timeout: Duration,
    /// Write timeout for connections
    pub write_timeout: Duration,
    /// Value reported as SERVER_NAME in the connection fields
    pub server_name: Option<String>,
    /// Echo page options
    pub echo: EchoOptions,
}

impl HttpConfig {
    /// Rejects settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(EchoError::Config(
                "max_connections must be greater than zero".to_string(),
            ));
        }
        if self.max_request_size == 0 {
            return Err(EchoError::Config(
                "max_request_size must be greater than zero".to_string(),
            ));
        }
        if self.read_timeout.is_zero() || self.write_timeout.is_zero() {
            return Err(EchoError::Config("timeouts must be non-zero".to_string()));
        }
        Ok(())
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            max_connections: 100,
            max_request_size: 1024 * 1024, // 1MB
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            server_name: None,
            echo: EchoOptions::default(),
        }
    }
}
