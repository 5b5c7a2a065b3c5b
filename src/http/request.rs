use bytes::Bytes;
use http::{HeaderMap, Method, Version};
use std::net::SocketAddr;

/// Socket-level facts about the connection a request arrived on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub remote_addr: SocketAddr,
    pub local_addr: SocketAddr,
    pub server_name: Option<String>,
}

/// One parsed HTTP request
///
/// The request-target is kept as the raw string from the request line so it
/// can be echoed back untouched, including targets `http::Uri` would reject.
#[derive(Debug, Clone)]
pub struct EchoRequest {
    pub method: Method,
    pub target: String,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub connection: Option<ConnectionInfo>,
}

impl EchoRequest {
    /// Builds a bodiless HTTP/1.1 request for `target`
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            connection: None,
        }
    }

    /// Replaces the body
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// The part of the target after the first `?`, if any
    pub fn query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, query)| query)
    }

    /// Whether the connection should stay open after this exchange
    pub fn keep_alive(&self) -> bool {
        let tokens = self
            .headers
            .get_all(http::header::CONNECTION)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .map(str::trim);

        let mut close = false;
        let mut keep_alive = false;
        for token in tokens {
            if token.eq_ignore_ascii_case("close") {
                close = true;
            } else if token.eq_ignore_ascii_case("keep-alive") {
                keep_alive = true;
            }
        }

        match self.version {
            Version::HTTP_10 | Version::HTTP_09 => keep_alive && !close,
            _ => !close,
        }
    }
}
