//! The echo handler
//!
//! Turns one request into an HTML page that lists the request URI, method,
//! headers and body. The page is byte-oriented: nothing is escaped and the
//! request body is copied verbatim, so a caller can diff exactly what arrived.

use super::config::EchoOptions;
use super::query::EchoQuery;
use super::request::{ConnectionInfo, EchoRequest};
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Response};
use tracing::{debug, warn};

pub const X_REQUEST_URI: HeaderName = HeaderName::from_static("x-request-uri");
pub const STATUS_CODE: HeaderName = HeaderName::from_static("status-code");
pub const X_STATUS_CODE: HeaderName = HeaderName::from_static("x-status-code");

const HTML_CONTENT_TYPE: &str = "text/html; charset=UTF-8";

/// Faults a handler raises on purpose
#[derive(Debug, thiserror::Error)]
pub enum HandlerFault {
    /// Unhandled error; the server answers 500
    #[error("{message} (code {code})")]
    Thrown { message: String, code: i32 },
    /// Processing stopped; the server drops the connection without answering
    #[error("request aborted with exit code {exit_code}")]
    Died { exit_code: i32 },
}

/// Something that answers requests for `HttpServer`
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, request: EchoRequest) -> Result<Response<Bytes>, HandlerFault>;
}

/// Reflects each request back as an HTML page
#[derive(Debug, Clone, Default)]
pub struct EchoHandler {
    options: EchoOptions,
}

impl EchoHandler {
    pub fn new(options: EchoOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> EchoOptions {
        self.options
    }

    /// Builds the response for `request`, or the fault it asked for
    pub fn respond(&self, request: &EchoRequest) -> Result<Response<Bytes>, HandlerFault> {
        let query = request.query().map(EchoQuery::parse).unwrap_or_default();

        if self.options.enable_fault_injection {
            if query.throw {
                return Err(HandlerFault::Thrown {
                    message: "throw exception".to_string(),
                    code: 1234,
                });
            }
            if query.die {
                return Err(HandlerFault::Died { exit_code: 1 });
            }
        }

        let mut response = Response::new(self.render(request));
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(HTML_CONTENT_TYPE));

        if let Some(literal) = query.status_code.as_deref() {
            match HeaderValue::from_str(literal) {
                Ok(value) => {
                    headers.insert(STATUS_CODE, value.clone());
                    headers.insert(X_STATUS_CODE, value);
                }
                Err(_) => warn!(value = %literal.escape_debug(), "status_code is not a valid header value"),
            }
            match query.response_status() {
                Some(status) => *response.status_mut() = status,
                None => debug!(value = %literal.escape_debug(), "status_code does not name an HTTP status, keeping 200"),
            }
        }

        match HeaderValue::from_str(&request.target) {
            Ok(value) => {
                response.headers_mut().insert(X_REQUEST_URI, value);
            }
            Err(_) => warn!(target_uri = %request.target.escape_debug(), "request target is not a valid header value"),
        }

        Ok(response)
    }

    /// Renders the echo page body
    pub fn render(&self, request: &EchoRequest) -> Bytes {
        let mut page = BytesMut::with_capacity(256 + request.body.len());

        page.put_slice(b"<h1>Requested URL:</h1>\n<p>");
        page.put_slice(request.target.as_bytes());
        page.put_slice(b"</p>\n<h1>Request Method:</h1>\n<p>");
        page.put_slice(request.method.as_str().as_bytes());
        page.put_slice(b"</p>\n<h1>Headers:</h1>\n<pre>\n");

        if self.options.include_connection_fields {
            for (name, value) in connection_fields(request.connection.as_ref()) {
                page.put_slice(name.as_bytes());
                page.put_slice(b": ");
                page.put_slice(value.as_bytes());
                page.put_u8(b'\n');
            }
        }

        for (name, value) in header_lines(&request.headers, self.options.sort_headers) {
            page.put_slice(name.as_bytes());
            page.put_slice(b": ");
            page.put_slice(&value);
            page.put_u8(b'\n');
        }

        page.put_slice(b"</pre>\n<h1>Body:</h1>\n<pre>\n");
        page.put_slice(&request.body);
        page.put_slice(b"</pre>");

        page.freeze()
    }
}

#[async_trait]
impl RequestHandler for EchoHandler {
    async fn handle(&self, request: EchoRequest) -> Result<Response<Bytes>, HandlerFault> {
        self.respond(&request)
    }
}

/// One `(name, value)` pair per distinct header, values joined with `, `
pub fn header_lines(headers: &HeaderMap, sorted: bool) -> Vec<(String, Vec<u8>)> {
    let mut lines: Vec<(String, Vec<u8>)> = headers
        .keys()
        .map(|name| {
            let mut joined = Vec::new();
            for (i, value) in headers.get_all(name).iter().enumerate() {
                if i > 0 {
                    joined.extend_from_slice(b", ");
                }
                joined.extend_from_slice(value.as_bytes());
            }
            (canonical_header_name(name), joined)
        })
        .collect();

    if sorted {
        lines.sort_by(|a, b| a.0.cmp(&b.0));
    }
    lines
}

/// `x-forwarded-for` becomes `X-Forwarded-For`
pub fn canonical_header_name(name: &HeaderName) -> String {
    let mut canonical = String::with_capacity(name.as_str().len());
    let mut upper = true;
    for c in name.as_str().chars() {
        if upper {
            canonical.push(c.to_ascii_uppercase());
        } else {
            canonical.push(c);
        }
        upper = c == '-';
    }
    canonical
}

fn connection_fields(info: Option<&ConnectionInfo>) -> [(&'static str, String); 5] {
    let remote = info.map(|info| info.remote_addr);
    let local = info.map(|info| info.local_addr);
    let server_name = info.and_then(|info| info.server_name.clone());

    [
        ("REMOTE_ADDR", remote.map(|addr| addr.ip().to_string()).unwrap_or_default()),
        ("REMOTE_PORT", remote.map(|addr| addr.port().to_string()).unwrap_or_default()),
        ("SERVER_ADDR", local.map(|addr| addr.ip().to_string()).unwrap_or_default()),
        ("SERVER_NAME", server_name.unwrap_or_default()),
        ("SERVER_PORT", local.map(|addr| addr.port().to_string()).unwrap_or_default()),
    ]
}
