//! HTTP/1.x framing on top of `tokio_util::codec`
//!
//! `ServerCodec` turns bytes into [`RequestFrame`]s and responses into bytes;
//! `ClientCodec` does the reverse for the test client.

use super::handler::canonical_header_name;
use super::request::EchoRequest;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, EXPECT, HeaderName, HeaderValue, TRANSFER_ENCODING};
use http::{HeaderMap, Method, Response, StatusCode, Version};
use std::collections::VecDeque;
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Maximum number of headers accepted in a single message head
pub const MAX_HEADERS: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("HTTP parsing error: {0}")]
    HttpParse(#[from] httparse::Error),
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
    #[error("message exceeds the {limit} byte limit")]
    TooLarge { limit: usize },
    #[error("connection closed in the middle of a message")]
    Incomplete,
}

impl CodecError {
    /// Status the server answers with when a request fails to decode
    pub fn status(&self) -> StatusCode {
        match self {
            CodecError::HttpParse(httparse::Error::TooManyHeaders) => {
                StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE
            }
            CodecError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// How the body of a message is delimited
#[derive(Debug)]
enum BodyFraming {
    Length(usize),
    Chunked(ChunkedBody),
}

#[derive(Debug, Clone, Copy)]
enum ChunkState {
    Size,
    Data(usize),
    DataEnd,
    Trailers,
}

/// Incremental decoder for `Transfer-Encoding: chunked` bodies
#[derive(Debug)]
struct ChunkedBody {
    state: ChunkState,
    body: BytesMut,
}

impl ChunkedBody {
    fn new() -> Self {
        Self {
            state: ChunkState::Size,
            body: BytesMut::new(),
        }
    }

    /// Consumes as much of `buf` as possible. `budget` bounds the decoded body.
    fn decode(&mut self, buf: &mut BytesMut, budget: usize) -> Result<Option<Bytes>, CodecError> {
        loop {
            match self.state {
                ChunkState::Size => match httparse::parse_chunk_size(buf) {
                    Ok(httparse::Status::Complete((consumed, size))) => {
                        buf.advance(consumed);
                        let size = usize::try_from(size)
                            .ok()
                            .filter(|size| self.body.len().saturating_add(*size) <= budget)
                            .ok_or(CodecError::TooLarge { limit: budget })?;
                        self.state = if size == 0 {
                            ChunkState::Trailers
                        } else {
                            ChunkState::Data(size)
                        };
                    }
                    Ok(httparse::Status::Partial) => {
                        // a size line never needs more than a few dozen bytes
                        if buf.len() > 1024 {
                            return Err(CodecError::InvalidMessage("chunk size line too long".into()));
                        }
                        return Ok(None);
                    }
                    Err(_) => return Err(CodecError::InvalidMessage("invalid chunk size".into())),
                },
                ChunkState::Data(remaining) => {
                    if buf.is_empty() {
                        return Ok(None);
                    }
                    let take = remaining.min(buf.len());
                    self.body.extend_from_slice(&buf.split_to(take));
                    self.state = match remaining - take {
                        0 => ChunkState::DataEnd,
                        left => ChunkState::Data(left),
                    };
                }
                ChunkState::DataEnd => {
                    if buf.len() < 2 {
                        return Ok(None);
                    }
                    if &buf[..2] != b"\r\n" {
                        return Err(CodecError::InvalidMessage("missing CRLF after chunk data".into()));
                    }
                    buf.advance(2);
                    self.state = ChunkState::Size;
                }
                ChunkState::Trailers => {
                    // trailer fields are read and discarded
                    match buf.windows(2).position(|w| w == b"\r\n") {
                        Some(0) => {
                            buf.advance(2);
                            return Ok(Some(std::mem::take(&mut self.body).freeze()));
                        }
                        Some(end) => buf.advance(end + 2),
                        None => {
                            if buf.len() > budget {
                                return Err(CodecError::TooLarge { limit: budget });
                            }
                            return Ok(None);
                        }
                    }
                }
            }
        }
    }
}

/// Request head waiting for its body
#[derive(Debug)]
struct PendingRequest {
    method: Method,
    target: String,
    version: Version,
    headers: HeaderMap,
    head_len: usize,
    framing: BodyFraming,
    expects_continue: bool,
}

/// What the server codec yields
#[derive(Debug)]
pub enum RequestFrame {
    /// The head asked for `Expect: 100-continue` and the body has not arrived
    Continue,
    /// A complete request
    Request(EchoRequest),
}

/// Server side codec: decodes requests, encodes responses
#[derive(Debug)]
pub struct ServerCodec {
    max_request_size: usize,
    pending: Option<PendingRequest>,
}

impl ServerCodec {
    pub fn new(max_request_size: usize) -> Self {
        Self {
            max_request_size,
            pending: None,
        }
    }

    fn decode_head(&self, buf: &mut BytesMut) -> Result<Option<PendingRequest>, CodecError> {
        let limit = self.max_request_size;
        let mut header_slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Request::new(&mut header_slots);

        let head_len = match parsed.parse(buf)? {
            httparse::Status::Complete(len) => len,
            httparse::Status::Partial => {
                if buf.len() > limit {
                    return Err(CodecError::TooLarge { limit });
                }
                return Ok(None);
            }
        };
        if head_len > limit {
            return Err(CodecError::TooLarge { limit });
        }

        let method = parsed
            .method
            .and_then(|method| Method::from_bytes(method.as_bytes()).ok())
            .ok_or_else(|| CodecError::InvalidMessage("invalid method".into()))?;
        let target = parsed
            .path
            .ok_or_else(|| CodecError::InvalidMessage("missing request target".into()))?
            .to_string();
        let version = match parsed.version {
            Some(0) => Version::HTTP_10,
            _ => Version::HTTP_11,
        };
        let headers = collect_headers(parsed.headers)?;

        let framing = if headers.contains_key(TRANSFER_ENCODING) {
            if !is_chunked(&headers) {
                return Err(CodecError::InvalidMessage(
                    "unsupported transfer encoding".into(),
                ));
            }
            BodyFraming::Chunked(ChunkedBody::new())
        } else {
            let length = content_length(&headers)?.unwrap_or(0);
            if length > limit - head_len {
                return Err(CodecError::TooLarge { limit });
            }
            BodyFraming::Length(length)
        };
        let expects_continue = version == Version::HTTP_11
            && headers
                .get(EXPECT)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|value| value.trim().eq_ignore_ascii_case("100-continue"));

        buf.advance(head_len);
        Ok(Some(PendingRequest {
            method,
            target,
            version,
            headers,
            head_len,
            framing,
            expects_continue,
        }))
    }
}

impl Decoder for ServerCodec {
    type Item = RequestFrame;
    type Error = CodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RequestFrame>, CodecError> {
        if self.pending.is_none() {
            match self.decode_head(buf)? {
                Some(head) => self.pending = Some(head),
                None => return Ok(None),
            }
        }

        let limit = self.max_request_size;
        let body = match self.pending.as_mut() {
            None => return Ok(None),
            Some(pending) => {
                let body = match &mut pending.framing {
                    BodyFraming::Length(length) => {
                        if buf.len() < *length {
                            buf.reserve(*length - buf.len());
                            None
                        } else {
                            Some(buf.split_to(*length).freeze())
                        }
                    }
                    BodyFraming::Chunked(chunked) => chunked.decode(buf, limit - pending.head_len)?,
                };
                match body {
                    Some(body) => body,
                    // the client holds the body back until it sees 100 Continue
                    None if pending.expects_continue => {
                        pending.expects_continue = false;
                        return Ok(Some(RequestFrame::Continue));
                    }
                    None => return Ok(None),
                }
            }
        };

        Ok(self.pending.take().map(|pending| {
            RequestFrame::Request(EchoRequest {
                method: pending.method,
                target: pending.target,
                version: pending.version,
                headers: pending.headers,
                body,
                connection: None,
            })
        }))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<RequestFrame>, CodecError> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() && self.pending.is_none() => Ok(None),
            None => Err(CodecError::Incomplete),
        }
    }
}

impl Encoder<Response<Bytes>> for ServerCodec {
    type Error = CodecError;

    fn encode(&mut self, response: Response<Bytes>, dst: &mut BytesMut) -> Result<(), CodecError> {
        let (mut parts, body) = response.into_parts();
        let status = parts.status;
        dst.reserve(128 + body.len());

        dst.put_slice(b"HTTP/1.1 ");
        dst.put_slice(status.as_str().as_bytes());
        dst.put_u8(b' ');
        dst.put_slice(status.canonical_reason().unwrap_or("").as_bytes());
        dst.put_slice(b"\r\n");

        if !status_allows_body(status) {
            // 304 may still announce the length of the representation
            if status != StatusCode::NOT_MODIFIED {
                parts.headers.remove(CONTENT_LENGTH);
            }
            write_headers(&parts.headers, dst);
            dst.put_slice(b"\r\n");
            return Ok(());
        }

        write_headers(&parts.headers, dst);
        if !parts.headers.contains_key(CONTENT_LENGTH) {
            dst.put_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
        }
        dst.put_slice(b"\r\n");
        dst.put_slice(&body);
        Ok(())
    }
}

/// 1xx, 204 and 304 responses never carry content
pub fn status_allows_body(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

/// Response head waiting for its body
#[derive(Debug)]
struct PendingResponse {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    length: usize,
}

/// Client side codec: encodes requests, decodes responses
#[derive(Debug)]
pub struct ClientCodec {
    max_response_size: usize,
    // one entry per request in flight, true for HEAD
    head_requests: VecDeque<bool>,
    pending: Option<PendingResponse>,
}

impl ClientCodec {
    pub fn new(max_response_size: usize) -> Self {
        Self {
            max_response_size,
            head_requests: VecDeque::new(),
            pending: None,
        }
    }

    fn decode_head(&mut self, buf: &mut BytesMut) -> Result<Option<PendingResponse>, CodecError> {
        let limit = self.max_response_size;
        let mut header_slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Response::new(&mut header_slots);

        let head_len = match parsed.parse(buf)? {
            httparse::Status::Complete(len) => len,
            httparse::Status::Partial => {
                if buf.len() > limit {
                    return Err(CodecError::TooLarge { limit });
                }
                return Ok(None);
            }
        };

        let status = parsed
            .code
            .and_then(|code| StatusCode::from_u16(code).ok())
            .ok_or_else(|| CodecError::InvalidMessage("invalid status code".into()))?;
        let version = match parsed.version {
            Some(0) => Version::HTTP_10,
            _ => Version::HTTP_11,
        };
        let headers = collect_headers(parsed.headers)?;

        // interim responses precede the final one for the same request
        let head_request = if status.is_informational() {
            false
        } else {
            self.head_requests.pop_front().unwrap_or(false)
        };
        let length = if head_request || !status_allows_body(status) {
            0
        } else {
            content_length(&headers)?.unwrap_or(0)
        };
        if length > limit {
            return Err(CodecError::TooLarge { limit });
        }

        buf.advance(head_len);
        Ok(Some(PendingResponse {
            status,
            version,
            headers,
            length,
        }))
    }
}

impl Encoder<EchoRequest> for ClientCodec {
    type Error = CodecError;

    fn encode(&mut self, request: EchoRequest, dst: &mut BytesMut) -> Result<(), CodecError> {
        self.head_requests.push_back(request.method == Method::HEAD);
        dst.reserve(128 + request.body.len());

        dst.put_slice(request.method.as_str().as_bytes());
        dst.put_u8(b' ');
        dst.put_slice(request.target.as_bytes());
        dst.put_slice(match request.version {
            Version::HTTP_10 => b" HTTP/1.0\r\n",
            _ => b" HTTP/1.1\r\n",
        });
        write_headers(&request.headers, dst);
        // a caller that sets Transfer-Encoding supplies an already framed body
        let framed = request.headers.contains_key(CONTENT_LENGTH)
            || request.headers.contains_key(TRANSFER_ENCODING);
        if !framed && !request.body.is_empty() {
            dst.put_slice(format!("Content-Length: {}\r\n", request.body.len()).as_bytes());
        }
        dst.put_slice(b"\r\n");
        dst.put_slice(&request.body);
        Ok(())
    }
}

impl Decoder for ClientCodec {
    type Item = Response<Bytes>;
    type Error = CodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Response<Bytes>>, CodecError> {
        while self.pending.is_none() {
            match self.decode_head(buf)? {
                Some(head) if head.status.is_informational() => {
                    tracing::trace!(status = %head.status, "skipping interim response");
                }
                Some(head) => self.pending = Some(head),
                None => return Ok(None),
            }
        }

        let length = self.pending.as_ref().map_or(0, |pending| pending.length);
        if buf.len() < length {
            buf.reserve(length - buf.len());
            return Ok(None);
        }
        let body = buf.split_to(length).freeze();

        Ok(self.pending.take().map(|pending| {
            let mut response = Response::new(body);
            *response.status_mut() = pending.status;
            *response.version_mut() = pending.version;
            *response.headers_mut() = pending.headers;
            response
        }))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Response<Bytes>>, CodecError> {
        match self.decode(buf)? {
            Some(response) => Ok(Some(response)),
            None if buf.is_empty() && self.pending.is_none() => Ok(None),
            None => Err(CodecError::Incomplete),
        }
    }
}

fn collect_headers(raw: &[httparse::Header<'_>]) -> Result<HeaderMap, CodecError> {
    let mut headers = HeaderMap::with_capacity(raw.len());
    for header in raw {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|_| CodecError::InvalidMessage(format!("invalid header name {:?}", header.name)))?;
        let value = HeaderValue::from_bytes(header.value)
            .map_err(|_| CodecError::InvalidMessage(format!("invalid value for header {}", header.name)))?;
        headers.append(name, value);
    }
    Ok(headers)
}

fn write_headers(headers: &HeaderMap, dst: &mut BytesMut) {
    for (name, value) in headers {
        dst.put_slice(canonical_header_name(name).as_bytes());
        dst.put_slice(b": ");
        dst.put_slice(value.as_bytes());
        dst.put_slice(b"\r\n");
    }
}

/// Whether the final transfer coding is `chunked`
fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|coding| !coding.is_empty())
        .last()
        .is_some_and(|coding| coding.eq_ignore_ascii_case("chunked"))
}

/// Declared body length. Repeated headers must agree.
fn content_length(headers: &HeaderMap) -> Result<Option<usize>, CodecError> {
    let mut length = None;
    for value in headers.get_all(CONTENT_LENGTH) {
        let parsed = value
            .to_str()
            .ok()
            .and_then(|value| value.trim().parse::<usize>().ok())
            .ok_or_else(|| CodecError::InvalidMessage("invalid Content-Length".into()))?;
        match length {
            Some(previous) if previous != parsed => {
                return Err(CodecError::InvalidMessage("conflicting Content-Length".into()));
            }
            _ => length = Some(parsed),
        }
    }
    Ok(length)
}
