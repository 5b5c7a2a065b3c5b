use super::codec::{CodecError, RequestFrame, ServerCodec, status_allows_body};
use super::config::HttpConfig;
use super::handler::{EchoHandler, HandlerFault, RequestHandler};
use super::request::ConnectionInfo;
use crate::Result;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};
use http::{Method, Response, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::{signal, time::timeout};
use tokio_util::codec::Framed;
use tracing::{Instrument, debug, error, info, warn};

/// HTTP/1.x server that hands every request to a [`RequestHandler`]
///
/// # Examples
///
/// ```no_run
/// use reqecho::http::{EchoOptions, HttpConfig, HttpEchoServer};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = HttpConfig {
///         bind_addr: "127.0.0.1:8080".parse()?,
///         echo: EchoOptions {
///             sort_headers: true,
///             ..EchoOptions::default()
///         },
///         ..HttpConfig::default()
///     };
///
///     let server = HttpEchoServer::new(config);
///     server.run().await?;
///     Ok(())
/// }
/// ```
pub struct HttpServer<H: RequestHandler> {
    config: HttpConfig,
    handler: Arc<H>,
    shutdown_signal: Arc<broadcast::Sender<()>>,
}

impl HttpServer<EchoHandler> {
    /// Creates an echo server using the echo options from `config`
    pub fn new(config: HttpConfig) -> Self {
        let handler = EchoHandler::new(config.echo);
        Self::with_handler(config, handler)
    }
}

impl<H: RequestHandler> HttpServer<H> {
    /// Creates a server that answers with `handler`
    pub fn with_handler(config: HttpConfig, handler: H) -> Self {
        let (shutdown_signal, _) = broadcast::channel(1);
        Self {
            config,
            handler: Arc::new(handler),
            shutdown_signal: Arc::new(shutdown_signal),
        }
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Returns a shutdown signal sender that can be used to gracefully shutdown the server
    pub fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.shutdown_signal.as_ref().clone()
    }

    /// Binds `bind_addr` and serves until shutdown
    pub async fn run(&self) -> Result<()> {
        self.config.validate()?;
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serves connections from an already bound listener until shutdown
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        self.config.validate()?;
        info!(address = %listener.local_addr()?, options = ?self.config.echo, "HTTP echo server listening");

        let connection_count = Arc::new(AtomicUsize::new(0));
        let mut shutdown_rx = self.shutdown_signal.subscribe();

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            let current_count = connection_count.load(Ordering::SeqCst);
                            if current_count >= self.config.max_connections {
                                warn!(%addr, current = current_count, limit = self.config.max_connections, "Connection rejected: limit reached");
                                continue;
                            }

                            let new_count = connection_count.fetch_add(1, Ordering::SeqCst) + 1;
                            info!(%addr, current = new_count, "Accepted connection");

                            let config = self.config.clone();
                            let handler = Arc::clone(&self.handler);
                            let connection_count = Arc::clone(&connection_count);
                            let span = tracing::info_span!("connection", %addr, current = new_count);
                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(stream, addr, handler, config).instrument(span).await {
                                    error!(%addr, error = %e, "Error handling connection");
                                }
                                let final_count = connection_count.fetch_sub(1, Ordering::SeqCst) - 1;
                                info!(%addr, current = final_count, "Connection closed");
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = signal::ctrl_c() => {
                    info!("Received shutdown signal, stopping server");
                    break;
                }
                _ = shutdown_rx.recv() => {
                    info!("Received internal shutdown signal, stopping server");
                    break;
                }
            }
        }

        info!("HTTP echo server stopped");
        Ok(())
    }

    /// Serves requests on one connection until it closes, times out or a
    /// request asks for the connection to be torn down
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        handler: Arc<H>,
        config: HttpConfig,
    ) -> Result<()> {
        let connection = ConnectionInfo {
            remote_addr: addr,
            local_addr: stream.local_addr()?,
            server_name: config.server_name.clone(),
        };
        let mut framed = Framed::new(stream, ServerCodec::new(config.max_request_size));

        loop {
            let mut request = match timeout(config.read_timeout, framed.next()).await {
                Ok(Some(Ok(RequestFrame::Request(request)))) => request,
                Ok(Some(Ok(RequestFrame::Continue))) => {
                    let mut interim = Response::new(Bytes::new());
                    *interim.status_mut() = StatusCode::CONTINUE;
                    match timeout(config.write_timeout, framed.send(interim)).await {
                        Ok(Ok(())) => debug!(%addr, "Sent 100 Continue"),
                        Ok(Err(e)) => return Err(e.into()),
                        Err(_) => {
                            warn!(%addr, "Write timeout");
                            break;
                        }
                    }
                    continue;
                }
                Ok(Some(Err(CodecError::Io(e)))) => return Err(e.into()),
                Ok(Some(Err(e))) => {
                    warn!(%addr, error = %e, "Rejecting malformed request");
                    let status = e.status();
                    let mut response = plain_response(status, status.canonical_reason().unwrap_or("bad request"));
                    response.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
                    match timeout(config.write_timeout, framed.send(response)).await {
                        Ok(Ok(())) => info!(%addr, status = status.as_u16(), "Sent error response"),
                        Ok(Err(e)) => warn!(%addr, error = %e, "Failed to send error response"),
                        Err(_) => warn!(%addr, "Write timeout"),
                    }
                    break;
                }
                Ok(None) => {
                    info!(%addr, "Client closed connection");
                    break;
                }
                Err(_) => {
                    warn!(%addr, "Read timeout");
                    break;
                }
            };

            let started = Instant::now();
            let method = request.method.clone();
            let uri = request.target.clone();
            let keep_alive = request.keep_alive();
            request.connection = Some(connection.clone());

            let mut response = match handler.handle(request).await {
                Ok(response) => response,
                Err(HandlerFault::Died { exit_code }) => {
                    warn!(%addr, %method, %uri, exit_code, "Request died, dropping connection");
                    return Ok(());
                }
                Err(fault) => {
                    error!(%addr, %method, %uri, error = %fault, "Unhandled fault while handling request");
                    plain_response(StatusCode::INTERNAL_SERVER_ERROR, "server error")
                }
            };

            if !keep_alive {
                response.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
            }
            if method == Method::HEAD {
                let length = response.body().len();
                response.headers_mut().insert(CONTENT_LENGTH, HeaderValue::from(length));
                *response.body_mut() = Bytes::new();
            }

            let status = response.status();
            if !status_allows_body(status) {
                *response.body_mut() = Bytes::new();
            }
            let bytes = response.body().len();
            match timeout(config.write_timeout, framed.send(response)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    warn!(%addr, "Write timeout");
                    break;
                }
            }
            log_access(addr, &method, &uri, status, bytes, started);

            if !keep_alive {
                break;
            }
        }

        Ok(())
    }
}

fn plain_response(status: StatusCode, body: &'static str) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from_static(body.as_bytes()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=UTF-8"));
    response
}

fn log_access(
    addr: SocketAddr,
    method: &Method,
    uri: &str,
    status: StatusCode,
    bytes: usize,
    started: Instant,
) {
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    if status.is_server_error() {
        error!(target: "reqecho::access", %addr, %method, %uri, status = status.as_u16(), bytes, elapsed_ms, "request");
    } else {
        info!(target: "reqecho::access", %addr, %method, %uri, status = status.as_u16(), bytes, elapsed_ms, "request");
    }
}
