use crate::http::{EchoOptions, HttpConfig, HttpEchoServer};
use crate::{EchoError, Result};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// An echo server running on a background task
pub struct TestServer {
    pub addr: SocketAddr,
    handle: JoinHandle<Result<()>>,
    shutdown: broadcast::Sender<()>,
}

impl TestServer {
    /// Stops the server and waits for its accept loop to finish
    pub async fn shutdown(self) -> Result<()> {
        if self.shutdown.send(()).is_err() {
            // the accept loop has not subscribed yet
            self.handle.abort();
        }
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(EchoError::Config(format!("server task failed: {e}"))),
        }
    }
}

/// Starts an echo server with `echo` options on 127.0.0.1 and an ephemeral port
pub async fn spawn_test_server(echo: EchoOptions) -> Result<TestServer> {
    spawn_test_server_with_config(HttpConfig {
        echo,
        ..HttpConfig::default()
    })
    .await
}

/// Starts an echo server with `config`, ignoring its bind address in favour
/// of an ephemeral loopback port
pub async fn spawn_test_server_with_config(mut config: HttpConfig) -> Result<TestServer> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
    let addr = listener.local_addr()?;
    config.bind_addr = addr;

    let server = HttpEchoServer::new(config);
    let shutdown = server.shutdown_signal();
    let handle = tokio::spawn(async move { server.serve(listener).await });

    Ok(TestServer {
        addr,
        handle,
        shutdown,
    })
}
