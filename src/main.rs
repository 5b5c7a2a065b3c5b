use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use reqecho::http::{EchoOptions, HttpConfig, HttpEchoServer};
use std::net::IpAddr;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Echoes every HTTP request back as an HTML page
#[derive(Debug, Parser)]
#[command(name = "reqecho", version, about)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    bind: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Maximum number of concurrent connections
    #[arg(long, default_value_t = 100)]
    max_connections: usize,

    /// Largest accepted request (head plus body) in bytes
    #[arg(long, default_value_t = 1024 * 1024)]
    max_request_size: usize,

    /// Read timeout in seconds
    #[arg(long, default_value_t = 30)]
    read_timeout: u64,

    /// Write timeout in seconds
    #[arg(long, default_value_t = 30)]
    write_timeout: u64,

    /// Value reported as SERVER_NAME
    #[arg(long)]
    server_name: Option<String>,

    /// List headers sorted by name instead of in arrival order
    #[arg(long)]
    sort_headers: bool,

    /// Include REMOTE_ADDR, REMOTE_PORT, SERVER_ADDR, SERVER_NAME and SERVER_PORT
    #[arg(long)]
    connection_fields: bool,

    /// Honour the `throw` and `die` query flags
    #[arg(long)]
    fault_injection: bool,
}

impl From<Args> for HttpConfig {
    fn from(args: Args) -> Self {
        Self {
            bind_addr: (args.bind, args.port).into(),
            max_connections: args.max_connections,
            max_request_size: args.max_request_size,
            read_timeout: Duration::from_secs(args.read_timeout),
            write_timeout: Duration::from_secs(args.write_timeout),
            server_name: args.server_name,
            echo: EchoOptions {
                sort_headers: args.sort_headers,
                include_connection_fields: args.connection_fields,
                enable_fault_injection: args.fault_injection,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("reqecho=info")),
        )
        .init();

    let config: HttpConfig = Args::parse().into();
    config.validate().wrap_err("Invalid configuration")?;

    info!(
        address = %config.bind_addr,
        max_connections = config.max_connections,
        options = ?config.echo,
        "Starting HTTP echo server"
    );

    let server = HttpEchoServer::new(config);
    server.run().await.wrap_err("Failed to run HTTP echo server")?;

    Ok(())
}
