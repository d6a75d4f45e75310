//! Transclusion sample host.
//!
//! Serves `POST /verify`: the request body is markup whose include
//! directives are resolved against their fragment sources, and the assembled
//! page is returned with the aggregated status, headers and `Cache-Control`.
//!
//! ```text
//!     Client ──POST /verify──▶ http::server ──▶ Transcluder
//!                                                  │
//!                                  ┌───────────────┼───────────────┐
//!                                  ▼               ▼               ▼
//!                             fragment A      fragment B      fragment C
//!                                  │   (FragmentCache + single-flight)
//!                                  └───────────────┼───────────────┘
//!     Client ◀──assembled page── http::server ◀────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use transclusion::config::{load_config, AppConfig};
use transclusion::observability::{logging, metrics};
use transclusion::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "transclusion")]
#[command(about = "Server-side fragment transclusion host", long_about = None)]
struct Args {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "transclusion starting");
    tracing::info!(
        bind_address = %config.server.bind_address,
        fragment_timeout_ms = config.transclusion.fragment_request_timeout_ms,
        cache_max_size_bytes = config.transclusion.cache_max_size_bytes,
        vary_headers = ?config.transclusion.cache_vary_by_request_headers,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
