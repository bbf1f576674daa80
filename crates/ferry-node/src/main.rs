//! Ferry Node - Git HTTP server.
//!
//! Serves the repositories under a root directory over the dumb and smart
//! HTTP transports.

use anyhow::Context;
use clap::Parser;
use ferry_node::api::{create_router, AppState};
use ferry_node::config::ServerConfig;
use ferry_node::observability::{init_logging, LogFormat};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Ferry Node - Git HTTP server
#[derive(Parser, Debug)]
#[command(name = "ferry-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "FERRY_CONFIG", default_value = "ferry.yaml")]
    config: PathBuf,

    /// HTTP listen address
    #[arg(long, env = "FERRY_LISTEN_ADDR")]
    listen_addr: Option<SocketAddr>,

    /// Directory containing the repositories
    #[arg(long, env = "FERRY_ROOT")]
    root: Option<PathBuf>,

    /// Serve git-upload-pack (fetch and clone)
    #[arg(long, env = "FERRY_UPLOAD_PACK")]
    upload_pack: Option<bool>,

    /// Serve git-receive-pack (push)
    #[arg(long, env = "FERRY_RECEIVE_PACK")]
    receive_pack: Option<bool>,

    /// Git executable used for the smart protocol
    #[arg(long, env = "FERRY_GIT_PROGRAM")]
    git_program: Option<PathBuf>,

    /// Largest accepted RPC request body in bytes
    #[arg(long, env = "FERRY_MAX_REQUEST_BODY")]
    max_request_body: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "FERRY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long, env = "FERRY_LOG_FORMAT")]
    log_format: Option<String>,
}

impl Args {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(addr) = self.listen_addr {
            config.listen_addr = addr;
        }
        if let Some(root) = self.root {
            config.root = root;
        }
        if let Some(enabled) = self.upload_pack {
            config.upload_pack = enabled;
        }
        if let Some(enabled) = self.receive_pack {
            config.receive_pack = enabled;
        }
        if let Some(program) = self.git_program {
            config.git_program = program;
        }
        if let Some(limit) = self.max_request_body {
            config.max_request_body = limit;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    args.apply(&mut config);

    init_logging(&config.log_level, LogFormat::parse(&config.log_format));

    config.validate()?;
    config.root = config
        .root
        .canonicalize()
        .with_context(|| format!("resolving {}", config.root.display()))?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Ferry node");
    tracing::info!(
        listen_addr = %config.listen_addr,
        root = %config.root.display(),
        upload_pack = config.upload_pack,
        receive_pack = config.receive_pack,
        git_program = %config.git_program.display(),
        "Node configuration"
    );

    let listen_addr = config.listen_addr;
    let app = create_router(AppState::new(config));

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("binding {listen_addr}"))?;
    tracing::info!(addr = %listen_addr, "Listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Ferry node stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
