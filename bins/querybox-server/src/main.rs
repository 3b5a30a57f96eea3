use anyhow::{Context, Result};
use clap::Parser;
use querybox_api::{background::start_registry_refresh_task, create_router, AppState};
use querybox_config::{loader, ConfigLoader};
use querybox_sandbox::SandboxGateway;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Querybox sandbox server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server host (overrides HOST)
    #[arg(long)]
    host: Option<String>,

    /// Server port (overrides PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting querybox server");

    let mut config = ConfigLoader::from_env()
        .load()
        .context("Failed to load configuration")?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    loader::validate(&config).context("Invalid configuration")?;

    info!(
        environment = %config.environment,
        database = %config.database.redacted_target(),
        "Configuration loaded"
    );

    let gateway = SandboxGateway::from_config(&config)?;
    let refresh_secs = config.catalog.refresh_interval_secs;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid listen address")?;

    let state = AppState::new(gateway, config);

    // Registry loads in the background; requests are served in
    // grammar-only mode until it succeeds
    let refresh = start_registry_refresh_task(state.gateway.clone(), refresh_secs);

    let app = create_router(state.clone())?;

    info!("Starting HTTP server on {}", addr);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    refresh.abort();
    state.gateway.pool().close().await;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
