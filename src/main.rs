#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # tunnelgate
//!
//! Remote-desktop tunnel gateway: session registry, tunnel bookkeeping and
//! an HTTP control plane.
//!
//! ## Subcommands
//!
//! - `tunnelgate serve` (default): run the HTTP server
//!
//! ## API surface
//!
//! | Method | Path                                         | Auth          |
//! |--------|----------------------------------------------|---------------|
//! | GET    | `/api/health`                                | No            |
//! | GET    | `/tunnel-control/live`                       | No*           |
//! | GET    | `/tunnel-control/session-status/{token}`     | No*           |
//! | GET    | `/tunnel-control/invalidate-session/{token}` | No*           |
//! | GET    | `/tunnel-control/session-tunnel/{token}`     | No*           |
//! | POST   | `/api/tokens`                                | `api_key`     |
//! | DELETE | `/api/tokens/{token}`                        | `api_key`     |
//! | GET    | `/api/transfers`                             | `api_key`     |
//! | GET    | `/api/session/tunnels[/...]`                 | session token |
//!
//! *`api_key` when `auth.protect_control = true`.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use tunnelgate::{routes, AppState, Config, SessionRegistry};

/// Remote-desktop tunnel gateway.
#[derive(Parser)]
#[command(name = "tunnelgate", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default when no subcommand given).
    Serve {
        /// Path to TOML config file.
        #[arg(long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config_path = match cli.command {
        Some(Commands::Serve { config }) => config,
        None => None,
    };

    if let Err(e) = run_server(config_path.as_deref()).await {
        eprintln!("tunnelgate: {e}");
        std::process::exit(1);
    }
}

async fn run_server(config_path: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(config_path)?;

    // Initialize tracing
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    info!("tunnelgate v{} starting", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}", config.server.listen);

    if config.auth.api_key == "change-me" {
        warn!("Using default API key, set TUNNELGATE_API_KEY or update config");
    }
    if let Some(ref url) = config.audit.webhook_url {
        info!("Transfer events will be posted to {url}");
    }

    let session_timeout = config.sessions.timeout();
    let sweep_interval = Duration::from_secs(config.sessions.sweep_interval_secs.max(1));

    let state = AppState::new(config);
    let app = routes::router(state.clone());

    let listener = TcpListener::bind(&state.config.server.listen).await?;

    info!("Server ready");

    // Periodic sweep: evict idle sessions that own no tunnels
    let sweep_task = session_timeout.map(|timeout| {
        let registry = Arc::clone(&state.registry);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            loop {
                interval.tick().await;
                let registry = Arc::clone(&registry);
                match tokio::task::spawn_blocking(move || registry.sweep_expired(timeout)).await {
                    Ok(0) => {}
                    Ok(n) => debug!(evicted = n, "Session sweep complete"),
                    Err(e) => warn!("Session sweep failed: {e}"),
                }
            }
        })
    });

    // Graceful shutdown
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => info!("Received SIGINT"),
                        _ = sigterm.recv() => info!("Received SIGTERM"),
                    }
                }
                Err(e) => {
                    error!("Failed to register SIGTERM handler: {e}");
                    ctrl_c.await.ok();
                    info!("Received SIGINT");
                }
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            info!("Received SIGINT");
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    // Cleanup
    info!("Shutting down...");
    if let Some(task) = sweep_task {
        task.abort();
    }
    drain_sessions(Arc::clone(&state.registry)).await;
    info!("Goodbye");
    Ok(())
}

async fn drain_sessions(registry: Arc<SessionRegistry>) {
    match tokio::task::spawn_blocking(move || registry.shutdown()).await {
        Ok(n) => info!(sessions = n, "All sessions invalidated"),
        Err(e) => error!("Session shutdown failed: {e}"),
    }
}
