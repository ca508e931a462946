//! Tenant data layer - backend-for-frontend for the project dashboard
//!
//! Hosts the data layer over HTTP:
//! - Demo CRUD over in-memory fixtures under `/demo`
//! - Live CRUD over Supabase under `/app`, authenticated by Supabase JWTs
//! - Navigation events that purge demo state on entry to `/app`

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tenant_data_layer::app::AppState;
use tenant_data_layer::config::Config;
use tenant_data_layer::http::build_router;
use tenant_data_layer::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting tenant data layer");
    info!("Server address: {}", config.server_addr);
    info!(
        bucket = %config.storage_bucket,
        session_dir = %config.session_data_dir.display(),
        "Storage configured"
    );

    // Create application state
    let state = AppState::new(config.clone());

    // Evict idle client sessions in the background
    let _sweeper = state.sessions.spawn_sweeper();
    info!(
        idle_ttl_secs = config.session_limits.idle_ttl.num_seconds(),
        max_sessions = config.session_limits.max_sessions,
        "Session sweeper started"
    );

    // Build router
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
