//! HTTP server startup.
//!
//! Builds the shared [`AppState`] from configuration and serves the router
//! until Ctrl-C or SIGTERM.

use anyhow::{Context, Result, anyhow};
use axum_extra::extract::cookie::Key;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::{Config, DeploymentInfo, MIN_SECRET_LEN, Settings, generate_secret};
use crate::diagnostics::DiagnosticsCollector;
use crate::health::{HealthRegistry, ProcessCheck, SelfCheck};
use crate::telemetry::EventLog;
use crate::web::auth::{FixedCredentials, SessionStore};
use crate::web::{AppState, app_router};

/// Server configuration
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
}

/// Derive the cookie signing key from the configured secret.
///
/// Without a secret a random one is used, so sessions end on restart.
pub fn cookie_key(secret: Option<&str>) -> Result<Key> {
    let secret = match secret {
        Some(secret) => secret.to_string(),
        None => {
            warn!("No session.secret configured; generated a random key, sessions will not survive a restart");
            generate_secret()
        }
    };

    Key::try_from(secret.as_bytes()).map_err(|e| {
        anyhow!("session.secret must be at least {MIN_SECRET_LEN} bytes: {e}")
    })
}

/// Assemble the shared state the router runs on.
pub fn build_state(
    config: &Config,
    deployment: DeploymentInfo,
    cookie_key: Key,
    events: Arc<dyn EventLog>,
) -> Result<AppState> {
    let diagnostics = Arc::new(
        DiagnosticsCollector::new().context("Failed to initialize process diagnostics")?,
    );

    let mut health = HealthRegistry::new();
    health.register(Arc::new(SelfCheck));
    health.register(Arc::new(ProcessCheck::new(
        diagnostics.clone(),
        config.health.memory_degraded_mb,
    )));

    Ok(AppState {
        settings: Arc::new(Settings::new(config, deployment)),
        credentials: Arc::new(FixedCredentials::default()),
        sessions: Arc::new(SessionStore::new(config.session.timeout_secs)),
        diagnostics,
        health: Arc::new(health),
        events,
        cookie_key,
    })
}

/// Run the HTTP server until a shutdown signal arrives.
pub async fn run_server(config: ServerConfig, state: AppState) -> Result<()> {
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;

    info!(
        addr = %config.listen_addr,
        environment = %state.settings.environment,
        health_checks = state.health.len(),
        "Starting HTTP server"
    );

    let app = app_router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server error")?;

    info!("HTTP server stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl-C).
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl-C");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }
}
