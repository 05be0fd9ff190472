//! Watchpost - Main entry point
//!
//! Serves the login pages and diagnostic endpoints, or writes a starter
//! configuration file.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use watchpost::config::{self, Config, DeploymentInfo};
use watchpost::server::{ServerConfig, build_state, cookie_key, run_server};
use watchpost::telemetry::TracingEventLog;

/// Watchpost - session login and diagnostic endpoints for monitoring tests
#[derive(Parser)]
#[command(name = "watchpost")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value_os_t = Config::default_path())]
    config: PathBuf,

    /// Data directory for logs
    #[arg(short, long, default_value_os_t = Config::default_data_dir())]
    data_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web server
    Serve {
        /// Address to listen on (overrides config)
        #[arg(long)]
        listen: Option<SocketAddr>,
    },

    /// Generate a default configuration file
    InitConfig {
        /// Output path (defaults to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    match cli.command {
        Commands::Serve { listen } => {
            // For daemon mode: log to both stdout and file with rotation
            init_daemon_logging(&cli.data_dir, filter)?;
            serve(&cli.config, listen).await
        }
        Commands::InitConfig { output } => {
            init_cli_logging(filter);
            generate_config(output)
        }
    }
}

/// Initialize logging for CLI commands (stdout only).
fn init_cli_logging(filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

/// Initialize logging for daemon mode (stdout + rotating file).
fn init_daemon_logging(data_dir: &Path, filter: EnvFilter) -> Result<()> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    // Daily rotating file, e.g. watchpost.2026-01-15.log
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("watchpost")
        .filename_suffix("log")
        .build(&log_dir)
        .with_context(|| "Failed to create log file appender")?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer alive for the lifetime of the process
    std::mem::forget(guard);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false)) // stdout
        .with(fmt::layer().with_target(true).with_ansi(false).with_writer(non_blocking)) // file
        .init();

    info!("Logging to: {}", log_dir.display());
    Ok(())
}

/// Run the web server
async fn serve(config_path: &Path, listen_override: Option<SocketAddr>) -> Result<()> {
    let config = Config::load(config_path)?;
    let deployment = DeploymentInfo::from_env();

    let listen_addr: SocketAddr = match listen_override {
        Some(addr) => addr,
        None => config.http.listen_addr.parse().map_err(|e| {
            anyhow!("Invalid http.listen_addr '{}': {e}", config.http.listen_addr)
        })?,
    };

    info!(
        environment = %config.environment,
        git_branch = %deployment.git_branch,
        git_sha = %deployment.git_commit_sha,
        deployment_version = %deployment.deployment_version,
        "Watchpost starting"
    );
    info!("Session timeout: {}s", config.session.timeout_secs);

    let key = cookie_key(config.session.secret.as_deref())?;
    let state = build_state(&config, deployment, key, Arc::new(TracingEventLog))?;

    run_server(ServerConfig { listen_addr }, state).await
}

/// Generate a default configuration file
fn generate_config(output: Option<PathBuf>) -> Result<()> {
    let config = config::default_config_template();

    match output {
        Some(path) => {
            std::fs::write(&path, &config)
                .with_context(|| format!("Failed to write config: {}", path.display()))?;
            println!("Configuration written to: {}", path.display());
        }
        None => {
            print!("{}", config);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_listen_override() {
        let cli = Cli::try_parse_from(["watchpost", "-v", "serve", "--listen", "127.0.0.1:9000"])
            .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Serve { listen } => {
                assert_eq!(listen, Some("127.0.0.1:9000".parse().unwrap()));
            }
            Commands::InitConfig { .. } => panic!("expected serve"),
        }
    }

    #[test]
    fn test_generate_config_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watchpost.toml");
        generate_config(Some(path.clone())).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.session.timeout_secs, 3600);
        assert!(config.session.secret.is_some());
    }
}
