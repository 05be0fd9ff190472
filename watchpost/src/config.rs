//! Configuration loading for the web application.
//!
//! Loads configuration from TOML files and/or environment variables using figment.
//!
//! # Configuration Sources (in order of priority, lowest to highest)
//!
//! 1. Default values (from `#[serde(default)]` attributes)
//! 2. TOML config file (if provided)
//! 3. Environment variables (prefix: `WATCHPOST_`, nested with `__`)
//!
//! # Environment Variable Naming
//!
//! - `WATCHPOST_HTTP__LISTEN_ADDR` → `http.listen_addr`
//! - `WATCHPOST_SESSION__TIMEOUT_SECS` → `session.timeout_secs`
//! - `WATCHPOST_SESSION__SECRET` → `session.secret`
//! - `WATCHPOST_HEALTH__MEMORY_DEGRADED_MB` → `health.memory_degraded_mb`
//! - `WATCHPOST_ENVIRONMENT` → `environment`
//!
//! # Deployment Information
//!
//! Git and deployment metadata is injected by the deploy pipeline through the
//! `DD_*` variables. It is read once at startup into [`DeploymentInfo`]; any
//! variable that is not set reads as [`UNKNOWN`].

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Placeholder reported for any deployment variable that is not set.
pub const UNKNOWN: &str = "unknown";

/// Minimum length of a session signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 64;

/// Main configuration for the web application.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// HTTP listener settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Session cookie settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Health check thresholds
    #[serde(default)]
    pub health: HealthConfig,

    /// Hosting environment name (`Development`, `Staging`, `Production`, ...).
    ///
    /// `Development` shows error details on the error page.
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            session: SessionConfig::default(),
            health: HealthConfig::default(),
            environment: default_environment(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    /// Address to listen on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

/// Session cookie configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Inactivity window in seconds. Each authenticated request slides it forward.
    #[serde(default = "default_session_timeout")]
    pub timeout_secs: u64,

    /// Secret used to sign the session cookie (at least 64 bytes).
    ///
    /// When unset, a random secret is generated at startup and sessions do not
    /// survive a restart.
    #[serde(default)]
    pub secret: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_session_timeout(),
            secret: None,
        }
    }
}

fn default_session_timeout() -> u64 {
    3600
}

/// Health check configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HealthConfig {
    /// Report `Degraded` when resident memory exceeds this many megabytes.
    #[serde(default)]
    pub memory_degraded_mb: Option<u64>,
}

fn default_environment() -> String {
    "Production".to_string()
}

impl Config {
    /// Load configuration from TOML file and environment variables.
    ///
    /// Configuration sources are merged in order (later sources override earlier):
    /// 1. TOML config file (if it exists)
    /// 2. Environment variables (prefix: `WATCHPOST_`, nested with `__`)
    pub fn load(path: &Path) -> Result<Self> {
        let mut figment = Figment::new();

        if path.exists() {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("WATCHPOST_").split("__"));

        let config: Config = figment.extract().with_context(|| {
            format!(
                "Failed to load config from {} and environment",
                path.display()
            )
        })?;

        Ok(config)
    }

    /// Get the default config file path
    /// - macOS: ~/Library/Application Support/watchpost/config.toml
    /// - Linux: ~/.config/watchpost/config.toml
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("watchpost")
            .join("config.toml")
    }

    /// Get the default data directory (for logs)
    /// - macOS: ~/Library/Application Support/watchpost/
    /// - Linux: ~/.local/share/watchpost/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("watchpost")
    }
}

/// Generate a random alphanumeric secret suitable for signing session cookies.
pub fn generate_secret() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(MIN_SECRET_LEN)
        .map(char::from)
        .collect()
}

/// Git and deployment metadata taken from the `DD_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentInfo {
    pub git_commit_sha: String,
    pub git_repository_url: String,
    pub git_branch: String,
    pub git_commit_message: String,
    pub deployment_version: String,
    pub deployment_time: String,
    pub datadog_env: String,
    pub datadog_site: String,
    /// Whether `DD_API_KEY` is set. The key itself is never kept.
    pub api_key_configured: bool,
}

impl DeploymentInfo {
    /// Read deployment metadata from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build deployment metadata from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).unwrap_or_else(|| UNKNOWN.to_string());

        Self {
            git_commit_sha: read("DD_GIT_COMMIT_SHA"),
            git_repository_url: read("DD_GIT_REPOSITORY_URL"),
            git_branch: read("DD_GIT_BRANCH"),
            git_commit_message: read("DD_GIT_COMMIT_MESSAGE"),
            deployment_version: read("DD_DEPLOYMENT_VERSION"),
            deployment_time: read("DD_DEPLOYMENT_TIME"),
            datadog_env: read("DD_ENV"),
            datadog_site: read("DD_SITE"),
            api_key_configured: lookup("DD_API_KEY").is_some(),
        }
    }
}

impl Default for DeploymentInfo {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

/// Read-only settings handed to request handlers.
///
/// Built once at startup from [`Config`] and [`DeploymentInfo`].
#[derive(Debug, Clone)]
pub struct Settings {
    pub environment: String,
    pub deployment: DeploymentInfo,
    /// Application version reported by the diagnostic endpoints
    pub version: &'static str,
}

impl Settings {
    pub fn new(config: &Config, deployment: DeploymentInfo) -> Self {
        Self {
            environment: config.environment.clone(),
            deployment,
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    /// Whether error details may be shown to the client.
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("Development")
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(&Config::default(), DeploymentInfo::default())
    }
}

/// Create a default configuration template
pub fn default_config_template() -> String {
    let secret = generate_secret();

    format!(
        r#"# Watchpost Configuration

# Hosting environment. "Development" shows error details on the error page.
environment = "Production"

[http]
listen_addr = "0.0.0.0:8080"

[session]
# Sliding inactivity window for the login cookie.
timeout_secs = 3600
# Secret for signing the session cookie (at least 64 bytes). Without it a
# random secret is generated at startup and users are signed out on restart.
secret = "{secret}"

[health]
# Report Degraded on /health when resident memory exceeds this (MB).
# memory_degraded_mb = 512

# Deployment metadata is read from the environment, not from this file:
#   DD_GIT_COMMIT_SHA, DD_GIT_REPOSITORY_URL, DD_GIT_BRANCH,
#   DD_GIT_COMMIT_MESSAGE, DD_DEPLOYMENT_VERSION, DD_DEPLOYMENT_TIME,
#   DD_ENV, DD_SITE, DD_API_KEY
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Toml as TomlProvider;
    use std::collections::HashMap;

    /// Helper to parse TOML config strings in tests
    fn parse_config(toml_str: &str) -> Config {
        Figment::new()
            .merge(TomlProvider::string(toml_str))
            .extract()
            .expect("Failed to parse test config")
    }

    #[test]
    fn test_parse_config() {
        let config_str = r#"
environment = "Development"

[http]
listen_addr = "127.0.0.1:9000"

[session]
timeout_secs = 600
secret = "not-a-real-secret"

[health]
memory_degraded_mb = 256
"#;

        let config = parse_config(config_str);
        assert_eq!(config.environment, "Development");
        assert_eq!(config.http.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.session.timeout_secs, 600);
        assert_eq!(config.session.secret.as_deref(), Some("not-a-real-secret"));
        assert_eq!(config.health.memory_degraded_mb, Some(256));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("");
        assert_eq!(config.environment, "Production");
        assert_eq!(config.http.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.session.timeout_secs, 3600);
        assert!(config.session.secret.is_none());
        assert!(config.health.memory_degraded_mb.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[session]\ntimeout_secs = 120\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.session.timeout_secs, 120);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.http.listen_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_default_template_parses() {
        let config = parse_config(&default_config_template());
        assert_eq!(config.session.timeout_secs, 3600);
        assert_eq!(
            config.session.secret.map(|s| s.len()),
            Some(MIN_SECRET_LEN)
        );
    }

    #[test]
    fn test_deployment_info_defaults_to_unknown() {
        let info = DeploymentInfo::from_lookup(|_| None);
        assert_eq!(info.git_commit_sha, UNKNOWN);
        assert_eq!(info.git_repository_url, UNKNOWN);
        assert_eq!(info.git_branch, UNKNOWN);
        assert_eq!(info.git_commit_message, UNKNOWN);
        assert_eq!(info.deployment_version, UNKNOWN);
        assert_eq!(info.deployment_time, UNKNOWN);
        assert_eq!(info.datadog_env, UNKNOWN);
        assert_eq!(info.datadog_site, UNKNOWN);
        assert!(!info.api_key_configured);
    }

    #[test]
    fn test_deployment_info_echoes_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("DD_GIT_COMMIT_SHA", "0123456789"),
            ("DD_GIT_BRANCH", "main"),
            ("DD_DEPLOYMENT_VERSION", "1.0"),
            ("DD_API_KEY", "secret-key"),
        ]);
        let info = DeploymentInfo::from_lookup(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(info.git_commit_sha, "0123456789");
        assert_eq!(info.git_branch, "main");
        assert_eq!(info.deployment_version, "1.0");
        assert_eq!(info.git_repository_url, UNKNOWN);
        assert!(info.api_key_configured);
    }

    #[test]
    fn test_development_environment_is_case_insensitive() {
        let config = Config {
            environment: "development".to_string(),
            ..Config::default()
        };
        assert!(Settings::new(&config, DeploymentInfo::default()).is_development());
        assert!(!Settings::default().is_development());
    }
}
