//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use parley_shared::constants::DEFAULT_SNAPSHOT_DELAY_MS;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Filesystem path of the SQLite database.
    /// Env: `DATABASE_PATH`
    /// Default: none (platform data directory).
    pub database_path: Option<PathBuf>,

    /// Base URL of the identity service answering `user-exists` checks.
    /// Env: `AUTH_SERVICE_URL`
    /// Default: `http://localhost:8081`
    pub auth_service_url: String,

    /// Allowed CORS origin.  Unset means any origin.
    /// Env: `CORS_ORIGIN`
    pub cors_origin: Option<String>,

    /// Delay before pushing a friend-request snapshot to a fresh
    /// subscriber, in milliseconds.
    /// Env: `SNAPSHOT_DELAY_MS`
    /// Default: `200`
    pub snapshot_delay_ms: u64,

    /// Poll interval of the ingestion-queue consumer, in milliseconds.
    /// Env: `QUEUE_POLL_INTERVAL_MS`
    /// Default: `250`
    pub queue_poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            database_path: None,
            auth_service_url: "http://localhost:8081".to_string(),
            cors_origin: None,
            snapshot_delay_ms: DEFAULT_SNAPSHOT_DELAY_MS,
            queue_poll_interval_ms: 250,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(
                    value = %addr,
                    "Invalid HTTP_ADDR, using default"
                );
            }
        }

        if let Ok(path) = std::env::var("DATABASE_PATH") {
            if !path.is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        if let Ok(url) = std::env::var("AUTH_SERVICE_URL") {
            if !url.is_empty() {
                config.auth_service_url = url.trim_end_matches('/').to_string();
            }
        }

        if let Ok(origin) = std::env::var("CORS_ORIGIN") {
            if !origin.is_empty() {
                config.cors_origin = Some(origin);
            }
        }

        if let Ok(val) = std::env::var("SNAPSHOT_DELAY_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                config.snapshot_delay_ms = ms;
            } else {
                tracing::warn!(value = %val, "Invalid SNAPSHOT_DELAY_MS, using default");
            }
        }

        if let Ok(val) = std::env::var("QUEUE_POLL_INTERVAL_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                config.queue_poll_interval_ms = ms.max(1);
            } else {
                tracing::warn!(value = %val, "Invalid QUEUE_POLL_INTERVAL_MS, using default");
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.snapshot_delay_ms, 200);
        assert!(config.database_path.is_none());
    }
}
