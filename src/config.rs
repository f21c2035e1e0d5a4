use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins, comma separated
    pub cors_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Database URL. Projects are kept in memory when unset.
    pub db_url: Option<String>,

    /// How long an empty room stays resident before it is flushed and evicted
    #[serde(default = "default_eviction_grace_ms")]
    pub eviction_grace_ms: u64,

    /// Store writes attempted per eviction before giving up for now
    #[serde(default = "default_flush_retry_attempts")]
    pub flush_retry_attempts: u32,

    /// Delay before the first flush retry, doubled for each further retry
    #[serde(default = "default_flush_retry_backoff_ms")]
    pub flush_retry_backoff_ms: u64,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        // Load from environment variables using envy
        match envy::from_env::<Config>() {
            Ok(config) => {
                info!("✅ Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    /// Allowed CORS origins, trimmed, empty entries dropped
    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .as_deref()
            .map(|origins| {
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Settings for the room lifecycle
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            eviction_grace: Duration::from_millis(self.eviction_grace_ms),
            flush_retry_attempts: self.flush_retry_attempts.max(1),
            flush_retry_backoff: Duration::from_millis(self.flush_retry_backoff_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            cors_origins: None,
            db_url: None,
            eviction_grace_ms: default_eviction_grace_ms(),
            flush_retry_attempts: default_flush_retry_attempts(),
            flush_retry_backoff_ms: default_flush_retry_backoff_ms(),
        }
    }
}

/// Room lifecycle settings
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub eviction_grace: Duration,
    pub flush_retry_attempts: u32,
    pub flush_retry_backoff: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Config::default().relay_config()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvError(#[from] envy::Error),
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_eviction_grace_ms() -> u64 {
    5000
}

fn default_flush_retry_attempts() -> u32 {
    3
}

fn default_flush_retry_backoff_ms() -> u64 {
    200
}
