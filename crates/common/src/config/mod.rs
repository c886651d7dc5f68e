//! Configuration management for YouBook services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Generative-text service configuration
    #[serde(default)]
    pub transformer: TransformerConfig,

    /// Session configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Image upload configuration
    #[serde(default)]
    pub uploads: UploadConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Time allowed for in-flight requests to drain on shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Create missing tables on startup
    #[serde(default)]
    pub bootstrap_schema: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransformerConfig {
    /// Provider: openai, mock
    #[serde(default = "default_transformer_provider")]
    pub provider: String,

    /// API key for the generative-text service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model that writes autobiography narrative
    #[serde(default = "default_narrative_model")]
    pub narrative_model: String,

    /// Model that summarizes chatbot transcripts
    #[serde(default = "default_summary_model")]
    pub summary_model: String,

    /// Request timeout in seconds
    #[serde(default = "default_transformer_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// HMAC secret the session tokens are signed with; required
    pub session_secret: Option<String>,

    /// Session lifetime in seconds
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// Cookie carrying the session token
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    /// Directory uploaded images are written to
    #[serde(default = "default_upload_dir")]
    pub dir: String,

    /// URL prefix the stored path is reported under
    #[serde(default = "default_upload_prefix")]
    pub public_prefix: String,

    /// Largest accepted multipart body in bytes
    #[serde(default = "default_upload_max_bytes")]
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error) or a full filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 120 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_transformer_provider() -> String { "openai".to_string() }
fn default_narrative_model() -> String {
    "ft:gpt-4o-mini-2024-07-18:personal:autobiography:AG1hlRpE".to_string()
}
fn default_summary_model() -> String {
    "ft:gpt-4o-mini-2024-07-18:personal:summary:A8lnw3tq".to_string()
}
fn default_transformer_timeout() -> u64 { 60 }
fn default_session_ttl() -> u64 { 86_400 }
fn default_session_cookie() -> String { "session".to_string() }
fn default_upload_dir() -> String { "uploads".to_string() }
fn default_upload_prefix() -> String { "/uploads".to_string() }
fn default_upload_max_bytes() -> usize { 10 * 1024 * 1024 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "youbook".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            provider: default_transformer_provider(),
            api_key: None,
            api_base: None,
            narrative_model: default_narrative_model(),
            summary_model: default_summary_model(),
            timeout_secs: default_transformer_timeout(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_secret: None,
            session_ttl_secs: default_session_ttl(),
            session_cookie: default_session_cookie(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: default_upload_dir(),
            public_prefix: default_upload_prefix(),
            max_bytes: default_upload_max_bytes(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__DATABASE__URL=postgres://...
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot safely start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.auth.session_secret.as_deref().map(str::trim) {
            Some(secret) if !secret.is_empty() => Ok(()),
            _ => Err(ConfigError::Message(
                "auth.session_secret must be set (APP__AUTH__SESSION_SECRET)".to_string(),
            )),
        }
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Get transformer timeout as Duration
    pub fn transformer_timeout(&self) -> Duration {
        Duration::from_secs(self.transformer.timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: "postgres://localhost/youbook".to_string(),
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
                bootstrap_schema: false,
            },
            transformer: TransformerConfig::default(),
            auth: AuthConfig::default(),
            uploads: UploadConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}
