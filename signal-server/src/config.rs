use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Overridden by the DATABASE_URL environment variable
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Disable CORS restrictions (allows all origins) - use only in development!
    #[serde(default)]
    pub disable: bool,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            disable: false,
            allowed_origins: default_allowed_origins(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable file logging
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,
    /// Directory for log files (relative to working directory or absolute)
    #[serde(default = "default_log_directory")]
    pub directory: String,
    /// Prefix for log file names
    #[serde(default = "default_log_file_prefix")]
    pub file_prefix: String,
    /// Rotation strategy: "daily", "hourly", or "never"
    #[serde(default = "default_log_rotation")]
    pub rotation: String,
}

fn default_logging_enabled() -> bool {
    true
}
fn default_log_directory() -> String {
    "logs".to_string()
}
fn default_log_file_prefix() -> String {
    "signal-server".to_string()
}
fn default_log_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            directory: default_log_directory(),
            file_prefix: default_log_file_prefix(),
            rotation: default_log_rotation(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Seconds between position synchronizer ticks
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,
    /// Seconds between hub keep-alive pings
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
}

fn default_sync_interval() -> u64 {
    5
}
fn default_ping_interval() -> u64 {
    30
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: default_sync_interval(),
            ping_interval_secs: default_ping_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Extraction model name; empty disables the LLM path
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_llm_temperature")]
    pub temperature: f64,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
}

fn default_llm_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_llm_temperature() -> f64 {
    0.3
}
fn default_llm_max_tokens() -> u32 {
    500
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            endpoint: default_llm_endpoint(),
            temperature: default_llm_temperature(),
            max_tokens: default_llm_max_tokens(),
        }
    }
}

impl Config {
    /// Load configuration from layered TOML files: `config.toml` then
    /// `config.local.toml`, either of which may be absent.
    pub fn from_file(base_path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(base_path).required(false))
            .add_source(config::File::with_name(&format!("{}.local", base_path)).required(false))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        Ok(config)
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Required and optional process environment, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Env {
    pub database_url: String,
    pub master_encryption_key: String,
    pub jwt_secret_key: String,
    pub telegram_api_id: Option<i64>,
    pub telegram_api_hash: Option<String>,
    pub telegram_phone: Option<String>,
    pub mt5_path: Option<String>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
}

impl Env {
    /// Resolve environment variables. Missing DATABASE_URL or
    /// MASTER_ENCRYPTION_KEY aborts startup.
    pub fn load() -> Result<Self, DomainError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| DomainError::Fatal("DATABASE_URL environment variable is required".into()))?;

        let master_encryption_key = std::env::var("MASTER_ENCRYPTION_KEY").map_err(|_| {
            DomainError::Fatal("MASTER_ENCRYPTION_KEY environment variable is required".into())
        })?;
        if master_encryption_key.len() < 32 {
            return Err(DomainError::Fatal(
                "MASTER_ENCRYPTION_KEY must be at least 32 characters".into(),
            ));
        }

        let jwt_secret_key = std::env::var("JWT_SECRET_KEY")
            .unwrap_or_else(|_| "your-secret-key-change-in-production".to_string());

        Ok(Self {
            database_url,
            master_encryption_key,
            jwt_secret_key,
            telegram_api_id: std::env::var("TELEGRAM_API_ID")
                .ok()
                .and_then(|v| v.parse().ok()),
            telegram_api_hash: std::env::var("TELEGRAM_API_HASH").ok(),
            telegram_phone: std::env::var("TELEGRAM_PHONE").ok(),
            mt5_path: std::env::var("MT5_PATH").ok(),
            llm_model: std::env::var("LLM_MODEL").ok(),
            llm_api_key: std::env::var("LLM_API_KEY").ok(),
        })
    }
}
