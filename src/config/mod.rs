//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::session::SessionLimits;

/// Default Supabase Storage bucket holding project files
pub const DEFAULT_STORAGE_BUCKET: &str = "project-files";

/// Default directory for persisted client-session stores
pub const DEFAULT_SESSION_DATA_DIR: &str = "./.sessions";

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Supabase project URL
    pub supabase_url: String,
    /// Supabase anonymous key; live calls pair it with the user's access token
    pub supabase_anon_key: String,
    /// Supabase JWT secret for token verification
    pub supabase_jwt_secret: String,
    /// Storage bucket for project files
    pub storage_bucket: String,

    /// Directory holding each client session's persisted store
    pub session_data_dir: PathBuf,
    /// Allowed client origin for CORS
    pub client_origin: String,
    /// Idle TTL, capacity and sweep cadence of the session registry
    pub session_limits: SessionLimits,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let defaults = SessionLimits::default();
        let session_limits = SessionLimits {
            idle_ttl: chrono::Duration::seconds(env_or(
                "SESSION_IDLE_TTL_SECS",
                defaults.idle_ttl.num_seconds(),
            )?),
            max_sessions: env_or("MAX_SESSIONS", defaults.max_sessions)?,
            sweep_interval: std::time::Duration::from_secs(env_or(
                "SESSION_SWEEP_SECS",
                defaults.sweep_interval.as_secs(),
            )?),
        };

        let supabase_url = env::var("SUPABASE_URL")
            .map_err(|_| ConfigError::Missing("SUPABASE_URL"))?
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            supabase_url,
            supabase_anon_key: env::var("SUPABASE_ANON_KEY")
                .map_err(|_| ConfigError::Missing("SUPABASE_ANON_KEY"))?,
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .map_err(|_| ConfigError::Missing("SUPABASE_JWT_SECRET"))?,
            storage_bucket: env::var("STORAGE_BUCKET")
                .unwrap_or_else(|_| DEFAULT_STORAGE_BUCKET.to_string()),

            session_data_dir: env::var("SESSION_DATA_DIR")
                .unwrap_or_else(|_| DEFAULT_SESSION_DATA_DIR.to_string())
                .into(),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_default(),
            session_limits,
        })
    }

    /// Configuration for tests and local tooling
    pub fn for_backend(supabase_url: &str, session_data_dir: impl Into<PathBuf>) -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            log_level: "debug".to_string(),
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            supabase_anon_key: "anon-key".to_string(),
            supabase_jwt_secret: "jwt-secret".to_string(),
            storage_bucket: DEFAULT_STORAGE_BUCKET.to_string(),
            session_data_dir: session_data_dir.into(),
            client_origin: String::new(),
            session_limits: SessionLimits::default(),
        }
    }
}

/// Parse `name` when set, `default` otherwise
fn env_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
