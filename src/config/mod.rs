//! Configuration module for the sync client.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::AppError;

/// Reference batch size for entity fetches.
pub const DEFAULT_SYNC_BATCH_SIZE: usize = 40;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Path to Tantivy search index directory
    pub index_path: PathBuf,
    /// Address to bind the local API to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Base URL of the remote change feed; the demo assets are used when unset
    pub remote_url: Option<String>,
    /// Directory holding `topics.json` and `news.json` for the demo source
    pub demo_assets_path: PathBuf,
    /// Period between scheduled sync jobs
    pub sync_interval: Duration,
    /// Number of ids fetched per entity request
    pub sync_batch_size: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let db_path = env::var("NIA_DB_PATH")
            .unwrap_or_else(|_| "./data/nia.sqlite".to_string())
            .into();

        let index_path = env::var("NIA_INDEX_PATH")
            .unwrap_or_else(|_| "./data/index".to_string())
            .into();

        let bind_addr = env::var("NIA_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .map_err(|e| AppError::Validation(format!("Invalid NIA_BIND_ADDR: {}", e)))?;

        let log_level = env::var("NIA_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let remote_url = env::var("NIA_REMOTE_URL")
            .ok()
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());

        let demo_assets_path = env::var("NIA_DEMO_ASSETS")
            .unwrap_or_else(|_| "./assets".to_string())
            .into();

        let sync_interval_secs: u64 = parse_var("NIA_SYNC_INTERVAL_SECS", 3600)?;
        if sync_interval_secs == 0 {
            return Err(AppError::Validation(
                "NIA_SYNC_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }

        let sync_batch_size: usize = parse_var("NIA_SYNC_BATCH_SIZE", DEFAULT_SYNC_BATCH_SIZE)?;
        if sync_batch_size == 0 {
            return Err(AppError::Validation(
                "NIA_SYNC_BATCH_SIZE must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            db_path,
            index_path,
            bind_addr,
            log_level,
            remote_url,
            demo_assets_path,
            sync_interval: Duration::from_secs(sync_interval_secs),
            sync_batch_size,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Validation(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}
