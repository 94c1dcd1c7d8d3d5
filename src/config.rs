//! Environment-driven configuration for the server binary.

use std::env;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid port number: {0}")]
    InvalidPort(String),

    #[error("Invalid bcrypt cost: {0}")]
    InvalidBcryptCost(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,

    /// Directory holding the collection files and uploaded media.
    pub data_dir: PathBuf,

    /// Base URL download links are built from.
    pub public_url: String,

    pub bcrypt_cost: u32,

    /// Fallback filter when RUST_LOG is unset.
    pub log_level: String,

    pub cors_origin: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is fine.
        dotenvy::dotenv().ok();

        let port = env::var("MANGROV_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort("MANGROV_PORT must be a valid number".to_string()))?;

        let data_dir = env::var("MANGROV_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));

        let public_url = env::var("MANGROV_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", port));

        let bcrypt_cost = match env::var("MANGROV_BCRYPT_COST") {
            Ok(raw) => {
                let cost = raw
                    .parse::<u32>()
                    .map_err(|_| ConfigError::InvalidBcryptCost(raw.clone()))?;
                if !(4..=31).contains(&cost) {
                    return Err(ConfigError::InvalidBcryptCost(raw));
                }
                cost
            }
            Err(_) => bcrypt::DEFAULT_COST,
        };

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let cors_origin = env::var("MANGROV_CORS_ORIGIN").ok();

        Ok(Config {
            port,
            data_dir,
            public_url: public_url.trim_end_matches('/').to_string(),
            bcrypt_cost,
            log_level,
            cors_origin,
        })
    }

    pub fn media_dir(&self) -> PathBuf {
        self.data_dir.join("media")
    }
}
