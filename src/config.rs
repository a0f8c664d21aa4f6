// src/config.rs
use rand::RngCore;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_DATABASE_URL: &str = "sqlite://finance.db?mode=rwc";
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3030";
const DEFAULT_QUOTE_API_URL: &str = "https://cloud.iexapis.com/stable";
const DEFAULT_SESSION_TTL_SECS: u64 = 86_400;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("API_KEY not set")]
    MissingApiKey,
    #[error("invalid {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub quote_api_url: String,
    pub session_secret: Vec<u8>,
    pub session_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("API_KEY")
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let listen_addr = lookup("LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = listen_addr.parse().map_err(|_| ConfigError::Invalid {
            name: "LISTEN_ADDR",
            value: listen_addr.clone(),
        })?;

        let quote_api_url =
            lookup("QUOTE_API_URL").unwrap_or_else(|| DEFAULT_QUOTE_API_URL.to_string());

        // Without a configured secret, sessions only last for this process.
        let session_secret = match lookup("SESSION_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => secret.into_bytes(),
            None => {
                let mut secret = vec![0u8; 32];
                rand::thread_rng().fill_bytes(&mut secret);
                secret
            }
        };

        let session_ttl = match lookup("SESSION_TTL_SECS") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "SESSION_TTL_SECS",
                value: raw.clone(),
            })?,
            None => DEFAULT_SESSION_TTL_SECS,
        };

        Ok(Config {
            api_key,
            database_url,
            listen_addr,
            quote_api_url,
            session_secret,
            session_ttl: Duration::from_secs(session_ttl),
        })
    }
}
