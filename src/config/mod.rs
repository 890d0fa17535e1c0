//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::room::RoomSettings;
use crate::util::rate_limit::INPUT_RATE_LIMIT;

/// Default window a non-playing room may sit idle before it is torn down
pub const DEFAULT_INACTIVITY_SECS: u64 = 15 * 60;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS; `None` allows any origin
    pub client_origin: Option<String>,
    /// Idle window before a waiting/finished room expires
    pub inactivity_timeout: Duration,
    /// Inbound messages allowed per second on a single connection
    pub input_rate_limit: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // PORT wins over SERVER_ADDR so hosted platforms can inject it
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:3001".to_string()),
        };

        let inactivity_secs = match lookup("ROOM_INACTIVITY_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| ConfigError::Invalid("ROOM_INACTIVITY_SECS"))?,
            None => DEFAULT_INACTIVITY_SECS,
        };

        let input_rate_limit = match lookup("INPUT_RATE_LIMIT") {
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|_| ConfigError::Invalid("INPUT_RATE_LIMIT"))?,
            None => INPUT_RATE_LIMIT,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            client_origin: lookup("CLIENT_ORIGIN").filter(|s| !s.trim().is_empty()),
            inactivity_timeout: Duration::from_secs(inactivity_secs),
            input_rate_limit,
        })
    }

    /// Timing parameters handed to every room
    pub fn room_settings(&self) -> RoomSettings {
        RoomSettings {
            inactivity_timeout: self.inactivity_timeout,
            ..RoomSettings::default()
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
