use std::{env, fmt, net::SocketAddr};

use super::server_bind_address;

const DEFAULT_DATABASE_URL: &str = "sqlite://inventory.db";
const DEV_JWT_SECRET: &str = "dev_secret";
const DEFAULT_FEED_HEARTBEAT_SECS: u64 = 15;

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns `true` when the current environment should behave as development.
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    pub jwt_secret: Vec<u8>,
    pub feed_heartbeat_secs: u64,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(value) if !value.trim().is_empty() => value.into_bytes(),
            _ if environment == Environment::Production => {
                return Err(ConfigError::MissingJwtSecret)
            }
            _ => DEV_JWT_SECRET.as_bytes().to_vec(),
        };

        let feed_heartbeat_secs = match env::var("FEED_HEARTBEAT_SECS") {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(value) if value > 0 => value,
                _ => return Err(ConfigError::InvalidHeartbeat(raw)),
            },
            Err(_) => DEFAULT_FEED_HEARTBEAT_SECS,
        };

        Ok(Self {
            bind_addr,
            environment,
            database_url,
            jwt_secret,
            feed_heartbeat_secs,
        })
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    MissingJwtSecret,
    InvalidHeartbeat(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::MissingJwtSecret => write!(f, "JWT_SECRET must be set in production"),
            Self::InvalidHeartbeat(value) => write!(
                f,
                "FEED_HEARTBEAT_SECS must be a positive integer (got {value})"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
