//! Server configuration from the environment.

use std::env;
use std::time::Duration;

use quizhall_room::RoomLimits;

const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_STORE_TIMEOUT_SECS: u64 = 5;
/// Zero: connections never time out unless configured to.
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 0;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}={value:?} is not a valid {expected}")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Everything the `quizhall-server` binary needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// `None` runs on the in-memory store.
    pub database_url: Option<String>,
    /// Empty accepts any origin.
    pub allowed_origins: Vec<String>,
    pub limits: RoomLimits,
    pub store_timeout: Duration,
    /// `None` disables the idle timeout.
    pub idle_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND.to_string(),
            database_url: None,
            allowed_origins: Vec::new(),
            limits: RoomLimits::default(),
            store_timeout: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS),
            idle_timeout: None,
        }
    }
}

impl ServerConfig {
    /// Loads `.env` (if present), then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Builds the config from `lookup`, which returns a variable's value
    /// if set. Unset and blank variables take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let get = |var: &'static str| lookup(var).filter(|v: &String| !v.trim().is_empty());
        let defaults = Self::default();

        let idle_secs = parse_or(&get, "QUIZHALL_IDLE_TIMEOUT_SECS", DEFAULT_IDLE_TIMEOUT_SECS)?;
        let limits = RoomLimits {
            max_rooms: parse_or(&get, "QUIZHALL_MAX_ROOMS", defaults.limits.max_rooms)?,
            max_users_in_room: parse_or(
                &get,
                "QUIZHALL_MAX_USERS_IN_ROOM",
                defaults.limits.max_users_in_room,
            )?,
            ..defaults.limits
        };

        Ok(Self {
            bind_addr: get("QUIZHALL_BIND").unwrap_or(defaults.bind_addr),
            database_url: get("DATABASE_URL"),
            allowed_origins: get("QUIZHALL_ALLOWED_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default(),
            limits,
            store_timeout: Duration::from_secs(parse_or(
                &get,
                "QUIZHALL_STORE_TIMEOUT_SECS",
                DEFAULT_STORE_TIMEOUT_SECS,
            )?),
            idle_timeout: (idle_secs > 0).then(|| Duration::from_secs(idle_secs)),
        })
    }
}

fn parse_or<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&'static str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            value,
            expected: "unsigned integer",
        }),
    }
}
