// src/config.rs
use log::warn;
use std::env;
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

pub const MEMORY_STORE_URI: &str = "memory://";

const DEFAULT_STORE_URI: &str = "127.0.0.1:9042";
const DEFAULT_KEYSPACE: &str = "stockfolio";
const DEFAULT_BIND_ADDR: [u8; 4] = [127, 0, 0, 1];
const DEFAULT_PORT: u16 = 4000;
const DEFAULT_JWT_SECRET: &str = "supersecretkey";
const DEFAULT_TOKEN_TTL_DAYS: i64 = 7;
const DEFAULT_BCRYPT_COST: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store_uri: String,
    pub keyspace: String,
    pub bind_addr: IpAddr,
    pub port: u16,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub bcrypt_cost: u32,
}

impl Config {
    /// Loads `.env` (if any) and reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store_uri = lookup("STORE_URI").unwrap_or_else(|| {
            warn!("STORE_URI not set, using {}", DEFAULT_STORE_URI);
            DEFAULT_STORE_URI.to_string()
        });
        let keyspace = lookup("STORE_KEYSPACE").unwrap_or_else(|| DEFAULT_KEYSPACE.to_string());
        if keyspace.is_empty() || !keyspace.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ConfigError::Invalid {
                key: "STORE_KEYSPACE",
                value: keyspace,
            });
        }

        let jwt_secret = match lookup("JWT_SECRET") {
            Some(secret) if !secret.is_empty() => secret,
            _ => {
                warn!("JWT_SECRET not set, tokens are signed with an insecure development secret");
                DEFAULT_JWT_SECRET.to_string()
            }
        };

        let bcrypt_cost = parse_or("BCRYPT_COST", &lookup, DEFAULT_BCRYPT_COST)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid {
                key: "BCRYPT_COST",
                value: bcrypt_cost.to_string(),
            });
        }

        let token_ttl_days = parse_or("TOKEN_TTL_DAYS", &lookup, DEFAULT_TOKEN_TTL_DAYS)?;
        if token_ttl_days <= 0 {
            return Err(ConfigError::Invalid {
                key: "TOKEN_TTL_DAYS",
                value: token_ttl_days.to_string(),
            });
        }

        Ok(Self {
            store_uri,
            keyspace,
            bind_addr: parse_or("BIND_ADDR", &lookup, IpAddr::from(DEFAULT_BIND_ADDR))?,
            port: parse_or("PORT", &lookup, DEFAULT_PORT)?,
            jwt_secret,
            token_ttl_days,
            bcrypt_cost,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    pub fn uses_memory_store(&self) -> bool {
        self.store_uri == MEMORY_STORE_URI
    }
}

fn parse_or<T, F>(key: &'static str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}
