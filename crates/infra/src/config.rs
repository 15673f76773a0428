//! Configuration loading and representation.
//!
//! Everything comes from environment variables. `from_lookup` takes the
//! variable source as a function so tests never touch the process environment.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgSslMode};
use thiserror::Error;

use teller_ledger::EngineConfig;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_LOCK_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_UNIT_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub storage: StorageConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone)]
pub enum StorageConfig {
    InMemory,
    Postgres(DatabaseConfig),
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub connect_options: PgConnectOptions,
    pub max_connections: u32,
    /// Per-transaction `lock_timeout` / `statement_timeout`.
    pub lock_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let bind_addr = env.parse_or("BIND_ADDR", || {
            SocketAddr::from_str(DEFAULT_BIND_ADDR).map_err(|_| ConfigError::Invalid {
                key: "BIND_ADDR",
                value: DEFAULT_BIND_ADDR.to_string(),
            })
        })?;

        let unit_timeout_ms = env.positive_or("LEDGER_UNIT_TIMEOUT_MS", DEFAULT_UNIT_TIMEOUT_MS)?;
        let engine = EngineConfig {
            unit_timeout: Duration::from_millis(unit_timeout_ms),
        };

        let use_persistent: bool = env.parse_or("USE_PERSISTENT_STORES", || Ok(false))?;
        let storage = if use_persistent {
            StorageConfig::Postgres(DatabaseConfig::from_env(&env)?)
        } else {
            StorageConfig::InMemory
        };

        Ok(Self {
            bind_addr,
            storage,
            engine,
        })
    }
}

impl DatabaseConfig {
    fn from_env<F>(env: &Env<F>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let connect_options = match env.get("DATABASE_URL") {
            Some(url) => PgConnectOptions::from_str(&url).map_err(|_| ConfigError::Invalid {
                key: "DATABASE_URL",
                value: "<redacted>".to_string(),
            })?,
            None => {
                let host = env.require("DB_HOST")?;
                let port: u16 = env.parse_or("DB_PORT", || Ok(DEFAULT_DB_PORT))?;
                let user = env.require("DB_USER")?;
                let name = env.require("DB_NAME")?;
                let ssl_mode: PgSslMode = env.parse_or("DB_SSLMODE", || Ok(PgSslMode::Require))?;

                let mut options = PgConnectOptions::new()
                    .host(&host)
                    .port(port)
                    .username(&user)
                    .database(&name)
                    .ssl_mode(ssl_mode);
                if let Some(password) = env.get("DB_PASSWORD") {
                    options = options.password(&password);
                }
                options
            }
        };

        let max_connections = env.positive_or("DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        // Postgres reads a zero lock_timeout as "wait forever".
        let lock_timeout_ms = env.positive_or("DB_LOCK_TIMEOUT_MS", DEFAULT_LOCK_TIMEOUT_MS)?;

        Ok(Self {
            connect_options,
            max_connections,
            lock_timeout: Duration::from_millis(lock_timeout_ms),
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn require(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    fn parse_or<T, D>(&self, key: &'static str, default: D) -> Result<T, ConfigError>
    where
        T: FromStr,
        D: FnOnce() -> Result<T, ConfigError>,
    {
        match self.get(key) {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
            None => default(),
        }
    }

    /// Like `parse_or`, but zero is rejected.
    fn positive_or<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + Default + PartialEq + ToString,
    {
        let value = self.parse_or(key, || Ok(default))?;
        if value == T::default() {
            return Err(ConfigError::Invalid {
                key,
                value: value.to_string(),
            });
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_to_in_memory_storage() {
        let cfg = config(&[]).unwrap();
        assert!(matches!(cfg.storage, StorageConfig::InMemory));
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(cfg.engine.unit_timeout, Duration::from_secs(5));
    }

    #[test]
    fn persistent_storage_from_discrete_settings() {
        let cfg = config(&[
            ("USE_PERSISTENT_STORES", "true"),
            ("DB_HOST", "db.internal"),
            ("DB_USER", "teller"),
            ("DB_PASSWORD", "secret"),
            ("DB_NAME", "teller"),
            ("DB_LOCK_TIMEOUT_MS", "750"),
        ])
        .unwrap();

        let StorageConfig::Postgres(db) = cfg.storage else {
            panic!("expected postgres storage");
        };
        assert_eq!(db.connect_options.get_host(), "db.internal");
        assert_eq!(db.connect_options.get_port(), 5432);
        assert_eq!(db.connect_options.get_database(), Some("teller"));
        assert_eq!(db.lock_timeout, Duration::from_millis(750));
        assert_eq!(db.max_connections, 10);
    }

    #[test]
    fn database_url_takes_precedence() {
        let cfg = config(&[
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://u:p@localhost:6543/bank"),
        ])
        .unwrap();

        let StorageConfig::Postgres(db) = cfg.storage else {
            panic!("expected postgres storage");
        };
        assert_eq!(db.connect_options.get_port(), 6543);
    }

    #[test]
    fn missing_database_settings_are_reported() {
        let err = config(&[("USE_PERSISTENT_STORES", "true"), ("DB_USER", "u")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DB_HOST"));
    }

    #[test]
    fn malformed_values_are_reported_with_their_key() {
        let err = config(&[("LEDGER_UNIT_TIMEOUT_MS", "soon")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "LEDGER_UNIT_TIMEOUT_MS",
                value: "soon".to_string()
            }
        );
        assert!(config(&[("LEDGER_UNIT_TIMEOUT_MS", "0")]).is_err());
        assert!(config(&[("USE_PERSISTENT_STORES", "maybe")]).is_err());
    }

    #[test]
    fn zero_bounds_are_rejected() {
        let persistent = |key: &'static str| {
            config(&[
                ("USE_PERSISTENT_STORES", "true"),
                ("DATABASE_URL", "postgres://u:p@localhost/bank"),
                (key, "0"),
            ])
            .unwrap_err()
        };

        for key in ["DB_LOCK_TIMEOUT_MS", "DB_MAX_CONNECTIONS"] {
            assert_eq!(
                persistent(key),
                ConfigError::Invalid {
                    key,
                    value: "0".to_string()
                }
            );
        }
        assert_eq!(
            config(&[("LEDGER_UNIT_TIMEOUT_MS", "0")]).unwrap_err(),
            ConfigError::Invalid {
                key: "LEDGER_UNIT_TIMEOUT_MS",
                value: "0".to_string()
            }
        );
    }
}
