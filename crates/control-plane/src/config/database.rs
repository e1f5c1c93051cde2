//! PostgreSQL settings for the `postgres` storage backend.

use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Connection and pool settings, read from `POSTGRES_*` variables.
///
/// `POSTGRES_URL` wins over the individual host/port/user/password/database
/// fields when set. `POSTGRES_SCHEMA` names the schema of the `kv` table.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_name")]
    pub user: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_name")]
    pub database: String,

    #[serde(default = "default_name")]
    pub schema: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_name() -> String {
    "kubefleet".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_acquire_timeout() -> u64 {
    30
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("POSTGRES_").from_env::<DatabaseConfig>()
    }

    /// Reject pool settings sqlx would only trip over at connect time.
    pub fn validate(&self) -> AppResult<()> {
        if self.max_connections == 0 {
            return Err(AppError::Config(
                "POSTGRES_MAX_CONNECTIONS must be at least 1".to_string(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(AppError::Config(format!(
                "POSTGRES_MIN_CONNECTIONS ({}) exceeds POSTGRES_MAX_CONNECTIONS ({})",
                self.min_connections, self.max_connections
            )));
        }
        Ok(())
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout)
    }

    pub fn connect_options(&self) -> AppResult<PgConnectOptions> {
        match &self.url {
            Some(url) => PgConnectOptions::from_str(url)
                .map_err(|e| AppError::Config(format!("invalid POSTGRES_URL: {}", e))),
            None => Ok(PgConnectOptions::new()
                .host(&self.host)
                .port(self.port)
                .username(&self.user)
                .password(&self.password)
                .database(&self.database)),
        }
    }

    /// Where the pool connects, without credentials. Safe to log.
    pub fn target(&self) -> String {
        match &self.url {
            Some(url) => match url.rsplit_once('@') {
                Some((_, host_part)) => host_part.to_string(),
                None => url.clone(),
            },
            None => format!("{}:{}/{}", self.host, self.port, self.database),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: default_host(),
            port: default_port(),
            user: default_name(),
            password: String::new(),
            database: default_name(),
            schema: default_name(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout: default_acquire_timeout(),
        }
    }
}
