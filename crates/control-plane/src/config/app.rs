//! Application configuration for the KubeFleet Control Plane.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Durable store used for cluster, account and task records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

/// Application configuration loaded from environment variables.
///
/// Environment variables are prefixed with `KUBEFLEET_`:
/// - `KUBEFLEET_HOST`: Server bind address (default: "0.0.0.0")
/// - `KUBEFLEET_PORT`: Server port (default: 8080)
/// - `KUBEFLEET_STORAGE`: `memory` or `postgres` (default: memory)
/// - `KUBEFLEET_LOG_DIR`: Directory for per-task logs
/// - `KUBEFLEET_CATALOG_FILE`: YAML file with extra steps and workflows
/// - `KUBEFLEET_PROVISION_TIMEOUT_SECS`: Deadline for node provisioning tasks
/// - `KUBEFLEET_REACTION_*`: Retry policy for completion reactions
/// - `KUBEFLEET_SHUTDOWN_GRACE_SECS`: How long cancelled runs get to finish on shutdown
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Server name for identification
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Storage backend
    #[serde(default)]
    pub storage: StorageBackend,

    /// Directory holding `<task id>.log` files
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Optional workflow catalog file
    #[serde(default)]
    pub catalog_file: Option<PathBuf>,

    /// Deadline applied to node provisioning tasks, in seconds
    #[serde(default = "default_provision_timeout")]
    pub provision_timeout_secs: u64,

    /// Maximum retries for a failing completion reaction
    #[serde(default = "default_reaction_max_retries")]
    pub reaction_max_retries: u32,

    /// First retry delay for completion reactions, in milliseconds
    #[serde(default = "default_reaction_initial_delay")]
    pub reaction_initial_delay_ms: u64,

    /// Retry delay ceiling for completion reactions, in milliseconds
    #[serde(default = "default_reaction_max_delay")]
    pub reaction_max_delay_ms: u64,

    /// Wait for cancelled task runs on shutdown, in seconds
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_server_name() -> String {
    "kubefleet-control-plane".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/kubefleet/tasks")
}

fn default_provision_timeout() -> u64 {
    600
}

fn default_reaction_max_retries() -> u32 {
    3
}

fn default_reaction_initial_delay() -> u64 {
    500
}

fn default_reaction_max_delay() -> u64 {
    10000
}

fn default_shutdown_grace() -> u64 {
    15
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables are prefixed with `KUBEFLEET_`.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("KUBEFLEET_").from_env::<AppConfig>()
    }

    /// Get the server bind address as a string suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Deadline for node provisioning tasks.
    pub fn provision_timeout(&self) -> Duration {
        Duration::from_secs(self.provision_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            server_name: default_server_name(),
            storage: StorageBackend::default(),
            log_dir: default_log_dir(),
            catalog_file: None,
            provision_timeout_secs: default_provision_timeout(),
            reaction_max_retries: default_reaction_max_retries(),
            reaction_initial_delay_ms: default_reaction_initial_delay(),
            reaction_max_delay_ms: default_reaction_max_delay(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.provision_timeout(), Duration::from_secs(600));
        assert_eq!(config.shutdown_grace(), Duration::from_secs(15));
    }

    #[test]
    fn test_bind_address() {
        let config = AppConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_from_iter() {
        let vars = vec![
            ("KUBEFLEET_PORT".to_string(), "9090".to_string()),
            ("KUBEFLEET_STORAGE".to_string(), "postgres".to_string()),
            ("KUBEFLEET_CATALOG_FILE".to_string(), "/etc/kubefleet/catalog.yaml".to_string()),
        ];
        let config: AppConfig = envy::prefixed("KUBEFLEET_").from_iter(vars).unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.storage, StorageBackend::Postgres);
        assert_eq!(
            config.catalog_file,
            Some(PathBuf::from("/etc/kubefleet/catalog.yaml"))
        );
        assert_eq!(config.reaction_max_retries, 3);
    }
}
