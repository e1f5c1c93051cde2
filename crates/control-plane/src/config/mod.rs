//! Server configuration, read from the environment with `envy`.
//!
//! `KUBEFLEET_*` variables feed [`AppConfig`]; `POSTGRES_*` variables feed
//! [`DatabaseConfig`] and are only read when the postgres backend is chosen.

mod app;
mod database;

pub use app::{AppConfig, StorageBackend};
pub use database::DatabaseConfig;
