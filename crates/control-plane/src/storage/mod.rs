//! Durable key-value storage.
//!
//! Records are opaque bytes addressed by a namespace prefix and a key. The
//! layers above decide how to (de)serialize them; there are no secondary
//! indexes, so "all records matching X" is a prefix scan plus a filter.

mod memory;
mod postgres;

use async_trait::async_trait;

use crate::error::AppResult;

pub use memory::MemoryStorage;
pub use postgres::{create_pool, DbPool, PostgresStorage};

/// Byte-oriented storage keyed by namespace prefix and identifier.
///
/// Every write is a single put of one record; there are no multi-record
/// transactions.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Get one record. `AppError::NotFound` if absent.
    async fn get(&self, prefix: &str, key: &str) -> AppResult<Vec<u8>>;

    /// Get every record stored under exactly `prefix`, ordered by key.
    ///
    /// Longer prefixes that start with `prefix` are separate namespaces.
    async fn get_all(&self, prefix: &str) -> AppResult<Vec<Vec<u8>>>;

    /// Insert or overwrite one record.
    async fn put(&self, prefix: &str, key: &str, value: &[u8]) -> AppResult<()>;

    /// Delete one record. `AppError::NotFound` if absent.
    async fn delete(&self, prefix: &str, key: &str) -> AppResult<()>;
}
