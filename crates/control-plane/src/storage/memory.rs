//! In-memory storage backend.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::Storage;
use crate::error::{AppError, AppResult};

/// Ordered in-memory map keyed by `(prefix, key)`. Used by default and in
/// tests.
///
/// `get_all` matches the prefix exactly, like the Postgres backend: records
/// under `/tasks/sub/` are not part of `/tasks/`.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: RwLock<BTreeMap<(String, String), Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn record_key(prefix: &str, key: &str) -> (String, String) {
    (prefix.to_string(), key.to_string())
}

fn not_found(prefix: &str, key: &str) -> AppError {
    AppError::NotFound(format!("{}{}", prefix, key))
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, prefix: &str, key: &str) -> AppResult<Vec<u8>> {
        self.records
            .read()
            .await
            .get(&record_key(prefix, key))
            .cloned()
            .ok_or_else(|| not_found(prefix, key))
    }

    async fn get_all(&self, prefix: &str) -> AppResult<Vec<Vec<u8>>> {
        let records = self.records.read().await;
        Ok(records
            .range(record_key(prefix, "")..)
            .take_while(|((p, _), _)| p == prefix)
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn put(&self, prefix: &str, key: &str, value: &[u8]) -> AppResult<()> {
        self.records
            .write()
            .await
            .insert(record_key(prefix, key), value.to_vec());
        Ok(())
    }

    async fn delete(&self, prefix: &str, key: &str) -> AppResult<()> {
        self.records
            .write()
            .await
            .remove(&record_key(prefix, key))
            .map(|_| ())
            .ok_or_else(|| not_found(prefix, key))
    }
}
