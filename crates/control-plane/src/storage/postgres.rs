//! PostgreSQL storage backend.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::Storage;
use crate::config::DatabaseConfig;
use crate::error::{AppError, AppResult};

/// Type alias for the PostgreSQL connection pool.
pub type DbPool = PgPool;

/// Connect a pool per `config`.
pub async fn create_pool(config: &DatabaseConfig) -> AppResult<DbPool> {
    config.validate()?;
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout())
        .connect_with(config.connect_options()?)
        .await?;

    tracing::info!(
        target_db = %config.target(),
        max_connections = config.max_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

/// Key-value records in a single `<schema>.kv` table.
#[derive(Clone)]
pub struct PostgresStorage {
    pool: DbPool,
    table: String,
}

impl PostgresStorage {
    /// Create a storage over `pool` using `schema`.
    ///
    /// The schema name is interpolated into SQL, so only ASCII letters,
    /// digits and underscores are accepted.
    pub fn new(pool: DbPool, schema: &str) -> AppResult<Self> {
        if schema.is_empty()
            || !schema
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(AppError::Config(format!("invalid schema name: {:?}", schema)));
        }
        Ok(Self {
            pool,
            table: format!("{}.kv", schema),
        })
    }

    /// Qualified table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the schema and table if they do not exist.
    pub async fn ensure_schema(&self) -> AppResult<()> {
        let schema = self.table.trim_end_matches(".kv");
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
            .execute(&self.pool)
            .await?;
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                prefix     TEXT NOT NULL,
                key        TEXT NOT NULL,
                value      BYTEA NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (prefix, key)
            )
            "#,
            self.table
        ))
        .execute(&self.pool)
        .await?;

        tracing::info!(table = %self.table, "Storage schema ready");
        Ok(())
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn get(&self, prefix: &str, key: &str) -> AppResult<Vec<u8>> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as(&format!(
            "SELECT value FROM {} WHERE prefix = $1 AND key = $2",
            self.table
        ))
        .bind(prefix)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(value,)| value)
            .ok_or_else(|| AppError::NotFound(format!("{}{}", prefix, key)))
    }

    async fn get_all(&self, prefix: &str) -> AppResult<Vec<Vec<u8>>> {
        let rows: Vec<(Vec<u8>,)> = sqlx::query_as(&format!(
            "SELECT value FROM {} WHERE prefix = $1 ORDER BY key",
            self.table
        ))
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(value,)| value).collect())
    }

    async fn put(&self, prefix: &str, key: &str, value: &[u8]) -> AppResult<()> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {} (prefix, key, value)
            VALUES ($1, $2, $3)
            ON CONFLICT (prefix, key) DO UPDATE SET
                value = EXCLUDED.value,
                updated_at = NOW()
            "#,
            self.table
        ))
        .bind(prefix)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, prefix: &str, key: &str) -> AppResult<()> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE prefix = $1 AND key = $2",
            self.table
        ))
        .bind(prefix)
        .bind(key)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("{}{}", prefix, key)));
        }
        Ok(())
    }
}
