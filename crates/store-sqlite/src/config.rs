// SQLite-backed ConfigLookup - reads the `config` table.

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use sqlx::SqlitePool;
use taskmesh_core::{ConfigLookup, Result};

pub struct SqliteConfig {
    pool: SqlitePool,
}

impl SqliteConfig {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConfigLookup for SqliteConfig {
    async fn get_int(&self, key: &str) -> Result<Option<i64>> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT value FROM config WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(|(v,)| v))
    }
}
