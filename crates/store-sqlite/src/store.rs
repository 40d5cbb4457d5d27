// SQLite Store - hands out transactions and fans out committed events.

use crate::error::map_sqlx_error;
use crate::transaction::SqliteTransaction;
use async_trait::async_trait;
use sqlx::SqlitePool;
use taskmesh_core::{Result, Store, StoreTransaction};
use tokio::sync::broadcast;

/// `Store` backed by a SQLite connection pool. Event channels are
/// in-process only; publish durability across restarts is not required.
pub struct SqliteStore {
    pool: SqlitePool,
    events: broadcast::Sender<(String, serde_json::Value)>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self { pool, events }
    }

    /// Subscribe to every published `(channel, payload)` event. Callers
    /// filter by channel name themselves, same as a Redis pub/sub client
    /// subscribed with a pattern.
    pub fn subscribe(&self) -> broadcast::Receiver<(String, serde_json::Value)> {
        self.events.subscribe()
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(SqliteTransaction::new(tx, self.events.clone())))
    }
}
