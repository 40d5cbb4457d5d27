// SQLite StoreTransaction Implementation
//
// The job hash (`j:<jid>`) is a real `jobs` row with typed columns; every
// other primitive (sets, sorted sets, lists, stat counters) is backed by a
// generic keyed table, mirroring the key-value shapes the port assumes.
// Published events are buffered and only fanned out on commit, so a rolled
// back transaction never leaks a `log`/`completed`/`failed` notification.

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use sqlx::{Row, Sqlite, Transaction as SqlxTransaction};
use std::collections::BTreeSet;
use taskmesh_core::port::RawHash;
use taskmesh_core::{EngineError, Result, StoreTransaction};
use tokio::sync::broadcast;

fn jid_from_key(key: &str) -> Result<&str> {
    key.strip_prefix("j:")
        .ok_or_else(|| EngineError::Store(format!("not a job hash key: {key}")))
}

#[derive(sqlx::FromRow)]
struct JobRow {
    jid: String,
    klass: String,
    state: String,
    queue: String,
    worker: String,
    priority: i64,
    expires: Option<i64>,
    retries: i64,
    remaining: i64,
    data: String,
    tags: String,
    history: String,
    failure: String,
}

impl JobRow {
    fn into_raw_hash(self) -> RawHash {
        RawHash::from([
            ("jid".to_string(), self.jid),
            ("klass".to_string(), self.klass),
            ("state".to_string(), self.state),
            ("queue".to_string(), self.queue),
            ("worker".to_string(), self.worker),
            ("priority".to_string(), self.priority.to_string()),
            (
                "expires".to_string(),
                self.expires.map(|e| e.to_string()).unwrap_or_default(),
            ),
            ("retries".to_string(), self.retries.to_string()),
            ("remaining".to_string(), self.remaining.to_string()),
            ("data".to_string(), self.data),
            ("tags".to_string(), self.tags),
            ("history".to_string(), self.history),
            ("failure".to_string(), self.failure),
        ])
    }
}

pub struct SqliteTransaction<'a> {
    tx: SqlxTransaction<'a, Sqlite>,
    events: broadcast::Sender<(String, serde_json::Value)>,
    pending_events: Vec<(String, serde_json::Value)>,
}

impl<'a> SqliteTransaction<'a> {
    pub fn new(
        tx: SqlxTransaction<'a, Sqlite>,
        events: broadcast::Sender<(String, serde_json::Value)>,
    ) -> Self {
        Self {
            tx,
            events,
            pending_events: Vec::new(),
        }
    }
}

#[async_trait]
impl StoreTransaction for SqliteTransaction<'_> {
    async fn hash_get_all(&mut self, key: &str) -> Result<Option<RawHash>> {
        let jid = jid_from_key(key)?;
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE jid = ?")
            .bind(jid)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(JobRow::into_raw_hash))
    }

    async fn hash_set_fields(&mut self, key: &str, fields: Vec<(String, String)>) -> Result<()> {
        let jid = jid_from_key(key)?;
        let map: std::collections::HashMap<String, String> = fields.into_iter().collect();
        let get = |k: &str| map.get(k).cloned().unwrap_or_default();
        let expires: Option<i64> = {
            let raw = get("expires");
            if raw.is_empty() {
                None
            } else {
                raw.parse().ok()
            }
        };

        sqlx::query(
            r#"
            INSERT INTO jobs (jid, klass, state, queue, worker, priority, expires, retries, remaining, data, tags, history, failure)
            VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?)
            ON CONFLICT(jid) DO UPDATE SET
                klass = excluded.klass, state = excluded.state, queue = excluded.queue,
                worker = excluded.worker, priority = excluded.priority, expires = excluded.expires,
                retries = excluded.retries, remaining = excluded.remaining, data = excluded.data,
                tags = excluded.tags, history = excluded.history, failure = excluded.failure
            "#,
        )
        .bind(jid)
        .bind(get("klass"))
        .bind(get("state"))
        .bind(get("queue"))
        .bind(get("worker"))
        .bind(get("priority").parse::<i64>().unwrap_or(0))
        .bind(expires)
        .bind(get("retries").parse::<i64>().unwrap_or(0))
        .bind(get("remaining").parse::<i64>().unwrap_or(0))
        .bind(get("data"))
        .bind(get("tags"))
        .bind(get("history"))
        .bind(get("failure"))
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn hash_delete(&mut self, key: &str) -> Result<()> {
        let jid = jid_from_key(key)?;
        sqlx::query("DELETE FROM jobs WHERE jid = ?")
            .bind(jid)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn sadd(&mut self, key: &str, member: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO sets (skey, member) VALUES (?, ?)")
            .bind(key)
            .bind(member)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn srem(&mut self, key: &str, member: &str) -> Result<()> {
        sqlx::query("DELETE FROM sets WHERE skey = ? AND member = ?")
            .bind(key)
            .bind(member)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn smembers(&mut self, key: &str) -> Result<BTreeSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT member FROM sets WHERE skey = ?")
            .bind(key)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(|(m,)| m).collect())
    }

    async fn sismember(&mut self, key: &str, member: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM sets WHERE skey = ? AND member = ?")
            .bind(key)
            .bind(member)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.is_some())
    }

    async fn sclear(&mut self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM sets WHERE skey = ?")
            .bind(key)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn zadd(&mut self, key: &str, member: &str, score: f64) -> Result<()> {
        sqlx::query(
            "INSERT INTO zsets (zkey, member, score) VALUES (?, ?, ?)
             ON CONFLICT(zkey, member) DO UPDATE SET score = excluded.score",
        )
        .bind(key)
        .bind(member)
        .bind(score)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn zrem(&mut self, key: &str, member: &str) -> Result<()> {
        sqlx::query("DELETE FROM zsets WHERE zkey = ? AND member = ?")
            .bind(key)
            .bind(member)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn zscore(&mut self, key: &str, member: &str) -> Result<Option<f64>> {
        let row: Option<(f64,)> =
            sqlx::query_as("SELECT score FROM zsets WHERE zkey = ? AND member = ?")
                .bind(key)
                .bind(member)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(map_sqlx_error)?;
        Ok(row.map(|(s,)| s))
    }

    async fn zcard(&mut self, key: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM zsets WHERE zkey = ?")
            .bind(key)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(count)
    }

    async fn zrange_by_score_max(&mut self, key: &str, max: f64) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT member FROM zsets WHERE zkey = ? AND score <= ? ORDER BY score ASC",
        )
        .bind(key)
        .bind(max)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(|(m,)| m).collect())
    }

    async fn zrange_lowest(&mut self, key: &str, count: i64) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT member FROM zsets WHERE zkey = ? ORDER BY score ASC LIMIT ?")
                .bind(key)
                .bind(count)
                .fetch_all(&mut *self.tx)
                .await
                .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(|(m,)| m).collect())
    }

    async fn zincrby(&mut self, key: &str, member: &str, delta: f64) -> Result<f64> {
        let current = self.zscore(key, member).await?.unwrap_or(0.0);
        let new_score = current + delta;
        self.zadd(key, member, new_score).await?;
        Ok(new_score)
    }

    async fn lpush(&mut self, key: &str, member: &str) -> Result<()> {
        let row = sqlx::query("SELECT COALESCE(MAX(seq), 0) + 1 FROM lists WHERE lkey = ?")
            .bind(key)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        let next_seq: i64 = row.get(0);

        sqlx::query("INSERT INTO lists (lkey, member, seq) VALUES (?, ?, ?)")
            .bind(key)
            .bind(member)
            .bind(next_seq)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn config_get(&mut self, key: &str) -> Result<Option<i64>> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT value FROM config WHERE key = ?")
            .bind(key)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(|(v,)| v))
    }

    async fn hincrby(&mut self, key: &str, field: &str, delta: i64) -> Result<i64> {
        let current: Option<(i64,)> =
            sqlx::query_as("SELECT value FROM stat_hashes WHERE hkey = ? AND field = ?")
                .bind(key)
                .bind(field)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(map_sqlx_error)?;
        let new_value = current.map(|(v,)| v).unwrap_or(0) + delta;

        sqlx::query(
            "INSERT INTO stat_hashes (hkey, field, value) VALUES (?, ?, ?)
             ON CONFLICT(hkey, field) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(field)
        .bind(new_value)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(new_value)
    }

    async fn publish(&mut self, channel: &str, payload: serde_json::Value) -> Result<()> {
        self.pending_events.push((channel.to_string(), payload));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.tx.commit().await.map_err(map_sqlx_error)?;
        for event in this.pending_events {
            // No receivers is not an error - publication is best-effort,
            // matching a pub/sub channel with zero subscribers.
            let _ = this.events.send(event);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.tx.rollback().await.map_err(map_sqlx_error)?;
        Ok(())
    }
}
