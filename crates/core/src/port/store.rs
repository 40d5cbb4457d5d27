// Store Facade Port - typed accessors over the key-value/hash/sorted-set/
// set/pub-sub primitives the job state machine is built on.
//
// A real deployment backs this with a shared key-value store (the sqlite
// adapter in `taskmesh-store-sqlite` is one such backing); the trait only
// assumes the four primitive shapes the job state machine needs plus a
// transaction boundary, so another backend (or an in-memory test double)
// can drop in without touching the state machine.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Canonical store key patterns. Centralised so every adapter
/// produces byte-identical keys, which is what makes the on-disk layout
/// interoperable across adapters and across versions of this crate.
pub mod keys {
    pub fn job(jid: &str) -> String {
        format!("j:{jid}")
    }
    pub fn dependencies(jid: &str) -> String {
        format!("j:{jid}-dependencies")
    }
    pub fn dependents(jid: &str) -> String {
        format!("j:{jid}-dependents")
    }
    pub fn worker_jobs(worker: &str) -> String {
        format!("w:{worker}:jobs")
    }
    pub fn tracked() -> String {
        "tracked".to_string()
    }
    pub fn queues() -> String {
        "queues".to_string()
    }
    pub fn completed() -> String {
        "completed".to_string()
    }
    pub fn failures() -> String {
        "failures".to_string()
    }
    pub fn failure_group(group: &str) -> String {
        format!("f:{group}")
    }
    pub fn tag(tag: &str) -> String {
        format!("t:{tag}")
    }
    pub fn tags() -> String {
        "tags".to_string()
    }
    pub fn stats(bin: i64, queue: &str) -> String {
        format!("s:stats:{bin}:{queue}")
    }
    pub fn work(queue: &str) -> String {
        format!("ql:{queue}:work")
    }
    pub fn locks(queue: &str) -> String {
        format!("ql:{queue}:locks")
    }
    pub fn scheduled(queue: &str) -> String {
        format!("ql:{queue}:scheduled")
    }
    pub fn depends(queue: &str) -> String {
        format!("ql:{queue}:depends")
    }
}

/// A raw (field, value) job hash as stored by the backend; values are the
/// string encoding the job record field mapper knows how to decode. Kept
/// generic (not `Job`) so the store port has no dependency on the domain
/// module's exact field list.
pub type RawHash = std::collections::HashMap<String, String>;

/// One atomic unit of work against the store. Every job state machine
/// operation opens exactly one transaction, performs its reads and writes,
/// and either commits or rolls back - there is no `.await` point inside an
/// operation that observes another transaction's partial state.
#[async_trait]
pub trait StoreTransaction: Send {
    // -- hash --
    async fn hash_get_all(&mut self, key: &str) -> Result<Option<RawHash>>;
    async fn hash_set_fields(&mut self, key: &str, fields: Vec<(String, String)>) -> Result<()>;
    async fn hash_delete(&mut self, key: &str) -> Result<()>;

    // -- sets --
    async fn sadd(&mut self, key: &str, member: &str) -> Result<()>;
    async fn srem(&mut self, key: &str, member: &str) -> Result<()>;
    async fn smembers(&mut self, key: &str) -> Result<BTreeSet<String>>;
    async fn sismember(&mut self, key: &str, member: &str) -> Result<bool>;
    /// Remove every member of the set at `key`, leaving it empty.
    async fn sclear(&mut self, key: &str) -> Result<()>;

    // -- sorted sets --
    async fn zadd(&mut self, key: &str, member: &str, score: f64) -> Result<()>;
    async fn zrem(&mut self, key: &str, member: &str) -> Result<()>;
    async fn zscore(&mut self, key: &str, member: &str) -> Result<Option<f64>>;
    async fn zcard(&mut self, key: &str) -> Result<i64>;
    /// Members with score <= `max`, ascending by score.
    async fn zrange_by_score_max(&mut self, key: &str, max: f64) -> Result<Vec<String>>;
    /// The `count` lowest-scoring members, ascending by score.
    async fn zrange_lowest(&mut self, key: &str, count: i64) -> Result<Vec<String>>;
    async fn zincrby(&mut self, key: &str, member: &str, delta: f64) -> Result<f64>;

    // -- lists (newest-first) --
    async fn lpush(&mut self, key: &str, member: &str) -> Result<()>;

    // -- config --
    async fn config_get(&mut self, key: &str) -> Result<Option<i64>>;

    // -- stats hash counters --
    async fn hincrby(&mut self, key: &str, field: &str, delta: i64) -> Result<i64>;

    // -- pub/sub --
    async fn publish(&mut self, channel: &str, payload: serde_json::Value) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// The store itself: only capable of handing out transactions.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>>;
}
