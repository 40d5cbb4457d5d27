// Queue Handle - the four ordered-set views per queue (work, locks,
// scheduled, depends) plus the per-queue stats sink.

use crate::error::Result;
use crate::port::{keys, StoreTransaction};

/// `work` is ordered by `(-priority, enqueue_time)`. The store's sorted
/// set only carries one score dimension, so the two components are packed
/// into a single `f64`: priority dominates the high-order digits, the
/// enqueue time fills the low-order ones. `PRIORITY_SCALE` comfortably
/// exceeds any realistic epoch-seconds value, so the two never bleed into
/// each other.
pub const PRIORITY_SCALE: f64 = 1.0e13;

pub fn work_score(priority: i64, now: i64) -> f64 {
    (-priority as f64) * PRIORITY_SCALE + now as f64
}

/// A handle onto one queue's four ordered-set views.
pub struct QueueHandle<'a> {
    queue: &'a str,
}

impl<'a> QueueHandle<'a> {
    pub fn new(queue: &'a str) -> Self {
        Self { queue }
    }

    pub async fn add_work(
        &self,
        tx: &mut dyn StoreTransaction,
        jid: &str,
        priority: i64,
        now: i64,
    ) -> Result<()> {
        tx.zadd(&keys::work(self.queue), jid, work_score(priority, now))
            .await
    }

    pub async fn remove_work(&self, tx: &mut dyn StoreTransaction, jid: &str) -> Result<()> {
        tx.zrem(&keys::work(self.queue), jid).await
    }

    pub async fn add_locks(
        &self,
        tx: &mut dyn StoreTransaction,
        jid: &str,
        expires: i64,
    ) -> Result<()> {
        tx.zadd(&keys::locks(self.queue), jid, expires as f64).await
    }

    pub async fn remove_locks(&self, tx: &mut dyn StoreTransaction, jid: &str) -> Result<()> {
        tx.zrem(&keys::locks(self.queue), jid).await
    }

    pub async fn add_scheduled(
        &self,
        tx: &mut dyn StoreTransaction,
        jid: &str,
        fire_at: i64,
    ) -> Result<()> {
        tx.zadd(&keys::scheduled(self.queue), jid, fire_at as f64)
            .await
    }

    pub async fn remove_scheduled(&self, tx: &mut dyn StoreTransaction, jid: &str) -> Result<()> {
        tx.zrem(&keys::scheduled(self.queue), jid).await
    }

    pub async fn add_depends(
        &self,
        tx: &mut dyn StoreTransaction,
        jid: &str,
        now: i64,
    ) -> Result<()> {
        tx.zadd(&keys::depends(self.queue), jid, now as f64).await
    }

    pub async fn remove_depends(&self, tx: &mut dyn StoreTransaction, jid: &str) -> Result<()> {
        tx.zrem(&keys::depends(self.queue), jid).await
    }

    /// Strip `jid` from whichever of the four ordered sets currently holds
    /// it (invariant P1: a jid is in at most one at a time, but callers
    /// that don't track which one just want it gone from all of them).
    pub async fn remove_from_all(&self, tx: &mut dyn StoreTransaction, jid: &str) -> Result<()> {
        self.remove_work(tx, jid).await?;
        self.remove_locks(tx, jid).await?;
        self.remove_scheduled(tx, jid).await?;
        self.remove_depends(tx, jid).await
    }

    /// Ensure this queue is present in the global known-queues index.
    pub async fn register(&self, tx: &mut dyn StoreTransaction, now: i64) -> Result<()> {
        if tx.zscore(&keys::queues(), self.queue).await?.is_none() {
            tx.zadd(&keys::queues(), self.queue, now as f64).await?;
        }
        Ok(())
    }
}
