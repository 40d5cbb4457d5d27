// Dependency Graph - forward/reverse edges between jids, and the release
// cascade that flips a dependent to `waiting` once its last dependency
// clears.

use crate::application::job_store;
use crate::application::queue_handle::QueueHandle;
use crate::domain::JobState;
use crate::error::Result;
use crate::port::{keys, StoreTransaction};

/// Record that `dependent` waits on `dependency`. Both sides are written
/// in the same transaction so invariant P4/P5 (`k in j.dependents` iff
/// `j in k.dependencies`) never observes a half-written edge.
pub async fn add_edge(
    tx: &mut dyn StoreTransaction,
    dependency: &str,
    dependent: &str,
) -> Result<()> {
    tx.sadd(&keys::dependents(dependency), dependent).await?;
    tx.sadd(&keys::dependencies(dependent), dependency).await
}

/// Remove the edge in both directions.
pub async fn remove_edge(
    tx: &mut dyn StoreTransaction,
    dependency: &str,
    dependent: &str,
) -> Result<()> {
    tx.srem(&keys::dependents(dependency), dependent).await?;
    tx.srem(&keys::dependencies(dependent), dependency).await
}

/// Release every dependent of `self_jid`: clear the edge, and for any
/// dependent whose dependency set just became empty, move it from its
/// queue's `depends` set to `work` and flip it to `waiting`. Called from
/// `complete` (no `next`) and from `depends off` (shared here so both
/// call sites can never drift apart).
pub async fn cascade_release(
    tx: &mut dyn StoreTransaction,
    self_jid: &str,
    now: i64,
) -> Result<()> {
    let dependents = tx.smembers(&keys::dependents(self_jid)).await?;

    for dependent_jid in dependents {
        remove_edge(tx, self_jid, &dependent_jid).await?;

        let remaining = tx.smembers(&keys::dependencies(&dependent_jid)).await?;
        if !remaining.is_empty() {
            continue;
        }

        let Some(mut dependent) = job_store::load(tx, &dependent_jid).await? else {
            continue;
        };
        if dependent.queue.is_empty() {
            continue;
        }

        let queue = dependent.queue.clone();
        let handle = QueueHandle::new(&queue);
        handle.remove_depends(tx, &dependent_jid).await?;
        handle.add_work(tx, &dependent_jid, dependent.priority, now).await?;
        dependent.state = JobState::Waiting;
        job_store::save(tx, &dependent).await?;
    }

    tx.sclear(&keys::dependents(self_jid)).await
}
