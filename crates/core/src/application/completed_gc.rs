// Completed-GC - bounds the retained completed-job set by count and age,
// cleaning tag indices on eviction.

use crate::application::job_store;
use crate::error::Result;
use crate::port::{keys, StoreTransaction};

/// Evict completed jobs older than `jobs_history_secs`, then evict the
/// oldest excess beyond `jobs_history_count`. Age eviction runs first so a
/// store with a huge backlog doesn't have its age-eligible jobs survive
/// just because the count bound hasn't kicked in yet.
pub async fn sweep(
    tx: &mut dyn StoreTransaction,
    now: i64,
    jobs_history_secs: i64,
    jobs_history_count: i64,
) -> Result<Vec<String>> {
    let mut evicted = Vec::new();

    let age_cutoff = (now - jobs_history_secs) as f64 - 1.0;
    let aged_out = tx.zrange_by_score_max(&keys::completed(), age_cutoff).await?;
    for jid in aged_out {
        evict_one(tx, &jid).await?;
        evicted.push(jid);
    }

    let remaining = tx.zcard(&keys::completed()).await?;
    if remaining > jobs_history_count {
        let overflow = remaining - jobs_history_count;
        let oldest = tx.zrange_lowest(&keys::completed(), overflow).await?;
        for jid in oldest {
            evict_one(tx, &jid).await?;
            evicted.push(jid);
        }
    }

    if !evicted.is_empty() {
        tracing::info!(count = evicted.len(), "completed-gc sweep evicted jobs");
    }

    Ok(evicted)
}

async fn evict_one(tx: &mut dyn StoreTransaction, jid: &str) -> Result<()> {
    tx.zrem(&keys::completed(), jid).await?;

    if let Some(job) = job_store::load(tx, jid).await? {
        for tag in &job.tags {
            tx.zrem(&keys::tag(tag), jid).await?;
            tx.zincrby(&keys::tags(), tag, -1.0).await?;
        }
    }

    job_store::delete(tx, jid).await
}
