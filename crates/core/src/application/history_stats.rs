// History & Stats Recorder - history-list bookkeeping, day-binned stat
// counters, and event publication.

use crate::domain::HistoryEntry;
use crate::error::Result;
use crate::port::{keys, StoreTransaction};

/// Stamp `history[last].done = now`. No-op if the
/// history is empty - that would only happen on already-corrupt data, and
/// there is nothing meaningful to stamp.
pub fn stamp_done(history: &mut [HistoryEntry], now: i64) {
    if let Some(last) = history.last_mut() {
        last.done = Some(now);
    }
}

/// Stamp `failed = now` on every history entry owned by `worker`, walking
/// from the tail so the most recent ownership span is the one marked
/// Seeds the history with a single entry if it was
/// empty.
pub fn stamp_failed_for_worker(history: &mut Vec<HistoryEntry>, worker: &str, now: i64) {
    if history.is_empty() {
        history.push(HistoryEntry {
            worker: Some(worker.to_string()),
            failed: Some(now),
            ..Default::default()
        });
        return;
    }
    for entry in history.iter_mut().rev() {
        if entry.worker.as_deref() == Some(worker) {
            entry.failed = Some(now);
        }
    }
}

/// The start-of-UTC-day bin used as a stats key suffix.
pub fn day_bin(now: i64) -> i64 {
    now - now.rem_euclid(86_400)
}

/// Run-duration histogram buckets (a conventional choice, not dictated by
/// any upstream format - see DESIGN.md open question 4). Each bucket
/// is a hash field `run:<label>` in the queue's stats hash, incremented
/// once per completion that falls in it.
const RUN_DURATION_BUCKETS: &[(i64, &str)] = &[
    (1, "lt_1s"),
    (10, "lt_10s"),
    (60, "lt_60s"),
    (600, "lt_10m"),
    (3600, "lt_1h"),
    (86_400, "lt_1d"),
];

fn run_duration_bucket(duration_secs: i64) -> &'static str {
    for (ceiling, label) in RUN_DURATION_BUCKETS {
        if duration_secs < *ceiling {
            return label;
        }
    }
    "ge_1d"
}

/// Record a completion's run duration into `s:stats:<bin>:<queue>`. The
/// field is historically labelled "waiting_duration" even though it is
/// computed from `popped` (i.e. it is really run duration) - the field
/// name is preserved verbatim for wire compatibility with existing stats
/// consumers (see DESIGN.md open question 1), only the histogram bucketing
/// itself is new.
pub async fn record_run_duration(
    tx: &mut dyn StoreTransaction,
    queue: &str,
    now: i64,
    duration_secs: i64,
) -> Result<()> {
    let key = keys::stats(day_bin(now), queue);
    tx.hincrby(&key, "run", 1).await?;
    let bucket_field = format!("run:{}", run_duration_bucket(duration_secs));
    tx.hincrby(&key, &bucket_field, 1).await?;
    Ok(())
}

/// Record a failure into `s:stats:<bin>:<queue>`.
pub async fn record_failure(tx: &mut dyn StoreTransaction, queue: &str, now: i64) -> Result<()> {
    let key = keys::stats(day_bin(now), queue);
    tx.hincrby(&key, "failures", 1).await?;
    tx.hincrby(&key, "failed", 1).await?;
    Ok(())
}

/// Publish a `log` channel event plus the matching `tracing` event. The
/// `tracing` event is emitted unconditionally - observability does not
/// depend on whether anything is subscribed to the store's pub/sub
/// channel.
pub async fn publish_log(
    tx: &mut dyn StoreTransaction,
    event: serde_json::Value,
) -> Result<()> {
    tracing::info!(event = %event, "log event");
    tx.publish("log", event).await
}

/// Publish `completed`/`failed` with just the jid, only when `jid` is a
/// member of the global `tracked` set.
pub async fn publish_if_tracked(
    tx: &mut dyn StoreTransaction,
    channel: &str,
    jid: &str,
) -> Result<()> {
    if tx.sismember(&keys::tracked(), jid).await? {
        tracing::info!(%jid, channel, "tracked event");
        tx.publish(channel, serde_json::json!(jid)).await?;
    }
    Ok(())
}
