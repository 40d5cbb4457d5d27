// Config Lookup Port - read-through config with per-queue override and a
// global default, e.g. `<queue>-heartbeat` else `heartbeat`.

use crate::error::Result;
use async_trait::async_trait;

/// Default values for the config keys the engine reads. Used only when the
/// backing store has no row for the key at all.
pub const DEFAULT_JOBS_HISTORY_SECS: i64 = 604_800;
pub const DEFAULT_JOBS_HISTORY_COUNT: i64 = 50_000;
pub const DEFAULT_HEARTBEAT_SECS: i64 = 60;

/// Read-through integer config lookup, backed by the same store the job
/// state machine runs against (so every engine instance sees the same
/// overrides without a redeploy).
#[async_trait]
pub trait ConfigLookup: Send + Sync {
    async fn get_int(&self, key: &str) -> Result<Option<i64>>;
}

/// Resolve `<queue>-<suffix>` if set, else `<suffix>`, else `default`.
///
/// This is the exact resolution order `heartbeat` uses, generalised for
/// `heartbeat` and generalises cleanly to `jobs-history`/`jobs-history-count`,
/// which have no per-queue override in practice but are looked up the same
/// way for consistency.
pub async fn queue_or_global(
    lookup: &dyn ConfigLookup,
    queue: &str,
    suffix: &str,
    default: i64,
) -> Result<i64> {
    let scoped = format!("{queue}-{suffix}");
    if let Some(v) = lookup.get_int(&scoped).await? {
        return Ok(v);
    }
    if let Some(v) = lookup.get_int(suffix).await? {
        return Ok(v);
    }
    Ok(default)
}
