// Store Facade - typed Job get/set on top of the raw hash/set primitives.
//
// Every other application module reaches the job hash only through
// `load`/`save`/`delete` here, never by poking `StoreTransaction::hash_*`
// directly, so the `expires` empty-string-vs-0 ambiguity (DESIGN.md open
// question 2) is handled in exactly one place.

use crate::domain::{Failure, HistoryEntry, Job, JobPayload, JobState};
use crate::error::{EngineError, Result};
use crate::port::{keys, StoreTransaction};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Load a job by id, or `None` if no job hash exists.
pub async fn load(tx: &mut dyn StoreTransaction, jid: &str) -> Result<Option<Job>> {
    let Some(hash) = tx.hash_get_all(&keys::job(jid)).await? else {
        return Ok(None);
    };
    let dependencies = tx.smembers(&keys::dependencies(jid)).await?;
    let dependents = tx.smembers(&keys::dependents(jid)).await?;
    Ok(Some(decode(jid, &hash, dependencies, dependents)?))
}

/// Persist every scalar/JSON field of `job` to its hash. Dependency sets
/// are maintained separately by the dependency graph module, since they
/// are mutated incrementally (edge by edge) rather than overwritten wholesale.
pub async fn save(tx: &mut dyn StoreTransaction, job: &Job) -> Result<()> {
    tx.hash_set_fields(&keys::job(&job.jid), encode(job)?).await
}

pub async fn delete(tx: &mut dyn StoreTransaction, jid: &str) -> Result<()> {
    tx.hash_delete(&keys::job(jid)).await?;
    tx.sclear(&keys::dependencies(jid)).await?;
    tx.sclear(&keys::dependents(jid)).await
}

fn encode(job: &Job) -> Result<Vec<(String, String)>> {
    Ok(vec![
        ("jid".into(), job.jid.clone()),
        ("klass".into(), job.klass.clone()),
        ("state".into(), job.state.to_string()),
        ("queue".into(), job.queue.clone()),
        ("worker".into(), job.worker.clone()),
        ("priority".into(), job.priority.to_string()),
        (
            "expires".into(),
            job.expires.map(|e| e.to_string()).unwrap_or_default(),
        ),
        ("retries".into(), job.retries.to_string()),
        ("remaining".into(), job.remaining.to_string()),
        ("data".into(), job.data.as_value().to_string()),
        ("tags".into(), serde_json::to_string(&job.tags)?),
        ("history".into(), serde_json::to_string(&job.history)?),
        (
            "failure".into(),
            match &job.failure {
                Some(f) => serde_json::to_string(f)?,
                None => "{}".to_string(),
            },
        ),
    ])
}

fn decode(
    jid: &str,
    hash: &std::collections::HashMap<String, String>,
    dependencies: BTreeSet<String>,
    dependents: BTreeSet<String>,
) -> Result<Job> {
    let field = |name: &str| hash.get(name).cloned().unwrap_or_default();

    let state = JobState::from_str(&field("state"))
        .map_err(EngineError::Store)?;

    // Open question 2: accept either the historical empty-string sentinel
    // or a literal "0" as "not owned"; anything else parses as epoch secs.
    let expires_raw = field("expires");
    let expires = if expires_raw.is_empty() || expires_raw == "0" {
        None
    } else {
        Some(expires_raw.parse::<i64>().map_err(|e| {
            EngineError::Store(format!("invalid expires field for {jid}: {e}"))
        })?)
    };

    let tags: Vec<String> = {
        let raw = field("tags");
        if raw.is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&raw)?
        }
    };

    let history: Vec<HistoryEntry> = {
        let raw = field("history");
        if raw.is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&raw)?
        }
    };

    let failure: Option<Failure> = {
        let raw = field("failure");
        if raw.is_empty() || raw == "{}" {
            None
        } else {
            Some(serde_json::from_str(&raw)?)
        }
    };

    let data_raw = field("data");
    let data = if data_raw.is_empty() {
        JobPayload::empty()
    } else {
        JobPayload::new(serde_json::from_str(&data_raw)?)
    };

    Ok(Job {
        jid: jid.to_string(),
        klass: field("klass"),
        state,
        queue: field("queue"),
        worker: field("worker"),
        priority: field("priority").parse().unwrap_or(0),
        expires,
        retries: field("retries").parse().unwrap_or(0),
        remaining: field("remaining").parse().unwrap_or(0),
        data,
        tags,
        history,
        failure,
        dependencies,
        dependents,
    })
}
