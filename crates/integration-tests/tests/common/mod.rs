// Shared setup for the integration test binaries: an in-memory SQLite
// store, migrated, wrapped behind the `Store`/`ConfigLookup` ports.

use std::sync::Arc;
use taskmesh_core::{ConfigLookup, Job, JobId, JobState, Store, StoreTransaction};
use taskmesh_store_sqlite::{create_pool, run_migrations, SqliteConfig, SqliteStore};

pub async fn setup() -> (Arc<dyn Store>, Arc<dyn ConfigLookup>) {
    // A plain "sqlite::memory:" URL hands every pooled connection its own
    // empty database; share one in-memory database across the pool instead.
    let pool = create_pool("file::memory:?cache=shared").await.unwrap();
    run_migrations(&pool).await.unwrap();
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool.clone()));
    let config: Arc<dyn ConfigLookup> = Arc::new(SqliteConfig::new(pool));
    (store, config)
}

/// Directly seed a job via the store, bypassing the (out-of-scope) `put`
/// operation, and put it straight into its queue's `work` set.
pub async fn seed_waiting_job(
    store: &Arc<dyn Store>,
    jid: &str,
    klass: &str,
    queue: &str,
    priority: i64,
    retries: i64,
    now: i64,
) {
    let job = Job::new_waiting(
        jid,
        klass,
        queue,
        priority,
        retries,
        taskmesh_core::JobPayload::new(serde_json::json!({})),
        now,
    );
    let mut tx = store.begin().await.unwrap();
    taskmesh_core::application::job_store::save(tx.as_mut(), &job)
        .await
        .unwrap();
    tx.zadd(
        &taskmesh_core::port::keys::work(queue),
        jid,
        taskmesh_core::application::work_score(priority, now),
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();
}

/// Pop `jid` from `queue`'s work set and mark it running under `worker`,
/// standing in for the out-of-scope `pop` operation.
pub async fn seed_running_job(
    store: &Arc<dyn Store>,
    jid: &str,
    klass: &str,
    queue: &str,
    worker: &str,
    priority: i64,
    retries: i64,
    now: i64,
) {
    let mut job = Job::new_waiting(
        jid,
        klass,
        queue,
        priority,
        retries,
        taskmesh_core::JobPayload::new(serde_json::json!({})),
        now,
    );
    job.state = JobState::Running;
    job.worker = worker.to_string();
    job.expires = Some(now + 60);
    if let Some(entry) = job.history.last_mut() {
        entry.popped = Some(now);
    }
    let mut tx = store.begin().await.unwrap();
    taskmesh_core::application::job_store::save(tx.as_mut(), &job)
        .await
        .unwrap();
    tx.zadd(&taskmesh_core::port::keys::locks(queue), jid, (now + 60) as f64)
        .await
        .unwrap();
    tx.zadd(&taskmesh_core::port::keys::worker_jobs(worker), jid, (now + 60) as f64)
        .await
        .unwrap();
    tx.commit().await.unwrap();
}

pub async fn load_job(store: &Arc<dyn Store>, jid: &JobId) -> Option<Job> {
    let mut tx = store.begin().await.unwrap();
    let job = taskmesh_core::application::job_store::load(tx.as_mut(), jid)
        .await
        .unwrap();
    tx.rollback().await.unwrap();
    job
}
