// Job State Machine - the eight operations a caller drives a job through:
// `data`, `complete`, `fail`, `retry`, `depends`, `heartbeat`, `priority`,
// `update`. Every operation is one atomic transaction against the store;
// precondition failures leave the store untouched.

use std::collections::HashMap;
use std::sync::Arc;

use crate::application::depends_command::DependsCommand;
use crate::application::history_stats;
use crate::application::job_store;
use crate::application::options::CompleteOptions;
use crate::application::queue_handle::QueueHandle;
use crate::domain::{DomainError, Failure, HistoryEntry, Job, JobId, JobPayload, JobState};
use crate::error::{EngineError, Result};
use crate::port::config::{
    queue_or_global, ConfigLookup, DEFAULT_HEARTBEAT_SECS, DEFAULT_JOBS_HISTORY_COUNT,
    DEFAULT_JOBS_HISTORY_SECS,
};
use crate::port::{keys, Store, StoreTransaction};

pub struct JobStateMachine {
    store: Arc<dyn Store>,
    config: Arc<dyn ConfigLookup>,
}

fn holder_of(job: &Job) -> Option<String> {
    if job.worker.is_empty() {
        None
    } else {
        Some(job.worker.clone())
    }
}

fn state_violation(jid: &str, expected: &str, actual: &JobState) -> EngineError {
    DomainError::StateViolation {
        jid: jid.to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
    .into()
}

fn missing_job(jid: &str, expected: &str) -> EngineError {
    DomainError::StateViolation {
        jid: jid.to_string(),
        expected: expected.to_string(),
        actual: "no such job".to_string(),
    }
    .into()
}

impl JobStateMachine {
    pub fn new(store: Arc<dyn Store>, config: Arc<dyn ConfigLookup>) -> Self {
        Self { store, config }
    }

    /// Read the job record, or a projection onto `keys`. The record
    /// includes a `tracked` flag reflecting membership in the global
    /// tracked-jobs set, alongside the job hash's own fields.
    pub async fn data(
        &self,
        jid: &str,
        keys_filter: Option<&[String]>,
    ) -> Result<Option<serde_json::Value>> {
        let mut tx = self.store.begin().await?;
        let job = job_store::load(tx.as_mut(), jid).await?;
        let tracked = tx.sismember(&keys::tracked(), jid).await?;
        tx.rollback().await?;

        let Some(job) = job else {
            return Ok(None);
        };
        let mut full = serde_json::to_value(&job)?;
        if let Some(obj) = full.as_object_mut() {
            obj.insert("tracked".to_string(), serde_json::Value::Bool(tracked));
        }
        match keys_filter {
            None => Ok(Some(full)),
            Some(ks) => {
                let projected: Vec<serde_json::Value> = ks
                    .iter()
                    .map(|k| full.get(k).cloned().unwrap_or(serde_json::Value::Null))
                    .collect();
                Ok(Some(serde_json::Value::Array(projected)))
            }
        }
    }

    /// Advance or terminate a running job.
    pub async fn complete(
        &self,
        jid: &str,
        now: i64,
        worker: &str,
        queue: &str,
        data: serde_json::Value,
        options: CompleteOptions,
    ) -> Result<JobState> {
        if worker.is_empty() {
            return Err(DomainError::ArgumentMissing("worker".into()).into());
        }
        if queue.is_empty() {
            return Err(DomainError::ArgumentMissing("queue".into()).into());
        }
        if !data.is_object() {
            return Err(DomainError::ArgumentType {
                name: "data".into(),
                reason: "must be a JSON object".into(),
            }
            .into());
        }
        options.validate()?;

        let mut tx = self.store.begin().await?;
        match self.complete_inner(tx.as_mut(), jid, now, worker, queue, data, options).await {
            Ok(result) => {
                tx.commit().await?;
                Ok(result)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    async fn complete_inner(
        &self,
        tx: &mut dyn StoreTransaction,
        jid: &str,
        now: i64,
        worker: &str,
        queue: &str,
        data: serde_json::Value,
        options: CompleteOptions,
    ) -> Result<JobState> {
        let mut job = job_store::load(tx, jid)
            .await?
            .ok_or_else(|| missing_job(jid, "running"))?;

        if job.worker != worker {
            return Err(DomainError::OwnershipLost {
                jid: jid.to_string(),
                caller: worker.to_string(),
                holder: holder_of(&job),
            }
            .into());
        }
        if job.state != JobState::Running {
            return Err(state_violation(jid, "running", &job.state));
        }

        // stamp history[last].done
        history_stats::stamp_done(&mut job.history, now);
        // overwrite data
        job.data = JobPayload::new(data);

        // remove from queue's work/locks/scheduled
        let from_handle = QueueHandle::new(queue);
        from_handle.remove_work(tx, jid).await?;
        from_handle.remove_locks(tx, jid).await?;
        from_handle.remove_scheduled(tx, jid).await?;

        // record run stat (labelled "waiting" for wire compatibility -
        // see DESIGN.md open question 1)
        let popped = job.history.last().and_then(|h| h.popped).unwrap_or(now);
        history_stats::record_run_duration(tx, queue, now, now - popped).await?;

        // remove from worker:jobs
        tx.zrem(&keys::worker_jobs(worker), jid).await?;

        // publish completed if tracked
        history_stats::publish_if_tracked(tx, "completed", jid).await?;

        let result_state = if let Some(next) = &options.next {
            // advance event
            history_stats::publish_log(
                tx,
                serde_json::json!({
                    "jid": jid, "event": "advanced", "queue": queue, "to": next
                }),
            )
            .await?;
            // history entry
            job.history.push(HistoryEntry::put(next.clone(), now));
            // register queue
            QueueHandle::new(next).register(tx, now).await?;
            // reset ownership fields
            job.state = JobState::Waiting;
            job.worker = String::new();
            job.failure = None;
            job.queue = next.clone();
            job.expires = None;
            job.remaining = job.retries;

            let next_handle = QueueHandle::new(next);
            if options.delay > 0 {
                next_handle.add_scheduled(tx, jid, now + options.delay).await?;
                job.state = JobState::Scheduled;
            } else {
                let mut added_any = false;
                for dep_jid in &options.depends {
                    if let Some(dep) = job_store::load(tx, dep_jid).await? {
                        if dep.state != JobState::Complete {
                            crate::application::dependency_graph::add_edge(tx, dep_jid, jid)
                                .await?;
                            added_any = true;
                        }
                    }
                }
                if added_any {
                    next_handle.add_depends(tx, jid, now).await?;
                    job.state = JobState::Depends;
                } else {
                    next_handle.add_work(tx, jid, job.priority, now).await?;
                    job.state = JobState::Waiting;
                }
            }
            job.state
        } else {
            // completed event
            history_stats::publish_log(
                tx,
                serde_json::json!({ "jid": jid, "event": "completed", "queue": queue }),
            )
            .await?;
            job.state = JobState::Complete;
            job.worker = String::new();
            job.queue = String::new();
            job.expires = None;
            job.failure = None;
            job.remaining = job.retries;

            job_store::save(tx, &job).await?;

            tx.zadd(&keys::completed(), jid, now as f64).await?;

            // Completed-GC sweep
            let jobs_history_secs =
                self.config.get_int("jobs-history").await?.unwrap_or(DEFAULT_JOBS_HISTORY_SECS);
            let jobs_history_count = self
                .config
                .get_int("jobs-history-count")
                .await?
                .unwrap_or(DEFAULT_JOBS_HISTORY_COUNT);
            crate::application::completed_gc::sweep(tx, now, jobs_history_secs, jobs_history_count)
                .await?;

            // dependency cascade, deletes self.dependents
            crate::application::dependency_graph::cascade_release(tx, jid, now).await?;

            return Ok(JobState::Complete);
        };

        job_store::save(tx, &job).await?;
        Ok(result_state)
    }

    /// Move a running job to `failed`.
    pub async fn fail(
        &self,
        jid: &str,
        now: i64,
        worker: &str,
        group: &str,
        message: &str,
        data: Option<serde_json::Value>,
    ) -> Result<JobId> {
        if worker.is_empty() {
            return Err(DomainError::ArgumentMissing("worker".into()).into());
        }
        if group.is_empty() {
            return Err(DomainError::ArgumentMissing("group".into()).into());
        }
        if message.is_empty() {
            return Err(DomainError::ArgumentMissing("message".into()).into());
        }

        let mut tx = self.store.begin().await?;
        match self.fail_inner(tx.as_mut(), jid, now, worker, group, message, data).await {
            Ok(v) => {
                tx.commit().await?;
                Ok(v)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    async fn fail_inner(
        &self,
        tx: &mut dyn StoreTransaction,
        jid: &str,
        now: i64,
        worker: &str,
        group: &str,
        message: &str,
        data: Option<serde_json::Value>,
    ) -> Result<JobId> {
        let mut job = job_store::load(tx, jid)
            .await?
            .ok_or_else(|| missing_job(jid, "running"))?;
        if job.state != JobState::Running {
            return Err(state_violation(jid, "running", &job.state));
        }

        // publish log + tracked failed event
        history_stats::publish_log(
            tx,
            serde_json::json!({
                "jid": jid, "event": "failed", "worker": worker,
                "group": group, "message": message
            }),
        )
        .await?;
        history_stats::publish_if_tracked(tx, "failed", jid).await?;

        // remove from worker:jobs
        tx.zrem(&keys::worker_jobs(worker), jid).await?;

        // stamp history
        history_stats::stamp_failed_for_worker(&mut job.history, worker, now);

        // stats
        history_stats::record_failure(tx, &job.queue, now).await?;

        // remove from queue's work/locks/scheduled
        let handle = QueueHandle::new(&job.queue);
        handle.remove_work(tx, jid).await?;
        handle.remove_locks(tx, jid).await?;
        handle.remove_scheduled(tx, jid).await?;

        // optional data overwrite
        if let Some(d) = data {
            job.data = JobPayload::new(d);
        }

        job.state = JobState::Failed;
        job.worker = String::new();
        job.expires = None;
        job.failure = Some(Failure {
            group: group.to_string(),
            message: message.to_string(),
            when: now,
            worker: worker.to_string(),
        });
        job_store::save(tx, &job).await?;

        tx.sadd(&keys::failures(), group).await?;
        tx.lpush(&keys::failure_group(group), jid).await?;

        Ok(jid.to_string())
    }

    /// Release a running job back to its queue, or exhaust its retries.
    pub async fn retry(
        &self,
        jid: &str,
        now: i64,
        queue: &str,
        worker: &str,
        delay: i64,
    ) -> Result<i64> {
        if queue.is_empty() {
            return Err(DomainError::ArgumentMissing("queue".into()).into());
        }
        if worker.is_empty() {
            return Err(DomainError::ArgumentMissing("worker".into()).into());
        }

        let mut tx = self.store.begin().await?;
        match self.retry_inner(tx.as_mut(), jid, now, queue, worker, delay).await {
            Ok(v) => {
                tx.commit().await?;
                Ok(v)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    async fn retry_inner(
        &self,
        tx: &mut dyn StoreTransaction,
        jid: &str,
        now: i64,
        queue: &str,
        worker: &str,
        delay: i64,
    ) -> Result<i64> {
        let mut job = job_store::load(tx, jid)
            .await?
            .ok_or_else(|| missing_job(jid, "running"))?;

        if job.worker != worker {
            return Err(DomainError::OwnershipLost {
                jid: jid.to_string(),
                caller: worker.to_string(),
                holder: holder_of(&job),
            }
            .into());
        }
        if job.state != JobState::Running {
            return Err(state_violation(jid, "running", &job.state));
        }

        let handle = QueueHandle::new(queue);

        // remove from old queue's locks
        handle.remove_locks(tx, jid).await?;

        // decrement remaining
        let r = job.remaining - 1;

        // remove from worker:jobs
        tx.zrem(&keys::worker_jobs(worker), jid).await?;

        job.worker = String::new();
        job.expires = None;

        if r < 0 {
            // exhausted
            let group = format!("failed-retries-{queue}");
            history_stats::stamp_failed_for_worker(&mut job.history, worker, now);
            job.state = JobState::Failed;
            job.failure = Some(Failure {
                group: group.clone(),
                message: format!("Job exhausted retries in queue \"{queue}\""),
                when: now,
                worker: worker.to_string(),
            });
            tx.sadd(&keys::failures(), &group).await?;
            tx.lpush(&keys::failure_group(&group), jid).await?;
        } else if delay > 0 {
            handle.add_scheduled(tx, jid, now + delay).await?;
            job.state = JobState::Scheduled;
        } else {
            handle.add_work(tx, jid, job.priority, now).await?;
            job.state = JobState::Waiting;
        }

        job.remaining = r;
        job_store::save(tx, &job).await?;

        Ok(r)
    }

    /// Add or release dependency edges on a job waiting in `depends`.
    pub async fn depends(
        &self,
        jid: &str,
        now: i64,
        command: DependsCommand,
    ) -> Result<bool> {
        let mut tx = self.store.begin().await?;
        match self.depends_inner(tx.as_mut(), jid, now, command).await {
            Ok(v) => {
                tx.commit().await?;
                Ok(v)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    async fn depends_inner(
        &self,
        tx: &mut dyn StoreTransaction,
        jid: &str,
        now: i64,
        command: DependsCommand,
    ) -> Result<bool> {
        let Some(mut job) = job_store::load(tx, jid).await? else {
            return Ok(false);
        };
        if job.state != JobState::Depends {
            return Ok(false);
        }

        match command {
            DependsCommand::On(deps) => {
                for dep_jid in deps {
                    if let Some(dep) = job_store::load(tx, &dep_jid).await? {
                        if dep.state != JobState::Complete {
                            crate::application::dependency_graph::add_edge(tx, &dep_jid, jid)
                                .await?;
                        }
                    }
                }
                Ok(true)
            }
            DependsCommand::OffAll => {
                let deps = job.dependencies.clone();
                for dep_jid in deps {
                    crate::application::dependency_graph::remove_edge(tx, &dep_jid, jid).await?;
                }
                self.move_to_work_if_released(tx, &mut job, now).await?;
                Ok(true)
            }
            DependsCommand::Off(deps) => {
                for dep_jid in deps {
                    crate::application::dependency_graph::remove_edge(tx, &dep_jid, jid).await?;
                }
                self.move_to_work_if_released(tx, &mut job, now).await?;
                Ok(true)
            }
        }
    }

    async fn move_to_work_if_released(
        &self,
        tx: &mut dyn StoreTransaction,
        job: &mut Job,
        now: i64,
    ) -> Result<()> {
        let remaining = tx.smembers(&keys::dependencies(&job.jid)).await?;
        if !remaining.is_empty() || job.queue.is_empty() {
            return Ok(());
        }
        let handle = QueueHandle::new(&job.queue);
        handle.remove_depends(tx, &job.jid).await?;
        handle.add_work(tx, &job.jid, job.priority, now).await?;
        job.state = JobState::Waiting;
        job_store::save(tx, job).await
    }

    /// Extend a running job's lock.
    pub async fn heartbeat(
        &self,
        jid: &str,
        now: i64,
        worker: &str,
        data: Option<serde_json::Value>,
    ) -> Result<i64> {
        let mut tx = self.store.begin().await?;
        match self.heartbeat_inner(tx.as_mut(), jid, now, worker, data).await {
            Ok(v) => {
                tx.commit().await?;
                Ok(v)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    async fn heartbeat_inner(
        &self,
        tx: &mut dyn StoreTransaction,
        jid: &str,
        now: i64,
        worker: &str,
        data: Option<serde_json::Value>,
    ) -> Result<i64> {
        let mut job = job_store::load(tx, jid).await?.ok_or_else(|| {
            DomainError::OwnershipLost {
                jid: jid.to_string(),
                caller: worker.to_string(),
                holder: None,
            }
        })?;

        if job.worker.is_empty() || job.worker != worker {
            return Err(DomainError::OwnershipLost {
                jid: jid.to_string(),
                caller: worker.to_string(),
                holder: holder_of(&job),
            }
            .into());
        }

        let heartbeat_secs =
            queue_or_global(self.config.as_ref(), &job.queue, "heartbeat", DEFAULT_HEARTBEAT_SECS)
                .await?;
        let expires = now + heartbeat_secs;

        job.expires = Some(expires);
        job.worker = worker.to_string();
        if let Some(d) = data {
            job.data = JobPayload::new(d);
        }
        job_store::save(tx, &job).await?;

        tx.zadd(&keys::worker_jobs(worker), jid, expires as f64).await?;
        QueueHandle::new(&job.queue).add_locks(tx, jid, expires).await?;

        Ok(expires)
    }

    /// Change a job's priority, re-scoring it in its queue's `work` set.
    pub async fn priority(&self, jid: &str, priority: i64) -> Result<bool> {
        let mut tx = self.store.begin().await?;
        match self.priority_inner(tx.as_mut(), jid, priority).await {
            Ok(v) => {
                tx.commit().await?;
                Ok(v)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    async fn priority_inner(
        &self,
        tx: &mut dyn StoreTransaction,
        jid: &str,
        priority: i64,
    ) -> Result<bool> {
        let Some(mut job) = job_store::load(tx, jid).await? else {
            return Ok(false);
        };
        let old_priority = job.priority;
        job.priority = priority;

        if job.queue.is_empty() {
            job_store::save(tx, &job).await?;
            return Ok(true);
        }

        let work_key = keys::work(&job.queue);
        if let Some(old_score) = tx.zscore(&work_key, jid).await? {
            use crate::application::queue_handle::PRIORITY_SCALE;
            let enqueue_component = old_score + (old_priority as f64) * PRIORITY_SCALE;
            let new_score = enqueue_component - (priority as f64) * PRIORITY_SCALE;
            tx.zadd(&work_key, jid, new_score).await?;
        }

        job_store::save(tx, &job).await?;
        Ok(true)
    }

    /// Bulk admin overwrite of recognised scalar fields, no ownership or
    /// state validation. A missing job is a silent no-op: there is no job
    /// to administer.
    pub async fn update(&self, jid: &str, fields: HashMap<String, serde_json::Value>) -> Result<()> {
        let mut tx = self.store.begin().await?;
        match self.update_inner(tx.as_mut(), jid, fields).await {
            Ok(()) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    async fn update_inner(
        &self,
        tx: &mut dyn StoreTransaction,
        jid: &str,
        fields: HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        let Some(mut job) = job_store::load(tx, jid).await? else {
            return Ok(());
        };

        if let Some(v) = fields.get("klass").and_then(|v| v.as_str()) {
            job.klass = v.to_string();
        }
        if let Some(v) = fields.get("queue").and_then(|v| v.as_str()) {
            job.queue = v.to_string();
        }
        if let Some(v) = fields.get("worker").and_then(|v| v.as_str()) {
            job.worker = v.to_string();
        }
        if let Some(v) = fields.get("priority").and_then(|v| v.as_i64()) {
            job.priority = v;
        }
        if let Some(v) = fields.get("expires") {
            job.expires = v.as_i64();
        }
        if let Some(v) = fields.get("retries").and_then(|v| v.as_i64()) {
            job.retries = v;
        }
        if let Some(v) = fields.get("remaining").and_then(|v| v.as_i64()) {
            job.remaining = v;
        }
        if let Some(v) = fields.get("data") {
            job.data = JobPayload::new(v.clone());
        }
        if let Some(v) = fields.get("tags").and_then(|v| v.as_array()) {
            job.tags = v
                .iter()
                .filter_map(|t| t.as_str().map(str::to_string))
                .collect();
        }

        job_store::save(tx, &job).await
    }
}
