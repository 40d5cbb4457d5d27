// Job Domain Model

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Opaque job identifier.
pub type JobId = String;

/// Queue identifier (empty string means "not currently in a queue").
pub type QueueId = String;

/// Opaque worker identifier (empty string means "unowned").
pub type WorkerId = String;

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Running,
    Scheduled,
    Depends,
    Complete,
    Failed,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Waiting => "waiting",
            JobState::Running => "running",
            JobState::Scheduled => "scheduled",
            JobState::Depends => "depends",
            JobState::Complete => "complete",
            JobState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(JobState::Waiting),
            "running" => Ok(JobState::Running),
            "scheduled" => Ok(JobState::Scheduled),
            "depends" => Ok(JobState::Depends),
            "complete" => Ok(JobState::Complete),
            "failed" => Ok(JobState::Failed),
            other => Err(format!("unknown job state: {other}")),
        }
    }
}

/// Opaque JSON job payload ("data" field).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobPayload(pub serde_json::Value);

impl JobPayload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn empty() -> Self {
        Self(serde_json::json!({}))
    }
}

/// One entry in a job's history list.
///
/// Modeled as a struct of optional fields rather than an enum because a
/// single entry can legitimately carry more than one of these keys at once
/// (e.g. `q` and `put` are always set together).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popped: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<i64>,
}

impl HistoryEntry {
    pub fn put(queue: impl Into<String>, when: i64) -> Self {
        Self {
            q: Some(queue.into()),
            put: Some(when),
            ..Default::default()
        }
    }
}

/// Failure record attached to a job in the `failed` state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Failure {
    pub group: String,
    pub message: String,
    pub when: i64,
    pub worker: String,
}

/// The Job entity.
///
/// `expires` and `worker` together define ownership: `state == Running`
/// iff `worker` is non-empty, `expires` is set, and the jid is present in
/// both `queue`'s `locks` set and the worker's job set. The state machine
/// is the only code allowed to break that equivalence, and only
/// transiently within a single transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub jid: JobId,
    pub klass: String,
    pub state: JobState,
    pub queue: QueueId,
    pub worker: WorkerId,
    pub priority: i64,
    /// Epoch seconds; `None` when not owned. The historical encoding used
    /// `0` or an empty string depending on code path; both are treated as
    /// "not owned" at the store boundary (see DESIGN.md open question 2).
    pub expires: Option<i64>,
    pub retries: i64,
    pub remaining: i64,
    pub data: JobPayload,
    pub tags: Vec<String>,
    pub history: Vec<HistoryEntry>,
    pub failure: Option<Failure>,
    pub dependencies: BTreeSet<JobId>,
    pub dependents: BTreeSet<JobId>,
}

impl Job {
    /// Construct a freshly-put job (state `waiting`, in `queue`, no owner).
    pub fn new_waiting(
        jid: impl Into<String>,
        klass: impl Into<String>,
        queue: impl Into<String>,
        priority: i64,
        retries: i64,
        data: JobPayload,
        now: i64,
    ) -> Self {
        let queue = queue.into();
        Self {
            jid: jid.into(),
            klass: klass.into(),
            state: JobState::Waiting,
            queue: queue.clone(),
            worker: String::new(),
            priority,
            expires: None,
            retries,
            remaining: retries,
            data,
            tags: Vec::new(),
            history: vec![HistoryEntry::put(queue, now)],
            failure: None,
            dependencies: BTreeSet::new(),
            dependents: BTreeSet::new(),
        }
    }

    pub fn is_owned(&self) -> bool {
        !self.worker.is_empty() && self.expires.is_some()
    }
}
