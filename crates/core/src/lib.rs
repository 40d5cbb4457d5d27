//! Job State Machine Core
//!
//! The lifecycle engine for a distributed job queue: enqueue, assignment,
//! heartbeating, completion, failure/retry, and dependency resolution, all
//! driven atomically against a pluggable [`Store`](port::Store).
//!
//! Backends implement [`Store`]/[`StoreTransaction`]; [`JobStateMachine`] is
//! the only thing callers need to drive jobs through their lifecycle.

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use application::{CompleteOptions, DependsCommand, JobStateMachine};
pub use domain::{Failure, HistoryEntry, Job, JobId, JobPayload, JobState, QueueId, WorkerId};
pub use error::{EngineError, Result};
pub use port::{keys, ConfigLookup, RawHash, Store, StoreTransaction};
