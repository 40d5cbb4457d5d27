// Application Layer - the job state machine and the modules it is built
// from, each owning one slice of the store's key space.

pub mod completed_gc;
pub mod dependency_graph;
pub mod depends_command;
pub mod history_stats;
pub mod job_store;
pub mod options;
pub mod queue_handle;
pub mod state_machine;

pub use depends_command::DependsCommand;
pub use options::CompleteOptions;
pub use queue_handle::{work_score, QueueHandle, PRIORITY_SCALE};
pub use state_machine::JobStateMachine;
