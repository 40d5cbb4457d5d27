// End-to-end lifecycle scenarios driven entirely through `JobStateMachine`.

mod common;

use common::{load_job, seed_running_job, seed_waiting_job, setup};
use serde_json::json;
use taskmesh_core::domain::DomainError;
use taskmesh_core::{CompleteOptions, DependsCommand, EngineError, JobState, JobStateMachine, Store, StoreTransaction};

#[tokio::test]
async fn simple_completion_clears_ownership_and_records_completed() {
    let (store, config) = setup().await;
    let machine = JobStateMachine::new(store.clone(), config);

    seed_running_job(&store, "j1", "Widget", "default", "w1", 0, 3, 1000).await;

    let state = machine
        .complete(
            "j1",
            1005,
            "w1",
            "default",
            json!({"result": "ok"}),
            CompleteOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(state, JobState::Complete);

    let job = load_job(&store, &"j1".to_string()).await.unwrap();
    assert_eq!(job.state, JobState::Complete);
    assert!(job.worker.is_empty());
    assert!(job.queue.is_empty());
    assert!(job.expires.is_none());
    assert_eq!(job.remaining, job.retries);
    assert_eq!(job.data.as_value(), &json!({"result": "ok"}));
}

#[tokio::test]
async fn advance_with_delay_schedules_into_next_queue() {
    let (store, config) = setup().await;
    let machine = JobStateMachine::new(store.clone(), config);

    seed_running_job(&store, "j1", "Widget", "stage1", "w1", 0, 3, 1000).await;

    let options = CompleteOptions {
        next: Some("stage2".to_string()),
        delay: 30,
        depends: Vec::new(),
    };
    let state = machine
        .complete("j1", 1000, "w1", "stage1", json!({}), options)
        .await
        .unwrap();

    assert_eq!(state, JobState::Scheduled);
    let job = load_job(&store, &"j1".to_string()).await.unwrap();
    assert_eq!(job.queue, "stage2");
    assert_eq!(job.state, JobState::Scheduled);

    let mut tx = store.begin().await.unwrap();
    let score = tx
        .zscore(&taskmesh_core::keys::scheduled("stage2"), "j1")
        .await
        .unwrap();
    tx.rollback().await.unwrap();
    assert_eq!(score, Some(1030.0));
}

#[tokio::test]
async fn advance_with_pending_dependency_lands_in_depends_then_releases() {
    let (store, config) = setup().await;
    let machine = JobStateMachine::new(store.clone(), config);

    seed_running_job(&store, "dep1", "Widget", "stage2", "w2", 0, 3, 900).await;
    seed_running_job(&store, "j1", "Widget", "stage1", "w1", 0, 3, 1000).await;

    let options = CompleteOptions {
        next: Some("stage2".to_string()),
        delay: 0,
        depends: vec!["dep1".to_string()],
    };
    let state = machine
        .complete("j1", 1000, "w1", "stage1", json!({}), options)
        .await
        .unwrap();

    assert_eq!(state, JobState::Depends);
    let job = load_job(&store, &"j1".to_string()).await.unwrap();
    assert_eq!(job.state, JobState::Depends);
    assert!(job.dependencies.contains("dep1"));

    // completing the dependency (terminal, no `next`) cascades j1 into work
    machine
        .complete(
            "dep1",
            1010,
            "w2",
            "stage2",
            json!({}),
            CompleteOptions::default(),
        )
        .await
        .unwrap();

    let job = load_job(&store, &"j1".to_string()).await.unwrap();
    assert_eq!(job.state, JobState::Waiting);
    assert!(job.dependencies.is_empty());

    let mut tx = store.begin().await.unwrap();
    let score = tx
        .zscore(&taskmesh_core::keys::work("stage2"), "j1")
        .await
        .unwrap();
    tx.rollback().await.unwrap();
    assert!(score.is_some());
}

#[tokio::test]
async fn fail_moves_running_job_to_failed_with_failure_record() {
    let (store, config) = setup().await;
    let machine = JobStateMachine::new(store.clone(), config);

    seed_running_job(&store, "j1", "Widget", "default", "w1", 0, 3, 1000).await;

    let jid = machine
        .fail("j1", 1005, "w1", "bad-input", "boom", None)
        .await
        .unwrap();
    assert_eq!(jid, "j1");

    let job = load_job(&store, &"j1".to_string()).await.unwrap();
    assert_eq!(job.state, JobState::Failed);
    let failure = job.failure.unwrap();
    assert_eq!(failure.group, "bad-input");
    assert_eq!(failure.message, "boom");
    assert_eq!(failure.worker, "w1");
}

#[tokio::test]
async fn retry_exhaustion_fails_the_job_after_remaining_drops_below_zero() {
    let (store, config) = setup().await;
    let machine = JobStateMachine::new(store.clone(), config);

    seed_running_job(&store, "j1", "Widget", "default", "w1", 0, 0, 1000).await;

    // retries == 0 means remaining starts at 0; one retry call exhausts it.
    let remaining = machine.retry("j1", 1005, "default", "w1", 0).await.unwrap();
    assert_eq!(remaining, -1);

    let job = load_job(&store, &"j1".to_string()).await.unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert!(job.failure.unwrap().group.starts_with("failed-retries-"));
}

#[tokio::test]
async fn retry_with_remaining_attempts_requeues_into_work() {
    let (store, config) = setup().await;
    let machine = JobStateMachine::new(store.clone(), config);

    seed_running_job(&store, "j1", "Widget", "default", "w1", 0, 3, 1000).await;

    let remaining = machine.retry("j1", 1005, "default", "w1", 0).await.unwrap();
    assert_eq!(remaining, 2);

    let job = load_job(&store, &"j1".to_string()).await.unwrap();
    assert_eq!(job.state, JobState::Waiting);
    assert!(job.worker.is_empty());
}

#[tokio::test]
async fn heartbeat_on_lost_lock_is_rejected() {
    let (store, config) = setup().await;
    let machine = JobStateMachine::new(store.clone(), config);

    seed_running_job(&store, "j1", "Widget", "default", "w1", 0, 3, 1000).await;

    let err = machine
        .heartbeat("j1", 1005, "someone-else", None)
        .await
        .unwrap_err();
    match err {
        EngineError::Domain(DomainError::OwnershipLost { caller, .. }) => {
            assert_eq!(caller, "someone-else");
        }
        other => panic!("expected ownership-lost error, got {other:?}"),
    }

    // the rightful owner can still heartbeat
    let expires = machine.heartbeat("j1", 1005, "w1", None).await.unwrap();
    assert_eq!(expires, 1005 + 60);
}

#[tokio::test]
async fn depends_command_rejects_unknown_verb() {
    let err = DependsCommand::parse("sideways", vec!["x".into()]).unwrap_err();
    assert!(err.to_string().contains("unknown depends command"));
}
