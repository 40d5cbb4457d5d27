// Dependency graph edges, symmetric add/remove, and the release cascade.

mod common;

use common::{load_job, seed_running_job, seed_waiting_job, setup};
use serde_json::json;
use taskmesh_core::{CompleteOptions, DependsCommand, JobState, JobStateMachine, Store, StoreTransaction};

/// Put `jid` straight into `depends` state with no edges, the shape
/// `depends on`/`depends off` expect to find it in.
async fn seed_depends_job(store: &std::sync::Arc<dyn Store>, jid: &str, queue: &str, now: i64) {
    seed_waiting_job(store, jid, "Widget", queue, 0, 3, now).await;
    let mut tx = store.begin().await.unwrap();
    let mut job = taskmesh_core::application::job_store::load(tx.as_mut(), jid)
        .await
        .unwrap()
        .unwrap();
    job.state = JobState::Depends;
    taskmesh_core::application::job_store::save(tx.as_mut(), &job)
        .await
        .unwrap();
    tx.zrem(&taskmesh_core::keys::work(queue), jid).await.unwrap();
    tx.zadd(&taskmesh_core::keys::depends(queue), jid, now as f64)
        .await
        .unwrap();
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn depends_on_records_symmetric_edges() {
    let (store, config) = setup().await;
    let machine = JobStateMachine::new(store.clone(), config);

    seed_depends_job(&store, "j1", "default", 1000).await;
    seed_waiting_job(&store, "dep1", "Widget", "default", 0, 3, 1000).await;

    let applied = machine
        .depends("j1", 1000, DependsCommand::On(vec!["dep1".to_string()]))
        .await
        .unwrap();
    assert!(applied);

    let j1 = load_job(&store, &"j1".to_string()).await.unwrap();
    assert!(j1.dependencies.contains("dep1"));
    let dep1 = load_job(&store, &"dep1".to_string()).await.unwrap();
    assert!(dep1.dependents.contains("j1"));
}

#[tokio::test]
async fn depends_on_an_already_complete_job_adds_no_edge() {
    let (store, config) = setup().await;
    let machine = JobStateMachine::new(store.clone(), config);

    seed_depends_job(&store, "j1", "default", 1000).await;
    seed_running_job(&store, "dep1", "Widget", "default", "w1", 0, 3, 1000).await;
    machine
        .complete("dep1", 1001, "w1", "default", json!({}), CompleteOptions::default())
        .await
        .unwrap();

    machine
        .depends("j1", 1002, DependsCommand::On(vec!["dep1".to_string()]))
        .await
        .unwrap();

    let j1 = load_job(&store, &"j1".to_string()).await.unwrap();
    assert!(j1.dependencies.is_empty());
}

#[tokio::test]
async fn depends_off_all_releases_into_work_when_last_edge_clears() {
    let (store, config) = setup().await;
    let machine = JobStateMachine::new(store.clone(), config);

    seed_depends_job(&store, "j1", "default", 1000).await;
    seed_waiting_job(&store, "dep1", "Widget", "default", 0, 3, 1000).await;
    seed_waiting_job(&store, "dep2", "Widget", "default", 0, 3, 1000).await;

    machine
        .depends(
            "j1",
            1000,
            DependsCommand::On(vec!["dep1".to_string(), "dep2".to_string()]),
        )
        .await
        .unwrap();

    machine.depends("j1", 1001, DependsCommand::OffAll).await.unwrap();

    let j1 = load_job(&store, &"j1".to_string()).await.unwrap();
    assert_eq!(j1.state, JobState::Waiting);
    assert!(j1.dependencies.is_empty());

    let dep1 = load_job(&store, &"dep1".to_string()).await.unwrap();
    assert!(!dep1.dependents.contains("j1"));
}

#[tokio::test]
async fn depends_off_one_of_several_keeps_job_in_depends() {
    let (store, config) = setup().await;
    let machine = JobStateMachine::new(store.clone(), config);

    seed_depends_job(&store, "j1", "default", 1000).await;
    seed_waiting_job(&store, "dep1", "Widget", "default", 0, 3, 1000).await;
    seed_waiting_job(&store, "dep2", "Widget", "default", 0, 3, 1000).await;

    machine
        .depends(
            "j1",
            1000,
            DependsCommand::On(vec!["dep1".to_string(), "dep2".to_string()]),
        )
        .await
        .unwrap();

    machine
        .depends("j1", 1001, DependsCommand::Off(vec!["dep1".to_string()]))
        .await
        .unwrap();

    let j1 = load_job(&store, &"j1".to_string()).await.unwrap();
    assert_eq!(j1.state, JobState::Depends);
    assert!(!j1.dependencies.contains("dep1"));
    assert!(j1.dependencies.contains("dep2"));
}

#[tokio::test]
async fn completion_cascades_release_to_waiting_dependents() {
    let (store, config) = setup().await;
    let machine = JobStateMachine::new(store.clone(), config);

    seed_depends_job(&store, "j1", "default", 1000).await;
    seed_running_job(&store, "dep1", "Widget", "default", "w1", 0, 3, 1000).await;

    machine
        .depends("j1", 1000, DependsCommand::On(vec!["dep1".to_string()]))
        .await
        .unwrap();

    machine
        .complete("dep1", 1005, "w1", "default", json!({}), CompleteOptions::default())
        .await
        .unwrap();

    let j1 = load_job(&store, &"j1".to_string()).await.unwrap();
    assert_eq!(j1.state, JobState::Waiting);
    assert!(j1.dependencies.is_empty());

    let mut tx = store.begin().await.unwrap();
    let on_work = tx.zscore(&taskmesh_core::keys::work("default"), "j1").await.unwrap();
    let dependents_left = tx
        .smembers(&taskmesh_core::keys::dependents("dep1"))
        .await
        .unwrap();
    tx.rollback().await.unwrap();
    assert!(on_work.is_some());
    assert!(dependents_left.is_empty());
}

#[tokio::test]
async fn depends_on_a_missing_job_is_a_no_op() {
    let (store, config) = setup().await;
    let machine = JobStateMachine::new(store.clone(), config);

    let applied = machine
        .depends("ghost", 1000, DependsCommand::On(vec!["dep1".to_string()]))
        .await
        .unwrap();
    assert!(!applied);
}
