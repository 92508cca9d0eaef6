use std::sync::Arc;

use switchyard_agent::{GraphExecutor, Router, SessionRunner, WorkerAdapter, WorkerRegistry};
use switchyard_core::config::{AppConfig, GraphConfig, RouterConfig};
use switchyard_core::traits::{CheckpointStore, LlmClient};
use switchyard_core::types::{NextNode, Role, SessionId};
use switchyard_memory::SqliteCheckpointStore;
use switchyard_test_utils::{test_model, worker_messages, ScriptedLlm};
use switchyard_workers::MathWorker;

fn runner_on(store: Arc<dyn CheckpointStore>, router_llm: ScriptedLlm) -> SessionRunner {
    let mut registry = WorkerRegistry::new();
    registry
        .register(WorkerAdapter::new(MathWorker::new("math_agent", "Arithmetic")))
        .unwrap();
    let llm: Arc<dyn LlmClient> = Arc::new(router_llm);
    SessionRunner::new(GraphExecutor::new(
        Router::new(llm, test_model(), RouterConfig::default()),
        registry,
        GraphConfig::default(),
        store,
    ))
}

#[tokio::test]
async fn test_session_resumes_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("checkpoints.db");
    let sid = SessionId::from_string("resume");

    {
        let store = Arc::new(SqliteCheckpointStore::open(&db).unwrap());
        let runner = runner_on(store, ScriptedLlm::new(["math_agent", "FINISH"]));
        runner.run_turn(&sid, "What is 2+2?").await.unwrap();
    }

    // A new process sees the same transcript and continues it
    let store = Arc::new(SqliteCheckpointStore::open(&db).unwrap());
    let runner = runner_on(store, ScriptedLlm::new(["math_agent", "FINISH"]));

    let restored = runner.history(&sid).await.unwrap();
    assert_eq!(restored.turn(), 1);
    assert_eq!(restored.next(), Some(&NextNode::Finish));

    let state = runner.run_turn(&sid, "And 5 * 5?").await.unwrap();
    assert_eq!(state.turn(), 2);
    assert_eq!(&state.messages()[..restored.len()], restored.messages());

    let answers: Vec<&str> = worker_messages(&state)
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(answers, vec!["2+2 = 4", "5 * 5 = 25"]);
}

#[tokio::test]
async fn test_unknown_session_loads_empty_every_time() {
    let store = Arc::new(SqliteCheckpointStore::in_memory().unwrap());
    let sid = SessionId::from_string("never-seen");

    let first = store.load(&sid).await.unwrap();
    let second = store.load(&sid).await.unwrap();

    assert!(first.is_empty());
    assert_eq!(first.turn(), 0);
    assert_eq!(first, second);
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_payload_survives_persistence() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("payload.db");
    let sid = SessionId::from_string("payload");

    {
        let store = Arc::new(SqliteCheckpointStore::open(&db).unwrap());
        let runner = runner_on(store, ScriptedLlm::new(["math_agent", "FINISH"]));
        runner.run_turn(&sid, "What is 7 - 10?").await.unwrap();
    }

    let store = SqliteCheckpointStore::open(&db).unwrap();
    let state = store.load(&sid).await.unwrap();
    let answer = state
        .messages()
        .iter()
        .find(|m| m.role == Role::Worker)
        .unwrap();
    let payload = answer.payload.as_ref().unwrap();
    assert_eq!(payload["expression"], "7 - 10");
    assert_eq!(payload["result"], serde_json::json!(-3.0));
}

#[tokio::test]
async fn test_store_from_config_persists_to_workspace() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::parse(&format!(
        "workspace = \"{}\"\n[model]\nmodel_id = \"m\"\n[checkpoint]\nbackend = \"sqlite\"\n",
        dir.path().display()
    ))
    .unwrap();

    let store = switchyard_memory::open_store(&config).unwrap();
    let runner = runner_on(store, ScriptedLlm::always("FINISH"));
    runner
        .run_turn(&SessionId::from_string("ws"), "hello")
        .await
        .unwrap();

    assert!(dir.path().join("checkpoints.db").exists());

    let reopened = switchyard_memory::open_store(&config).unwrap();
    let ids = reopened.list().await.unwrap();
    assert_eq!(ids, vec![SessionId::from_string("ws")]);
    assert!(reopened.delete(&ids[0]).await.unwrap());
    assert!(reopened.list().await.unwrap().is_empty());
}
