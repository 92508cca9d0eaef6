use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use switchyard_core::error::Result;
use switchyard_core::traits::CheckpointStore;
use switchyard_core::types::{ConversationState, Message, SessionId};

use crate::graph::{ExecutionResult, GraphExecutor};
use crate::worker::WorkerRegistry;

/// Entry point for conversation turns.
///
/// Loads the session's state, appends the user message, runs the graph and
/// returns the persisted result. Turns on the same session are serialized.
pub struct SessionRunner {
    executor: GraphExecutor,
    locks: Mutex<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl SessionRunner {
    pub fn new(executor: GraphExecutor) -> Self {
        Self {
            executor,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        self.executor.store()
    }

    pub fn registry(&self) -> &WorkerRegistry {
        self.executor.registry()
    }

    /// Run one turn and return the final state.
    pub async fn run_turn(
        &self,
        session_id: &SessionId,
        user_message: &str,
    ) -> Result<ConversationState> {
        Ok(self.run_turn_detailed(session_id, user_message).await?.state)
    }

    /// Run one turn and return the full execution report.
    pub async fn run_turn_detailed(
        &self,
        session_id: &SessionId,
        user_message: &str,
    ) -> Result<ExecutionResult> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(session_id.clone()).or_default().clone()
        };

        let result = {
            let _guard = lock.lock().await;
            self.run_locked(session_id, user_message).await
        };

        // Drop the entry once no other turn on this session holds or awaits it
        let mut locks = self.locks.lock().await;
        if Arc::strong_count(&lock) == 2 {
            locks.remove(session_id);
        }

        result
    }

    async fn run_locked(
        &self,
        session_id: &SessionId,
        user_message: &str,
    ) -> Result<ExecutionResult> {
        let mut state = self.store().load(session_id).await?;
        debug!(
            session_id = %session_id,
            prior_messages = state.len(),
            turn = state.turn(),
            "Session state loaded"
        );

        state.push(Message::user(user_message));
        self.executor.execute(state).await
    }

    /// Stored transcript for a session; empty if unknown.
    pub async fn history(&self, session_id: &SessionId) -> Result<ConversationState> {
        self.store().load(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use switchyard_core::config::{GraphConfig, RouterConfig};
    use switchyard_core::error::SwitchyardError;
    use switchyard_core::types::Role;
    use switchyard_memory::InMemoryCheckpointStore;
    use switchyard_test_utils::{
        test_model, worker_messages, CountingWorker, FailingStore, ScriptedLlm,
    };

    use crate::router::Router;
    use crate::worker::WorkerAdapter;

    fn runner(llm: ScriptedLlm, worker: CountingWorker) -> SessionRunner {
        let mut registry = WorkerRegistry::new();
        registry.register(WorkerAdapter::new(worker)).unwrap();
        SessionRunner::new(GraphExecutor::new(
            Router::new(Arc::new(llm), test_model(), RouterConfig::default()),
            registry,
            GraphConfig::default(),
            Arc::new(InMemoryCheckpointStore::new()),
        ))
    }

    #[tokio::test]
    async fn test_turns_accumulate_on_session() {
        let math = CountingWorker::new("math_agent", "4");
        let calls = math.counter();
        let runner = runner(
            ScriptedLlm::new(["math_agent", "FINISH", "math_agent", "FINISH"]),
            math,
        );
        let sid = SessionId::from_string("multi");

        let first = runner.run_turn(&sid, "What is 2+2?").await.unwrap();
        assert_eq!(first.turn(), 1);
        assert_eq!(first.len(), 2);

        let second = runner.run_turn(&sid, "And 3+1?").await.unwrap();
        assert_eq!(second.turn(), 2);
        assert_eq!(second.messages()[..2], first.messages()[..]);
        assert_eq!(worker_messages(&second).len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let stored = runner.history(&sid).await.unwrap();
        assert_eq!(stored, second);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let runner = runner(ScriptedLlm::always("FINISH"), CountingWorker::new("math_agent", "4"));

        runner.run_turn(&SessionId::from_string("a"), "hi").await.unwrap();
        let b = runner.run_turn(&SessionId::from_string("b"), "hello").await.unwrap();

        assert_eq!(b.messages()[0].content, "hello");
        assert_eq!(b.messages()[0].role, Role::User);
        assert_eq!(runner.store().list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_load_failure_reaches_caller() {
        let math = CountingWorker::new("math_agent", "4");
        let calls = math.counter();
        let mut registry = WorkerRegistry::new();
        registry.register(WorkerAdapter::new(math)).unwrap();
        let runner = SessionRunner::new(GraphExecutor::new(
            Router::new(
                Arc::new(ScriptedLlm::always("math_agent")),
                test_model(),
                RouterConfig::default(),
            ),
            registry,
            GraphConfig::default(),
            Arc::new(FailingStore::on_load()),
        ));

        let err = runner
            .run_turn(&SessionId::from_string("broken"), "2+2")
            .await
            .unwrap_err();

        assert!(matches!(err, SwitchyardError::Checkpoint(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(runner.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_session_locks_released_after_turns() {
        let runner = runner(ScriptedLlm::always("FINISH"), CountingWorker::new("math_agent", "4"));

        for i in 0..50 {
            let sid = SessionId::from_string(&format!("s{i}"));
            runner.run_turn(&sid, "hi").await.unwrap();
            runner.store().delete(&sid).await.unwrap();
        }

        assert!(runner.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_turns_same_session_serialize() {
        let runner = Arc::new(runner(
            ScriptedLlm::always("FINISH"),
            CountingWorker::new("math_agent", "4"),
        ));
        let sid = SessionId::from_string("shared");

        let mut handles = Vec::new();
        for i in 0..4 {
            let runner = runner.clone();
            let sid = sid.clone();
            handles.push(tokio::spawn(async move {
                runner.run_turn(&sid, &format!("msg {i}")).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let state = runner.history(&sid).await.unwrap();
        assert_eq!(state.turn(), 4);
        // each turn: user message plus the finish notice
        assert_eq!(state.len(), 8);
        assert!(runner.locks.lock().await.is_empty());
    }
}
