use std::collections::HashMap;

use futures::future::BoxFuture;
use tokio::sync::RwLock;

use switchyard_core::error::Result;
use switchyard_core::traits::CheckpointStore;
use switchyard_core::types::{ConversationState, SessionId};

/// Process-local checkpoint store. Contents are lost on exit.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    states: RwLock<HashMap<SessionId, ConversationState>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn load<'a>(&'a self, session_id: &'a SessionId) -> BoxFuture<'a, Result<ConversationState>> {
        Box::pin(async move {
            let states = self.states.read().await;
            Ok(states
                .get(session_id)
                .cloned()
                .unwrap_or_else(|| ConversationState::new(session_id.clone())))
        })
    }

    fn save<'a>(&'a self, state: &'a ConversationState) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.states
                .write()
                .await
                .insert(state.session_id().clone(), state.clone());
            Ok(())
        })
    }

    fn delete<'a>(&'a self, session_id: &'a SessionId) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(self.states.write().await.remove(session_id).is_some()) })
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<SessionId>>> {
        Box::pin(async move {
            let states = self.states.read().await;
            let mut entries: Vec<_> = states.values().collect();
            entries.sort_by(|a, b| b.updated_at().cmp(&a.updated_at()));
            Ok(entries.into_iter().map(|s| s.session_id().clone()).collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use switchyard_core::types::{Message, NextNode};

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let store = InMemoryCheckpointStore::new();
        let sid = SessionId::from_string("s1");

        let mut state = store.load(&sid).await.unwrap();
        state.push(Message::user("What is 2+2?"));
        state.push(Message::worker("math_agent", "4"));
        state.set_next(NextNode::Finish);
        store.save(&state).await.unwrap();

        let loaded = store.load(&sid).await.unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.next(), Some(&NextNode::Finish));
    }

    #[tokio::test]
    async fn test_unknown_session_loads_fresh_twice() {
        let store = InMemoryCheckpointStore::new();
        let sid = SessionId::from_string("missing");

        let first = store.load(&sid).await.unwrap();
        let second = store.load(&sid).await.unwrap();
        assert!(first.is_empty() && second.is_empty());
        assert_eq!(first.session_id(), &sid);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_last_write_wins_and_delete() {
        let store = InMemoryCheckpointStore::new();
        let sid = SessionId::from_string("s2");

        let mut state = ConversationState::new(sid.clone());
        state.push(Message::user("one"));
        store.save(&state).await.unwrap();
        state.push(Message::user("two"));
        store.save(&state).await.unwrap();

        assert_eq!(store.load(&sid).await.unwrap().len(), 2);
        assert!(store.delete(&sid).await.unwrap());
        assert!(!store.delete(&sid).await.unwrap());
        assert!(store.load(&sid).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_sessions() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut state = ConversationState::new(SessionId::from_string(&format!("c{i}")));
                state.push(Message::user(format!("msg {i}")));
                store.save(&state).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.list().await.unwrap().len(), 8);
    }
}
