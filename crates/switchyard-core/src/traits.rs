use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::*;

/// Multi-provider streaming LLM client.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and receive a stream of deltas.
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;
}

/// A named capability provider the router can dispatch to.
pub trait Worker: Send + Sync + 'static {
    /// Registry key and the exact token the router emits to select it.
    fn name(&self) -> &str;

    /// One-line competence summary shown to the router.
    fn description(&self) -> &str;

    /// Produce the messages to append for the current state.
    ///
    /// Errors are folded into transcript content by the adapter; they never
    /// abort the turn.
    fn run<'a>(&'a self, state: &'a ConversationState) -> BoxFuture<'a, Result<WorkerReply>>;
}

/// Per-session persistence backend.
pub trait CheckpointStore: Send + Sync + 'static {
    /// Latest state for a session, or a fresh empty one if none was saved.
    fn load<'a>(&'a self, session_id: &'a SessionId) -> BoxFuture<'a, Result<ConversationState>>;

    /// Overwrite the stored state for `state.session_id()`.
    fn save<'a>(&'a self, state: &'a ConversationState) -> BoxFuture<'a, Result<()>>;

    /// Remove a session. Returns whether anything was stored.
    fn delete<'a>(&'a self, session_id: &'a SessionId) -> BoxFuture<'a, Result<bool>>;

    /// All stored session ids, most recently updated first.
    fn list(&self) -> BoxFuture<'_, Result<Vec<SessionId>>>;
}
