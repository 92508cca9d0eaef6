//! Mocks and fixtures shared by the Switchyard test suites.
//!
//! `ScriptedLlm` plays back router replies. The worker mocks cover the three
//! outcomes the adapter cares about: a normal reply, an error, and an empty
//! reply.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};

use switchyard_core::config::{AppConfig, ModelConfig};
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::{CheckpointStore, LlmClient, Worker};
use switchyard_core::types::*;

/// An LLM client that returns scripted text replies in order.
///
/// Once the script runs out the last reply repeats, so a single-entry
/// script models a policy that never changes its mind.
pub struct ScriptedLlm {
    replies: Vec<String>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedLlm {
    pub fn new<S: Into<String>>(replies: impl IntoIterator<Item = S>) -> Self {
        Self {
            replies: replies.into_iter().map(Into::into).collect(),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `reply`.
    pub fn always(reply: impl Into<String>) -> Self {
        Self::new([reply.into()])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Message lists received so far, one entry per call.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl LlmClient for ScriptedLlm {
    fn chat_stream(
        &self,
        _config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        Box::pin(async move {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(messages);
            }

            let reply = self
                .replies
                .get(n)
                .or_else(|| self.replies.last())
                .cloned()
                .unwrap_or_default();

            // Split the reply so consumers exercise delta concatenation.
            let mid = reply
                .char_indices()
                .nth(reply.chars().count() / 2)
                .map(|(i, _)| i)
                .unwrap_or(0);
            let (head, tail) = reply.split_at(mid);
            let deltas = vec![
                Ok(StreamDelta::MessageId(format!("scripted-{}", n))),
                Ok(StreamDelta::TextDelta(head.to_string())),
                Ok(StreamDelta::TextDelta(tail.to_string())),
                Ok(StreamDelta::Stop(StopReason::EndTurn)),
            ];
            Ok(futures::stream::iter(deltas).boxed())
        })
    }
}

/// An LLM client whose every request fails.
pub struct FailingLlm {
    message: String,
}

impl FailingLlm {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl LlmClient for FailingLlm {
    fn chat_stream(
        &self,
        _config: &ModelConfig,
        _messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let message = self.message.clone();
        Box::pin(async move { Err(SwitchyardError::LlmRequest(message)) })
    }
}

/// Worker that appends a fixed reply and counts its invocations.
pub struct CountingWorker {
    name: String,
    description: String,
    reply: String,
    calls: Arc<AtomicUsize>,
}

impl CountingWorker {
    pub fn new(name: &str, reply: &str) -> Self {
        Self {
            name: name.to_string(),
            description: format!("Handles {} requests", name),
            reply: reply.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter, usable after the worker has moved into a registry.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Worker for CountingWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn run<'a>(&'a self, _state: &'a ConversationState) -> BoxFuture<'a, Result<WorkerReply>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(WorkerReply::text(&self.name, &self.reply))
        })
    }
}

/// Worker that always fails with `message`.
pub struct FailingWorker {
    name: String,
    message: String,
}

impl FailingWorker {
    pub fn new(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            message: message.to_string(),
        }
    }
}

impl Worker for FailingWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn run<'a>(&'a self, _state: &'a ConversationState) -> BoxFuture<'a, Result<WorkerReply>> {
        Box::pin(async move { Err(SwitchyardError::worker(&self.name, &self.message)) })
    }
}

/// Worker that returns an empty reply.
pub struct SilentWorker {
    name: String,
}

impl SilentWorker {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Worker for SilentWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Says nothing"
    }

    fn run<'a>(&'a self, _state: &'a ConversationState) -> BoxFuture<'a, Result<WorkerReply>> {
        Box::pin(async move { Ok(WorkerReply::default()) })
    }
}

/// Checkpoint store that fails on demand. Nothing is kept; `load` returns
/// a fresh state unless load failures are enabled.
pub struct FailingStore {
    fail_load: bool,
    saves_allowed: usize,
    saves: AtomicUsize,
}

impl FailingStore {
    /// Every `load` fails.
    pub fn on_load() -> Self {
        Self {
            fail_load: true,
            saves_allowed: usize::MAX,
            saves: AtomicUsize::new(0),
        }
    }

    /// The first `allowed` saves succeed, every later one fails.
    pub fn on_save_after(allowed: usize) -> Self {
        Self {
            fail_load: false,
            saves_allowed: allowed,
            saves: AtomicUsize::new(0),
        }
    }

    /// Save attempts so far, failed ones included.
    pub fn save_attempts(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl CheckpointStore for FailingStore {
    fn load<'a>(&'a self, session_id: &'a SessionId) -> BoxFuture<'a, Result<ConversationState>> {
        Box::pin(async move {
            if self.fail_load {
                return Err(SwitchyardError::Checkpoint("load failed: disk unavailable".into()));
            }
            Ok(ConversationState::new(session_id.clone()))
        })
    }

    fn save<'a>(&'a self, _state: &'a ConversationState) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let n = self.saves.fetch_add(1, Ordering::SeqCst);
            if n >= self.saves_allowed {
                return Err(SwitchyardError::Checkpoint("save failed: disk full".into()));
            }
            Ok(())
        })
    }

    fn delete<'a>(&'a self, _session_id: &'a SessionId) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(false) })
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<SessionId>>> {
        Box::pin(async move { Ok(Vec::new()) })
    }
}

/// Model config that never reaches a network.
pub fn test_model() -> ModelConfig {
    ModelConfig {
        provider: "openai".to_string(),
        model_id: "test-model".to_string(),
        api_key: None,
        base_url: Some("http://127.0.0.1:9/v1/chat/completions".to_string()),
        max_tokens: 64,
        temperature: 0.0,
        retry: None,
        extra_headers: Default::default(),
    }
}

/// Smallest valid application config.
pub fn minimal_config() -> AppConfig {
    AppConfig {
        workspace: "/tmp/switchyard-test".to_string(),
        model: test_model(),
        fallback_models: Vec::new(),
        router: Default::default(),
        graph: Default::default(),
        checkpoint: Default::default(),
        workers: Vec::new(),
    }
}

/// A fresh state holding one user message.
pub fn state_with_user(session: &str, text: &str) -> ConversationState {
    let mut state = ConversationState::new(SessionId::from_string(session));
    state.push(Message::user(text));
    state
}

/// Worker-authored messages, in transcript order.
pub fn worker_messages(state: &ConversationState) -> Vec<&Message> {
    state.messages().iter().filter(|m| m.is_from_worker()).collect()
}
