use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use switchyard_core::config::ModelConfig;
use switchyard_core::error::Result;
use switchyard_core::traits::{LlmClient, Worker};
use switchyard_core::types::{ChatMessage, ConversationState, WorkerReply};

/// Model-backed specialist with its own system prompt.
pub struct LlmWorker {
    name: String,
    description: String,
    system_prompt: String,
    llm: Arc<dyn LlmClient>,
    model: ModelConfig,
}

impl LlmWorker {
    pub fn new(
        name: &str,
        description: &str,
        system_prompt: impl Into<String>,
        llm: Arc<dyn LlmClient>,
        model: ModelConfig,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            system_prompt: system_prompt.into(),
            llm,
            model,
        }
    }
}

impl Worker for LlmWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn run<'a>(&'a self, state: &'a ConversationState) -> BoxFuture<'a, Result<WorkerReply>> {
        Box::pin(async move {
            let mut messages = Vec::with_capacity(state.len() + 1);
            messages.push(ChatMessage::system(self.system_prompt.clone()));
            messages.extend(state.messages().iter().map(ChatMessage::from));

            let stream = self.llm.chat_stream(&self.model, messages).await?;
            let text = switchyard_llm::collect_text(stream).await?;
            debug!(worker = %self.name, chars = text.len(), "Specialist replied");

            let text = text.trim();
            if text.is_empty() {
                return Ok(WorkerReply::default());
            }
            Ok(WorkerReply::text(&self.name, text))
        })
    }
}
