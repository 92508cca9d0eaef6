use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use switchyard_core::config::{ModelConfig, RouterConfig};
use switchyard_core::traits::LlmClient;
use switchyard_core::types::{ChatMessage, ConversationState, NextNode, FINISH};

use crate::worker::WorkerRegistry;

/// Outcome of one routing step.
#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub next: NextNode,
    /// The classifier's reply before normalization.
    pub raw: String,
    /// Set when the classifier call itself failed.
    pub failure: Option<String>,
}

/// Decision-policy gateway.
///
/// Asks the classifier model for exactly one menu token and fails closed:
/// anything that is not a registered worker name ends the turn.
pub struct Router {
    llm: Arc<dyn LlmClient>,
    model: ModelConfig,
    config: RouterConfig,
}

impl Router {
    pub fn new(llm: Arc<dyn LlmClient>, model: ModelConfig, config: RouterConfig) -> Self {
        Self { llm, model, config }
    }

    pub fn build_system_prompt(&self, registry: &WorkerRegistry) -> String {
        let mut prompt = String::from(
            "You are a supervisor routing a conversation between specialized workers.\n",
        );

        if self.config.include_date {
            prompt.push_str(&format!(
                "Today's date is {}.\n",
                Utc::now().format("%Y-%m-%d")
            ));
        }

        prompt.push_str("\nAvailable workers:\n");
        for (name, description) in registry.menu() {
            prompt.push_str(&format!("- {}: {}\n", name, description));
        }
        prompt.push_str(&format!(
            "- {}: the request has been fully answered, or no worker fits.\n",
            FINISH
        ));

        prompt.push_str(&format!(
            "\nGiven the conversation so far, decide who acts next. \
             Reply with exactly one token from the list above ({} included) \
             and nothing else: no punctuation, no explanation.\n\
             If a worker has already answered the latest request, reply {}.\n",
            FINISH, FINISH
        ));

        if let Some(extra) = self.config.instructions.as_deref() {
            prompt.push('\n');
            prompt.push_str(extra.trim());
            prompt.push('\n');
        }

        prompt
    }

    /// Choose the next node. Never fails: classifier errors select `Finish`.
    pub async fn decide(&self, state: &ConversationState, registry: &WorkerRegistry) -> RouteDecision {
        let mut messages = Vec::with_capacity(state.len() + 1);
        messages.push(ChatMessage::system(self.build_system_prompt(registry)));
        messages.extend(state.messages().iter().map(ChatMessage::from));

        let raw = match self.llm.chat_stream(&self.model, messages).await {
            Ok(stream) => switchyard_llm::collect_text(stream).await,
            Err(e) => Err(e),
        };

        match raw {
            Ok(raw) => {
                let next = normalize_choice(&raw, &registry.names());
                debug!(raw = %raw.trim(), next = %next, "Router reply normalized");
                RouteDecision {
                    next,
                    raw,
                    failure: None,
                }
            }
            Err(e) => {
                warn!(
                    session_id = %state.session_id(),
                    error = %e,
                    "Router call failed, finishing turn"
                );
                RouteDecision {
                    next: NextNode::Finish,
                    raw: String::new(),
                    failure: Some(e.to_string()),
                }
            }
        }
    }
}

/// Map a raw classifier reply onto the menu.
///
/// The reply is trimmed and lowercased, then must equal a registered name
/// exactly. Everything else, including the finish token, selects `Finish`.
pub fn normalize_choice(raw: &str, names: &[&str]) -> NextNode {
    let choice = raw.trim().to_lowercase();
    if names.iter().any(|n| *n == choice) {
        NextNode::Worker(choice)
    } else {
        NextNode::Finish
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::types::ChatRole;
    use switchyard_test_utils::{
        state_with_user, test_model, CountingWorker, FailingLlm, ScriptedLlm,
    };

    use crate::worker::WorkerAdapter;

    const NAMES: &[&str] = &["math_agent", "weather_agent"];

    fn registry() -> WorkerRegistry {
        let mut registry = WorkerRegistry::new();
        registry
            .register(WorkerAdapter::new(CountingWorker::new("math_agent", "4")))
            .unwrap();
        registry
            .register(WorkerAdapter::new(CountingWorker::new("weather_agent", "Sunny")))
            .unwrap();
        registry
    }

    #[test]
    fn test_normalize_exact_and_case_insensitive() {
        assert_eq!(
            normalize_choice("math_agent", NAMES),
            NextNode::Worker("math_agent".into())
        );
        assert_eq!(
            normalize_choice("  Weather_Agent\n", NAMES),
            NextNode::Worker("weather_agent".into())
        );
    }

    #[test]
    fn test_normalize_fails_closed() {
        for raw in ["", "   ", "FINISH", "finish", "banana", "math_agent.", "use math_agent"] {
            assert_eq!(normalize_choice(raw, NAMES), NextNode::Finish, "{raw:?}");
        }
    }

    #[test]
    fn test_system_prompt_lists_menu() {
        let router = Router::new(
            Arc::new(ScriptedLlm::always("FINISH")),
            test_model(),
            RouterConfig {
                instructions: Some("Prefer weather_agent for travel questions.".into()),
                ..Default::default()
            },
        );
        let prompt = router.build_system_prompt(&registry());

        assert!(prompt.contains("- math_agent: Handles math_agent requests"));
        assert!(prompt.contains("- weather_agent:"));
        assert!(prompt.contains("- FINISH:"));
        assert!(prompt.contains("Today's date is"));
        assert!(prompt.ends_with("Prefer weather_agent for travel questions.\n"));
    }

    #[tokio::test]
    async fn test_decide_sends_history_and_selects_worker() {
        let llm = Arc::new(ScriptedLlm::always("weather_agent"));
        let router = Router::new(llm.clone(), test_model(), RouterConfig::default());

        let decision = router
            .decide(&state_with_user("s", "Weather in Pune?"), &registry())
            .await;

        assert_eq!(decision.next, NextNode::Worker("weather_agent".into()));
        assert!(decision.failure.is_none());

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0][0].role, ChatRole::System);
        assert_eq!(requests[0][1].content, "Weather in Pune?");
    }

    #[tokio::test]
    async fn test_decide_llm_failure_finishes() {
        let router = Router::new(
            Arc::new(FailingLlm::new("HTTP 503")),
            test_model(),
            RouterConfig::default(),
        );
        let decision = router.decide(&state_with_user("s", "hi"), &registry()).await;

        assert_eq!(decision.next, NextNode::Finish);
        assert!(decision.failure.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_decide_does_not_touch_state() {
        let router = Router::new(
            Arc::new(ScriptedLlm::always("math_agent")),
            test_model(),
            RouterConfig::default(),
        );
        let state = state_with_user("s", "2+2");
        let before = state.clone();
        router.decide(&state, &registry()).await;
        assert_eq!(state, before);
    }
}
