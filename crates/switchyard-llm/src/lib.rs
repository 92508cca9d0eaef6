pub mod providers;
pub mod retry;
pub mod streaming;

use futures::stream::{BoxStream, StreamExt};

use switchyard_core::config::ModelConfig;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::LlmClient;
use switchyard_core::types::StreamDelta;

pub use providers::anthropic::AnthropicClient;
pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

const GEMINI_OPENAI_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions";

/// Create an LLM client based on the provider name.
pub fn create_client(config: &ModelConfig) -> Result<Box<dyn LlmClient>> {
    match config.provider.as_str() {
        "anthropic" | "claude" => Ok(Box::new(AnthropicClient::new())),
        "google" | "gemini" => Ok(Box::new(OpenAiClient::with_default_url(GEMINI_OPENAI_URL))),
        // OpenAI-compatible servers (Ollama, vLLM, Groq, OpenRouter) need a base_url
        "openai" | "ollama" | "vllm" | "groq" | "openrouter" | "compatible" => {
            Ok(Box::new(OpenAiClient::new()))
        }
        other => Err(SwitchyardError::UnsupportedProvider(other.to_string())),
    }
}

/// Create a client with retry/fallback wrapping when configured.
pub fn create_resilient_client(
    primary: &ModelConfig,
    fallbacks: &[ModelConfig],
) -> Result<Box<dyn LlmClient>> {
    let client = create_client(primary)?;
    if primary.retry.is_none() && fallbacks.is_empty() {
        return Ok(client);
    }

    let fallback_clients = fallbacks
        .iter()
        .map(|fb| Ok((fb.clone(), create_client(fb)?)))
        .collect::<Result<Vec<_>>>()?;

    Ok(Box::new(RetryingClient::new(
        client,
        fallback_clients,
        primary.retry.clone().unwrap_or_default(),
    )))
}

/// Drain a delta stream into the concatenated response text.
///
/// Stream errors abort collection; text received before the error is lost.
pub async fn collect_text(mut stream: BoxStream<'_, Result<StreamDelta>>) -> Result<String> {
    let mut text = String::new();
    while let Some(delta) = stream.next().await {
        match delta? {
            StreamDelta::TextDelta(chunk) => text.push_str(&chunk),
            StreamDelta::Stop(_) => break,
            StreamDelta::Usage { .. } | StreamDelta::MessageId(_) => {}
        }
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::types::StopReason;

    fn model(provider: &str) -> ModelConfig {
        ModelConfig {
            provider: provider.to_string(),
            model_id: "m".to_string(),
            api_key: None,
            base_url: None,
            max_tokens: 16,
            temperature: 0.0,
            retry: None,
            extra_headers: Default::default(),
        }
    }

    #[test]
    fn test_create_client_known_providers() {
        for provider in ["openai", "anthropic", "claude", "google", "ollama"] {
            assert!(create_client(&model(provider)).is_ok(), "{}", provider);
        }
    }

    #[test]
    fn test_create_client_unknown_provider() {
        assert!(matches!(
            create_client(&model("carrier-pigeon")),
            Err(SwitchyardError::UnsupportedProvider(_))
        ));
    }

    #[tokio::test]
    async fn test_collect_text_stops_at_stop() {
        let deltas = vec![
            Ok(StreamDelta::MessageId("id".into())),
            Ok(StreamDelta::TextDelta("math_".into())),
            Ok(StreamDelta::TextDelta("agent".into())),
            Ok(StreamDelta::Stop(StopReason::EndTurn)),
            Ok(StreamDelta::TextDelta("ignored".into())),
        ];
        let stream = futures::stream::iter(deltas).boxed();
        assert_eq!(collect_text(stream).await.unwrap(), "math_agent");
    }

    #[tokio::test]
    async fn test_collect_text_propagates_errors() {
        let deltas = vec![
            Ok(StreamDelta::TextDelta("partial".into())),
            Err(SwitchyardError::LlmStream("boom".into())),
        ];
        let stream = futures::stream::iter(deltas).boxed();
        assert!(collect_text(stream).await.is_err());
    }
}
