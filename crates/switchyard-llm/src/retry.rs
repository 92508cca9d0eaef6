use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use tracing::{info, warn};

use switchyard_core::config::{ModelConfig, RetryConfig};
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::LlmClient;
use switchyard_core::types::*;

/// An LLM client that retries failed requests and falls back to alternative providers.
pub struct RetryingClient {
    primary: Box<dyn LlmClient>,
    fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    pub fn new(
        primary: Box<dyn LlmClient>,
        fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            primary,
            fallbacks,
            retry_config,
        }
    }
}

fn is_retryable(e: &SwitchyardError) -> bool {
    match e {
        SwitchyardError::LlmRequest(msg) => {
            ["429", "500", "502", "503", "529", "timeout", "connection"]
                .iter()
                .any(|needle| msg.contains(needle))
        }
        SwitchyardError::LlmStream(_) => true,
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_backoff_ms);
    // 0.8x to 1.2x jitter
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl LlmClient for RetryingClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();

        Box::pin(async move {
            let max_retries = self.retry_config.max_retries;

            let mut last_err = None;
            for attempt in 0..=max_retries {
                match self.primary.chat_stream(&config, messages.clone()).await {
                    Ok(stream) => return Ok(stream),
                    Err(e) => {
                        if is_retryable(&e) && attempt < max_retries {
                            let backoff = calculate_backoff(attempt, &self.retry_config);
                            warn!(
                                attempt = attempt + 1,
                                max_retries,
                                backoff_ms = backoff.as_millis() as u64,
                                error = %e,
                                "Retrying LLM request"
                            );
                            tokio::time::sleep(backoff).await;
                            last_err = Some(e);
                            continue;
                        }
                        last_err = Some(e);
                        break;
                    }
                }
            }

            if !self.fallbacks.is_empty() {
                info!("Primary LLM exhausted, trying fallback models");
            }
            for (fb_config, fb_client) in &self.fallbacks {
                match fb_client.chat_stream(fb_config, messages.clone()).await {
                    Ok(stream) => {
                        info!(
                            model = %fb_config.model_id,
                            provider = %fb_config.provider,
                            "Fell back to alternative model"
                        );
                        return Ok(stream);
                    }
                    Err(e) => {
                        warn!(model = %fb_config.model_id, error = %e, "Fallback model also failed");
                    }
                }
            }

            Err(last_err
                .unwrap_or_else(|| SwitchyardError::LlmRequest("All providers failed".into())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use futures::StreamExt;

    /// Fails `failures` times with the given error, then streams "ok".
    struct Flaky {
        failures: usize,
        calls: Arc<AtomicUsize>,
        error: fn() -> SwitchyardError,
    }

    impl LlmClient for Flaky {
        fn chat_stream(
            &self,
            _config: &ModelConfig,
            _messages: Vec<ChatMessage>,
        ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                if n < self.failures {
                    return Err((self.error)());
                }
                let deltas = vec![Ok(StreamDelta::TextDelta("ok".into()))];
                Ok(futures::stream::iter(deltas).boxed())
            })
        }
    }

    fn model(id: &str) -> ModelConfig {
        ModelConfig {
            provider: "openai".into(),
            model_id: id.into(),
            api_key: None,
            base_url: None,
            max_tokens: 16,
            temperature: 0.0,
            retry: None,
            extra_headers: Default::default(),
        }
    }

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&SwitchyardError::LlmRequest("HTTP 429 Too Many".into())));
        assert!(is_retryable(&SwitchyardError::LlmStream("reset".into())));
        assert!(!is_retryable(&SwitchyardError::LlmRequest("HTTP 401".into())));
        assert!(!is_retryable(&SwitchyardError::Config("no key".into())));
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_retries: 10,
            initial_backoff_ms: 1000,
            max_backoff_ms: 5000,
        };
        let backoff = calculate_backoff(8, &config);
        assert!(backoff <= Duration::from_millis(6000));
        assert!(backoff >= Duration::from_millis(4000));
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = RetryingClient::new(
            Box::new(Flaky {
                failures: 2,
                calls: calls.clone(),
                error: || SwitchyardError::LlmRequest("HTTP 503".into()),
            }),
            vec![],
            fast_retry(3),
        );
        let stream = client.chat_stream(&model("m"), vec![]).await.unwrap();
        assert_eq!(crate::collect_text(stream).await.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_goes_to_fallback() {
        let primary_calls = Arc::new(AtomicUsize::new(0));
        let fallback_calls = Arc::new(AtomicUsize::new(0));
        let client = RetryingClient::new(
            Box::new(Flaky {
                failures: usize::MAX,
                calls: primary_calls.clone(),
                error: || SwitchyardError::LlmRequest("HTTP 401".into()),
            }),
            vec![(
                model("fallback"),
                Box::new(Flaky {
                    failures: 0,
                    calls: fallback_calls.clone(),
                    error: || SwitchyardError::LlmRequest("unused".into()),
                }) as Box<dyn LlmClient>,
            )],
            fast_retry(3),
        );
        assert!(client.chat_stream(&model("m"), vec![]).await.is_ok());
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_failed_returns_last_error() {
        let client = RetryingClient::new(
            Box::new(Flaky {
                failures: usize::MAX,
                calls: Arc::new(AtomicUsize::new(0)),
                error: || SwitchyardError::LlmRequest("HTTP 500".into()),
            }),
            vec![],
            fast_retry(1),
        );
        match client.chat_stream(&model("m"), vec![]).await {
            Err(SwitchyardError::LlmRequest(msg)) => assert!(msg.contains("500")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected failure"),
        };
    }
}
