use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use switchyard_core::config::ModelConfig;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::LlmClient;
use switchyard_core::types::*;

use crate::streaming::{SseEvent, SseStream};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    http: Client,
}

impl AnthropicClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for AnthropicClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
}

#[derive(Serialize, Debug, PartialEq)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
enum SseData {
    #[serde(rename = "message_start")]
    MessageStart { message: MessageInfo },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: DeltaInfo },
    #[serde(rename = "message_delta")]
    MessageDelta {
        delta: MessageDeltaInfo,
        usage: Option<UsageInfo>,
    },
    #[serde(rename = "error")]
    Error { error: ApiError },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
struct MessageInfo {
    id: String,
}

#[derive(Deserialize, Debug)]
struct UsageInfo {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
enum DeltaInfo {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
struct MessageDeltaInfo {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    message: String,
}

/// System messages are lifted to the top-level `system` field; the API
/// rejects them inside `messages`.
fn convert_messages(messages: Vec<ChatMessage>) -> (Option<String>, Vec<ApiMessage>) {
    let mut system: Option<String> = None;
    let mut api_msgs = Vec::new();

    for msg in messages {
        match msg.role {
            ChatRole::System => match system.as_mut() {
                Some(existing) => {
                    existing.push_str("\n\n");
                    existing.push_str(&msg.content);
                }
                None => system = Some(msg.content),
            },
            ChatRole::User => api_msgs.push(ApiMessage {
                role: "user",
                content: msg.content,
            }),
            ChatRole::Assistant => api_msgs.push(ApiMessage {
                role: "assistant",
                content: msg.content,
            }),
        }
    }

    (system, api_msgs)
}

fn parse_sse_to_delta(event: SseEvent) -> Option<Result<StreamDelta>> {
    let data: SseData = match serde_json::from_str(&event.data) {
        Ok(d) => d,
        Err(e) => {
            warn!(data = %event.data, error = %e, "Failed to parse SSE data");
            return None;
        }
    };

    match data {
        SseData::MessageStart { message } => Some(Ok(StreamDelta::MessageId(message.id))),
        SseData::ContentBlockDelta { delta } => match delta {
            DeltaInfo::TextDelta { text } => Some(Ok(StreamDelta::TextDelta(text))),
            DeltaInfo::Other => None,
        },
        SseData::MessageDelta { delta, usage } => {
            if let Some(usage) = usage {
                debug!(
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "Token usage"
                );
            }
            let stop = match delta.stop_reason.as_deref() {
                Some("max_tokens") => StopReason::MaxTokens,
                Some("stop_sequence") => StopReason::StopSequence,
                Some(_) => StopReason::EndTurn,
                None => return None,
            };
            Some(Ok(StreamDelta::Stop(stop)))
        }
        SseData::Error { error } => Some(Err(SwitchyardError::LlmStream(error.message))),
        SseData::Other => None,
    }
}

impl LlmClient for AnthropicClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();

        Box::pin(async move {
            let api_key = config
                .api_key
                .as_deref()
                .ok_or_else(|| SwitchyardError::Config("Anthropic API key not set".into()))?;

            let base_url = config.base_url.as_deref().unwrap_or(ANTHROPIC_API_URL);

            let (system, api_messages) = convert_messages(messages);

            let body = AnthropicRequest {
                model: config.model_id.clone(),
                max_tokens: config.max_tokens,
                temperature: (config.temperature > 0.0).then_some(config.temperature),
                messages: api_messages,
                system,
                stream: true,
            };

            let mut req = self
                .http
                .post(base_url)
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json");

            for (k, v) in &config.extra_headers {
                req = req.header(k.as_str(), v.as_str());
            }

            let response = req
                .json(&body)
                .send()
                .await
                .map_err(|e| SwitchyardError::LlmRequest(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown error".to_string());
                return Err(SwitchyardError::LlmRequest(format!("HTTP {}: {}", status, body)));
            }

            let sse_stream = SseStream::new(response.bytes_stream());

            let delta_stream =
                sse_stream.filter_map(|event| async move { parse_sse_to_delta(event) });

            Ok(Box::pin(delta_stream) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}
