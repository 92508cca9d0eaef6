//! Concurrent multi-source lookup worker.
//!
//! Every source is queried at once, each under its own timeout. Sources that
//! fail or time out are listed; they do not fail the worker.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{join_all, BoxFuture};
use tracing::{debug, info, warn};

use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::Worker;
use switchyard_core::types::{ConversationState, Message, WorkerReply};

/// One backend queried by a [`FanOutWorker`].
pub trait Source: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Fetch results for `query` as text.
    fn fetch<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<String>>;
}

/// HTTP GET source with a `{query}` URL template.
pub struct HttpSource {
    http: reqwest::Client,
    name: String,
    url_template: String,
    max_chars: usize,
}

impl HttpSource {
    pub fn new(http: reqwest::Client, name: &str, url_template: &str, max_chars: usize) -> Self {
        Self {
            http,
            name: name.to_string(),
            url_template: url_template.to_string(),
            max_chars,
        }
    }

    pub fn render_url(&self, query: &str) -> String {
        self.url_template
            .replace("{query}", &urlencoding::encode(query))
    }
}

impl Source for HttpSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let url = self.render_url(query);
            debug!(source = %self.name, url = %url, "Fetching source");

            let resp = self
                .http
                .get(&url)
                .header("User-Agent", "switchyard/0.3")
                .send()
                .await
                .map_err(|e| SwitchyardError::worker(&self.name, format!("request failed: {}", e)))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(SwitchyardError::worker(&self.name, format!("HTTP {}", status)));
            }

            let body = resp
                .text()
                .await
                .map_err(|e| SwitchyardError::worker(&self.name, format!("read failed: {}", e)))?;

            Ok(truncate_chars(body.trim(), self.max_chars))
        })
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}\n[truncated]", &text[..idx]),
        None => text.to_string(),
    }
}

/// Queries all sources concurrently and summarizes the results in one message.
pub struct FanOutWorker {
    name: String,
    description: String,
    sources: Vec<Arc<dyn Source>>,
    timeout: Duration,
}

impl FanOutWorker {
    pub fn new(
        name: &str,
        description: &str,
        sources: Vec<Arc<dyn Source>>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            sources,
            timeout,
        }
    }

    async fn query_source(
        &self,
        source: &Arc<dyn Source>,
        query: &str,
    ) -> (String, std::result::Result<String, String>) {
        let name = source.name().to_string();
        let outcome = match tokio::time::timeout(self.timeout, source.fetch(query)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(SwitchyardError::Worker { message, .. })) => Err(message),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {}ms", self.timeout.as_millis())),
        };
        (name, outcome)
    }
}

impl Worker for FanOutWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn run<'a>(&'a self, state: &'a ConversationState) -> BoxFuture<'a, Result<WorkerReply>> {
        Box::pin(async move {
            let query = state
                .last_user_message()
                .ok_or_else(|| SwitchyardError::worker(&self.name, "no user request to look up"))?;

            let start = Instant::now();
            let outcomes =
                join_all(self.sources.iter().map(|s| self.query_source(s, query))).await;

            let mut found = Vec::new();
            let mut failed = Vec::new();
            for (source, outcome) in outcomes {
                match outcome {
                    Ok(text) => found.push((source, text)),
                    Err(err) => {
                        warn!(worker = %self.name, source = %source, error = %err, "Source failed");
                        failed.push((source, err));
                    }
                }
            }

            info!(
                worker = %self.name,
                succeeded = found.len(),
                failed = failed.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Fan-out complete"
            );

            let mut content = if found.is_empty() {
                format!(
                    "No results: all {} sources failed for \"{}\".",
                    self.sources.len(),
                    query
                )
            } else {
                let mut out = format!(
                    "Results for \"{}\" from {} of {} sources:",
                    query,
                    found.len(),
                    self.sources.len()
                );
                for (source, text) in &found {
                    out.push_str(&format!("\n\n[{}]\n{}", source, text));
                }
                out
            };

            if !failed.is_empty() {
                content.push_str("\n\nFailed sources:");
                for (source, err) in &failed {
                    content.push_str(&format!("\n- {}: {}", source, err));
                }
            }

            let payload = serde_json::json!({
                "query": query,
                "succeeded": found.iter().map(|(s, _)| s).collect::<Vec<_>>(),
                "failed": failed
                    .iter()
                    .map(|(s, e)| serde_json::json!({"source": s, "error": e}))
                    .collect::<Vec<_>>(),
            });

            Ok(WorkerReply::new(vec![
                Message::worker(&self.name, content).with_payload(payload)
            ]))
        })
    }
}
