use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SwitchyardError};

/// Top-level Switchyard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory for local state (checkpoint database, etc.).
    #[serde(default = "default_workspace")]
    pub workspace: String,
    /// Default model for the router and LLM-backed workers.
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub workers: Vec<WorkerConfig>,
}

fn default_workspace() -> String { "~/.switchyard".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Extra HTTP headers sent with every request.
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.0 }

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Decision-policy settings for the router node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Model override for routing; falls back to `[model]`.
    #[serde(default)]
    pub model: Option<ModelConfig>,
    /// Extra operator rules appended to the routing instruction.
    #[serde(default)]
    pub instructions: Option<String>,
    /// Mention today's date in the routing instruction (default: true).
    #[serde(default = "default_include_date")]
    pub include_date: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            model: None,
            instructions: None,
            include_date: default_include_date(),
        }
    }
}

fn default_include_date() -> bool { true }

/// Run-loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Maximum node executions per turn before forced termination.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Persist after every node execution, not only at the end of the turn.
    #[serde(default = "default_checkpoint_every_step")]
    pub checkpoint_every_step: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            checkpoint_every_step: default_checkpoint_every_step(),
        }
    }
}

fn default_max_steps() -> usize { 100 }
fn default_checkpoint_every_step() -> bool { true }

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    /// Process-local; state is lost on exit.
    #[default]
    Memory,
    /// SQLite file under the workspace (or `path`).
    Sqlite,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default)]
    pub backend: CheckpointBackend,
    /// Database path for the sqlite backend. Default: <workspace>/checkpoints.db
    #[serde(default)]
    pub path: Option<String>,
}

/// Built-in worker implementations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    /// Model-backed specialist with its own system prompt.
    Llm,
    /// Deterministic arithmetic evaluator.
    Math,
    /// Concurrent multi-source HTTP lookup.
    Fanout,
}

/// Where control goes after a worker runs.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AfterRun {
    /// Hand control back to the router for another decision.
    #[default]
    Router,
    /// One-shot: end the turn right after this worker.
    Finish,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub name: String,
    pub description: String,
    pub kind: WorkerKind,
    #[serde(default)]
    pub after: AfterRun,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Model override for `llm` workers.
    #[serde(default)]
    pub model: Option<ModelConfig>,
    /// Sources for `fanout` workers.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    /// Per-source timeout for `fanout` workers.
    #[serde(default = "default_source_timeout")]
    pub timeout_secs: u64,
    /// Characters kept from each source response.
    #[serde(default = "default_source_max_chars")]
    pub max_chars: usize,
}

fn default_source_timeout() -> u64 { 20 }
fn default_source_max_chars() -> usize { 2000 }

/// One HTTP source queried by a fan-out worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    /// URL template; `{query}` is replaced with the URL-encoded user request.
    pub url: String,
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| SwitchyardError::ConfigNotFound(path.display().to_string()))?;

        Self::parse(&content)
    }

    /// Parse config from TOML text, with env var expansion.
    pub fn parse(content: &str) -> Result<Self> {
        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(content);

        toml::from_str(&expanded).map_err(|e| SwitchyardError::Config(e.to_string()))
    }

    /// Model used by the router.
    pub fn router_model(&self) -> &ModelConfig {
        self.router.model.as_ref().unwrap_or(&self.model)
    }

    /// Resolve the workspace directory (expand ~).
    pub fn workspace_dir(&self) -> PathBuf {
        expand_home(&self.workspace)
    }

    /// Resolve the sqlite checkpoint path.
    pub fn checkpoint_path(&self) -> PathBuf {
        match self.checkpoint.path {
            Some(ref p) => expand_home(p),
            None => self.workspace_dir().join("checkpoints.db"),
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
