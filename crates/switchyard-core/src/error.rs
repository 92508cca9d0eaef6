use thiserror::Error;

#[derive(Debug, Error)]
pub enum SwitchyardError {
    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    #[error("LLM provider not supported: {0}")]
    UnsupportedProvider(String),

    // Worker errors
    #[error("Worker not found: {0}")]
    WorkerNotFound(String),

    #[error("Worker failed: {worker}: {message}")]
    Worker { worker: String, message: String },

    #[error("Worker already registered: {0}")]
    DuplicateWorker(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Persistence errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Database error: {0}")]
    Database(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SwitchyardError {
    /// Shorthand for a worker-side failure.
    pub fn worker(worker: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Worker {
            worker: worker.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SwitchyardError>;
