use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use switchyard_core::config::AfterRun;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::Worker;
use switchyard_core::types::{ConversationState, Message, NextNode, Role, FINISH, ROUTER};

/// State delta produced by one worker execution.
#[derive(Debug, Clone)]
pub struct NodeOutput {
    /// Messages to append, never empty.
    pub messages: Vec<Message>,
    pub next: NextNode,
}

/// Wraps a [`Worker`] as a graph node.
///
/// The adapter owns the worker's outgoing edge and guarantees a uniform
/// result: failures and empty replies become transcript entries instead of
/// errors, so a worker can never abort the turn.
#[derive(Clone)]
pub struct WorkerAdapter {
    worker: Arc<dyn Worker>,
    after: AfterRun,
}

impl WorkerAdapter {
    /// Adapter that hands control back to the router.
    pub fn new(worker: impl Worker) -> Self {
        Self::from_arc(Arc::new(worker), AfterRun::Router)
    }

    pub fn from_arc(worker: Arc<dyn Worker>, after: AfterRun) -> Self {
        Self { worker, after }
    }

    /// End the turn directly after this worker runs.
    pub fn one_shot(mut self) -> Self {
        self.after = AfterRun::Finish;
        self
    }

    pub fn with_after(mut self, after: AfterRun) -> Self {
        self.after = after;
        self
    }

    pub fn name(&self) -> &str {
        self.worker.name()
    }

    pub fn description(&self) -> &str {
        self.worker.description()
    }

    pub fn after(&self) -> AfterRun {
        self.after
    }

    /// Run the worker and fold its outcome into a [`NodeOutput`].
    pub async fn execute(&self, state: &ConversationState) -> NodeOutput {
        let name = self.name();

        let mut messages = match self.worker.run(state).await {
            Ok(reply) if reply.is_empty() => {
                debug!(worker = %name, "Worker returned no messages");
                vec![Message::worker(name, format!("{}: finished without output", name))]
            }
            Ok(reply) => reply.messages,
            Err(e) => {
                warn!(worker = %name, error = %e, "Worker failed");
                let detail = match e {
                    SwitchyardError::Worker { message, .. } => message,
                    other => other.to_string(),
                };
                vec![Message::worker(name, format!("{}: error: {}", name, detail))]
            }
        };

        for msg in &mut messages {
            if msg.role == Role::Worker && msg.author.is_none() {
                msg.author = Some(name.to_string());
            }
        }

        let next = match self.after {
            AfterRun::Router => NextNode::Router,
            AfterRun::Finish => NextNode::Finish,
        };

        NodeOutput { messages, next }
    }
}

/// Registry of workers the router may select. The router's menu is derived
/// from it, in registration order.
#[derive(Default, Clone)]
pub struct WorkerRegistry {
    workers: Vec<WorkerAdapter>,
    index: HashMap<String, usize>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker adapter.
    ///
    /// Names must be non-empty, lowercase, free of whitespace, unique, and
    /// must not collide with the router or finish tokens.
    pub fn register(&mut self, adapter: WorkerAdapter) -> Result<()> {
        let name = adapter.name().to_string();
        validate_name(&name)?;

        if self.index.contains_key(&name) {
            return Err(SwitchyardError::DuplicateWorker(name));
        }

        debug!(worker = %name, after = ?adapter.after(), "Registered worker");
        self.index.insert(name, self.workers.len());
        self.workers.push(adapter);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&WorkerAdapter> {
        self.index.get(name).map(|&i| &self.workers[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Worker names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.workers.iter().map(|w| w.name()).collect()
    }

    /// `(name, description)` pairs in registration order.
    pub fn menu(&self) -> Vec<(&str, &str)> {
        self.workers
            .iter()
            .map(|w| (w.name(), w.description()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Execute the named worker against `state`.
    pub async fn dispatch(&self, name: &str, state: &ConversationState) -> Result<NodeOutput> {
        let adapter = self
            .get(name)
            .ok_or_else(|| SwitchyardError::WorkerNotFound(name.to_string()))?;
        Ok(adapter.execute(state).await)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SwitchyardError::Config("worker name must not be empty".into()));
    }
    if name.chars().any(char::is_whitespace) || name.to_lowercase() != name {
        return Err(SwitchyardError::Config(format!(
            "worker name '{}' must be lowercase without whitespace",
            name
        )));
    }
    if name == ROUTER || name == FINISH.to_lowercase() {
        return Err(SwitchyardError::Config(format!(
            "worker name '{}' is reserved",
            name
        )));
    }
    Ok(())
}
