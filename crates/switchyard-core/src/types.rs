use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved token the router emits to end a turn.
pub const FINISH: &str = "FINISH";

/// Name of the routing node.
pub const ROUTER: &str = "router";

/// Unique session identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Author role of a transcript entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Worker,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Worker => "worker",
        };
        f.write_str(s)
    }
}

/// A single entry in the conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Structured data attached by a worker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Worker name for `Role::Worker` entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            payload: None,
            author: None,
            timestamp: Some(Utc::now()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn worker(author: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::with_role(Role::Worker, content);
        msg.author = Some(author.into());
        msg
    }

    /// Attach a structured payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn is_from_worker(&self) -> bool {
        self.role == Role::Worker
    }
}

/// The node that runs next, or the end of the turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node", content = "name", rename_all = "snake_case")]
pub enum NextNode {
    Router,
    Worker(String),
    Finish,
}

impl NextNode {
    pub fn is_finish(&self) -> bool {
        matches!(self, Self::Finish)
    }

    /// Token form used in logs and the router menu.
    pub fn as_token(&self) -> &str {
        match self {
            Self::Router => ROUTER,
            Self::Worker(name) => name,
            Self::Finish => FINISH,
        }
    }
}

impl std::fmt::Display for NextNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_token())
    }
}

/// Shared conversation record threaded through every graph step.
///
/// The transcript is append-only: there is no API to remove, reorder or
/// rewrite entries once pushed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationState {
    session_id: SessionId,
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default)]
    next: Option<NextNode>,
    /// Completed turns on this session.
    #[serde(default)]
    turn: u64,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl ConversationState {
    /// A fresh state with an empty transcript.
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            messages: Vec::new(),
            next: None,
            turn: 0,
            updated_at: None,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn next(&self) -> Option<&NextNode> {
        self.next.as_ref()
    }

    pub fn turn(&self) -> u64 {
        self.turn
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.touch();
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
        self.touch();
    }

    pub fn set_next(&mut self, next: NextNode) {
        self.next = Some(next);
        self.touch();
    }

    /// Mark the end of a turn.
    pub fn complete_turn(&mut self) {
        self.turn += 1;
        self.touch();
    }

    /// Most recent user-authored content, if any.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Messages appended since index `from`.
    pub fn messages_since(&self, from: usize) -> &[Message] {
        self.messages.get(from..).unwrap_or(&[])
    }

    fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

/// What a worker hands back to its adapter.
#[derive(Debug, Clone, Default)]
pub struct WorkerReply {
    pub messages: Vec<Message>,
}

impl WorkerReply {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Single worker-authored text message.
    pub fn text(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::worker(author, content)],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Role for model-facing chat messages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A message sent to an LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        match msg.role {
            Role::User => ChatMessage::user(msg.content.clone()),
            Role::Assistant => ChatMessage::assistant(msg.content.clone()),
            // Providers only know three roles; worker output is attributed inline.
            Role::Worker => {
                let author = msg.author.as_deref().unwrap_or("worker");
                ChatMessage::assistant(format!("[{}] {}", author, msg.content))
            }
            Role::System => ChatMessage::user(format!("[system notice] {}", msg.content)),
        }
    }
}

/// Stop reason from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
}

/// A streaming delta from the LLM.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    /// A chunk of text content.
    TextDelta(String),

    /// The response is complete.
    Stop(StopReason),

    /// Usage information.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },

    /// Message ID from the API.
    MessageId(String),
}

/// Why a turn reached the terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The router selected the finish sentinel (or failed closed).
    Routed,
    /// A one-shot worker completed.
    OneShot,
    /// The step ceiling was hit.
    StepCeiling,
}

/// Graph lifecycle event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum GraphEvent {
    TurnStarted {
        session_id: SessionId,
        turn: u64,
    },
    NodeStarted {
        session_id: SessionId,
        node: String,
        step: usize,
    },
    NodeFinished {
        session_id: SessionId,
        node: String,
        step: usize,
        appended: usize,
        elapsed_ms: u64,
    },
    RouteDecided {
        session_id: SessionId,
        raw: String,
        next: NextNode,
    },
    CeilingReached {
        session_id: SessionId,
        max_steps: usize,
    },
    TurnComplete {
        session_id: SessionId,
        steps: usize,
        termination: Termination,
    },
}
