use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Chat messages ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Body posted to the relay's `/api/chat` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(rename = "webSearch", default)]
    pub web_search: bool,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self { model: model.into(), messages, web_search: false }
    }

    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.web_search = enabled;
        self
    }
}

// ── Model catalog ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

// ── Per-slot stream state ─────────────────────────────────────────────────────

/// Stable identifier of a fan-out panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PanelId(pub u32);

impl std::fmt::Display for PanelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "panel-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Idle,
    Loading,
    Streaming,
    Done,
    Error,
}

impl StreamStatus {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, StreamStatus::Loading | StreamStatus::Streaming)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamStatus::Done | StreamStatus::Error)
    }
}

/// Accumulated output of one model call.
///
/// Status only moves forward (`idle → loading → streaming → done|error`);
/// out-of-order transitions are ignored. [`StreamState::begin`] is the only
/// way back, and it discards the previous call's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamState {
    pub slot: PanelId,
    pub accumulated_text: String,
    pub status: StreamStatus,
    pub error_detail: Option<String>,
}

impl StreamState {
    pub fn new(slot: PanelId) -> Self {
        Self {
            slot,
            accumulated_text: String::new(),
            status: StreamStatus::Idle,
            error_detail: None,
        }
    }

    pub fn begin(&mut self) {
        self.accumulated_text.clear();
        self.error_detail = None;
        self.status = StreamStatus::Loading;
    }

    pub fn mark_streaming(&mut self) {
        if self.status == StreamStatus::Loading {
            self.status = StreamStatus::Streaming;
        }
    }

    pub fn push_delta(&mut self, fragment: &str) {
        if self.status.is_in_flight() {
            self.status = StreamStatus::Streaming;
            self.accumulated_text.push_str(fragment);
        }
    }

    pub fn complete(&mut self, full_text: String) {
        if self.status.is_in_flight() {
            self.accumulated_text = full_text;
            self.status = StreamStatus::Done;
        }
    }

    pub fn fail(&mut self, detail: impl Into<String>) {
        if self.status.is_in_flight() {
            self.error_detail = Some(detail.into());
            self.status = StreamStatus::Error;
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.slot);
    }

    /// What a panel shows: the response text, or the error in its place.
    pub fn display_text(&self) -> String {
        match (&self.status, &self.error_detail) {
            (StreamStatus::Error, Some(detail)) => format!("Error: {detail}"),
            _ => self.accumulated_text.clone(),
        }
    }
}

// ── Dialogue ──────────────────────────────────────────────────────────────────

/// Which participant slot is speaking. Identity is the slot, not the model id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DialogueSlot {
    A,
    B,
}

impl DialogueSlot {
    /// A speaks on even 0-based turn indices, B on odd.
    pub fn for_turn(turn_index: u32) -> Self {
        if turn_index % 2 == 0 {
            DialogueSlot::A
        } else {
            DialogueSlot::B
        }
    }

    pub fn other(&self) -> Self {
        match self {
            DialogueSlot::A => DialogueSlot::B,
            DialogueSlot::B => DialogueSlot::A,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Speaker {
    User,
    A,
    B,
    SystemError,
}

impl From<DialogueSlot> for Speaker {
    fn from(slot: DialogueSlot) -> Self {
        match slot {
            DialogueSlot::A => Speaker::A,
            DialogueSlot::B => Speaker::B,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DialogueTurnRecord {
    /// 0 for the seed prompt, then 1-based per completed turn.
    pub turn_index: u32,
    pub speaker: Speaker,
    pub model_id: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl DialogueTurnRecord {
    pub fn seed(prompt: impl Into<String>) -> Self {
        Self {
            turn_index: 0,
            speaker: Speaker::User,
            model_id: None,
            content: prompt.into(),
            created_at: Utc::now(),
        }
    }

    pub fn turn(turn_index: u32, slot: DialogueSlot, model_id: &str, content: String) -> Self {
        Self {
            turn_index,
            speaker: slot.into(),
            model_id: Some(model_id.to_string()),
            content,
            created_at: Utc::now(),
        }
    }

    pub fn error(turn_index: u32, message: &str) -> Self {
        Self {
            turn_index,
            speaker: Speaker::SystemError,
            model_id: None,
            content: format!("Error: {message}"),
            created_at: Utc::now(),
        }
    }
}

pub const MIN_DIALOGUE_TURNS: u32 = 1;
pub const MAX_DIALOGUE_TURNS: u32 = 50;
pub const DEFAULT_DIALOGUE_TURNS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueConfig {
    pub model_a: String,
    pub model_b: String,
    pub initial_prompt: String,
    pub max_turns: u32,
}

impl DialogueConfig {
    pub fn new(
        model_a: impl Into<String>,
        model_b: impl Into<String>,
        initial_prompt: impl Into<String>,
    ) -> Self {
        Self {
            model_a: model_a.into(),
            model_b: model_b.into(),
            initial_prompt: initial_prompt.into(),
            max_turns: DEFAULT_DIALOGUE_TURNS,
        }
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Checks required fields and returns a copy with the prompt trimmed and
    /// `max_turns` clamped into the supported range.
    pub fn validated(&self) -> Result<Self, crate::errors::AppError> {
        use crate::errors::AppError;

        if self.model_a.trim().is_empty() {
            return Err(AppError::empty_field("model_a"));
        }
        if self.model_b.trim().is_empty() {
            return Err(AppError::empty_field("model_b"));
        }
        let prompt = self.initial_prompt.trim();
        if prompt.is_empty() {
            return Err(AppError::empty_field("initial_prompt"));
        }
        Ok(Self {
            model_a: self.model_a.trim().to_string(),
            model_b: self.model_b.trim().to_string(),
            initial_prompt: prompt.to_string(),
            max_turns: self.max_turns.clamp(MIN_DIALOGUE_TURNS, MAX_DIALOGUE_TURNS),
        })
    }

    pub fn model_for(&self, slot: DialogueSlot) -> &str {
        match slot {
            DialogueSlot::A => &self.model_a,
            DialogueSlot::B => &self.model_b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogueStatus {
    Idle,
    Running,
    Completed,
    Stopped,
    Errored,
}

impl DialogueStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, DialogueStatus::Running)
    }
}
