//! Inbound message types.
//!
//! Everything the backend can send to a client over the session connection.
//! All messages are tagged with a `type` field; the codec preserves
//! unrecognized tags as [`ServerMessage::Unknown`] instead of rejecting them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Messages (Server -> Client)
// ============================================================================

/// Messages sent from the backend to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    // ========== Session Lifecycle ==========
    /// Session established. Sent once per (re)connect.
    SessionStart {
        session_id: String,
        user_id: String,
        /// Which front end this session serves ("terminal", "browser", ...).
        interface: String,
        /// True when this connection resumed an existing session.
        #[serde(default)]
        resumed: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_count: Option<u64>,
    },

    /// Informational routing notice (which skill or agent took the request).
    Routing {
        skill_or_agent: String,
        routing_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// The request sits in a backlog at the given position.
    Queued { request_id: String, position: u32 },

    // ========== Reply Streaming ==========
    /// One chunk of a streamed reply.
    Stream {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    /// The reply text is complete; final metrics follow in a `response`.
    StreamEnd {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    /// Terminal metrics for a reply. May arrive alone (combined shape) or
    /// after a `stream_end`.
    Response {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tokens_used: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output_tokens: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_tokens_generated: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        generation_time: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },

    // ========== User Interaction ==========
    /// The assistant asks the user something. Some backends send the prompt
    /// under `content` instead of `question`.
    Question {
        request_id: String,
        #[serde(alias = "content")]
        question: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options: Option<Vec<String>>,
    },

    /// Artifact delivery.
    File(FileArtifact),

    /// Artifact suggestion; requires explicit accept by the user.
    FileSuggestion(FileArtifact),

    /// The assistant requests shell execution on the client machine.
    ExecuteCommand {
        request_id: String,
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        working_dir: Option<String>,
        #[serde(default)]
        requires_approval: bool,
    },

    // ========== Diagnostics ==========
    /// Server-reported failure. Does not close the connection.
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        available_models: Vec<String>,
    },

    /// Advisory notice.
    Warning { warning: String },

    // ========== Session Management ==========
    /// Conversation replay in response to a `history` command.
    History {
        session_id: String,
        messages: Vec<HistoryMessage>,
    },

    /// The remote acknowledged a cancel (or cancelled on its own).
    Cancelled {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// The session was closed and deleted on the backend.
    CloseComplete { deleted_count: u64 },

    /// Heartbeat acknowledgment. Never surfaced to the view layer.
    Pong,

    /// An unrecognized message type, preserved for diagnostics.
    ///
    /// Constructed by the codec, never by serde.
    #[serde(skip)]
    Unknown { message_type: String, payload: Value },
}

/// Message kind tags, used as dispatch keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    SessionStart,
    Routing,
    Queued,
    Stream,
    StreamEnd,
    Response,
    Question,
    File,
    FileSuggestion,
    ExecuteCommand,
    Error,
    Warning,
    History,
    Cancelled,
    CloseComplete,
    Pong,
    Unknown,
}

impl ServerMessage {
    /// Returns the dispatch kind for this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::SessionStart { .. } => MessageKind::SessionStart,
            Self::Routing { .. } => MessageKind::Routing,
            Self::Queued { .. } => MessageKind::Queued,
            Self::Stream { .. } => MessageKind::Stream,
            Self::StreamEnd { .. } => MessageKind::StreamEnd,
            Self::Response { .. } => MessageKind::Response,
            Self::Question { .. } => MessageKind::Question,
            Self::File(_) => MessageKind::File,
            Self::FileSuggestion(_) => MessageKind::FileSuggestion,
            Self::ExecuteCommand { .. } => MessageKind::ExecuteCommand,
            Self::Error { .. } => MessageKind::Error,
            Self::Warning { .. } => MessageKind::Warning,
            Self::History { .. } => MessageKind::History,
            Self::Cancelled { .. } => MessageKind::Cancelled,
            Self::CloseComplete { .. } => MessageKind::CloseComplete,
            Self::Pong => MessageKind::Pong,
            Self::Unknown { .. } => MessageKind::Unknown,
        }
    }
}

// ============================================================================
// Supporting types
// ============================================================================

/// A file delivered (or suggested) by the assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileArtifact {
    pub filename: String,
    pub base64_data: String,
    pub mimetype: String,
    /// Where the artifact came from (e.g. "generated", "workspace").
    pub source: String,
    pub confidence: f64,
    /// True for suggestions the user must explicitly accept.
    #[serde(default)]
    pub needs_confirmation: bool,
}

impl FileArtifact {
    /// Decodes the payload bytes.
    pub fn decode_data(&self) -> Result<Vec<u8>, base64::DecodeError> {
        use base64::Engine as _;
        base64::engine::general_purpose::STANDARD.decode(&self.base64_data)
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One entry of a conversation replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
    /// Unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// A finalized assistant reply, assembled from stream chunks plus whichever
/// metrics the terminal `response` reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Request id of the reply, or a generated id when the stream carried none.
    pub id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens_generated: Option<u64>,
    /// Generation wall time in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_time: Option<f64>,
    /// Unix milliseconds.
    pub created_at: i64,
}
