//! Engine events.
//!
//! The view layer observes the session through one typed event stream
//! (broadcast channel) instead of per-event-name listener registration.
//! Heartbeat acknowledgments are deliberately absent.

use parley_protocol::{ChatMessage, CommandStatus, FileArtifact, HistoryMessage};

use crate::approval::PendingCommandApproval;
use crate::session::PendingQuestion;

/// Identity of an established session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: String,
    pub user_id: String,
    pub interface: String,
    pub resumed: bool,
    pub message_count: Option<u64>,
}

/// Everything the engine reports to the view layer.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    // ========== Connection ==========
    /// Session established (first connect or reconnect).
    Connected(SessionInfo),
    /// The connection ended and no reconnect is scheduled.
    Disconnected { reason: String },
    /// An abnormal closure occurred; a retry is scheduled.
    Reconnecting {
        attempt: u32,
        delay: std::time::Duration,
    },
    /// All reconnection attempts failed; manual reconnect required.
    ReconnectExhausted,

    // ========== Reply streaming ==========
    /// One chunk of streamed reply text.
    StreamChunk {
        request_id: Option<String>,
        text: String,
    },
    /// The reply was finalized (either terminal shape).
    ReplyFinalized(ChatMessage),
    /// The request waits in a backlog.
    ReplyQueued { request_id: String, position: u32 },
    /// Routing notice.
    Routing {
        skill_or_agent: String,
        routing_type: String,
        reason: Option<String>,
    },

    // ========== User interaction ==========
    QuestionAsked(PendingQuestion),
    QuestionAnswered { request_id: String },
    /// A file arrived; suggestions carry `needs_confirmation` and must be
    /// explicitly accepted by the view layer.
    FileOffered(FileArtifact),

    // ========== Command approval ==========
    ApprovalRequested(PendingCommandApproval),
    /// A command-output report went to the remote.
    CommandReported {
        request_id: String,
        status: CommandStatus,
        exit_code: i32,
    },

    // ========== Diagnostics ==========
    RemoteError {
        message: String,
        code: Option<String>,
        available_models: Vec<String>,
    },
    Warning { message: String },

    // ========== Session management ==========
    HistoryReplayed {
        session_id: String,
        messages: Vec<HistoryMessage>,
    },
    /// The remote acknowledged a cancel.
    Cancelled {
        request_id: Option<String>,
        reason: Option<String>,
    },
    SessionClosed { deleted_count: u64 },

    // ========== Outbound queue ==========
    /// A send was buffered because the session was busy.
    InputQueued { id: String },
    /// A buffered send was transmitted.
    InputFlushed { id: String },
}
