//! Session state and streamed-reply aggregation.
//!
//! Tracks the active sub-state of a connected session and assembles chunked
//! reply text per request id. At most one streaming request is active at a
//! time; a terminal signal finalizes it into an immutable [`ChatMessage`].
//! Both terminal shapes are handled: a combined `response`, or `stream_end`
//! followed later by a separate `response` carrying the metrics.

use log::warn;

use parley_protocol::ChatMessage;

/// User-facing sub-state of a connected session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Streaming,
    AwaitingAnswer,
    AwaitingApproval,
}

/// One in-flight reply, assembled from chunks.
#[derive(Debug, Clone)]
pub struct StreamingRequest {
    /// Absent when the stream never carried a request id.
    pub request_id: Option<String>,
    text: String,
    /// Unix milliseconds.
    pub started_at: i64,
    pub model: Option<String>,
    /// Set by `stream_end`; metrics are still pending.
    text_complete: bool,
}

impl StreamingRequest {
    fn new(request_id: Option<String>) -> Self {
        Self {
            request_id,
            text: String::new(),
            started_at: chrono::Utc::now().timestamp_millis(),
            model: None,
            text_complete: false,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Metrics reported by a terminal `response`.
#[derive(Debug, Clone, Default)]
pub struct ReplyMetrics {
    pub content: Option<String>,
    pub tokens_used: Option<u64>,
    pub output_tokens: Option<u64>,
    pub total_tokens_generated: Option<u64>,
    pub generation_time: Option<f64>,
    pub model: Option<String>,
}

/// A question from the assistant awaiting the user's answer.
#[derive(Debug, Clone)]
pub struct PendingQuestion {
    pub request_id: String,
    pub prompt: String,
    pub options: Option<Vec<String>>,
}

/// Mutable session state. Owned by the engine task; never locked.
#[derive(Debug, Default)]
pub struct SessionState {
    streaming: Option<StreamingRequest>,
    question: Option<PendingQuestion>,
    /// Count of approvals pending in the gateway; drives the phase only.
    approvals_pending: usize,
}

impl SessionState {
    /// Derived sub-state. Approval outranks a pending question, which
    /// outranks an active stream; resolving one restores whatever the prior
    /// sub-state still implies.
    pub fn phase(&self) -> SessionPhase {
        if self.approvals_pending > 0 {
            SessionPhase::AwaitingApproval
        } else if self.question.is_some() {
            SessionPhase::AwaitingAnswer
        } else if self.streaming.is_some() {
            SessionPhase::Streaming
        } else {
            SessionPhase::Idle
        }
    }

    pub fn streaming(&self) -> Option<&StreamingRequest> {
        self.streaming.as_ref()
    }

    pub fn question(&self) -> Option<&PendingQuestion> {
        self.question.as_ref()
    }

    /// Ordinary chat sends are blocked while a reply streams or a question
    /// (or approval) is outstanding.
    pub fn blocks_sends(&self) -> bool {
        self.phase() != SessionPhase::Idle
    }

    /// Appends a chunk, starting a new streaming request implicitly when the
    /// request id changes. No explicit "begin" message exists in the
    /// protocol.
    pub fn append_chunk(&mut self, request_id: Option<String>, content: &str) {
        let matches_current = match (&self.streaming, &request_id) {
            (Some(current), Some(id)) => current.request_id.as_deref() == Some(id.as_str()),
            // A chunk without an id belongs to whatever is active.
            (Some(_), None) => true,
            (None, _) => false,
        };

        if !matches_current {
            if let Some(stale) = &self.streaming {
                warn!(
                    "new stream {:?} replaces unfinished stream {:?}",
                    request_id, stale.request_id
                );
            }
            self.streaming = Some(StreamingRequest::new(request_id));
        }

        if let Some(current) = &mut self.streaming {
            current.text.push_str(content);
        }
    }

    /// Marks the reply text complete; the final metrics arrive separately.
    pub fn end_stream(&mut self, request_id: Option<&str>) {
        match &mut self.streaming {
            Some(current)
                if request_id.is_none() || current.request_id.as_deref() == request_id =>
            {
                current.text_complete = true;
            }
            _ => warn!("stream_end for unknown request {request_id:?}"),
        }
    }

    /// Finalizes the active streaming request with the reported metrics.
    ///
    /// Works for both terminal shapes; when no stream is active (a reply that
    /// never streamed) the response content alone becomes the message.
    pub fn finalize(&mut self, metrics: ReplyMetrics) -> ChatMessage {
        let streaming = self.streaming.take();
        let (id, content) = match streaming {
            Some(req) => {
                let id = req
                    .request_id
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                let content = if req.text.is_empty() {
                    metrics.content.clone().unwrap_or_default()
                } else {
                    req.text
                };
                (id, content)
            }
            None => (
                uuid::Uuid::new_v4().to_string(),
                metrics.content.clone().unwrap_or_default(),
            ),
        };

        ChatMessage {
            id,
            content,
            model: metrics.model,
            tokens_used: metrics.tokens_used,
            output_tokens: metrics.output_tokens,
            total_tokens_generated: metrics.total_tokens_generated,
            generation_time: metrics.generation_time,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Records an inbound question. An active streaming request is left
    /// untouched; only ordinary sends are blocked.
    pub fn set_question(&mut self, question: PendingQuestion) {
        if let Some(stale) = self.question.replace(question) {
            warn!("question {} superseded before it was answered", stale.request_id);
        }
    }

    /// Takes the pending question for answering.
    pub fn take_question(&mut self) -> Option<PendingQuestion> {
        self.question.take()
    }

    /// Clears streaming state after a server-reported error. The error itself
    /// is surfaced by the caller; the connection stays up.
    pub fn clear_streaming(&mut self) {
        self.streaming = None;
    }

    /// Applies a remote `cancelled` acknowledgment: clears any streaming
    /// request or question matching the id. No id clears both.
    pub fn apply_cancelled(&mut self, request_id: Option<&str>) {
        let stream_matches = match (&self.streaming, request_id) {
            (Some(_), None) => true,
            (Some(req), Some(id)) => req.request_id.as_deref() == Some(id),
            (None, _) => false,
        };
        if stream_matches {
            self.streaming = None;
        }

        let question_matches = match (&self.question, request_id) {
            (Some(_), None) => true,
            (Some(q), Some(id)) => q.request_id == id,
            (None, _) => false,
        };
        if question_matches {
            self.question = None;
        }
    }

    pub fn set_approvals_pending(&mut self, count: usize) {
        self.approvals_pending = count;
    }

    /// Drops all per-session state (disconnect or session close).
    pub fn clear(&mut self) {
        self.streaming = None;
        self.question = None;
        self.approvals_pending = 0;
    }
}
