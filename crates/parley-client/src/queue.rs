//! Outbound input queue.
//!
//! User sends submitted while a reply is streaming (or a question is
//! pending) are buffered here and replayed, strictly in submission order,
//! once the session returns to idle.

use std::collections::VecDeque;

/// One buffered user send.
#[derive(Debug, Clone)]
pub struct QueuedInput {
    pub id: String,
    pub content: String,
    pub files: Vec<String>,
    /// Unix milliseconds.
    pub enqueued_at: i64,
}

/// FIFO buffer of blocked sends.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    inputs: VecDeque<QueuedInput>,
}

impl OutboundQueue {
    /// Buffers a send and returns its assigned id.
    pub fn enqueue(&mut self, content: String, files: Vec<String>) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.inputs.push_back(QueuedInput {
            id: id.clone(),
            content,
            files,
            enqueued_at: chrono::Utc::now().timestamp_millis(),
        });
        id
    }

    /// Drains every buffered input in FIFO order.
    pub fn drain(&mut self) -> Vec<QueuedInput> {
        self.inputs.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }
}
