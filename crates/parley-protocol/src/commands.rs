//! Outbound command types.
//!
//! Everything a client can send to the backend. Commands are tagged with a
//! `type` field and serialized one per frame.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Commands sent from the client to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Ordinary chat send.
    Message {
        content: String,
        /// Opaque identifiers of previously uploaded files.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        files: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },

    /// Reply to a pending question.
    Answer { request_id: String, content: String },

    /// Ask the remote to cancel the in-flight request. Cooperative: local
    /// state clears only once the remote acknowledges with `cancelled`.
    Cancel {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Request a conversation replay.
    History,

    /// Close and delete the session on the backend.
    Close { session_id: String },

    /// Report the outcome of a remote-requested command execution.
    CommandOutput {
        request_id: String,
        stdout: String,
        stderr: String,
        exit_code: i32,
        status: CommandStatus,
    },

    /// Heartbeat.
    Ping,
}

/// Outcome classification for a `command_output` report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    /// The command ran to completion (any exit code).
    Completed,
    /// The executor failed to run the command, or it timed out.
    Error,
    /// The user rejected the command; it never ran.
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization() {
        let cmd = ClientCommand::Message {
            content: "Hello".to_string(),
            files: vec!["file-1".to_string()],
            message_id: Some("m-1".to_string()),
            metadata: None,
        };

        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"type\":\"message\""));
        assert!(json.contains("\"content\":\"Hello\""));
        assert!(json.contains("\"files\":[\"file-1\"]"));
        assert!(!json.contains("metadata"));
    }

    #[test]
    fn test_empty_files_omitted() {
        let cmd = ClientCommand::Message {
            content: "hi".to_string(),
            files: Vec::new(),
            message_id: None,
            metadata: None,
        };

        let json = serde_json::to_string(&cmd).unwrap();
        assert!(!json.contains("files"));
    }

    #[test]
    fn test_command_output_status() {
        let cmd = ClientCommand::CommandOutput {
            request_id: "r1".to_string(),
            stdout: String::new(),
            stderr: "rejected".to_string(),
            exit_code: -1,
            status: CommandStatus::Cancelled,
        };

        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"type\":\"command_output\""));
        assert!(json.contains("\"status\":\"cancelled\""));
    }

    #[test]
    fn test_ping_is_bare() {
        let json = serde_json::to_string(&ClientCommand::Ping).unwrap();
        assert_eq!(json, r#"{"type":"ping"}"#);
    }
}
