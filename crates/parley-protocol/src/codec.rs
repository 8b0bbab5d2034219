//! Frame codec.
//!
//! [`decode`] keeps three cases apart: a known message parses into its typed
//! variant, an unrecognized `type` tag is preserved as
//! [`ServerMessage::Unknown`], and a frame that fails to parse at all is an
//! error the caller logs and drops. The connection survives all three.

use serde_json::Value;
use thiserror::Error;

use crate::commands::ClientCommand;
use crate::messages::ServerMessage;

/// Errors produced by the codec.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON, lacks a `type` tag, or a known type
    /// carried malformed fields.
    #[error("malformed frame: {0}")]
    Parse(String),

    /// A command failed to serialize.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Type tags the client understands. Anything else decodes as `Unknown`.
const KNOWN_TYPES: &[&str] = &[
    "session_start",
    "routing",
    "queued",
    "stream",
    "stream_end",
    "response",
    "question",
    "file",
    "file_suggestion",
    "execute_command",
    "error",
    "warning",
    "history",
    "cancelled",
    "close_complete",
    "pong",
];

/// Decodes one raw frame into a typed message.
pub fn decode(raw: &str) -> Result<ServerMessage, ProtocolError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ProtocolError::Parse(e.to_string()))?;

    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::Parse("missing type tag".to_string()))?
        .to_string();

    if !KNOWN_TYPES.contains(&tag.as_str()) {
        return Ok(ServerMessage::Unknown {
            message_type: tag,
            payload: value,
        });
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::Parse(format!("{tag}: {e}")))
}

/// Serializes one command into a raw frame.
pub fn encode(command: &ClientCommand) -> Result<String, ProtocolError> {
    serde_json::to_string(command).map_err(ProtocolError::Encode)
}
