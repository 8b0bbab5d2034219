//! Wire protocol for Parley chat sessions.
//!
//! Defines the typed message unions exchanged between a client and the
//! assistant backend over a persistent connection, plus the codec that
//! turns raw frames into them. Unknown message types survive decoding as
//! inert records; malformed frames surface as errors for the caller to
//! log and drop.

pub mod codec;
pub mod commands;
pub mod messages;

pub use codec::{ProtocolError, decode, encode};
pub use commands::{ClientCommand, CommandStatus};
pub use messages::{
    ChatMessage, FileArtifact, HistoryMessage, MessageKind, Role, ServerMessage,
};
