//! Engine error types.

use thiserror::Error;

use parley_protocol::ProtocolError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the transport layer.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The transport could not be opened.
    #[error("connect failed: {0}")]
    Connect(String),

    /// An open transport failed while sending.
    #[error("send failed: {0}")]
    Send(String),
}

/// Errors returned to callers of the engine handle.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// The operation needs an established session.
    #[error("not connected")]
    NotConnected,

    /// A connect is already being negotiated.
    #[error("connect already in progress")]
    ConnectInProgress,

    /// All reconnection attempts failed; a manual reconnect is required.
    #[error("reconnect attempts exhausted")]
    ReconnectExhausted,

    /// `answer` was called with no question pending.
    #[error("no pending question to answer")]
    NoPendingQuestion,

    /// `approve`/`reject` named a request with no pending approval.
    #[error("no pending approval for request {0}")]
    NoPendingApproval(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The engine task is gone.
    #[error("engine stopped")]
    Stopped,
}
