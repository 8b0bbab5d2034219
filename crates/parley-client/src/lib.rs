//! Realtime chat session engine for Parley clients.
//!
//! One engine serves both the terminal and browser front ends: view layers
//! drive it through an [`EngineHandle`] and render the [`EngineEvent`]
//! stream. The engine owns the connection lifecycle (heartbeat, exponential
//! backoff reconnection), inbound dispatch, streamed-reply aggregation,
//! command-execution approval gating, and the outbound input queue.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use parley_client::{ClientConfig, Engine, LocalExecutor, WsTransport};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = ClientConfig::load(None)?;
//! let handle = Engine::spawn(
//!     config,
//!     Arc::new(WsTransport),
//!     Arc::new(LocalExecutor::new()),
//! );
//!
//! let mut events = handle.subscribe();
//! let session = handle.connect().await?;
//! println!("connected to session {}", session.session_id);
//!
//! handle.send("hello").await?;
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod approval;
pub mod config;
pub mod conn;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod queue;
pub mod session;
pub mod transport;

pub use approval::{ApprovalGateway, GateDecision, PendingCommandApproval};
pub use config::{ClientConfig, DangerConfig, ExecConfig, ReconnectConfig};
pub use conn::{Connection, ConnectionStatus, ReconnectPolicy};
pub use engine::{Engine, EngineHandle};
pub use error::{EngineError, EngineResult, TransportError};
pub use events::{EngineEvent, SessionInfo};
pub use executor::{CommandExecutor, ExecOutcome, ExecRequest, LocalExecutor};
pub use queue::{OutboundQueue, QueuedInput};
pub use session::{PendingQuestion, SessionPhase, SessionState, StreamingRequest};
pub use transport::{ConnectTarget, Transport, TransportEvent, TransportLink, WsTransport};
