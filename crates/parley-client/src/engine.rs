//! The session engine.
//!
//! One task owns all mutable session state and drives everything from a
//! single `select!` loop: inbound transport events, user commands, executor
//! completions, the heartbeat interval, and the reconnection backoff timer.
//! Dispatches never interleave their own mutations, so no state is locked.
//!
//! The view layer talks to the engine through an [`EngineHandle`] and
//! observes it through the [`EngineEvent`] broadcast stream.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

use parley_protocol::{ClientCommand, CommandStatus, MessageKind, ServerMessage};

use crate::approval::{ApprovalGateway, GateDecision, PendingCommandApproval};
use crate::config::ClientConfig;
use crate::conn::{Connection, ConnectionStatus};
use crate::dispatch::Dispatcher;
use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, SessionInfo};
use crate::executor::{CommandExecutor, ExecRequest};
use crate::queue::OutboundQueue;
use crate::session::{PendingQuestion, ReplyMetrics, SessionState};
use crate::transport::{ConnectTarget, Transport, TransportEvent, TransportLink};

/// Size of the event broadcast buffer.
const EVENT_BUFFER_SIZE: usize = 256;

/// Size of the user command buffer.
const COMMAND_BUFFER_SIZE: usize = 64;

// ============================================================================
// Handle
// ============================================================================

/// Cloneable handle to a running engine task.
#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<UserCommand>,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl EngineHandle {
    /// Subscribes to the engine event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Opens the transport and resolves once the session is established.
    pub async fn connect(&self) -> EngineResult<SessionInfo> {
        self.request(|ack| UserCommand::Connect { ack }).await
    }

    /// Gracefully closes the connection and suppresses auto-reconnect.
    pub async fn disconnect(&self) -> EngineResult<()> {
        self.request(|ack| UserCommand::Disconnect { ack }).await
    }

    /// Sends a chat message, or buffers it while a reply is in flight.
    pub async fn send(&self, content: impl Into<String>) -> EngineResult<()> {
        self.send_with_files(content, Vec::new()).await
    }

    /// Sends a chat message referencing previously uploaded files.
    pub async fn send_with_files(
        &self,
        content: impl Into<String>,
        files: Vec<String>,
    ) -> EngineResult<()> {
        let content = content.into();
        self.request(|ack| UserCommand::SendChat {
            content,
            files,
            ack,
        })
        .await
    }

    /// Answers the pending question.
    pub async fn answer(&self, content: impl Into<String>) -> EngineResult<()> {
        let content = content.into();
        self.request(|ack| UserCommand::Answer { content, ack }).await
    }

    /// Asks the remote to cancel the in-flight request. Cooperative: local
    /// state clears only when the remote acknowledges.
    pub async fn cancel(&self, reason: Option<String>) -> EngineResult<()> {
        self.request(|ack| UserCommand::Cancel { reason, ack }).await
    }

    /// Approves a pending command execution.
    pub async fn approve(&self, request_id: impl Into<String>) -> EngineResult<()> {
        let request_id = request_id.into();
        self.request(|ack| UserCommand::Approve { request_id, ack })
            .await
    }

    /// Rejects a pending command execution; the executor is never invoked.
    pub async fn reject(&self, request_id: impl Into<String>) -> EngineResult<()> {
        let request_id = request_id.into();
        self.request(|ack| UserCommand::Reject { request_id, ack })
            .await
    }

    /// Requests a conversation replay.
    pub async fn request_history(&self) -> EngineResult<()> {
        self.request(|ack| UserCommand::RequestHistory { ack }).await
    }

    /// Closes and deletes the session on the backend.
    pub async fn close_session(&self) -> EngineResult<()> {
        self.request(|ack| UserCommand::CloseSession { ack }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<EngineResult<T>>) -> UserCommand,
    ) -> EngineResult<T> {
        let (ack, response) = oneshot::channel();
        self.cmd_tx
            .send(build(ack))
            .await
            .map_err(|_| EngineError::Stopped)?;
        response.await.map_err(|_| EngineError::Stopped)?
    }
}

enum UserCommand {
    Connect {
        ack: oneshot::Sender<EngineResult<SessionInfo>>,
    },
    Disconnect {
        ack: oneshot::Sender<EngineResult<()>>,
    },
    SendChat {
        content: String,
        files: Vec<String>,
        ack: oneshot::Sender<EngineResult<()>>,
    },
    Answer {
        content: String,
        ack: oneshot::Sender<EngineResult<()>>,
    },
    Cancel {
        reason: Option<String>,
        ack: oneshot::Sender<EngineResult<()>>,
    },
    Approve {
        request_id: String,
        ack: oneshot::Sender<EngineResult<()>>,
    },
    Reject {
        request_id: String,
        ack: oneshot::Sender<EngineResult<()>>,
    },
    RequestHistory {
        ack: oneshot::Sender<EngineResult<()>>,
    },
    CloseSession {
        ack: oneshot::Sender<EngineResult<()>>,
    },
}

/// Outcome of a spawned command execution, fed back into the engine loop.
struct ExecReport {
    request_id: String,
    stdout: String,
    stderr: String,
    exit_code: i32,
    status: CommandStatus,
}

// ============================================================================
// Engine state
// ============================================================================

/// Everything the inbound handlers mutate.
struct EngineCore {
    config: ClientConfig,
    conn: Connection,
    session: SessionState,
    queue: OutboundQueue,
    gateway: ApprovalGateway,
    events: broadcast::Sender<EngineEvent>,
    /// Raw frame sender of the current link; dropping it closes the socket.
    outbound: Option<mpsc::Sender<String>>,
    exec_tx: mpsc::Sender<ExecReport>,
    executor: Arc<dyn CommandExecutor>,
    /// Resolved by the next `session_start` (or terminal failure).
    connect_ack: Option<oneshot::Sender<EngineResult<SessionInfo>>>,
    last_session: Option<SessionInfo>,
}

impl EngineCore {
    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    /// Encodes and queues one outbound frame. Never blocks the loop.
    fn send_command(&self, command: &ClientCommand) {
        let Some(outbound) = &self.outbound else {
            warn!("dropping outbound command while disconnected");
            return;
        };
        match parley_protocol::encode(command) {
            Ok(frame) => {
                if outbound.try_send(frame).is_err() {
                    warn!("outbound buffer full, frame dropped");
                }
            }
            Err(e) => warn!("failed to encode command: {e}"),
        }
    }

    fn send_chat_now(&self, content: String, files: Vec<String>, message_id: String) {
        self.send_command(&ClientCommand::Message {
            content,
            files,
            message_id: Some(message_id),
            metadata: None,
        });
    }

    /// Replays buffered sends once the session is idle again.
    fn maybe_flush(&mut self) {
        if !self.conn.is_connected() || self.session.blocks_sends() {
            return;
        }
        for input in self.queue.drain() {
            debug!("flushing queued input {}", input.id);
            self.send_chat_now(input.content, input.files, input.id.clone());
            self.emit(EngineEvent::InputFlushed { id: input.id });
        }
    }

    /// Runs a command on the executor without blocking the engine loop; the
    /// report re-enters through the exec channel.
    fn spawn_execution(&self, pending: PendingCommandApproval) {
        let request = ExecRequest {
            id: pending.request_id.clone(),
            command: pending.command.clone(),
            cwd: self.config.resolve_working_dir(pending.working_dir.as_deref()),
            timeout: self.config.exec_timeout(),
            env: HashMap::new(),
        };
        let executor = Arc::clone(&self.executor);
        let exec_tx = self.exec_tx.clone();
        let request_id = pending.request_id;

        tokio::spawn(async move {
            let report = match executor.execute(request).await {
                Ok(outcome) => {
                    let status = if outcome.timed_out || outcome.killed {
                        CommandStatus::Error
                    } else {
                        CommandStatus::Completed
                    };
                    let mut stderr = outcome.stderr;
                    if outcome.timed_out {
                        stderr.push_str("\n(command timed out)");
                    }
                    ExecReport {
                        request_id,
                        stdout: outcome.stdout,
                        stderr,
                        exit_code: outcome.exit_code,
                        status,
                    }
                }
                Err(e) => ExecReport {
                    request_id,
                    stdout: String::new(),
                    stderr: format!("executor failed: {e}"),
                    exit_code: -1,
                    status: CommandStatus::Error,
                },
            };
            let _ = exec_tx.send(report).await;
        });
    }

    fn report_command(&self, report: ExecReport) {
        self.send_command(&ClientCommand::CommandOutput {
            request_id: report.request_id.clone(),
            stdout: report.stdout,
            stderr: report.stderr,
            exit_code: report.exit_code,
            status: report.status,
        });
        self.emit(EngineEvent::CommandReported {
            request_id: report.request_id,
            status: report.status,
            exit_code: report.exit_code,
        });
    }

    fn resolve_connect_ack(&mut self, result: EngineResult<SessionInfo>) {
        if let Some(ack) = self.connect_ack.take() {
            let _ = ack.send(result);
        }
    }

    // ========== Inbound handlers ==========

    fn on_session_start(
        &mut self,
        session_id: String,
        user_id: String,
        interface: String,
        resumed: bool,
        message_count: Option<u64>,
    ) {
        info!("session {session_id} established (resumed: {resumed})");
        self.conn.established(session_id.clone());
        let session = SessionInfo {
            session_id,
            user_id,
            interface,
            resumed,
            message_count,
        };
        self.last_session = Some(session.clone());
        self.emit(EngineEvent::Connected(session.clone()));
        self.resolve_connect_ack(Ok(session));
        self.maybe_flush();
    }

    fn on_response(&mut self, metrics: ReplyMetrics) {
        let message = self.session.finalize(metrics);
        self.emit(EngineEvent::ReplyFinalized(message));
        self.maybe_flush();
    }

    fn on_execute_command(
        &mut self,
        request_id: String,
        command: String,
        working_dir: Option<String>,
        requires_approval: bool,
    ) {
        let pending = PendingCommandApproval {
            request_id,
            command,
            working_dir,
            requires_approval,
        };
        match self.gateway.gate(&pending.command, requires_approval) {
            GateDecision::RunNow => self.spawn_execution(pending),
            GateDecision::RequireApproval => {
                self.gateway.park(pending.clone());
                self.session
                    .set_approvals_pending(self.gateway.pending_count());
                self.emit(EngineEvent::ApprovalRequested(pending));
            }
        }
    }

    fn on_error(&mut self, message: String, code: Option<String>, available_models: Vec<String>) {
        self.session.clear_streaming();
        self.emit(EngineEvent::RemoteError {
            message,
            code,
            available_models,
        });
        self.maybe_flush();
    }

    fn on_cancelled(&mut self, request_id: Option<String>, reason: Option<String>) {
        self.session.apply_cancelled(request_id.as_deref());
        self.emit(EngineEvent::Cancelled { request_id, reason });
        self.maybe_flush();
    }

    /// Drops connection-scoped state after the link goes away.
    fn drop_link_state(&mut self) {
        self.outbound = None;
        self.session.clear();
        self.gateway.clear();
        self.queue.drain();
    }
}

// ============================================================================
// Engine task
// ============================================================================

/// The engine task: owns the core, the dispatcher, and the loop plumbing.
pub struct Engine {
    core: EngineCore,
    dispatcher: Dispatcher<EngineCore>,
    transport: Arc<dyn Transport>,
    cmd_rx: mpsc::Receiver<UserCommand>,
    exec_rx: mpsc::Receiver<ExecReport>,
    link_rx: Option<mpsc::Receiver<TransportEvent>>,
    /// Deadline of the scheduled reconnection attempt, if any.
    reconnect_at: Option<Instant>,
}

impl Engine {
    /// Spawns the engine task and returns its handle.
    pub fn spawn(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        executor: Arc<dyn CommandExecutor>,
    ) -> EngineHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER_SIZE);
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        let (exec_tx, exec_rx) = mpsc::channel(COMMAND_BUFFER_SIZE);

        let core = EngineCore {
            conn: Connection::new(&config.reconnect),
            gateway: ApprovalGateway::new(&config.danger),
            session: SessionState::default(),
            queue: OutboundQueue::default(),
            events: event_tx.clone(),
            outbound: None,
            exec_tx,
            executor,
            connect_ack: None,
            last_session: None,
            config,
        };

        let engine = Self {
            core,
            dispatcher: default_dispatcher(),
            transport,
            cmd_rx,
            exec_rx,
            link_rx: None,
            reconnect_at: None,
        };

        tokio::spawn(engine.run());

        EngineHandle { cmd_tx, event_tx }
    }

    async fn run(mut self) {
        let mut heartbeat = tokio::time::interval(self.core.config.heartbeat_interval());
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The interval's first tick completes immediately; consume it so the
        // first ping goes out one full period after connect.
        heartbeat.tick().await;

        loop {
            tokio::select! {
                maybe_cmd = self.cmd_rx.recv() => match maybe_cmd {
                    Some(cmd) => self.handle_user_command(cmd).await,
                    // All handles dropped; the engine winds down.
                    None => break,
                },

                maybe_event = recv_link(&mut self.link_rx) => match maybe_event {
                    Some(TransportEvent::Frame(raw)) => self.handle_frame(&raw),
                    Some(TransportEvent::Closed { abnormal, reason }) => {
                        self.handle_closed(abnormal, reason);
                    }
                    None => self.handle_closed(true, "transport channel dropped".to_string()),
                },

                Some(report) = self.exec_rx.recv() => self.core.report_command(report),

                _ = heartbeat.tick(), if self.core.conn.is_connected() => {
                    self.core.send_command(&ClientCommand::Ping);
                }

                _ = tokio::time::sleep_until(self.reconnect_at.unwrap_or_else(Instant::now)),
                    if self.reconnect_at.is_some() =>
                {
                    self.attempt_reconnect().await;
                }
            }
        }
    }

    fn target(&self) -> ConnectTarget {
        ConnectTarget {
            url: self.core.config.url.clone(),
            identity: self.core.config.identity.clone(),
            credential: self.core.config.credential.clone(),
        }
    }

    fn install_link(&mut self, link: TransportLink) {
        self.core.outbound = Some(link.tx);
        self.link_rx = Some(link.rx);
    }

    fn handle_frame(&mut self, raw: &str) {
        match parley_protocol::decode(raw) {
            Ok(message) => self.dispatcher.dispatch(&mut self.core, message),
            // Malformed frames are dropped; the connection survives.
            Err(e) => warn!("dropping malformed frame: {e}"),
        }
    }

    fn handle_closed(&mut self, abnormal: bool, reason: String) {
        self.link_rx = None;
        let was_manual = self.core.conn.manual_close;
        self.core.drop_link_state();

        if was_manual {
            debug!("link closed after manual disconnect");
            return;
        }

        if abnormal {
            info!("abnormal closure: {reason}");
            self.schedule_reconnect();
        } else {
            info!("connection closed: {reason}");
            self.core.conn.reset();
            self.core
                .resolve_connect_ack(Err(EngineError::NotConnected));
            self.core.emit(EngineEvent::Disconnected { reason });
        }
    }

    /// Schedules the next reconnection attempt. Re-entrant calls while one is
    /// already scheduled are no-ops.
    fn schedule_reconnect(&mut self) {
        if self.reconnect_at.is_some() {
            return;
        }
        self.core.conn.status = ConnectionStatus::Reconnecting;

        match self.core.conn.next_attempt() {
            Some((attempt, delay)) => {
                info!("reconnect attempt {attempt} in {delay:?}");
                self.core.emit(EngineEvent::Reconnecting { attempt, delay });
                self.reconnect_at = Some(Instant::now() + delay);
            }
            None => {
                warn!("reconnect attempts exhausted");
                self.core.conn.status = ConnectionStatus::Errored;
                self.core
                    .resolve_connect_ack(Err(EngineError::ReconnectExhausted));
                self.core.emit(EngineEvent::ReconnectExhausted);
            }
        }
    }

    async fn attempt_reconnect(&mut self) {
        self.reconnect_at = None;
        match self.transport.open(&self.target()).await {
            Ok(link) => {
                self.install_link(link);
                // Connected only once the next session_start arrives.
                self.core.conn.status = ConnectionStatus::Connecting;
            }
            Err(e) => {
                warn!("reconnect failed: {e}");
                self.schedule_reconnect();
            }
        }
    }

    async fn handle_user_command(&mut self, command: UserCommand) {
        match command {
            UserCommand::Connect { ack } => self.do_connect(ack).await,
            UserCommand::Disconnect { ack } => {
                self.do_disconnect();
                let _ = ack.send(Ok(()));
            }
            UserCommand::SendChat {
                content,
                files,
                ack,
            } => {
                let result = self.do_send_chat(content, files);
                let _ = ack.send(result);
            }
            UserCommand::Answer { content, ack } => {
                let result = self.do_answer(content);
                let _ = ack.send(result);
            }
            UserCommand::Cancel { reason, ack } => {
                let result = self.do_cancel(reason);
                let _ = ack.send(result);
            }
            UserCommand::Approve { request_id, ack } => {
                let result = self.do_approve(&request_id);
                let _ = ack.send(result);
            }
            UserCommand::Reject { request_id, ack } => {
                let result = self.do_reject(&request_id);
                let _ = ack.send(result);
            }
            UserCommand::RequestHistory { ack } => {
                let result = self.connected_then(|core| {
                    core.send_command(&ClientCommand::History);
                });
                let _ = ack.send(result);
            }
            UserCommand::CloseSession { ack } => {
                let result = match self.core.conn.session_id.clone() {
                    Some(session_id) if self.core.conn.is_connected() => {
                        self.core
                            .send_command(&ClientCommand::Close { session_id });
                        Ok(())
                    }
                    _ => Err(EngineError::NotConnected),
                };
                let _ = ack.send(result);
            }
        }
    }

    async fn do_connect(&mut self, ack: oneshot::Sender<EngineResult<SessionInfo>>) {
        match self.core.conn.status {
            ConnectionStatus::Connected => {
                let result = self
                    .core
                    .last_session
                    .clone()
                    .ok_or(EngineError::NotConnected);
                let _ = ack.send(result);
            }
            ConnectionStatus::Connecting | ConnectionStatus::Reconnecting => {
                if self.core.connect_ack.is_some() {
                    let _ = ack.send(Err(EngineError::ConnectInProgress));
                } else {
                    self.core.connect_ack = Some(ack);
                }
            }
            ConnectionStatus::Disconnected | ConnectionStatus::Errored => {
                self.core.conn.begin_connect();
                match self.transport.open(&self.target()).await {
                    Ok(link) => {
                        self.install_link(link);
                        self.core.connect_ack = Some(ack);
                    }
                    Err(e) => {
                        self.core.conn.reset();
                        let _ = ack.send(Err(e.into()));
                    }
                }
            }
        }
    }

    fn do_disconnect(&mut self) {
        self.core.conn.manual_close = true;
        self.reconnect_at = None;
        self.link_rx = None;
        self.core.drop_link_state();
        self.core.conn.reset();
        self.core
            .resolve_connect_ack(Err(EngineError::NotConnected));
        self.core.emit(EngineEvent::Disconnected {
            reason: "disconnected by client".to_string(),
        });
    }

    fn do_send_chat(&mut self, content: String, files: Vec<String>) -> EngineResult<()> {
        if !self.core.conn.is_connected() {
            return Err(EngineError::NotConnected);
        }
        if self.core.session.blocks_sends() {
            let id = self.core.queue.enqueue(content, files);
            debug!("send blocked, queued as {id}");
            self.core.emit(EngineEvent::InputQueued { id });
            return Ok(());
        }
        let message_id = uuid::Uuid::new_v4().to_string();
        self.core.send_chat_now(content, files, message_id);
        Ok(())
    }

    fn do_answer(&mut self, content: String) -> EngineResult<()> {
        if !self.core.conn.is_connected() {
            return Err(EngineError::NotConnected);
        }
        let question = self
            .core
            .session
            .take_question()
            .ok_or(EngineError::NoPendingQuestion)?;
        self.core.send_command(&ClientCommand::Answer {
            request_id: question.request_id.clone(),
            content,
        });
        self.core.emit(EngineEvent::QuestionAnswered {
            request_id: question.request_id,
        });
        self.core.maybe_flush();
        Ok(())
    }

    fn do_cancel(&mut self, reason: Option<String>) -> EngineResult<()> {
        if !self.core.conn.is_connected() {
            return Err(EngineError::NotConnected);
        }
        // Target the active stream, else the pending question. Local state
        // clears only on the remote's `cancelled` acknowledgment.
        let request_id = self
            .core
            .session
            .streaming()
            .and_then(|s| s.request_id.clone())
            .or_else(|| self.core.session.question().map(|q| q.request_id.clone()));
        self.core
            .send_command(&ClientCommand::Cancel { request_id, reason });
        Ok(())
    }

    fn do_approve(&mut self, request_id: &str) -> EngineResult<()> {
        let pending = self
            .core
            .gateway
            .take(request_id)
            .ok_or_else(|| EngineError::NoPendingApproval(request_id.to_string()))?;
        self.core
            .session
            .set_approvals_pending(self.core.gateway.pending_count());
        self.core.spawn_execution(pending);
        self.core.maybe_flush();
        Ok(())
    }

    fn do_reject(&mut self, request_id: &str) -> EngineResult<()> {
        let pending = self
            .core
            .gateway
            .take(request_id)
            .ok_or_else(|| EngineError::NoPendingApproval(request_id.to_string()))?;
        self.core
            .session
            .set_approvals_pending(self.core.gateway.pending_count());
        // The executor is never invoked for a rejected command.
        self.core.report_command(ExecReport {
            request_id: pending.request_id,
            stdout: String::new(),
            stderr: "command rejected by user".to_string(),
            exit_code: -1,
            status: CommandStatus::Cancelled,
        });
        self.core.maybe_flush();
        Ok(())
    }

    fn connected_then(&mut self, action: impl FnOnce(&mut EngineCore)) -> EngineResult<()> {
        if !self.core.conn.is_connected() {
            return Err(EngineError::NotConnected);
        }
        action(&mut self.core);
        Ok(())
    }
}

async fn recv_link(
    link: &mut Option<mpsc::Receiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match link {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// Inbound handler registry
// ============================================================================

fn default_dispatcher() -> Dispatcher<EngineCore> {
    let mut d: Dispatcher<EngineCore> = Dispatcher::new();

    d.register(
        MessageKind::SessionStart,
        Box::new(|core, msg| {
            if let ServerMessage::SessionStart {
                session_id,
                user_id,
                interface,
                resumed,
                message_count,
            } = msg
            {
                core.on_session_start(session_id, user_id, interface, resumed, message_count);
            }
            Ok(())
        }),
    );

    d.register(
        MessageKind::Routing,
        Box::new(|core, msg| {
            if let ServerMessage::Routing {
                skill_or_agent,
                routing_type,
                reason,
            } = msg
            {
                core.emit(EngineEvent::Routing {
                    skill_or_agent,
                    routing_type,
                    reason,
                });
            }
            Ok(())
        }),
    );

    d.register(
        MessageKind::Queued,
        Box::new(|core, msg| {
            if let ServerMessage::Queued {
                request_id,
                position,
            } = msg
            {
                core.emit(EngineEvent::ReplyQueued {
                    request_id,
                    position,
                });
            }
            Ok(())
        }),
    );

    d.register(
        MessageKind::Stream,
        Box::new(|core, msg| {
            if let ServerMessage::Stream {
                content,
                request_id,
            } = msg
            {
                core.session.append_chunk(request_id.clone(), &content);
                core.emit(EngineEvent::StreamChunk {
                    request_id,
                    text: content,
                });
            }
            Ok(())
        }),
    );

    d.register(
        MessageKind::StreamEnd,
        Box::new(|core, msg| {
            if let ServerMessage::StreamEnd { request_id } = msg {
                core.session.end_stream(request_id.as_deref());
            }
            Ok(())
        }),
    );

    d.register(
        MessageKind::Response,
        Box::new(|core, msg| {
            if let ServerMessage::Response {
                content,
                source: _,
                tokens_used,
                output_tokens,
                total_tokens_generated,
                generation_time,
                model,
            } = msg
            {
                core.on_response(ReplyMetrics {
                    content,
                    tokens_used,
                    output_tokens,
                    total_tokens_generated,
                    generation_time,
                    model,
                });
            }
            Ok(())
        }),
    );

    d.register(
        MessageKind::Question,
        Box::new(|core, msg| {
            if let ServerMessage::Question {
                request_id,
                question,
                options,
            } = msg
            {
                let pending = PendingQuestion {
                    request_id,
                    prompt: question,
                    options,
                };
                core.session.set_question(pending.clone());
                core.emit(EngineEvent::QuestionAsked(pending));
            }
            Ok(())
        }),
    );

    d.register(
        MessageKind::File,
        Box::new(|core, msg| {
            if let ServerMessage::File(artifact) = msg {
                core.emit(EngineEvent::FileOffered(artifact));
            }
            Ok(())
        }),
    );

    d.register(
        MessageKind::FileSuggestion,
        Box::new(|core, msg| {
            if let ServerMessage::FileSuggestion(artifact) = msg {
                core.emit(EngineEvent::FileOffered(artifact));
            }
            Ok(())
        }),
    );

    d.register(
        MessageKind::ExecuteCommand,
        Box::new(|core, msg| {
            if let ServerMessage::ExecuteCommand {
                request_id,
                command,
                working_dir,
                requires_approval,
            } = msg
            {
                core.on_execute_command(request_id, command, working_dir, requires_approval);
            }
            Ok(())
        }),
    );

    d.register(
        MessageKind::Error,
        Box::new(|core, msg| {
            if let ServerMessage::Error {
                error,
                code,
                available_models,
            } = msg
            {
                core.on_error(error, code, available_models);
            }
            Ok(())
        }),
    );

    d.register(
        MessageKind::Warning,
        Box::new(|core, msg| {
            if let ServerMessage::Warning { warning } = msg {
                core.emit(EngineEvent::Warning { message: warning });
            }
            Ok(())
        }),
    );

    d.register(
        MessageKind::History,
        Box::new(|core, msg| {
            if let ServerMessage::History {
                session_id,
                messages,
            } = msg
            {
                core.emit(EngineEvent::HistoryReplayed {
                    session_id,
                    messages,
                });
            }
            Ok(())
        }),
    );

    d.register(
        MessageKind::Cancelled,
        Box::new(|core, msg| {
            if let ServerMessage::Cancelled { request_id, reason } = msg {
                core.on_cancelled(request_id, reason);
            }
            Ok(())
        }),
    );

    d.register(
        MessageKind::CloseComplete,
        Box::new(|core, msg| {
            if let ServerMessage::CloseComplete { deleted_count } = msg {
                core.emit(EngineEvent::SessionClosed { deleted_count });
            }
            Ok(())
        }),
    );

    // Heartbeat acknowledgments are consumed silently.
    d.register(MessageKind::Pong, Box::new(|_core, _msg| Ok(())));

    // Unknown types are a no-op by design: logged, no state change.
    d.register(
        MessageKind::Unknown,
        Box::new(|_core, msg| {
            if let ServerMessage::Unknown { message_type, .. } = msg {
                debug!("ignoring unknown message type {message_type:?}");
            }
            Ok(())
        }),
    );

    d
}
