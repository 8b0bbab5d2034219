//! Test doubles: a scripted transport and a recording executor.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use parley_client::{
    CommandExecutor, ConnectTarget, ExecOutcome, ExecRequest, Transport, TransportError,
    TransportEvent, TransportLink,
};

/// The far side of a mock link: inject inbound events, observe outbound frames.
pub struct RemoteEnd {
    pub tx: mpsc::Sender<TransportEvent>,
    pub rx: mpsc::Receiver<String>,
}

impl RemoteEnd {
    pub async fn send_frame(&self, raw: &str) {
        self.tx
            .send(TransportEvent::Frame(raw.to_string()))
            .await
            .expect("engine dropped link");
    }

    pub async fn send_session_start(&self, session_id: &str) {
        self.send_frame(&format!(
            r#"{{"type":"session_start","session_id":"{session_id}","user_id":"u1","interface":"terminal"}}"#
        ))
        .await;
    }

    pub async fn close(&self, abnormal: bool) {
        self.tx
            .send(TransportEvent::Closed {
                abnormal,
                reason: if abnormal { "reset" } else { "done" }.to_string(),
            })
            .await
            .expect("engine dropped link");
    }

    /// Next outbound frame, heartbeats included. The generous timeout lets a
    /// paused clock auto-advance through heartbeat and backoff deadlines.
    pub async fn next_raw_frame(&mut self) -> Value {
        let raw = tokio::time::timeout(Duration::from_secs(120), self.rx.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("engine closed link");
        serde_json::from_str(&raw).expect("outbound frame is not JSON")
    }

    /// Next outbound frame that is not a heartbeat ping.
    pub async fn next_frame(&mut self) -> Value {
        loop {
            let frame = self.next_raw_frame().await;
            if frame["type"] != "ping" {
                return frame;
            }
        }
    }

    /// Asserts that no non-ping frame is currently buffered.
    pub fn assert_no_pending_frame(&mut self) {
        while let Ok(raw) = self.rx.try_recv() {
            let frame: Value = serde_json::from_str(&raw).expect("outbound frame is not JSON");
            assert_eq!(frame["type"], "ping", "unexpected outbound frame: {frame}");
        }
    }
}

/// Transport that hands out pre-scripted links in order.
#[derive(Default)]
pub struct MockTransport {
    outcomes: Mutex<VecDeque<Result<TransportLink, TransportError>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a successful open and returns its remote end.
    pub fn push_link(&self) -> RemoteEnd {
        let (in_tx, in_rx) = mpsc::channel(64);
        let (out_tx, out_rx) = mpsc::channel(64);
        self.outcomes.lock().unwrap().push_back(Ok(TransportLink {
            tx: out_tx,
            rx: in_rx,
        }));
        RemoteEnd {
            tx: in_tx,
            rx: out_rx,
        }
    }

    /// Scripts a failed open.
    pub fn push_failure(&self) {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(Err(TransportError::Connect("scripted failure".to_string())));
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, _target: &ConnectTarget) -> Result<TransportLink, TransportError> {
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Connect("no scripted link".to_string())))
    }
}

/// Executor that records every request and returns a fixed outcome.
pub struct MockExecutor {
    pub calls: Mutex<Vec<ExecRequest>>,
    outcome: ExecOutcome,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            outcome: ExecOutcome {
                exit_code: 0,
                stdout: "ok\n".to_string(),
                stderr: String::new(),
                timed_out: false,
                killed: false,
            },
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CommandExecutor for MockExecutor {
    async fn execute(&self, request: ExecRequest) -> anyhow::Result<ExecOutcome> {
        self.calls.lock().unwrap().push(request);
        Ok(self.outcome.clone())
    }

    async fn cancel(&self, _id: &str) {}
}
