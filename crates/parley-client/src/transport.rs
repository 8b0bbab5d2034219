//! Transport abstraction.
//!
//! The engine is parameterized by a [`Transport`] so the terminal and browser
//! front ends share one protocol implementation and tests can substitute a
//! channel-backed fake. A [`TransportLink`] is a pair of channels: raw frames
//! out, [`TransportEvent`]s in. The WebSocket implementation owns the socket
//! split halves on two background tasks; WebSocket-level ping/pong and close
//! framing never leave this module.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::TransportError;

/// Buffer size for frames in either direction.
const FRAME_BUFFER_SIZE: usize = 256;

/// What to connect to, and as whom.
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    pub url: String,
    pub identity: String,
    /// Opaque credential; sent as a bearer header when present.
    pub credential: Option<String>,
}

/// Events delivered by an open transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// One inbound text frame.
    Frame(String),

    /// The connection ended. `abnormal` distinguishes failures (which trigger
    /// the reconnect policy) from clean closes (which do not).
    Closed { abnormal: bool, reason: String },
}

/// An open connection: frames out, events in.
///
/// Dropping `tx` closes the connection gracefully.
pub struct TransportLink {
    pub tx: mpsc::Sender<String>,
    pub rx: mpsc::Receiver<TransportEvent>,
}

/// Factory for connections. One implementation per underlying medium.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(&self, target: &ConnectTarget) -> Result<TransportLink, TransportError>;
}

// ============================================================================
// WebSocket implementation
// ============================================================================

/// Production transport over tokio-tungstenite.
#[derive(Debug, Default)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, target: &ConnectTarget) -> Result<TransportLink, TransportError> {
        let url = format!(
            "{}?identity={}",
            target.url,
            urlencoding::encode(&target.identity)
        );
        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        if let Some(credential) = &target.credential {
            let value = format!("Bearer {credential}")
                .parse()
                .map_err(|_| TransportError::Connect("invalid credential bytes".to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (socket, _) = connect_async(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        debug!("transport open to {}", target.url);

        let (mut ws_tx, mut ws_rx) = socket.split();
        let (out_tx, mut out_rx) = mpsc::channel::<String>(FRAME_BUFFER_SIZE);
        let (in_tx, in_rx) = mpsc::channel::<TransportEvent>(FRAME_BUFFER_SIZE);

        // Writer: drains outbound frames; a dropped sender closes the socket.
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = ws_tx.send(Message::Text(frame.into())).await {
                    warn!("transport send failed: {e}");
                    break;
                }
            }
            let _ = ws_tx.send(Message::Close(None)).await;
        });

        // Reader: forwards text frames, reports closure. Protocol-level
        // ping/pong is answered inside tungstenite.
        tokio::spawn(async move {
            let closed = loop {
                match ws_rx.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if in_tx
                            .send(TransportEvent::Frame(text.to_string()))
                            .await
                            .is_err()
                        {
                            // Engine went away; nothing left to report to.
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .unwrap_or_else(|| "closed by remote".to_string());
                        break TransportEvent::Closed {
                            abnormal: false,
                            reason,
                        };
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        break TransportEvent::Closed {
                            abnormal: true,
                            reason: e.to_string(),
                        };
                    }
                    None => {
                        break TransportEvent::Closed {
                            abnormal: true,
                            reason: "connection reset".to_string(),
                        };
                    }
                }
            };
            let _ = in_tx.send(closed).await;
        });

        Ok(TransportLink { tx: out_tx, rx: in_rx })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused_is_transport_error() {
        // Grab a free port, then close it so the connect is refused.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = WsTransport
            .open(&ConnectTarget {
                url: format!("ws://127.0.0.1:{port}/session"),
                identity: "alice".to_string(),
                credential: None,
            })
            .await
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)));
    }
}
