//! Unicast/broadcast dispatch to connected clients.
//!
//! Sends are fire-and-forget enqueues into each connection's outbound
//! channel; the websocket writer task owns the actual network I/O. A
//! broadcast serializes the message once and fans the frame out as cheap
//! byte-buffer clones.

use axum::extract::ws::Utf8Bytes;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, error};

use trivium_protocol::ServerMessage;

/// WebSocket close codes used by the coordinator.
pub mod close_code {
    /// Normal closure — the game is over.
    pub const NORMAL: u16 = 1000;
    /// Internal error — protocol or identity violation.
    pub const ERROR: u16 = 1011;
}

/// Process-unique id for a live connection.
pub type ConnId = u64;

/// Frames queued to a connection's writer task.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    /// A serialized `ServerMessage`
    Frame(Utf8Bytes),
    /// Raw pong response
    Pong(Bytes),
    /// Close the socket with this code after draining prior frames.
    Close { code: u16, reason: &'static str },
}

/// Non-owning handle to a live connection's outbound queue.
///
/// Participants keep one of these across their roster entry; dropping a
/// handle never closes the socket, and sending to a gone connection is a
/// logged no-op.
#[derive(Debug, Clone)]
pub struct ConnHandle {
    id: ConnId,
    tx: mpsc::Sender<OutboundFrame>,
}

impl ConnHandle {
    pub fn new(id: ConnId, tx: mpsc::Sender<OutboundFrame>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Whether the connection's writer is still draining frames.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    async fn send(&self, frame: OutboundFrame) {
        if self.tx.send(frame).await.is_err() {
            debug!(
                component = "dispatch",
                event = "dispatch.send.dropped",
                connection_id = self.id,
                "Outbound channel closed, frame dropped"
            );
        }
    }
}

/// Send a message to a single connection. Failures are swallowed into a log.
pub async fn unicast(conn: &ConnHandle, msg: &ServerMessage) {
    let Some(frame) = encode(msg) else { return };
    if !conn.is_open() {
        debug!(
            component = "dispatch",
            event = "dispatch.unicast.unreachable",
            connection_id = conn.id(),
            "Skipping unicast to closed connection"
        );
        return;
    }
    conn.send(OutboundFrame::Frame(frame)).await;
}

/// Serialize once, then fan out to every reachable recipient.
/// Zero reachable recipients is a legal, silent no-op.
pub async fn broadcast<'a, I>(recipients: I, msg: &ServerMessage, excluding: Option<ConnId>)
where
    I: IntoIterator<Item = &'a ConnHandle>,
{
    let Some(frame) = encode(msg) else { return };
    for conn in recipients {
        if excluding == Some(conn.id()) || !conn.is_open() {
            continue;
        }
        conn.send(OutboundFrame::Frame(frame.clone())).await;
    }
}

/// Ask a connection's writer to close the socket.
pub async fn close(conn: &ConnHandle, code: u16, reason: &'static str) {
    conn.send(OutboundFrame::Close { code, reason }).await;
}

fn encode(msg: &ServerMessage) -> Option<Utf8Bytes> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(json.into()),
        Err(e) => {
            error!(
                component = "dispatch",
                event = "dispatch.encode_failed",
                error = %e,
                "Failed to serialize server message"
            );
            None
        }
    }
}
