//! WebSocket handling — the connection lifecycle boundary.
//!
//! Wires inbound frames to session actors and runs the teardown path when
//! a socket drops. Malformed frames are answered with an `ERROR` unicast
//! and never touch session state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use trivium_protocol::{ClientMessage, ServerMessage};

use crate::command::{Reply, SessionCommand};
use crate::dispatch::{self, close_code, ConnHandle, ConnId, OutboundFrame};
use crate::registry::Association;
use crate::session::SessionError;
use crate::store::SessionStore;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

const OUTBOUND_BUFFER: usize = 100;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(store): State<Arc<SessionStore>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, store))
}

/// Handle a WebSocket connection from open to teardown.
async fn handle_socket(socket: WebSocket, store: Arc<SessionStore>) {
    let conn_id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
    info!(
        component = "websocket",
        event = "ws.connection.opened",
        connection_id = conn_id,
        "WebSocket connection opened"
    );

    let (mut ws_tx, mut ws_rx) = socket.split();

    // All outbound traffic for this socket funnels through one channel;
    // the writer task owns the sink.
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundFrame>(OUTBOUND_BUFFER);
    let conn = ConnHandle::new(conn_id, outbound_tx.clone());

    let send_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let result = match frame {
                OutboundFrame::Frame(text) => ws_tx.send(Message::Text(text)).await,
                OutboundFrame::Pong(data) => ws_tx.send(Message::Pong(data)).await,
                OutboundFrame::Close { code, reason } => {
                    let _ = ws_tx
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: Utf8Bytes::from_static(reason),
                        })))
                        .await;
                    break;
                }
            };

            if result.is_err() {
                debug!(
                    component = "websocket",
                    event = "ws.send.disconnected",
                    connection_id = conn_id,
                    "WebSocket send failed, client disconnected"
                );
                break;
            }
        }
    });

    while let Some(result) = ws_rx.next().await {
        let text = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Ping(data)) => {
                let _ = outbound_tx.send(OutboundFrame::Pong(data)).await;
                continue;
            }
            Ok(Message::Close(_)) => {
                info!(
                    component = "websocket",
                    event = "ws.connection.close_frame",
                    connection_id = conn_id,
                    "Client sent close frame"
                );
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(
                    component = "websocket",
                    event = "ws.connection.error",
                    connection_id = conn_id,
                    error = %e,
                    "WebSocket error"
                );
                break;
            }
        };

        handle_text_frame(text.as_str(), &conn, &store).await;
    }

    handle_disconnect(conn_id, &store).await;
    info!(
        component = "websocket",
        event = "ws.connection.closed",
        connection_id = conn_id,
        "WebSocket connection closed"
    );
    send_task.abort();
}

/// Decode one inbound frame and dispatch it. Malformed frames yield an
/// `ERROR` unicast and alter no state.
pub(crate) async fn handle_text_frame(text: &str, conn: &ConnHandle, store: &Arc<SessionStore>) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!(
                component = "websocket",
                event = "ws.message.parse_failed",
                connection_id = conn.id(),
                error = %e,
                payload_bytes = text.len(),
                "Failed to parse client message"
            );
            dispatch::unicast(
                conn,
                &ServerMessage::Error {
                    message: format!("malformed frame: {e}"),
                },
            )
            .await;
            return;
        }
    };

    handle_client_message(msg, conn, store).await;
}

/// Handle a decoded client message
async fn handle_client_message(msg: ClientMessage, conn: &ConnHandle, store: &Arc<SessionStore>) {
    debug!(
        component = "websocket",
        event = "ws.message.received",
        connection_id = conn.id(),
        message = ?msg,
        "Received client message"
    );

    match msg {
        ClientMessage::HostJoin {
            session_id,
            session_code,
        } => {
            let handle = store.get_or_create(&session_id, &session_code);
            let (tx, rx) = oneshot::channel();
            handle
                .send(SessionCommand::HostAttach {
                    conn: conn.clone(),
                    reply: tx,
                })
                .await;
            deliver_reply(conn, rx).await;
        }

        ClientMessage::PlayerIdentify {
            session_id,
            participant_id,
            display_name,
        } => {
            // Join-time failure: report and terminate the connection.
            let Some(handle) = store.get(&session_id) else {
                warn!(
                    component = "websocket",
                    event = "ws.join.unknown_session",
                    connection_id = conn.id(),
                    session_id = %session_id,
                    "Identify for unknown session"
                );
                dispatch::unicast(
                    conn,
                    &ServerMessage::Error {
                        message: "unknown session".to_string(),
                    },
                )
                .await;
                dispatch::close(conn, close_code::ERROR, "unknown session").await;
                return;
            };
            let (tx, rx) = oneshot::channel();
            handle
                .send(SessionCommand::Identify {
                    conn: conn.clone(),
                    participant_id,
                    display_name,
                    reply: tx,
                })
                .await;
            deliver_reply(conn, rx).await;
        }

        ClientMessage::StartGame {} => {
            let conn_id = conn.id();
            route_identified(conn, store, move |_assoc, reply| SessionCommand::StartGame {
                conn_id,
                reply,
            })
            .await;
        }

        ClientMessage::AdminUpdateSharedState { new_state } => {
            let conn_id = conn.id();
            route_identified(conn, store, move |_assoc, reply| {
                SessionCommand::UpdateSharedState {
                    conn_id,
                    new_state,
                    reply,
                }
            })
            .await;
        }

        ClientMessage::ShowLeaderboard {} => {
            let conn_id = conn.id();
            route_identified(conn, store, move |_assoc, reply| {
                SessionCommand::ShowLeaderboard { conn_id, reply }
            })
            .await;
        }

        ClientMessage::NextQuestion {} => {
            let conn_id = conn.id();
            route_identified(conn, store, move |_assoc, reply| SessionCommand::NextQuestion {
                conn_id,
                reply,
            })
            .await;
        }

        ClientMessage::SubmitAnswer { answer_index } => {
            let conn_id = conn.id();
            route_identified(conn, store, move |assoc, reply| SessionCommand::SubmitAnswer {
                conn_id,
                participant_id: assoc.participant_id,
                answer_index,
                reply,
            })
            .await;
        }
    }
}

/// Route a message from an already-identified connection to its session.
async fn route_identified<F>(conn: &ConnHandle, store: &Arc<SessionStore>, make: F)
where
    F: FnOnce(Association, Reply) -> SessionCommand,
{
    let Some(assoc) = store.registry().lookup(conn.id()) else {
        dispatch::unicast(
            conn,
            &ServerMessage::Error {
                message: "connection has not identified".to_string(),
            },
        )
        .await;
        return;
    };
    let Some(handle) = store.get(&assoc.session_id) else {
        // Teardown purged the registry between lookup and here; the entry
        // disappears when this connection closes.
        dispatch::unicast(
            conn,
            &ServerMessage::Error {
                message: "session no longer exists".to_string(),
            },
        )
        .await;
        return;
    };

    let (tx, rx) = oneshot::channel();
    handle.send(make(assoc, tx)).await;
    deliver_reply(conn, rx).await;
}

/// Report a rejection to the offending connection only; close it when the
/// error demands it. Uninvolved connections observe nothing.
async fn deliver_reply(conn: &ConnHandle, rx: oneshot::Receiver<Result<(), SessionError>>) {
    let Ok(result) = rx.await else {
        // Actor exited mid-flight (session ended); nothing to report.
        return;
    };
    if let Err(err) = result {
        dispatch::unicast(
            conn,
            &ServerMessage::Error {
                message: err.to_string(),
            },
        )
        .await;
        if err.should_close() {
            dispatch::close(conn, close_code::ERROR, "identity conflict").await;
        }
    }
}

/// Teardown entry point for a closed socket. The registry entry is removed
/// exactly once; a connection that never identified has nothing to do.
pub(crate) async fn handle_disconnect(conn_id: ConnId, store: &Arc<SessionStore>) {
    let Some(assoc) = store.registry().remove(conn_id) else {
        return;
    };
    let Some(handle) = store.get(&assoc.session_id) else {
        return;
    };
    handle
        .send(SessionCommand::ConnectionClosed {
            conn_id,
            participant_id: assoc.participant_id,
            is_host: assoc.is_host,
        })
        .await;
}
