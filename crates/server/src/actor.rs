//! Session actor — owns a `Session` and processes commands sequentially.
//!
//! Each session runs as an independent tokio task; callers talk to it
//! through `SessionHandle` over an mpsc channel, so no message for a
//! session is ever handled concurrently with another message for the same
//! session, and every operation (including the broadcasts it triggers)
//! completes before the next command is taken.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use trivium_protocol::EndReason;

use crate::command::{SessionCommand, SessionSnapshot};
use crate::dispatch::ConnId;
use crate::persistence::PersistCommand;
use crate::session::Session;
use crate::store::SessionStore;

/// Handle to a running session actor (cheap to clone).
#[derive(Clone)]
pub struct SessionHandle {
    pub id: String,
    command_tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Spawn the actor task for a session.
    pub fn spawn(session: Session, store: Arc<SessionStore>) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::channel(256);
        let id = session.id().to_string();

        tokio::spawn(actor_loop(session, command_rx, store));

        SessionHandle { id, command_tx }
    }

    /// Send a command (fire-and-forget). An ended session's actor has
    /// exited, so commands to it are dropped, never processed.
    pub async fn send(&self, cmd: SessionCommand) {
        if self.command_tx.send(cmd).await.is_err() {
            warn!(
                component = "session_actor",
                session_id = %self.id,
                "Actor channel closed, command dropped"
            );
        }
    }
}

enum Flow {
    Continue,
    End,
}

async fn actor_loop(
    mut session: Session,
    mut command_rx: mpsc::Receiver<SessionCommand>,
    store: Arc<SessionStore>,
) {
    while let Some(cmd) = command_rx.recv().await {
        if let Flow::End = handle_command(cmd, &mut session, &store).await {
            break;
        }
    }
    debug!(
        component = "session_actor",
        session_id = %session.id(),
        "Session actor stopped"
    );
}

async fn handle_command(
    cmd: SessionCommand,
    session: &mut Session,
    store: &Arc<SessionStore>,
) -> Flow {
    match cmd {
        SessionCommand::HostAttach { conn, reply } => {
            let result = session.host_attach(conn, store.registry()).await;
            let _ = reply.send(result);
        }

        SessionCommand::Identify {
            conn,
            participant_id,
            display_name,
            reply,
        } => {
            match session
                .identify(conn, participant_id, &display_name, store.registry())
                .await
            {
                Ok(participant_id) => {
                    // Mirror the roster entry into the best-effort archive.
                    let _ = store.persist().try_send(PersistCommand::ParticipantUpsert {
                        session_id: session.id().to_string(),
                        participant_id,
                        display_name: display_name.trim().to_string(),
                    });
                    let _ = reply.send(Ok(()));
                }
                Err(err) => {
                    let _ = reply.send(Err(err));
                }
            }
        }

        SessionCommand::StartGame { conn_id, reply } => {
            let _ = reply.send(session.start(conn_id).await);
        }

        SessionCommand::UpdateSharedState {
            conn_id,
            new_state,
            reply,
        } => {
            let _ = reply.send(session.update_shared_state(conn_id, &new_state).await);
        }

        SessionCommand::ShowLeaderboard { conn_id, reply } => {
            let _ = reply.send(session.show_leaderboard(conn_id).await);
        }

        SessionCommand::NextQuestion { conn_id, reply } => match session.next_question(conn_id).await {
            Ok(false) => {
                let _ = reply.send(Ok(()));
            }
            Ok(true) => {
                let _ = reply.send(Ok(()));
                end_session(session, store, EndReason::Complete, None).await;
                return Flow::End;
            }
            Err(err) => {
                let _ = reply.send(Err(err));
            }
        },

        SessionCommand::SubmitAnswer {
            conn_id,
            participant_id,
            answer_index,
            reply,
        } => {
            let result = session
                .submit_answer(conn_id, participant_id.as_deref(), answer_index)
                .await;
            let _ = reply.send(result);
        }

        SessionCommand::ConnectionClosed {
            conn_id,
            participant_id,
            is_host,
        } => {
            // A host that already re-attached on a new connection keeps the
            // session alive; only the current host connection tears it down.
            if is_host && session.host_conn_id() == Some(conn_id) {
                end_session(session, store, EndReason::HostLeft, Some(conn_id)).await;
                return Flow::End;
            }
            if let Some(participant_id) = participant_id {
                session.participant_disconnected(&participant_id, conn_id).await;
            }
        }

        SessionCommand::Snapshot { reply } => {
            let _ = reply.send(SessionSnapshot {
                session_code: session.code().to_string(),
                phase: session.phase(),
                host_conn: session.host_conn_id(),
                players: session.roster_entries(),
                shared_scalar: session.shared_scalar(),
                current_question: session.current_question(),
            });
        }
    }
    Flow::Continue
}

/// Terminal teardown. In-memory state goes first (broadcast, closes,
/// registry purge, store removal); the storage delete is fired afterwards
/// and its outcome never affects the in-memory view.
async fn end_session(
    session: &mut Session,
    store: &Arc<SessionStore>,
    reason: EndReason,
    excluding: Option<ConnId>,
) {
    let closed = session.end(reason, excluding).await;
    for conn_id in closed {
        store.registry().remove(conn_id);
    }
    store.remove(session.id());
    store.request_delete(session.id()).await;
}
