//! Commands processed by a session actor.
//!
//! Every state-changing message from the websocket layer becomes one of
//! these; replies travel back over oneshot channels so the lifecycle
//! handler can report rejections to the offending connection.

use serde_json::Value;
use tokio::sync::oneshot;

use trivium_protocol::{Phase, PlayerEntry};

use crate::dispatch::{ConnHandle, ConnId};
use crate::session::SessionError;

pub type Reply = oneshot::Sender<Result<(), SessionError>>;

#[allow(dead_code)]
pub enum SessionCommand {
    // -- Joining --
    HostAttach {
        conn: ConnHandle,
        reply: Reply,
    },
    Identify {
        conn: ConnHandle,
        participant_id: Option<String>,
        display_name: String,
        reply: Reply,
    },

    // -- Host controls --
    StartGame {
        conn_id: ConnId,
        reply: Reply,
    },
    UpdateSharedState {
        conn_id: ConnId,
        new_state: Value,
        reply: Reply,
    },
    ShowLeaderboard {
        conn_id: ConnId,
        reply: Reply,
    },
    NextQuestion {
        conn_id: ConnId,
        reply: Reply,
    },

    // -- Participant actions --
    SubmitAnswer {
        conn_id: ConnId,
        participant_id: Option<String>,
        answer_index: u32,
        reply: Reply,
    },

    // -- Lifecycle --
    /// A socket closed after identifying. No reply: the connection is gone.
    ConnectionClosed {
        conn_id: ConnId,
        participant_id: Option<String>,
        is_host: bool,
    },

    // -- Queries --
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

/// Read-only view of a session, for diagnostics and tests.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session_code: String,
    pub phase: Phase,
    pub host_conn: Option<ConnId>,
    pub players: Vec<PlayerEntry>,
    pub shared_scalar: i64,
    pub current_question: i32,
}
