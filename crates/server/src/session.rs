//! Session aggregate — roster, phase and host tracking for one game
//! instance.
//!
//! All mutation goes through the operation methods below, each of which
//! validates caller authority and phase before touching any state. The
//! owning actor (`actor.rs`) serializes calls, so within a session the
//! operations run strictly one at a time.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use trivium_protocol::{EndReason, Phase, PlayerEntry, Question, ServerMessage};

use crate::dispatch::{self, close_code, ConnHandle, ConnId};
use crate::registry::{Association, ConflictError, ConnectionRegistry};

const DISPLAY_NAME_MAX_CHARS: usize = 20;

/// Rejection of a single operation. Never corrupts session state and is
/// only ever reported to the offending connection.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("another connection is already hosting this session")]
    HostConflict,
    #[error(transparent)]
    IdentityConflict(#[from] ConflictError),
    #[error("only the host may perform this action")]
    Unauthorized,
    #[error("action not valid in the current phase")]
    InvalidPhase(Phase),
    #[error("newState must be an integer")]
    InvalidValue,
    #[error("display name must be 1-20 characters")]
    InvalidName,
}

impl SessionError {
    /// Whether the lifecycle handler should terminate the offending
    /// connection after reporting the error.
    pub fn should_close(&self) -> bool {
        matches!(
            self,
            SessionError::HostConflict | SessionError::IdentityConflict(_)
        )
    }
}

/// A quiz participant. Outlives any single connection: on reconnect only
/// the connection handle is rewritten, score and name are preserved.
pub struct Participant {
    pub id: String,
    pub display_name: String,
    pub score: u32,
    pub connection: Option<ConnHandle>,
}

/// One running game instance.
pub struct Session {
    id: String,
    code: String,
    phase: Phase,
    host: Option<ConnHandle>,
    roster: HashMap<String, Participant>,
    current_question: i32,
    shared_scalar: i64,
    deck: Arc<Vec<Question>>,
}

impl Session {
    pub fn new(id: String, code: String, deck: Arc<Vec<Question>>) -> Self {
        Self {
            id,
            code,
            phase: Phase::Lobby,
            host: None,
            roster: HashMap::new(),
            current_question: -1,
            shared_scalar: 0,
            deck,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn shared_scalar(&self) -> i64 {
        self.shared_scalar
    }

    pub fn current_question(&self) -> i32 {
        self.current_question
    }

    pub fn host_conn_id(&self) -> Option<ConnId> {
        self.host.as_ref().map(ConnHandle::id)
    }

    fn is_host(&self, conn_id: ConnId) -> bool {
        self.host_conn_id() == Some(conn_id)
    }

    /// Roster rows as clients see them, in stable id order.
    pub fn roster_entries(&self) -> Vec<PlayerEntry> {
        let mut entries: Vec<PlayerEntry> = self
            .roster
            .values()
            .map(|p| PlayerEntry {
                id: p.id.clone(),
                display_name: p.display_name.clone(),
                score: p.score,
                connected: p.connection.as_ref().is_some_and(ConnHandle::is_open),
            })
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }

    /// Roster rows ranked for the leaderboard: descending score, then id.
    fn leaderboard_entries(&self) -> Vec<PlayerEntry> {
        let mut entries = self.roster_entries();
        entries.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        entries
    }

    /// Every connection a broadcast reaches: the host plus each
    /// participant's current connection.
    pub fn recipients(&self) -> impl Iterator<Item = &ConnHandle> {
        self.host
            .iter()
            .chain(self.roster.values().filter_map(|p| p.connection.as_ref()))
    }

    async fn broadcast(&self, msg: &ServerMessage) {
        dispatch::broadcast(self.recipients(), msg, None).await;
    }

    fn roster_update(&self) -> ServerMessage {
        ServerMessage::PlayerListUpdate {
            players: self.roster_entries(),
        }
    }

    fn current_question_msg(&self) -> Option<ServerMessage> {
        let index = usize::try_from(self.current_question).ok()?;
        let question = self.deck.get(index)?;
        Some(ServerMessage::ShowQuestion {
            index: index as u32,
            text: question.text.clone(),
            options: question.options.clone(),
        })
    }

    // --- Operations -------------------------------------------------------

    /// Attach (or re-attach) the controlling connection. Fails if a
    /// different connection is still hosting; a closed or identical host
    /// connection may be replaced.
    pub async fn host_attach(
        &mut self,
        conn: ConnHandle,
        registry: &ConnectionRegistry,
    ) -> Result<(), SessionError> {
        if let Some(current) = &self.host {
            if current.id() != conn.id() && current.is_open() {
                return Err(SessionError::HostConflict);
            }
        }

        registry.associate(
            conn.id(),
            Association {
                session_id: self.id.clone(),
                participant_id: None,
                is_host: true,
            },
        )?;

        self.host = Some(conn.clone());
        info!(
            component = "session",
            event = "session.host_attached",
            session_id = %self.id,
            connection_id = conn.id(),
            "Host attached"
        );

        // Joining only needs to disturb the new host's view: roster
        // snapshot plus the current shared value, both unicast.
        dispatch::unicast(&conn, &self.roster_update()).await;
        dispatch::unicast(
            &conn,
            &ServerMessage::SharedStateUpdate {
                new_state: self.shared_scalar,
            },
        )
        .await;
        Ok(())
    }

    /// Register a participant, or rewrite the connection of an existing one
    /// (reconnect). Returns the effective participant id.
    pub async fn identify(
        &mut self,
        conn: ConnHandle,
        participant_id: Option<String>,
        display_name: &str,
        registry: &ConnectionRegistry,
    ) -> Result<String, SessionError> {
        let name = display_name.trim();
        if name.is_empty() || name.chars().count() > DISPLAY_NAME_MAX_CHARS {
            return Err(SessionError::InvalidName);
        }

        let participant_id = participant_id.unwrap_or_else(trivium_protocol::new_id);

        registry.associate(
            conn.id(),
            Association {
                session_id: self.id.clone(),
                participant_id: Some(participant_id.clone()),
                is_host: false,
            },
        )?;

        let participant = self
            .roster
            .entry(participant_id.clone())
            .or_insert_with(|| Participant {
                id: participant_id.clone(),
                display_name: name.to_string(),
                score: 0,
                connection: None,
            });
        // Reconnect: only the connection is rewritten.
        participant.connection = Some(conn.clone());

        info!(
            component = "session",
            event = "session.participant_identified",
            session_id = %self.id,
            participant_id = %participant_id,
            connection_id = conn.id(),
            "Participant identified"
        );

        dispatch::unicast(
            &conn,
            &ServerMessage::IdentifySuccess {
                participant_id: participant_id.clone(),
            },
        )
        .await;
        dispatch::unicast(
            &conn,
            &ServerMessage::SharedStateUpdate {
                new_state: self.shared_scalar,
            },
        )
        .await;
        // Membership visibly changed for everyone.
        self.broadcast(&self.roster_update()).await;
        Ok(participant_id)
    }

    /// Host-only: Lobby → Question, show the first question.
    pub async fn start(&mut self, conn_id: ConnId) -> Result<(), SessionError> {
        if !self.is_host(conn_id) {
            return Err(SessionError::Unauthorized);
        }
        if self.phase != Phase::Lobby {
            return Err(SessionError::InvalidPhase(self.phase));
        }

        self.phase = Phase::Question;
        self.current_question = 0;
        info!(
            component = "session",
            event = "session.started",
            session_id = %self.id,
            "Game started"
        );

        self.broadcast(&ServerMessage::GameStarted {}).await;
        if let Some(msg) = self.current_question_msg() {
            self.broadcast(&msg).await;
        }
        Ok(())
    }

    /// Host-only: overwrite the shared scalar and notify everyone,
    /// unconditionally — there is no diffing.
    pub async fn update_shared_state(
        &mut self,
        conn_id: ConnId,
        new_state: &serde_json::Value,
    ) -> Result<(), SessionError> {
        if !self.is_host(conn_id) {
            return Err(SessionError::Unauthorized);
        }
        let value = new_state.as_i64().ok_or(SessionError::InvalidValue)?;

        self.shared_scalar = value;
        self.broadcast(&ServerMessage::SharedStateUpdate { new_state: value })
            .await;
        Ok(())
    }

    /// Participant-only. Outside the question phase, or for an unknown
    /// participant, the submission is silently ignored. Evaluating the
    /// answer content is a scoring concern and lives outside this core.
    pub async fn submit_answer(
        &mut self,
        conn_id: ConnId,
        participant_id: Option<&str>,
        answer_index: u32,
    ) -> Result<(), SessionError> {
        if self.is_host(conn_id) {
            return Err(SessionError::Unauthorized);
        }
        if self.phase != Phase::Question {
            return Ok(());
        }
        let Some(participant) = participant_id.and_then(|id| self.roster.get(id)) else {
            return Ok(());
        };

        let _ = answer_index;
        if let Some(conn) = &participant.connection {
            dispatch::unicast(conn, &ServerMessage::AnswerReceived {}).await;
        }
        Ok(())
    }

    /// Host-only: Question → Leaderboard, ranked roster to everyone.
    pub async fn show_leaderboard(&mut self, conn_id: ConnId) -> Result<(), SessionError> {
        if !self.is_host(conn_id) {
            return Err(SessionError::Unauthorized);
        }
        if self.phase != Phase::Question {
            return Err(SessionError::InvalidPhase(self.phase));
        }

        self.phase = Phase::Leaderboard;
        let msg = ServerMessage::LeaderboardUpdate {
            entries: self.leaderboard_entries(),
        };
        self.broadcast(&msg).await;
        Ok(())
    }

    /// Host-only: Leaderboard → Question with the next deck entry.
    /// Returns `true` when the deck is exhausted and the caller must run
    /// the end-of-game teardown instead.
    pub async fn next_question(&mut self, conn_id: ConnId) -> Result<bool, SessionError> {
        if !self.is_host(conn_id) {
            return Err(SessionError::Unauthorized);
        }
        if self.phase != Phase::Leaderboard {
            return Err(SessionError::InvalidPhase(self.phase));
        }

        let next = self.current_question + 1;
        if (next as usize) < self.deck.len() {
            self.current_question = next;
            self.phase = Phase::Question;
            if let Some(msg) = self.current_question_msg() {
                self.broadcast(&msg).await;
            }
            Ok(false)
        } else {
            Ok(true)
        }
    }

    /// A participant's socket went away: null its connection (the roster
    /// entry survives for a reconnect) and show everyone the new roster.
    /// A reconnect may already have replaced the connection, in which case
    /// the stale close is a no-op.
    pub async fn participant_disconnected(&mut self, participant_id: &str, conn_id: ConnId) {
        let Some(participant) = self.roster.get_mut(participant_id) else {
            return;
        };
        if participant
            .connection
            .as_ref()
            .is_some_and(|c| c.id() == conn_id)
        {
            participant.connection = None;
            self.broadcast(&self.roster_update()).await;
        }
    }

    /// Terminal transition: notify every connection except `excluding`,
    /// force-close the rest with a normal-closure code, and return the
    /// connection ids whose registry entries the caller must purge.
    pub async fn end(&mut self, reason: EndReason, excluding: Option<ConnId>) -> Vec<ConnId> {
        self.phase = Phase::Ended;
        dispatch::broadcast(
            self.recipients(),
            &ServerMessage::GameEnded { reason },
            excluding,
        )
        .await;

        let mut closed = Vec::new();
        if let Some(host) = self.host.take() {
            if excluding != Some(host.id()) {
                dispatch::close(&host, close_code::NORMAL, "game ended").await;
            }
            closed.push(host.id());
        }
        for participant in self.roster.values_mut() {
            if let Some(conn) = participant.connection.take() {
                if excluding != Some(conn.id()) {
                    dispatch::close(&conn, close_code::NORMAL, "game ended").await;
                }
                closed.push(conn.id());
            }
        }

        info!(
            component = "session",
            event = "session.ended",
            session_id = %self.id,
            reason = ?reason,
            connections_closed = closed.len(),
            "Session ended"
        );
        closed
    }
}
