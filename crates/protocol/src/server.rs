//! Server → Client messages

use serde::{Deserialize, Serialize};

use crate::types::{EndReason, PlayerEntry};

/// Messages sent from the coordinator to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    // Roster / shared state
    PlayerListUpdate {
        players: Vec<PlayerEntry>,
    },
    SharedStateUpdate {
        new_state: i64,
    },

    // Game flow
    GameStarted {},
    ShowQuestion {
        index: u32,
        text: String,
        options: Vec<String>,
    },
    LeaderboardUpdate {
        entries: Vec<PlayerEntry>,
    },
    GameEnded {
        reason: EndReason,
    },

    // Acknowledgements
    IdentifySuccess {
        /// Effective id, echoed back so generated ids reach the client.
        participant_id: String,
    },
    AnswerReceived {},

    // Errors
    Error {
        message: String,
    },
}
