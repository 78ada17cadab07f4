//! Client → Server messages

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages sent from clients to the coordinator.
///
/// `HOST_JOIN` and `PLAYER_IDENTIFY` carry a session id because the
/// connection is not yet associated with a session; every later message is
/// routed through the connection registry instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    // Joining
    HostJoin {
        session_id: String,
        session_code: String,
    },
    PlayerIdentify {
        session_id: String,
        /// Upstream-assigned id; the coordinator generates one when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        participant_id: Option<String>,
        display_name: String,
    },

    // Host controls
    StartGame {},
    AdminUpdateSharedState {
        /// Kept as a raw value so a non-integer is rejected as
        /// `InvalidValue` rather than a parse failure.
        new_state: Value,
    },
    ShowLeaderboard {},
    NextQuestion {},

    // Participant actions
    SubmitAnswer {
        answer_index: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::ClientMessage;

    #[test]
    fn deserializes_host_join() {
        let json = r#"{
          "type":"HOST_JOIN",
          "payload":{"sessionId":"S1","sessionCode":"ABCDEF"}
        }"#;

        let parsed: ClientMessage = serde_json::from_str(json).expect("parse host join");
        match parsed {
            ClientMessage::HostJoin {
                session_id,
                session_code,
            } => {
                assert_eq!(session_id, "S1");
                assert_eq!(session_code, "ABCDEF");
            }
            other => panic!("unexpected message variant: {:?}", other),
        }
    }

    #[test]
    fn player_identify_without_id_defaults_to_none() {
        let json = r#"{
          "type":"PLAYER_IDENTIFY",
          "payload":{"sessionId":"S1","displayName":"Alice"}
        }"#;

        let parsed: ClientMessage = serde_json::from_str(json).expect("parse player identify");
        match parsed {
            ClientMessage::PlayerIdentify {
                session_id,
                participant_id,
                display_name,
            } => {
                assert_eq!(session_id, "S1");
                assert!(participant_id.is_none());
                assert_eq!(display_name, "Alice");
            }
            other => panic!("unexpected message variant: {:?}", other),
        }
    }

    #[test]
    fn roundtrip_player_identify_with_id() {
        let json = r#"{
          "type":"PLAYER_IDENTIFY",
          "payload":{"sessionId":"S1","participantId":"P1","displayName":"Alice"}
        }"#;

        let parsed: ClientMessage = serde_json::from_str(json).expect("parse");
        let serialized = serde_json::to_string(&parsed).expect("serialize");
        let reparsed: ClientMessage = serde_json::from_str(&serialized).expect("reparse");
        match reparsed {
            ClientMessage::PlayerIdentify { participant_id, .. } => {
                assert_eq!(participant_id.as_deref(), Some("P1"));
            }
            other => panic!("unexpected variant on roundtrip: {:?}", other),
        }
    }

    #[test]
    fn deserializes_start_game_with_empty_payload() {
        let json = r#"{"type":"START_GAME","payload":{}}"#;
        let parsed: ClientMessage = serde_json::from_str(json).expect("parse start game");
        assert!(matches!(parsed, ClientMessage::StartGame {}));
    }

    #[test]
    fn admin_update_keeps_raw_value() {
        let json = r#"{"type":"ADMIN_UPDATE_SHARED_STATE","payload":{"newState":5}}"#;
        let parsed: ClientMessage = serde_json::from_str(json).expect("parse admin update");
        match parsed {
            ClientMessage::AdminUpdateSharedState { new_state } => {
                assert_eq!(new_state.as_i64(), Some(5));
            }
            other => panic!("unexpected variant: {:?}", other),
        }

        // A non-integer still parses; validation happens in the session.
        let json = r#"{"type":"ADMIN_UPDATE_SHARED_STATE","payload":{"newState":"five"}}"#;
        let parsed: ClientMessage = serde_json::from_str(json).expect("parse admin update");
        match parsed {
            ClientMessage::AdminUpdateSharedState { new_state } => {
                assert!(new_state.as_i64().is_none());
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn roundtrip_submit_answer() {
        let json = r#"{"type":"SUBMIT_ANSWER","payload":{"answerIndex":2}}"#;
        let parsed: ClientMessage = serde_json::from_str(json).expect("parse submit answer");
        match &parsed {
            ClientMessage::SubmitAnswer { answer_index } => assert_eq!(*answer_index, 2),
            other => panic!("unexpected variant: {:?}", other),
        }
        let serialized = serde_json::to_string(&parsed).expect("serialize");
        let _: ClientMessage = serde_json::from_str(&serialized).expect("roundtrip");
    }

    #[test]
    fn unknown_type_is_rejected() {
        let json = r#"{"type":"TELEPORT","payload":{}}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }

    #[test]
    fn missing_type_is_rejected() {
        let json = r#"{"payload":{"sessionId":"S1"}}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }
}
