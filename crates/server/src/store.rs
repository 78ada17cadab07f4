//! Session store — owns every active session and spawns its actor.
//!
//! The store and the connection registry are the only cross-session
//! shared resources; both use sharded maps locked only around
//! insert/remove, never across a session mutation.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{info, warn};

use trivium_protocol::Question;

use crate::actor::SessionHandle;
use crate::persistence::PersistCommand;
use crate::registry::ConnectionRegistry;
use crate::session::Session;

pub struct SessionStore {
    sessions: DashMap<String, SessionHandle>,
    registry: Arc<ConnectionRegistry>,
    persist_tx: mpsc::Sender<PersistCommand>,
    deck: Arc<Vec<Question>>,
}

impl SessionStore {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        persist_tx: mpsc::Sender<PersistCommand>,
        deck: Arc<Vec<Question>>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            registry,
            persist_tx,
            deck,
        }
    }

    /// Idempotent creation: returns the existing session for this id, or
    /// creates one in the lobby phase and spawns its actor. Never renames
    /// an existing session's code.
    pub fn get_or_create(self: &Arc<Self>, session_id: &str, session_code: &str) -> SessionHandle {
        if let Some(existing) = self.sessions.get(session_id) {
            return existing.clone();
        }

        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                info!(
                    component = "store",
                    event = "store.session_created",
                    session_id = %session_id,
                    session_code = %session_code,
                    "Session created"
                );
                let _ = self.persist_tx.try_send(PersistCommand::SessionUpsert {
                    id: session_id.to_string(),
                    code: session_code.to_string(),
                });
                SessionHandle::spawn(
                    Session::new(
                        session_id.to_string(),
                        session_code.to_string(),
                        self.deck.clone(),
                    ),
                    self.clone(),
                )
            })
            .clone()
    }

    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.get(session_id).map(|entry| entry.clone())
    }

    pub fn remove(&self, session_id: &str) -> Option<SessionHandle> {
        let removed = self.sessions.remove(session_id).map(|(_, handle)| handle);
        if removed.is_some() {
            info!(
                component = "store",
                event = "store.session_removed",
                session_id = %session_id,
                "Session removed"
            );
        }
        removed
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn persist(&self) -> &mpsc::Sender<PersistCommand> {
        &self.persist_tx
    }

    /// Fire the best-effort storage delete. Issued only after in-memory
    /// teardown; a full or closed channel is logged, never retried.
    pub async fn request_delete(&self, session_id: &str) {
        if self
            .persist_tx
            .send(PersistCommand::SessionDelete {
                id: session_id.to_string(),
            })
            .await
            .is_err()
        {
            warn!(
                component = "store",
                event = "store.delete_dropped",
                session_id = %session_id,
                "Persistence channel closed, session delete dropped"
            );
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::create_persistence_channel;

    fn test_store() -> (Arc<SessionStore>, mpsc::Receiver<PersistCommand>) {
        let (persist_tx, persist_rx) = create_persistence_channel();
        let deck = Arc::new(vec![Question {
            text: "Q1".to_string(),
            options: vec!["a".to_string(), "b".to_string()],
        }]);
        let store = Arc::new(SessionStore::new(
            Arc::new(ConnectionRegistry::new()),
            persist_tx,
            deck,
        ));
        (store, persist_rx)
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let (store, mut persist_rx) = test_store();

        let first = store.get_or_create("S1", "ABCDEF");
        let second = store.get_or_create("S1", "ZZZZZZ");

        assert_eq!(store.len(), 1);
        assert_eq!(first.id, second.id);

        // Only the creation is recorded, not the second call.
        assert!(matches!(
            persist_rx.try_recv(),
            Ok(PersistCommand::SessionUpsert { ref id, ref code }) if id == "S1" && code == "ABCDEF"
        ));
        assert!(persist_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn get_returns_absent_for_unknown_session() {
        let (store, _persist_rx) = test_store();
        assert!(store.get("nope").is_none());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let (store, _persist_rx) = test_store();
        store.get_or_create("S1", "ABCDEF");

        assert!(store.remove("S1").is_some());
        assert!(store.remove("S1").is_none());
        assert!(store.get("S1").is_none());
    }
}
