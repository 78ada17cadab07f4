//! Connection registry — maps each live connection to the session and
//! identity it authenticated as.
//!
//! This is the only table that answers "which session does this socket
//! belong to", so session teardown purges every entry it owns; an entry
//! must never outlive its session.

use dashmap::DashMap;
use thiserror::Error;

use crate::dispatch::ConnId;

/// What a connection has been identified as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    pub session_id: String,
    /// `None` for the host connection.
    pub participant_id: Option<String>,
    pub is_host: bool,
}

/// The connection is already bound to a different session or identity.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("connection is already identified for session {existing_session}")]
pub struct ConflictError {
    pub existing_session: String,
}

/// Process-wide connection → identity table. Sharded locking on
/// insert/remove only; never held across a session mutation.
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: DashMap<ConnId, Association>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection to an identity. Re-identifying as the same
    /// identity is idempotent; switching identities is a conflict.
    pub fn associate(&self, conn_id: ConnId, assoc: Association) -> Result<(), ConflictError> {
        use dashmap::mapref::entry::Entry;

        match self.entries.entry(conn_id) {
            Entry::Occupied(existing) => {
                if *existing.get() == assoc {
                    Ok(())
                } else {
                    Err(ConflictError {
                        existing_session: existing.get().session_id.clone(),
                    })
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(assoc);
                Ok(())
            }
        }
    }

    pub fn lookup(&self, conn_id: ConnId) -> Option<Association> {
        self.entries.get(&conn_id).map(|entry| entry.clone())
    }

    /// Idempotent; returns the association if one existed.
    pub fn remove(&self, conn_id: ConnId) -> Option<Association> {
        self.entries.remove(&conn_id).map(|(_, assoc)| assoc)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(session: &str, id: &str) -> Association {
        Association {
            session_id: session.to_string(),
            participant_id: Some(id.to_string()),
            is_host: false,
        }
    }

    #[test]
    fn associate_then_lookup_roundtrips() {
        let registry = ConnectionRegistry::new();
        registry.associate(1, player("S1", "P1")).expect("associate");

        let assoc = registry.lookup(1).expect("association present");
        assert_eq!(assoc.session_id, "S1");
        assert_eq!(assoc.participant_id.as_deref(), Some("P1"));
        assert!(!assoc.is_host);
    }

    #[test]
    fn reidentifying_as_same_identity_is_idempotent() {
        let registry = ConnectionRegistry::new();
        registry.associate(1, player("S1", "P1")).expect("first");
        registry.associate(1, player("S1", "P1")).expect("duplicate");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn switching_identity_conflicts() {
        let registry = ConnectionRegistry::new();
        registry.associate(1, player("S1", "P1")).expect("first");

        let err = registry
            .associate(1, player("S1", "P2"))
            .expect_err("identity switch must conflict");
        assert_eq!(err.existing_session, "S1");

        let err = registry
            .associate(1, player("S2", "P1"))
            .expect_err("session switch must conflict");
        assert_eq!(err.existing_session, "S1");
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = ConnectionRegistry::new();
        registry.associate(1, player("S1", "P1")).expect("associate");

        assert!(registry.remove(1).is_some());
        assert!(registry.remove(1).is_none());
        assert!(registry.lookup(1).is_none());
    }
}
