//! Trivium Protocol
//!
//! Shared types for communication between the Trivium coordinator and its
//! clients. Every frame is a JSON object `{"type": ..., "payload": {...}}`,
//! serialized over WebSocket.

use uuid::Uuid;

pub mod client;
pub mod server;
pub mod types;

pub use client::ClientMessage;
pub use server::ServerMessage;
pub use types::*;

/// Generate a new unique ID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
