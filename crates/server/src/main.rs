//! Trivium Server
//!
//! Real-time session coordinator for live multiplayer quizzes: tracks
//! which participants are connected to which game, enforces host control,
//! and fans out state changes over WebSocket.

mod actor;
mod command;
mod config;
mod deck;
mod dispatch;
mod logging;
mod persistence;
mod registry;
mod session;
mod store;
mod websocket;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{response::IntoResponse, routing::get, Router};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::persistence::{create_persistence_channel, PersistenceWriter};
use crate::registry::ConnectionRegistry;
use crate::store::SessionStore;
use crate::websocket::ws_handler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    let _logging = logging::init_logging()?;

    info!(
        component = "main",
        event = "server.starting",
        "Starting Trivium coordinator"
    );

    let deck = Arc::new(deck::load_deck(config.questions.as_deref())?);

    // The sink is best-effort: game state never waits on it.
    let (persist_tx, persist_rx) = create_persistence_channel();
    let persistence_writer = PersistenceWriter::new(persist_rx, config.database_path());
    tokio::spawn(persistence_writer.run());

    let registry = Arc::new(ConnectionRegistry::new());
    let store = Arc::new(SessionStore::new(registry, persist_tx, deck));

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(store);

    let addr = SocketAddr::from((config.bind, config.port));
    info!(
        component = "main",
        event = "server.listening",
        addr = %addr,
        "Listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    "OK"
}
