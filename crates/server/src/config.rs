//! Server configuration.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;

/// Command-line / environment configuration for the coordinator.
#[derive(Debug, Parser)]
#[command(
    name = "trivium",
    about = "Real-time session coordinator for live multiplayer quizzes",
    version
)]
pub struct ServerConfig {
    /// Address to bind the websocket listener on
    #[arg(long, env = "TRIVIUM_BIND", default_value = "127.0.0.1")]
    pub bind: IpAddr,

    /// Port for the websocket listener
    #[arg(long, env = "TRIVIUM_PORT", default_value_t = 4000)]
    pub port: u16,

    /// SQLite database for the best-effort session archive
    #[arg(long, env = "TRIVIUM_DB")]
    pub db_path: Option<PathBuf>,

    /// JSON question deck (falls back to a built-in demo deck)
    #[arg(long, env = "TRIVIUM_QUESTIONS")]
    pub questions: Option<PathBuf>,
}

impl ServerConfig {
    pub fn database_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| data_dir().join("trivium.db"))
    }
}

/// Per-user data directory, shared by the database and log files.
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".into())))
        .join("trivium")
}
