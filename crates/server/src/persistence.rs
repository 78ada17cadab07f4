//! Persistence sink — batched SQLite writes.
//!
//! The coordinator treats storage as best-effort: commands are queued on
//! an mpsc channel and written in batches via `spawn_blocking`. No
//! game-facing path ever waits on a write, and write failures are logged,
//! never surfaced to a connection.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Commands accepted by the sink
#[derive(Debug, Clone)]
pub enum PersistCommand {
    /// Record a session when it is created
    SessionUpsert { id: String, code: String },

    /// Mirror a roster entry; an existing row keeps its score
    ParticipantUpsert {
        session_id: String,
        participant_id: String,
        display_name: String,
    },

    /// Delete a session and its roster after teardown
    SessionDelete { id: String },
}

pub fn create_persistence_channel() -> (mpsc::Sender<PersistCommand>, mpsc::Receiver<PersistCommand>)
{
    mpsc::channel(256)
}

/// Persistence writer that batches SQLite writes
pub struct PersistenceWriter {
    rx: mpsc::Receiver<PersistCommand>,
    db_path: PathBuf,
    batch: Vec<PersistCommand>,
    batch_size: usize,
    flush_interval: Duration,
}

impl PersistenceWriter {
    pub fn new(rx: mpsc::Receiver<PersistCommand>, db_path: PathBuf) -> Self {
        if let Some(parent) = db_path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(
                    component = "persistence",
                    event = "persistence.dir_create_failed",
                    path = %parent.display(),
                    error = %e,
                    "Could not create database directory"
                );
            }
        }

        Self {
            rx,
            db_path,
            batch: Vec::with_capacity(100),
            batch_size: 50,
            flush_interval: Duration::from_millis(100),
        }
    }

    /// Run the persistence writer (call from `tokio::spawn`)
    pub async fn run(mut self) {
        info!(
            component = "persistence",
            event = "persistence.started",
            db_path = %self.db_path.display(),
            "PersistenceWriter started"
        );

        let mut interval = tokio::time::interval(self.flush_interval);

        loop {
            tokio::select! {
                Some(cmd) = self.rx.recv() => {
                    self.batch.push(cmd);

                    if self.batch.len() >= self.batch_size {
                        self.flush().await;
                    }
                }

                _ = interval.tick() => {
                    if !self.batch.is_empty() {
                        self.flush().await;
                    }
                }
            }
        }
    }

    /// Flush the batch to SQLite
    async fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }

        let batch = std::mem::take(&mut self.batch);
        let db_path = self.db_path.clone();

        // SQLite is synchronous; keep it off the runtime threads.
        let result = tokio::task::spawn_blocking(move || flush_batch(&db_path, batch)).await;

        match result {
            Ok(Ok(count)) => {
                debug!(
                    component = "persistence",
                    event = "persistence.flushed",
                    commands = count,
                    "Persisted commands"
                );
            }
            Ok(Err(e)) => {
                error!(
                    component = "persistence",
                    event = "persistence.flush_failed",
                    error = %e,
                    "Persistence flush failed"
                );
            }
            Err(e) => {
                error!(
                    component = "persistence",
                    event = "persistence.flush_panicked",
                    error = %e,
                    "spawn_blocking panicked"
                );
            }
        }
    }
}

/// Flush a batch of commands to SQLite (runs in a blocking thread)
fn flush_batch(db_path: &PathBuf, batch: Vec<PersistCommand>) -> Result<usize, rusqlite::Error> {
    let conn = Connection::open(db_path)?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    ensure_schema(&conn)?;

    let count = batch.len();
    let tx = conn.unchecked_transaction()?;

    for cmd in batch {
        if let Err(e) = execute_command(&tx, cmd) {
            warn!(
                component = "persistence",
                event = "persistence.command_failed",
                error = %e,
                "Failed to execute persist command"
            );
            // Continue with other commands
        }
    }

    tx.commit()?;
    Ok(count)
}

fn ensure_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL,
            created_at TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS participants (
            session_id TEXT NOT NULL,
            id TEXT NOT NULL,
            display_name TEXT NOT NULL,
            score INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (session_id, id)
         );",
    )
}

/// Execute a single persist command
fn execute_command(conn: &Connection, cmd: PersistCommand) -> Result<(), rusqlite::Error> {
    match cmd {
        PersistCommand::SessionUpsert { id, code } => {
            conn.execute(
                "INSERT INTO sessions (id, code, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO NOTHING",
                params![id, code, unix_z_now()],
            )?;
        }

        PersistCommand::ParticipantUpsert {
            session_id,
            participant_id,
            display_name,
        } => {
            conn.execute(
                "INSERT INTO participants (session_id, id, display_name) VALUES (?1, ?2, ?3)
                 ON CONFLICT(session_id, id) DO UPDATE SET display_name = excluded.display_name",
                params![session_id, participant_id, display_name],
            )?;
        }

        PersistCommand::SessionDelete { id } => {
            conn.execute(
                "DELETE FROM participants WHERE session_id = ?1",
                params![id],
            )?;
            conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        }
    }
    Ok(())
}

fn unix_z_now() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{}Z", secs)
}
