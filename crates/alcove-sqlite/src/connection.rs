//! Embedded connection and single-writer serialization
//!
//! The embedded engine supports exactly one writer per database, so every
//! mutating call must hold the write gate for its entire backend round
//! trip. Reads share the physical connection without the gate; the
//! parking_lot mutex only guards the (short) blocking access itself, while
//! the async gate serializes whole mutations — including ones that suspend
//! mid-flight, like episode ingestion awaiting the extractor.

use crate::error::{EmbeddedError, EmbeddedResult};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::MutexGuard;
use tracing::{debug, info};

/// Thread-safe handle to the embedded database
///
/// Cloning is cheap: all clones share one physical connection and one write
/// gate.
#[derive(Clone)]
pub struct EmbeddedConnection {
    conn: Arc<Mutex<Connection>>,
    write_gate: Arc<tokio::sync::Mutex<()>>,
    path: PathBuf,
}

impl std::fmt::Debug for EmbeddedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedConnection")
            .field("path", &self.path)
            .finish()
    }
}

impl EmbeddedConnection {
    /// Open (or create) the database file at `path`
    pub fn open(path: &Path) -> EmbeddedResult<Self> {
        info!(path = ?path, "Opening embedded database");

        let conn = if path.to_str() == Some(":memory:") {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    EmbeddedError::Connection(format!("failed to create directory: {}", e))
                })?;
            }
            Connection::open(path)?
        };

        configure_pragmas(&conn, path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            write_gate: Arc::new(tokio::sync::Mutex::new(())),
            path: path.to_path_buf(),
        })
    }

    /// Open an in-memory database for testing
    pub fn memory() -> EmbeddedResult<Self> {
        Self::open(Path::new(":memory:"))
    }

    /// Run a closure against the connection on the blocking pool.
    ///
    /// Does NOT take the write gate; use for reads, or for writes while the
    /// gate is already held via [`EmbeddedConnection::acquire_write`].
    pub async fn run<T, F>(&self, f: F) -> EmbeddedResult<T>
    where
        F: FnOnce(&Connection) -> EmbeddedResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await
        .map_err(|e| EmbeddedError::Connection(format!("blocking task failed: {}", e)))?
    }

    /// Run a mutating closure while holding the write gate for the whole
    /// round trip. At most one mutation is in flight at any instant.
    pub async fn write<T, F>(&self, f: F) -> EmbeddedResult<T>
    where
        F: FnOnce(&Connection) -> EmbeddedResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let _gate = self.write_gate.lock().await;
        self.run(f).await
    }

    /// Acquire the write gate explicitly, for mutations that span several
    /// backend calls or suspend in between (episode ingestion).
    pub async fn acquire_write(&self) -> MutexGuard<'_, ()> {
        self.write_gate.lock().await
    }

    /// Path this connection was opened with
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn configure_pragmas(conn: &Connection, path: &Path) -> EmbeddedResult<()> {
    debug!("Configuring embedded database pragmas");

    // WAL only applies to file databases
    if path.to_str() != Some(":memory:") {
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
    }
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
    conn.execute_batch("PRAGMA temp_store = MEMORY;")?;

    Ok(())
}
