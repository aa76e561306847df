// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All statements run on tokio-rusqlite's single background thread. Clone the
//! [`Database`] handle to share it; never open a second connection for writes.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use cortex_core::{AdapterType, CortexError, HealthStatus, PluginAdapter};
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::migrations;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the engine database. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Open (or create) the database at `path`, apply PRAGMAs and run
    /// pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CortexError> {
        Self::open_with(path, true).await
    }

    /// Like [`Self::open`], with WAL journaling switchable (`storage.wal_mode`).
    pub async fn open_with(path: impl AsRef<Path>, wal: bool) -> Result<Self, CortexError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CortexError::Storage {
                source: Box::new(e),
            })?;
        }
        let conn = Connection::open(&path).await.map_err(open_err)?;
        let db = Self::init(conn, wal).await?;
        debug!(path = %path.display(), "database opened");
        Ok(db)
    }

    /// Open a private in-memory database with the full schema. Used by tests
    /// and ephemeral runs.
    pub async fn open_in_memory() -> Result<Self, CortexError> {
        let conn = Connection::open_in_memory().await.map_err(open_err)?;
        Self::init(conn, false).await
    }

    async fn init(conn: Connection, wal: bool) -> Result<Self, CortexError> {
        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            if wal {
                let _mode: String = conn.pragma_update_and_check(
                    None,
                    "journal_mode",
                    "WAL",
                    |row| row.get(0),
                )?;
                conn.pragma_update(None, "synchronous", "NORMAL")?;
            }
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| -> Result<Result<(), CortexError>, rusqlite::Error> {
            Ok(migrations::run_migrations(conn))
        })
        .await
        .map_err(map_tr_err)??;

        Ok(Self { conn })
    }

    /// The shared connection. All query modules go through `call()` on it.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Cheap liveness probe.
    pub async fn ping(&self) -> Result<(), CortexError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.query_row("SELECT 1", [], |_| Ok(()))
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), CortexError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
            })
            .await
            .map_err(map_tr_err)?;
        self.conn.close().await.map_err(map_tr_err)?;
        debug!("database closed");
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for Database {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, CortexError> {
        Ok(match self.ping().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }
}

fn open_err(e: rusqlite::Error) -> CortexError {
    CortexError::Storage {
        source: Box::new(e),
    }
}

/// Convert tokio-rusqlite errors into [`CortexError::Storage`].
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> CortexError {
    CortexError::Storage {
        source: Box::new(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_schema_and_wal() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("nested/cortex.db")).await.unwrap();

        let (mode, tables): (String, i64) = db
            .connection()
            .call(|conn| -> Result<(String, i64), rusqlite::Error> {
                let mode = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
                let tables = conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                     AND name IN ('memories', 'conversation_turns', 'agents',
                                  'vault_meta', 'vault_entries')",
                    [],
                    |row| row.get(0),
                )?;
                Ok((mode, tables))
            })
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        assert_eq!(tables, 5);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopening_does_not_rerun_migrations() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cortex.db");
        Database::open(&path).await.unwrap().close().await.unwrap();
        let db = Database::open(&path).await.unwrap();
        db.ping().await.unwrap();
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn in_memory_database_is_usable() {
        let db = Database::open_in_memory().await.unwrap();
        db.ping().await.unwrap();
        assert_eq!(db.health_check().await.unwrap(), HealthStatus::Healthy);
        assert_eq!(db.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn unopenable_path_is_a_storage_error() {
        let dir = tempdir().unwrap();
        let err = Database::open(dir.path()).await.unwrap_err();
        assert_eq!(err.kind(), "storage");
    }

    #[tokio::test]
    async fn wal_can_be_disabled() {
        let dir = tempdir().unwrap();
        let db = Database::open_with(dir.path().join("plain.db"), false).await.unwrap();
        let mode: String = db
            .connection()
            .call(|conn| -> Result<String, rusqlite::Error> {
                conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))
            })
            .await
            .unwrap();
        assert_ne!(mode.to_lowercase(), "wal");
    }
}
