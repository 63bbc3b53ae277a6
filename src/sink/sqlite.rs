//! SQLite State Sink
//!
//! Persists device snapshots into a single `device_states` table.
//! Every snapshot becomes its own row; nothing is updated in place.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection, OpenFlags, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::error::{SinkError, SinkResult};
use super::snapshot::DeviceSnapshot;
use super::StateSink;

/// SQLite-backed snapshot store
pub struct SqliteSink {
    /// std::sync::Mutex because rusqlite::Connection is !Sync
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteSink {
    /// Create or open the snapshot database
    pub fn open(path: impl AsRef<Path>) -> SinkResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS device_states (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                servo_pos REAL,
                pot_value REAL,
                system_enabled INTEGER,
                pot_control INTEGER,
                is_reset INTEGER,
                timestamp INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_device_states_timestamp ON device_states(timestamp)",
            [],
        )?;

        tracing::debug!(path = ?path, "Snapshot database ready");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Most recent snapshots, newest first
    pub async fn recent(&self, limit: usize) -> SinkResult<Vec<DeviceSnapshot>> {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || -> SinkResult<Vec<DeviceSnapshot>> {
            let conn = lock(&conn)?;
            let mut stmt = conn.prepare_cached(
                "SELECT servo_pos, pot_value, system_enabled, pot_control, is_reset, timestamp
                 FROM device_states
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?",
            )?;

            let snapshots = stmt
                .query_map(params![limit as i64], row_to_snapshot)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(snapshots)
        })
        .await?
    }

    /// Number of stored snapshots
    pub async fn count(&self) -> SinkResult<u64> {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || -> SinkResult<u64> {
            let conn = lock(&conn)?;
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM device_states", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await?
    }
}

#[async_trait]
impl StateSink for SqliteSink {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn persist(&self, snapshot: &DeviceSnapshot) -> SinkResult<()> {
        let conn = Arc::clone(&self.conn);
        let snapshot = snapshot.clone();

        tokio::task::spawn_blocking(move || -> SinkResult<()> {
            let conn = lock(&conn)?;
            conn.prepare_cached(
                "INSERT INTO device_states
                    (servo_pos, pot_value, system_enabled, pot_control, is_reset, timestamp)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )?
            .execute(params![
                snapshot.servo_pos,
                snapshot.pot_value,
                snapshot.system_enabled,
                snapshot.pot_control,
                snapshot.is_reset,
                snapshot.timestamp.timestamp_millis(),
            ])?;
            Ok(())
        })
        .await?
    }
}

fn lock(conn: &Mutex<Connection>) -> SinkResult<std::sync::MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|e| SinkError::Lock(format!("Failed to acquire database lock: {}", e)))
}

fn row_to_snapshot(row: &Row<'_>) -> rusqlite::Result<DeviceSnapshot> {
    let millis: i64 = row.get(5)?;

    Ok(DeviceSnapshot {
        servo_pos: row.get(0)?,
        pot_value: row.get(1)?,
        system_enabled: row.get(2)?,
        pot_control: row.get(3)?,
        is_reset: row.get(4)?,
        timestamp: Utc
            .timestamp_millis_opt(millis)
            .single()
            .unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_persist_and_read_back() {
        let dir = tempdir().unwrap();
        let sink = SqliteSink::open(dir.path().join("states.db")).unwrap();

        let snapshot = DeviceSnapshot::new().servo_pos(90.0).pot_value(512.0);
        sink.persist(&snapshot).await.unwrap();

        let rows = sink.recent(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].servo_pos, Some(90.0));
        assert_eq!(rows[0].pot_value, Some(512.0));
        assert_eq!(rows[0].system_enabled, None);
        assert_eq!(
            rows[0].timestamp.timestamp_millis(),
            snapshot.timestamp.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_identical_snapshots_are_separate_rows() {
        let dir = tempdir().unwrap();
        let sink = SqliteSink::open(dir.path().join("states.db")).unwrap();

        let snapshot = DeviceSnapshot::new().servo_pos(10.0);
        sink.persist(&snapshot).await.unwrap();
        sink.persist(&snapshot).await.unwrap();

        assert_eq!(sink.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_recent_is_newest_first_and_limited() {
        let dir = tempdir().unwrap();
        let sink = SqliteSink::open(dir.path().join("states.db")).unwrap();

        let base = Utc::now();
        for i in 0..5 {
            let snapshot = DeviceSnapshot::new()
                .servo_pos(i as f64)
                .timestamp(base + chrono::Duration::seconds(i));
            sink.persist(&snapshot).await.unwrap();
        }

        let rows = sink.recent(3).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].servo_pos, Some(4.0));
        assert_eq!(rows[2].servo_pos, Some(2.0));
    }

    #[tokio::test]
    async fn test_reopen_keeps_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("states.db");

        {
            let sink = SqliteSink::open(&path).unwrap();
            sink.persist(&DeviceSnapshot::new().servo_pos(1.0))
                .await
                .unwrap();
        }

        let sink = SqliteSink::open(&path).unwrap();
        assert_eq!(sink.count().await.unwrap(), 1);
        assert_eq!(sink.path(), path.as_path());
    }
}
