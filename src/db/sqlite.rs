// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! SQLite primary store

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use super::{EventQuery, EventStore, LogRecord, LogSummary, StoreError};
use crate::core::{format_timestamp, kinds, timestamp_now, Event};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        source TEXT NOT NULL,
        event_type TEXT NOT NULL,
        payload TEXT NOT NULL,
        accident_detected INTEGER NOT NULL DEFAULT 0,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_timestamp ON events(timestamp DESC);
    CREATE INDEX IF NOT EXISTS idx_source ON events(source);
    CREATE INDEX IF NOT EXISTS idx_accidents ON events(event_type, accident_detected, timestamp);
"#;

/// SQLite-backed event log. Every operation opens its own connection, so the
/// store can be shared freely between the flusher thread and request handlers.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create parent directories and the schema
    pub fn init(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            "#,
        )?;

        info!("Database initialized at {:?}", self.path);
        Ok(())
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(conn)
    }
}

impl EventStore for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn append_batch(&self, batch: &[Event]) -> Result<usize, StoreError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO events (timestamp, source, event_type, payload, accident_detected)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;

            for event in batch {
                let timestamp = event
                    .timestamp
                    .as_ref()
                    .map(format_timestamp)
                    .unwrap_or_else(timestamp_now);
                let payload = serde_json::to_string(event)?;

                stmt.execute(params![
                    timestamp,
                    event.source,
                    event.kind,
                    payload,
                    event.is_accident(),
                ])?;
            }
        }

        tx.commit()?;
        debug!("Wrote {} events to {:?}", batch.len(), self.path);
        Ok(batch.len())
    }
}

impl EventQuery for SqliteStore {
    fn recent(&self, limit: usize) -> Result<Vec<LogRecord>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, source, event_type, payload, created_at
             FROM events
             ORDER BY id DESC
             LIMIT ?1",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], |row| {
            let raw: String = row.get(4)?;
            Ok(LogRecord {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                source: row.get(2)?,
                event_type: row.get(3)?,
                payload: serde_json::from_str(&raw)
                    .unwrap_or_else(|_| serde_json::json!({ "raw": raw })),
                created_at: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn summary(&self) -> Result<LogSummary, StoreError> {
        let conn = self.connect()?;

        let total_events: i64 =
            conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        let by_source = group_counts(&conn, "source")?;
        let by_type = group_counts(&conn, "event_type")?;

        let cutoff = format_timestamp(&(Utc::now() - chrono::Duration::hours(24)));
        let recent_accidents: i64 = conn.query_row(
            "SELECT COUNT(*) FROM events
             WHERE event_type = ?1 AND accident_detected = 1 AND timestamp > ?2",
            params![kinds::CAMERA_DETECTION, cutoff],
            |row| row.get(0),
        )?;

        Ok(LogSummary {
            total_events,
            by_source,
            by_type,
            recent_accidents,
            timestamp: timestamp_now(),
        })
    }
}

fn group_counts(conn: &Connection, column: &str) -> Result<BTreeMap<String, i64>, StoreError> {
    let sql = format!("SELECT {column}, COUNT(*) FROM events GROUP BY {column}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

    let mut counts = BTreeMap::new();
    for row in rows {
        let (key, count) = row?;
        counts.insert(key, count);
    }
    Ok(counts)
}
