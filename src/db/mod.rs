// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Database module for persistent storage
//!
//! The durable log writes batches to SQLite and falls back to one CSV file per
//! day when SQLite is unavailable. Reads only ever see SQLite.

mod csv;
mod logger;
mod sqlite;

pub use csv::CsvStore;
pub use logger::{DurableLogger, FlushOutcome, FlushPolicy, LoggerError, LoggerStats};
pub use sqlite::SqliteStore;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::Event;

/// Store failure
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("{0}")]
    Unavailable(String),
}

impl StoreError {
    /// Failures of the medium rather than of the data. A transient failure on
    /// the primary store is the expected reason to use the fallback.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Io(_) | StoreError::Unavailable(_) => true,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy
                    | rusqlite::ErrorCode::DatabaseLocked
                    | rusqlite::ErrorCode::CannotOpen
                    | rusqlite::ErrorCode::DiskFull
                    | rusqlite::ErrorCode::SystemIoFailure
                    | rusqlite::ErrorCode::ReadOnly
            ),
            StoreError::Sqlite(_) | StoreError::Serialize(_) => false,
        }
    }
}

/// Append-only batch sink
pub trait EventStore: Send + Sync {
    /// Short name for log lines
    fn name(&self) -> &'static str;

    /// Append the whole batch, in order, as one write sequence
    fn append_batch(&self, batch: &[Event]) -> Result<usize, StoreError>;
}

/// Read path of the primary store
pub trait EventQuery: Send + Sync {
    /// Most recent records first
    fn recent(&self, limit: usize) -> Result<Vec<LogRecord>, StoreError>;

    fn summary(&self) -> Result<LogSummary, StoreError>;
}

/// Primary store: writable and queryable
pub trait PrimaryStore: EventStore + EventQuery {}

impl<T: EventStore + EventQuery> PrimaryStore for T {}

/// Persisted form of an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: i64,
    pub timestamp: String,
    pub source: String,
    pub event_type: String,
    pub payload: Value,
    pub created_at: String,
}

/// Aggregate counts over the persisted log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSummary {
    pub total_events: i64,
    pub by_source: BTreeMap<String, i64>,
    pub by_type: BTreeMap<String, i64>,
    pub recent_accidents: i64,
    pub timestamp: String,
}
