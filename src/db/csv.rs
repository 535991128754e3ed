// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Flat-file fallback store: one CSV file per calendar day

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, info};

use super::{EventStore, StoreError};
use crate::core::{format_timestamp, timestamp_now, Event};

const HEADER: &str = "timestamp,source,event_type,payload";

/// Append-only CSV store
#[derive(Debug, Clone)]
pub struct CsvStore {
    dir: PathBuf,
}

impl CsvStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File receiving today's fallback writes
    pub fn current_file(&self) -> PathBuf {
        self.dir
            .join(format!("events_{}.csv", Local::now().format("%Y%m%d")))
    }
}

impl EventStore for CsvStore {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn append_batch(&self, batch: &[Event]) -> Result<usize, StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.current_file();

        // Serialize first so a bad event cannot leave a half-written batch
        let mut lines = Vec::with_capacity(batch.len());
        for event in batch {
            let timestamp = event
                .timestamp
                .as_ref()
                .map(format_timestamp)
                .unwrap_or_else(timestamp_now);
            let payload = serde_json::to_string(event)?;
            lines.push(format!(
                "{},{},{},{}",
                quote(&timestamp),
                quote(&event.source),
                quote(&event.kind),
                quote(&payload)
            ));
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_new = file.metadata()?.len() == 0;
        let mut writer = BufWriter::new(file);

        if is_new {
            writeln!(writer, "{HEADER}")?;
            info!("Created fallback log {:?}", path);
        }
        for line in &lines {
            writeln!(writer, "{line}")?;
        }
        writer.flush()?;

        debug!("Appended {} events to {:?}", batch.len(), path);
        Ok(batch.len())
    }
}

/// RFC 4180 field quoting
fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split one CSV record back into fields. Only needed to read fallback files
/// back in tests and tooling.
#[cfg(test)]
pub(crate) fn parse_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', true) => in_quotes = false,
            ('"', false) if field.is_empty() => in_quotes = true,
            (',', false) => fields.push(std::mem::take(&mut field)),
            (c, _) => field.push(c),
        }
    }
    fields.push(field);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_quote() {
        assert_eq!(quote("cam0"), "cam0");
        assert_eq!(quote("a,b"), "\"a,b\"");
        assert_eq!(quote(r#"{"k":"v"}"#), r#""{""k"":""v""}""#);
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempdir().unwrap();
        let store = CsvStore::new(dir.path().join("logs"));

        store.append_batch(&[Event::noise_level(90.0, 85.0)]).unwrap();
        store
            .append_batch(&[Event::ppe_detection(0, 1, 1, vec!["vest".into()], 10.0)])
            .unwrap();

        let content = std::fs::read_to_string(store.current_file()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER);
        assert_eq!(content.matches(HEADER).count(), 1);

        let fields = parse_record(lines[2]);
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[1], "cam10");
        let payload: serde_json::Value = serde_json::from_str(&fields[3]).unwrap();
        assert_eq!(payload["missing_items"][0], "vest");
    }

    #[test]
    fn test_file_named_by_day() {
        let store = CsvStore::new("logs");
        let name = store.current_file().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("events_"));
        assert!(name.ends_with(".csv"));
        assert_eq!(name.len(), "events_YYYYMMDD.csv".len());
    }
}
