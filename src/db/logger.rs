// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Durable event logger
//!
//! Events are buffered in memory and written in batches. A batch is cut when the
//! buffer reaches `max_batch` events or `max_interval` has passed since the last
//! cut, and handed to a single flusher thread. The buffer lock is only held to
//! push or swap the buffer; store I/O happens on the flusher thread.
//!
//! At most [`MAX_QUEUED_BATCHES`] batches wait for the flusher. While that queue
//! is full, events stay in the buffer and the cut is retried on the next event
//! or tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use super::{CsvStore, EventStore, LogRecord, LogSummary, PrimaryStore, SqliteStore, StoreError};
use crate::config::Config;
use crate::core::Event;

/// Cut batches allowed to wait for the flusher thread
pub const MAX_QUEUED_BATCHES: usize = 4;

/// Logger failure
#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("logger is closed")]
    Closed,

    #[error("flush thread is gone")]
    FlusherGone,

    #[error("batch of {count} events lost (primary: {primary}; fallback: {fallback})")]
    BatchLost {
        count: usize,
        primary: StoreError,
        fallback: StoreError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Where a batch ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Empty,
    Primary(usize),
    Fallback(usize),
}

/// When to cut a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    pub max_batch: usize,
    pub max_interval: Duration,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            max_batch: 100,
            max_interval: Duration::from_secs(60),
        }
    }
}

impl FlushPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_batch: config.storage.flush_batch_size.max(1),
            max_interval: config.flush_interval(),
        }
    }

    pub fn is_due(&self, buffered: usize, since_last_flush: Duration) -> bool {
        buffered > 0 && (buffered >= self.max_batch || since_last_flush >= self.max_interval)
    }
}

/// Counters since start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoggerStats {
    pub events_logged: u64,
    pub primary_flushes: u64,
    pub fallback_flushes: u64,
    pub events_persisted: u64,
    pub batches_lost: u64,
    pub events_lost: u64,
}

#[derive(Default)]
struct Counters {
    events_logged: AtomicU64,
    primary_flushes: AtomicU64,
    fallback_flushes: AtomicU64,
    events_persisted: AtomicU64,
    batches_lost: AtomicU64,
    events_lost: AtomicU64,
}

impl Counters {
    fn record(&self, outcome: &Result<FlushOutcome, LoggerError>, count: usize) {
        let count = count as u64;
        match outcome {
            Ok(FlushOutcome::Empty) => {}
            Ok(FlushOutcome::Primary(_)) => {
                self.primary_flushes.fetch_add(1, Ordering::Relaxed);
                self.events_persisted.fetch_add(count, Ordering::Relaxed);
            }
            Ok(FlushOutcome::Fallback(_)) => {
                self.fallback_flushes.fetch_add(1, Ordering::Relaxed);
                self.events_persisted.fetch_add(count, Ordering::Relaxed);
            }
            Err(_) => {
                self.batches_lost.fetch_add(1, Ordering::Relaxed);
                self.events_lost.fetch_add(count, Ordering::Relaxed);
            }
        }
    }

    fn snapshot(&self) -> LoggerStats {
        LoggerStats {
            events_logged: self.events_logged.load(Ordering::Relaxed),
            primary_flushes: self.primary_flushes.load(Ordering::Relaxed),
            fallback_flushes: self.fallback_flushes.load(Ordering::Relaxed),
            events_persisted: self.events_persisted.load(Ordering::Relaxed),
            batches_lost: self.batches_lost.load(Ordering::Relaxed),
            events_lost: self.events_lost.load(Ordering::Relaxed),
        }
    }
}

enum FlushRequest {
    Batch(Vec<Event>),
    Close {
        batch: Vec<Event>,
        reply: Sender<Result<FlushOutcome, LoggerError>>,
    },
}

struct Buffer {
    events: Vec<Event>,
    last_flush: Instant,
    /// `None` once closed
    flusher: Option<Sender<FlushRequest>>,
    /// Set while the flusher queue is full
    backlogged: bool,
}

/// Buffered, batch-flushing event log with a fallback store
pub struct DurableLogger {
    buffer: Mutex<Buffer>,
    policy: FlushPolicy,
    primary: Arc<dyn PrimaryStore>,
    counters: Arc<Counters>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DurableLogger {
    /// SQLite primary and CSV fallback at the configured locations. A database
    /// that cannot be initialized is not fatal: flushes go to the fallback.
    pub fn open(config: &Config) -> Result<Self, LoggerError> {
        let primary = SqliteStore::new(&config.storage.db_path);
        if let Err(e) = primary.init() {
            error!("Database initialization error: {}", e);
            warn!("Will use CSV fallback for logging");
        }
        let fallback = CsvStore::new(&config.storage.log_dir);

        let logger = Self::new(
            Arc::new(primary),
            Box::new(fallback),
            FlushPolicy::from_config(config),
        )?;
        info!("EventLogger initialized (DB: {:?})", config.storage.db_path);
        Ok(logger)
    }

    pub fn new(
        primary: Arc<dyn PrimaryStore>,
        fallback: Box<dyn EventStore>,
        policy: FlushPolicy,
    ) -> Result<Self, LoggerError> {
        let (tx, rx) = channel::bounded(MAX_QUEUED_BATCHES);
        let counters = Arc::new(Counters::default());

        let worker = {
            let primary = primary.clone();
            let counters = counters.clone();
            std::thread::Builder::new()
                .name("log-flusher".into())
                .spawn(move || run_flusher(rx, primary, fallback, counters))
                .map_err(StoreError::from)?
        };

        Ok(Self {
            buffer: Mutex::new(Buffer {
                events: Vec::with_capacity(policy.max_batch),
                last_flush: Instant::now(),
                flusher: Some(tx),
                backlogged: false,
            }),
            policy,
            primary,
            counters,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Buffer an event. Never waits on storage.
    pub fn log_event(&self, event: Event) -> Result<(), LoggerError> {
        let mut buffer = self.buffer.lock();
        if buffer.flusher.is_none() {
            return Err(LoggerError::Closed);
        }

        buffer.events.push(event);
        self.counters.events_logged.fetch_add(1, Ordering::Relaxed);

        if self.policy.is_due(buffer.events.len(), buffer.last_flush.elapsed()) {
            cut_batch(&mut buffer)?;
        }
        Ok(())
    }

    /// Cut a batch if the time threshold has passed. Returns whether one was cut.
    pub fn flush_if_due(&self) -> Result<bool, LoggerError> {
        let mut buffer = self.buffer.lock();
        if buffer.flusher.is_none() {
            return Ok(false);
        }
        if !self.policy.is_due(buffer.events.len(), buffer.last_flush.elapsed()) {
            return Ok(false);
        }
        cut_batch(&mut buffer)?;
        Ok(true)
    }

    /// Newest records first, from the primary store only
    pub fn get_recent(&self, limit: usize) -> Result<Vec<LogRecord>, StoreError> {
        self.primary.recent(limit)
    }

    pub fn get_summary(&self) -> Result<LogSummary, StoreError> {
        self.primary.summary()
    }

    /// Events waiting for the next batch
    pub fn buffered(&self) -> usize {
        self.buffer.lock().events.len()
    }

    pub fn stats(&self) -> LoggerStats {
        self.counters.snapshot()
    }

    pub fn policy(&self) -> FlushPolicy {
        self.policy
    }

    /// Flush everything still buffered, wait for it to land, and stop the
    /// flusher. Later calls return `FlushOutcome::Empty`.
    pub fn close(&self) -> Result<FlushOutcome, LoggerError> {
        let (reply_tx, reply_rx) = channel::bounded(1);
        {
            let mut buffer = self.buffer.lock();
            let Some(flusher) = buffer.flusher.take() else {
                return Ok(FlushOutcome::Empty);
            };
            let batch = std::mem::take(&mut buffer.events);
            buffer.last_flush = Instant::now();
            if !batch.is_empty() {
                info!("Flushing {} remaining events before shutdown...", batch.len());
            }
            flusher
                .send(FlushRequest::Close { batch, reply: reply_tx })
                .map_err(|_| LoggerError::FlusherGone)?;
        }

        let result = reply_rx.recv().map_err(|_| LoggerError::FlusherGone)?;
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                error!("Flush thread panicked");
            }
        }
        info!("Logger closed");
        result
    }
}

impl Drop for DurableLogger {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("Error closing logger: {}", e);
        }
    }
}

/// Hand the buffer to the flusher. A full queue leaves the events buffered.
fn cut_batch(buffer: &mut Buffer) -> Result<(), LoggerError> {
    let Some(flusher) = buffer.flusher.as_ref() else {
        return Err(LoggerError::Closed);
    };

    let batch = std::mem::take(&mut buffer.events);
    match flusher.try_send(FlushRequest::Batch(batch)) {
        Ok(()) => {
            buffer.last_flush = Instant::now();
            if buffer.backlogged {
                buffer.backlogged = false;
                info!("Flush backlog cleared");
            }
            Ok(())
        }
        Err(TrySendError::Full(request)) => {
            if let FlushRequest::Batch(batch) = request {
                buffer.events = batch;
            }
            if !buffer.backlogged {
                buffer.backlogged = true;
                warn!(
                    "Flush backlog: {} batches queued, holding {} events in memory",
                    MAX_QUEUED_BATCHES,
                    buffer.events.len()
                );
            }
            Ok(())
        }
        Err(TrySendError::Disconnected(_)) => Err(LoggerError::FlusherGone),
    }
}

fn run_flusher(
    rx: Receiver<FlushRequest>,
    primary: Arc<dyn PrimaryStore>,
    fallback: Box<dyn EventStore>,
    counters: Arc<Counters>,
) {
    for request in rx.iter() {
        match request {
            FlushRequest::Batch(batch) => {
                let result = flush_batch(primary.as_ref(), fallback.as_ref(), &batch);
                counters.record(&result, batch.len());
                if let Err(e) = result {
                    error!("Flush failed: {}", e);
                }
            }
            FlushRequest::Close { batch, reply } => {
                let result = flush_batch(primary.as_ref(), fallback.as_ref(), &batch);
                counters.record(&result, batch.len());
                if let Err(e) = &result {
                    error!("Final flush failed: {}", e);
                }
                let _ = reply.send(result);
                break;
            }
        }
    }
}

/// Primary first, then fallback. There is no third option.
fn flush_batch(
    primary: &dyn PrimaryStore,
    fallback: &dyn EventStore,
    batch: &[Event],
) -> Result<FlushOutcome, LoggerError> {
    if batch.is_empty() {
        return Ok(FlushOutcome::Empty);
    }

    let primary_err = match primary.append_batch(batch) {
        Ok(count) => {
            info!("Flushed {} events to {}", count, primary.name());
            return Ok(FlushOutcome::Primary(count));
        }
        Err(e) => e,
    };

    if primary_err.is_transient() {
        warn!("{} flush failed: {}", primary.name(), primary_err);
    } else {
        error!("{} flush failed: {}", primary.name(), primary_err);
    }

    match fallback.append_batch(batch) {
        Ok(count) => {
            info!("Flushed {} events to {} fallback", count, fallback.name());
            Ok(FlushOutcome::Fallback(count))
        }
        Err(fallback_err) => Err(LoggerError::BatchLost {
            count: batch.len(),
            primary: primary_err,
            fallback: fallback_err,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::csv::parse_record;
    use crate::db::EventQuery;
    use tempfile::{tempdir, TempDir};

    /// Primary store that is always down
    struct DownStore;

    impl EventStore for DownStore {
        fn name(&self) -> &'static str {
            "down"
        }

        fn append_batch(&self, _batch: &[Event]) -> Result<usize, StoreError> {
            Err(StoreError::Unavailable("database is down".into()))
        }
    }

    impl EventQuery for DownStore {
        fn recent(&self, _limit: usize) -> Result<Vec<LogRecord>, StoreError> {
            Err(StoreError::Unavailable("database is down".into()))
        }

        fn summary(&self) -> Result<LogSummary, StoreError> {
            Err(StoreError::Unavailable("database is down".into()))
        }
    }

    /// Primary whose writes wait until the test releases them
    struct GatedStore {
        entered: Sender<()>,
        gate: Receiver<()>,
        written: Mutex<Vec<i64>>,
    }

    impl EventStore for GatedStore {
        fn name(&self) -> &'static str {
            "gated"
        }

        fn append_batch(&self, batch: &[Event]) -> Result<usize, StoreError> {
            let _ = self.entered.send(());
            let _ = self.gate.recv();
            let mut written = self.written.lock();
            for event in batch {
                written.push(event.get("seq").and_then(|v| v.as_f64()).unwrap_or(-1.0) as i64);
            }
            Ok(batch.len())
        }
    }

    impl EventQuery for GatedStore {
        fn recent(&self, _limit: usize) -> Result<Vec<LogRecord>, StoreError> {
            Ok(Vec::new())
        }

        fn summary(&self) -> Result<LogSummary, StoreError> {
            Err(StoreError::Unavailable("not tracked".into()))
        }
    }

    fn policy(max_batch: usize, max_interval: Duration) -> FlushPolicy {
        FlushPolicy { max_batch, max_interval }
    }

    fn sqlite_logger(policy: FlushPolicy) -> (TempDir, Arc<SqliteStore>, DurableLogger) {
        let dir = tempdir().unwrap();
        let primary = Arc::new(SqliteStore::new(dir.path().join("events.db")));
        primary.init().unwrap();
        let fallback = CsvStore::new(dir.path().join("logs"));
        let logger = DurableLogger::new(primary.clone(), Box::new(fallback), policy).unwrap();
        (dir, primary, logger)
    }

    fn numbered(i: i64) -> Event {
        Event::noise_level(60.0, 85.0).with("seq", i)
    }

    #[test]
    fn test_policy_thresholds() {
        let p = FlushPolicy::default();
        assert!(!p.is_due(99, Duration::from_secs(59)));
        assert!(p.is_due(100, Duration::ZERO));
        assert!(p.is_due(1, Duration::from_secs(60)));
        assert!(!p.is_due(0, Duration::from_secs(600)));
    }

    #[test]
    fn test_flush_at_batch_size() {
        let (_dir, primary, logger) = sqlite_logger(policy(100, Duration::from_secs(3600)));

        for i in 0..99 {
            logger.log_event(numbered(i)).unwrap();
        }
        assert_eq!(logger.buffered(), 99);

        logger.log_event(numbered(99)).unwrap();
        assert_eq!(logger.buffered(), 0);

        assert_eq!(logger.close().unwrap(), FlushOutcome::Empty);
        let stats = logger.stats();
        assert_eq!(stats.primary_flushes, 1);
        assert_eq!(stats.events_persisted, 100);
        assert_eq!(primary.summary().unwrap().total_events, 100);
    }

    #[test]
    fn test_flush_after_interval() {
        let (_dir, _primary, logger) = sqlite_logger(policy(100, Duration::from_millis(200)));

        logger.log_event(numbered(0)).unwrap();
        assert_eq!(logger.buffered(), 1);
        assert!(!logger.flush_if_due().unwrap());

        std::thread::sleep(Duration::from_millis(300));
        logger.log_event(numbered(1)).unwrap();
        assert_eq!(logger.buffered(), 0);

        logger.log_event(numbered(2)).unwrap();
        std::thread::sleep(Duration::from_millis(300));
        assert!(logger.flush_if_due().unwrap());
        assert_eq!(logger.buffered(), 0);

        logger.close().unwrap();
        assert_eq!(logger.stats().primary_flushes, 2);
        assert_eq!(logger.get_recent(10).unwrap().len(), 3);
    }

    #[test]
    fn test_close_flushes_single_event() {
        let (_dir, _primary, logger) = sqlite_logger(policy(100, Duration::from_secs(3600)));

        logger.log_event(numbered(7)).unwrap();
        assert_eq!(logger.close().unwrap(), FlushOutcome::Primary(1));

        let recent = logger.get_recent(10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].payload["seq"], 7);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (_dir, _primary, logger) = sqlite_logger(FlushPolicy::default());

        logger.log_event(numbered(1)).unwrap();
        assert_eq!(logger.close().unwrap(), FlushOutcome::Primary(1));
        assert_eq!(logger.close().unwrap(), FlushOutcome::Empty);
        assert!(matches!(logger.log_event(numbered(2)), Err(LoggerError::Closed)));
        assert!(!logger.flush_if_due().unwrap());
    }

    #[test]
    fn test_primary_failure_goes_to_fallback_without_loss() {
        let dir = tempdir().unwrap();
        let fallback = CsvStore::new(dir.path().join("logs"));
        let logger = DurableLogger::new(
            Arc::new(DownStore),
            Box::new(fallback.clone()),
            policy(100, Duration::from_secs(3600)),
        )
        .unwrap();

        for i in 0..150 {
            logger.log_event(numbered(i)).unwrap();
        }
        assert_eq!(logger.close().unwrap(), FlushOutcome::Fallback(50));

        let stats = logger.stats();
        assert_eq!(stats.fallback_flushes, 2);
        assert_eq!(stats.primary_flushes, 0);
        assert_eq!(stats.events_lost, 0);

        let content = std::fs::read_to_string(fallback.current_file()).unwrap();
        let rows: Vec<&str> = content.lines().skip(1).collect();
        assert_eq!(rows.len(), 150);

        let seqs: Vec<i64> = rows
            .iter()
            .map(|line| {
                let fields = parse_record(line);
                let payload: serde_json::Value = serde_json::from_str(&fields[3]).unwrap();
                payload["seq"].as_i64().unwrap()
            })
            .collect();
        assert_eq!(seqs, (0..150).collect::<Vec<_>>());
    }

    #[test]
    fn test_both_stores_failing_reports_lost_batch() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let fallback = CsvStore::new(blocker.join("logs"));
        let logger =
            DurableLogger::new(Arc::new(DownStore), Box::new(fallback), FlushPolicy::default())
                .unwrap();

        logger.log_event(numbered(1)).unwrap();
        match logger.close() {
            Err(LoggerError::BatchLost { count, .. }) => assert_eq!(count, 1),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(logger.stats().events_lost, 1);
        assert!(logger.get_recent(1).is_err());
    }

    #[test]
    fn test_full_flush_queue_keeps_events_buffered() {
        let dir = tempdir().unwrap();
        let (entered_tx, entered_rx) = channel::unbounded();
        let (gate_tx, gate_rx) = channel::unbounded();
        let store = Arc::new(GatedStore {
            entered: entered_tx,
            gate: gate_rx,
            written: Mutex::new(Vec::new()),
        });
        let fallback = CsvStore::new(dir.path().join("logs"));
        let logger = DurableLogger::new(
            store.clone(),
            Box::new(fallback),
            policy(1, Duration::from_secs(3600)),
        )
        .unwrap();

        // The flusher holds batch 0 while the queue fills up behind it
        logger.log_event(numbered(0)).unwrap();
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        for i in 1..=MAX_QUEUED_BATCHES as i64 {
            logger.log_event(numbered(i)).unwrap();
        }
        assert_eq!(logger.buffered(), 0);

        let first_held = MAX_QUEUED_BATCHES as i64 + 1;
        logger.log_event(numbered(first_held)).unwrap();
        logger.log_event(numbered(first_held + 1)).unwrap();
        assert_eq!(logger.buffered(), 2);

        drop(gate_tx);
        assert_eq!(logger.close().unwrap(), FlushOutcome::Primary(2));

        let written = store.written.lock().clone();
        assert_eq!(written, (0..=first_held + 1).collect::<Vec<_>>());
        assert_eq!(logger.stats().events_lost, 0);
    }
}
