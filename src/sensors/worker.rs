// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Worker thread lifecycle: Stopped -> Running -> Stopping -> Stopped

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

/// Longest uninterrupted sleep inside a worker loop
const SLEEP_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker is still stopping")]
    Stopping,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Stopped,
    Running,
    Stopping,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => WorkerState::Running,
            2 => WorkerState::Stopping,
            _ => WorkerState::Stopped,
        }
    }
}

/// Shared lifecycle flag, read by the worker loop and by status queries
#[derive(Debug)]
pub struct WorkerControl {
    state: AtomicU8,
}

impl WorkerControl {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(WorkerState::Stopped as u8),
        }
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Loop condition for worker bodies
    pub fn is_running(&self) -> bool {
        self.state() == WorkerState::Running
    }

    fn set(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: WorkerState, to: WorkerState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Sleep up to `duration`, waking early once a stop is requested.
    /// Returns whether the worker is still running.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        while self.is_running() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
        self.is_running()
    }
}

impl Default for WorkerControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Body of a worker thread. `run` returns when `control` stops running or
/// when the task cannot continue.
pub trait WorkerTask: Send + 'static {
    fn run(&mut self, control: &WorkerControl);
}

/// Marks the worker stopped however the thread exits
struct StoppedOnExit(Arc<WorkerControl>);

impl Drop for StoppedOnExit {
    fn drop(&mut self) {
        self.0.set(WorkerState::Stopped);
    }
}

/// Restartable background worker running a [`WorkerTask`] on a named thread
pub struct Worker {
    name: String,
    control: Arc<WorkerControl>,
    task: Arc<Mutex<Box<dyn WorkerTask>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    pub fn new(name: impl Into<String>, task: impl WorkerTask) -> Self {
        Self {
            name: name.into(),
            control: Arc::new(WorkerControl::new()),
            task: Arc::new(Mutex::new(Box::new(task))),
            handle: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start the worker. No-op when already running.
    pub fn start(&self) -> Result<(), WorkerError> {
        match self.control.state() {
            WorkerState::Running => return Ok(()),
            WorkerState::Stopping => return Err(WorkerError::Stopping),
            WorkerState::Stopped => {}
        }
        if !self.control.transition(WorkerState::Stopped, WorkerState::Running) {
            return Ok(());
        }

        // Reap the previous run; it already reported Stopped
        if let Some(previous) = self.handle.lock().take() {
            let _ = previous.join();
        }

        let control = self.control.clone();
        let task = self.task.clone();
        let spawned = thread::Builder::new().name(self.name.clone()).spawn(move || {
            let _stopped = StoppedOnExit(control.clone());
            let mut task = task.lock();
            task.run(&control);
        });

        match spawned {
            Ok(handle) => {
                *self.handle.lock() = Some(handle);
                info!("{} worker started", self.name);
                Ok(())
            }
            Err(e) => {
                self.control.set(WorkerState::Stopped);
                Err(WorkerError::Spawn(e))
            }
        }
    }

    /// Request a stop. Returns `false` when the worker was not running.
    pub fn stop(&self) -> bool {
        let requested = self
            .control
            .transition(WorkerState::Running, WorkerState::Stopping);
        if requested {
            info!("Stopping {} worker...", self.name);
        }
        requested
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    pub fn state(&self) -> WorkerState {
        self.control.state()
    }

    /// Block until the current run has exited
    pub fn join(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("{} worker thread panicked", self.name);
            }
        }
    }

    /// Lifecycle flag for status reporting
    pub fn control(&self) -> Arc<WorkerControl> {
        self.control.clone()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}
