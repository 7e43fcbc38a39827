use std::sync::Mutex;

use serde::Serialize;

use muxpty_proc::{ExitResult, WindowSize};

/// Externally observable health of one worker thread.
///
/// Terminal once it leaves `Running`; a worker never restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum WorkerState {
    /// The worker thread is alive and serving its stream.
    Running,
    /// The worker finished cleanly (stream reached end-of-input, or the
    /// queue was closed).
    Done,
    /// The worker hit an I/O failure and stopped, with the captured message.
    Failed(String),
}

impl WorkerState {
    pub fn is_running(&self) -> bool {
        matches!(self, WorkerState::Running)
    }
}

/// Shared run-state cell for one worker.
///
/// Written only by the owning worker thread, read by anyone building a
/// status snapshot. The first transition out of `Running` wins; later
/// transitions are ignored.
#[derive(Debug)]
pub struct RunState {
    state: Mutex<WorkerState>,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WorkerState::Running),
        }
    }

    pub fn is_running(&self) -> bool {
        self.snapshot().is_running()
    }

    pub fn snapshot(&self) -> WorkerState {
        match self.state.lock() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Mark the worker cleanly finished.
    pub fn finish(&self) {
        self.transition(WorkerState::Done);
    }

    /// Mark the worker failed with a captured error message.
    pub fn fail(&self, message: impl Into<String>) {
        self.transition(WorkerState::Failed(message.into()));
    }

    fn transition(&self, next: WorkerState) {
        if let Ok(mut state) = self.state.lock() {
            if state.is_running() {
                *state = next;
            }
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time aggregate of the process and worker health.
///
/// Built on demand by [`crate::ProcessSession::status`]; never cached.
/// `error` is `None` when the backend merges stderr into stdout.
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub pid: u32,
    pub window_size: WindowSize,
    pub result: Option<ExitResult>,
    pub event_loop: WorkerState,
    pub input: WorkerState,
    pub output: WorkerState,
    pub error: Option<WorkerState>,
}
