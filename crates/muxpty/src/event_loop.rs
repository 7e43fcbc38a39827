use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use muxpty_proc::{ExitResult, ProcessHandle};

use crate::listeners::{Listener, Listeners};
use crate::reader::StreamReader;
use crate::status::{RunState, WorkerState};
use crate::writer::StreamWriter;

/// How long the loop sleeps when a cycle moved no bytes.
const IDLE_INTERVAL: Duration = Duration::from_millis(5);

/// Drains the stream readers and fans each chunk out to the registered
/// listeners, in arrival order; also captures the process exit result.
///
/// Owns the output and error listener registries. The loop runs on its own
/// thread until both readers have terminated and the exit result has been
/// captured; anything buffered before that point is dispatched before the
/// loop stops, so no trailing output is dropped. Reader and writer workers
/// keep their own run-states — a failure here never stops them, and vice
/// versa a reader failure only stops this loop after its buffer is flushed.
///
/// Waiting for process exit is this loop's responsibility: once the exit
/// result is captured it also closes the input queue, letting the writer
/// flush whatever is queued and finish instead of blocking forever.
pub struct EventLoop {
    output_listeners: Arc<Listeners>,
    error_listeners: Arc<Listeners>,
    result: Arc<Mutex<Option<ExitResult>>>,
    state: Arc<RunState>,
}

impl EventLoop {
    /// Start the dispatch thread.
    ///
    /// `seed` holds the output listeners staged before the session started;
    /// it is installed before the first dispatch so no pre-start
    /// registration is lost.
    pub fn spawn(
        output: StreamReader,
        error: Option<StreamReader>,
        input: StreamWriter,
        process: Arc<Mutex<Box<dyn ProcessHandle>>>,
        seed: HashMap<String, Listener>,
    ) -> Self {
        let output_listeners = Arc::new(Listeners::new());
        output_listeners.install(seed);
        let error_listeners = Arc::new(Listeners::new());
        let result = Arc::new(Mutex::new(None));
        let state = Arc::new(RunState::new());

        let ctx = LoopCtx {
            output,
            error,
            input,
            process,
            output_listeners: Arc::clone(&output_listeners),
            error_listeners: Arc::clone(&error_listeners),
            result: Arc::clone(&result),
            state: Arc::clone(&state),
        };
        let spawned = std::thread::Builder::new()
            .name("muxpty-events".to_string())
            .spawn(move || ctx.run());
        if let Err(e) = spawned {
            state.fail(format!("failed to spawn event loop thread: {e}"));
        }

        Self {
            output_listeners,
            error_listeners,
            result,
            state,
        }
    }

    pub fn add_output_listener(&self, name: impl Into<String>, listener: Listener) {
        self.output_listeners.add(name, listener);
    }

    pub fn remove_output_listener(&self, name: &str) {
        self.output_listeners.remove(name);
    }

    pub fn remove_all_output_listeners(&self) {
        self.output_listeners.remove_all();
    }

    pub fn add_error_listener(&self, name: impl Into<String>, listener: Listener) {
        self.error_listeners.add(name, listener);
    }

    pub fn remove_error_listener(&self, name: &str) {
        self.error_listeners.remove(name);
    }

    pub fn remove_all_error_listeners(&self) {
        self.error_listeners.remove_all();
    }

    /// The captured exit result, once the process has exited.
    pub fn result(&self) -> Option<ExitResult> {
        self.result.lock().ok().and_then(|result| *result)
    }

    pub fn state(&self) -> WorkerState {
        self.state.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }
}

/// State moved onto the dispatch thread.
struct LoopCtx {
    output: StreamReader,
    error: Option<StreamReader>,
    input: StreamWriter,
    process: Arc<Mutex<Box<dyn ProcessHandle>>>,
    output_listeners: Arc<Listeners>,
    error_listeners: Arc<Listeners>,
    result: Arc<Mutex<Option<ExitResult>>>,
    state: Arc<RunState>,
}

impl LoopCtx {
    fn run(self) {
        loop {
            let moved = self.pump();
            self.capture_result();

            let readers_stopped = !self.output.is_running()
                && self.error.as_ref().map_or(true, |e| !e.is_running());
            if readers_stopped {
                // Flush whatever arrived between the last pump and the
                // readers stopping.
                self.pump();
                break;
            }

            if !moved {
                std::thread::sleep(IDLE_INTERVAL);
            }
        }

        // The streams are done but the process may still be winding down;
        // capturing its exit result is this loop's job.
        while self.capture_result().is_none() {
            std::thread::sleep(IDLE_INTERVAL);
        }

        // The process is gone; let the writer flush its queue and stop.
        self.input.close();

        match self.reader_failure() {
            Some(message) => self.state.fail(message),
            None => self.state.finish(),
        }
        log::debug!("event loop stopped");
    }

    /// Drain both readers and dispatch every chunk, output first. Returns
    /// whether any chunk moved this cycle.
    fn pump(&self) -> bool {
        let mut moved = false;
        for chunk in self.output.drain() {
            moved = true;
            self.output_listeners.dispatch(&chunk);
        }
        if let Some(error) = &self.error {
            for chunk in error.drain() {
                moved = true;
                self.error_listeners.dispatch(&chunk);
            }
        }
        moved
    }

    /// Probe the process once, capturing the exit result the first time it
    /// appears. Returns the result once captured.
    fn capture_result(&self) -> Option<ExitResult> {
        {
            let Ok(result) = self.result.lock() else {
                return None;
            };
            if result.is_some() {
                return *result;
            }
        }

        let probed = match self.process.lock() {
            Ok(mut process) => process.try_wait(),
            Err(_) => None,
        };
        if let Some(exit) = probed {
            log::debug!("process exited with code {}", exit.exit_code);
            if let Ok(mut result) = self.result.lock() {
                *result = Some(exit);
            }
        }
        probed
    }

    /// The first captured reader failure, if any, to surface as this loop's
    /// own terminal state.
    fn reader_failure(&self) -> Option<String> {
        if let WorkerState::Failed(msg) = self.output.state() {
            return Some(format!("output worker failed: {msg}"));
        }
        if let Some(error) = &self.error {
            if let WorkerState::Failed(msg) = error.state() {
                return Some(format!("error worker failed: {msg}"));
            }
        }
        None
    }
}
