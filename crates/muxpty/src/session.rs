use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use muxpty_proc::{ExitResult, ProcessHandle, ProcessSpawner, SpawnError, WindowSize};

use crate::event_loop::EventLoop;
use crate::listeners::Listener;
use crate::reader::StreamReader;
use crate::status::Status;
use crate::writer::StreamWriter;

/// Probe interval for [`ProcessSession::wait_for`].
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Errors from session lifecycle operations.
#[derive(Debug)]
pub enum SessionError {
    AlreadyStarted,
    NotStarted,
    Spawn(SpawnError),
    MissingStream(&'static str),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::AlreadyStarted => write!(f, "session already started"),
            SessionError::NotStarted => write!(f, "session not started"),
            SessionError::Spawn(err) => write!(f, "spawn failed: {err}"),
            SessionError::MissingStream(stream) => {
                write!(f, "process handle has no {stream} stream")
            }
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Spawn(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SpawnError> for SessionError {
    fn from(err: SpawnError) -> Self {
        SessionError::Spawn(err)
    }
}

/// Non-blocking facade over one child process.
///
/// Composes a [`StreamWriter`] for stdin, a [`StreamReader`] for stdout (and
/// one for stderr when the backend keeps it separate), and an [`EventLoop`]
/// fanning output out to named listeners. Output listeners registered before
/// [`start`](Self::start) are staged and installed into the loop atomically
/// with its creation; error listeners have no staging path and require a
/// started session.
///
/// No worker stops a sibling on failure: poll [`status`](Self::status) or
/// [`is_running`](Self::is_running) to observe health and react, typically by
/// calling [`stop`](Self::stop).
pub struct ProcessSession {
    spawner: Box<dyn ProcessSpawner>,
    pending_output: HashMap<String, Listener>,
    started: Option<Started>,
}

/// Everything that exists only after `start`.
struct Started {
    process: Arc<Mutex<Box<dyn ProcessHandle>>>,
    pid: u32,
    window_size: WindowSize,
    input: StreamWriter,
    output: StreamReader,
    error: Option<StreamReader>,
    event_loop: EventLoop,
}

impl ProcessSession {
    pub fn new(spawner: impl ProcessSpawner + 'static) -> Self {
        Self {
            spawner: Box::new(spawner),
            pending_output: HashMap::new(),
            started: None,
        }
    }

    /// Spawn the process and launch the worker threads.
    ///
    /// Starting twice is rejected with [`SessionError::AlreadyStarted`].
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.started.is_some() {
            return Err(SessionError::AlreadyStarted);
        }

        let mut handle = self.spawner.spawn()?;
        let writer = handle
            .take_writer()
            .ok_or(SessionError::MissingStream("stdin"))?;
        let reader = handle
            .take_reader()
            .ok_or(SessionError::MissingStream("stdout"))?;
        let error_reader = handle.take_error_reader();

        // Cached so status() never has to touch the handle.
        let pid = handle.pid();
        let window_size = handle.window_size();
        let process: Arc<Mutex<Box<dyn ProcessHandle>>> = Arc::new(Mutex::new(handle));

        let input = StreamWriter::spawn("stdin", writer);
        let output = StreamReader::spawn("stdout", reader);
        let error = error_reader.map(|r| StreamReader::spawn("stderr", r));

        let seed = std::mem::take(&mut self.pending_output);
        let event_loop = EventLoop::spawn(
            output.clone(),
            error.clone(),
            input.clone(),
            Arc::clone(&process),
            seed,
        );

        log::debug!("session started, pid {pid}");
        self.started = Some(Started {
            process,
            pid,
            window_size,
            input,
            output,
            error,
            event_loop,
        });
        Ok(())
    }

    /// Register an output listener. Staged before `start`; effective from
    /// the next dispatch afterwards. Re-using a name replaces the previous
    /// listener.
    pub fn add_output_listener(&mut self, name: impl Into<String>, listener: Listener) {
        match &self.started {
            Some(started) => started.event_loop.add_output_listener(name, listener),
            None => {
                self.pending_output.insert(name.into(), listener);
            }
        }
    }

    pub fn remove_output_listener(&mut self, name: &str) {
        match &self.started {
            Some(started) => started.event_loop.remove_output_listener(name),
            None => {
                self.pending_output.remove(name);
            }
        }
    }

    pub fn remove_all_output_listeners(&mut self) {
        match &self.started {
            Some(started) => started.event_loop.remove_all_output_listeners(),
            None => self.pending_output.clear(),
        }
    }

    /// Register an error-stream listener. There is no staging path: the
    /// session must already be started.
    pub fn add_error_listener(
        &mut self,
        name: impl Into<String>,
        listener: Listener,
    ) -> Result<(), SessionError> {
        let started = self.started.as_ref().ok_or(SessionError::NotStarted)?;
        started.event_loop.add_error_listener(name, listener);
        Ok(())
    }

    pub fn remove_error_listener(&mut self, name: &str) -> Result<(), SessionError> {
        let started = self.started.as_ref().ok_or(SessionError::NotStarted)?;
        started.event_loop.remove_error_listener(name);
        Ok(())
    }

    pub fn remove_all_error_listeners(&mut self) -> Result<(), SessionError> {
        let started = self.started.as_ref().ok_or(SessionError::NotStarted)?;
        started.event_loop.remove_all_error_listeners();
        Ok(())
    }

    /// Submit one chunk of bytes to the child's stdin queue. Non-blocking;
    /// check [`status`](Self::status) to learn whether the writer is still
    /// flushing.
    pub fn input(&self, bytes: impl Into<Vec<u8>>) -> Result<(), SessionError> {
        let started = self.started.as_ref().ok_or(SessionError::NotStarted)?;
        started.input.submit(bytes.into());
        Ok(())
    }

    /// Build a point-in-time status snapshot. Never blocks on process I/O.
    pub fn status(&self) -> Result<Status, SessionError> {
        let started = self.started.as_ref().ok_or(SessionError::NotStarted)?;
        Ok(Status {
            pid: started.pid,
            window_size: started.window_size,
            result: started.event_loop.result(),
            event_loop: started.event_loop.state(),
            input: started.input.state(),
            output: started.output.state(),
            error: started.error.as_ref().map(|e| e.state()),
        })
    }

    /// True while any worker thread is still running. False before `start`.
    pub fn is_running(&self) -> bool {
        let Some(started) = &self.started else {
            return false;
        };
        started.event_loop.is_running()
            || started.input.is_running()
            || started.output.is_running()
            || started.error.as_ref().is_some_and(|e| e.is_running())
    }

    /// Request process destruction. The workers are not stopped directly;
    /// they wind down as the process's streams close or fail.
    pub fn stop(&self) -> Result<(), SessionError> {
        let started = self.started.as_ref().ok_or(SessionError::NotStarted)?;
        if let Ok(mut process) = started.process.lock() {
            process.destroy();
        }
        Ok(())
    }

    /// Wait up to `timeout` for the process to exit, returning its result if
    /// it did. Does not wait for the workers to drain. The shared handle is
    /// locked only per probe, so the event loop keeps dispatching while the
    /// caller waits.
    pub fn wait_for(&self, timeout: Duration) -> Result<Option<ExitResult>, SessionError> {
        let started = self.started.as_ref().ok_or(SessionError::NotStarted)?;
        let deadline = Instant::now() + timeout;
        loop {
            let probed = match started.process.lock() {
                Ok(mut process) => process.try_wait(),
                Err(_) => None,
            };
            if probed.is_some() {
                return Ok(probed);
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(WAIT_POLL_INTERVAL);
        }
    }
}
