use std::io::{Read, Write};

use serde::Serialize;

/// Errors from spawning a child process.
#[derive(Debug)]
pub enum SpawnError {
    SpawnFailed(String),
    IoError(std::io::Error),
}

impl std::fmt::Display for SpawnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpawnError::SpawnFailed(msg) => write!(f, "spawn failed: {msg}"),
            SpawnError::IoError(err) => write!(f, "spawn I/O error: {err}"),
        }
    }
}

impl std::error::Error for SpawnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SpawnError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SpawnError {
    fn from(err: std::io::Error) -> Self {
        SpawnError::IoError(err)
    }
}

/// Captured outcome of a child process exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExitResult {
    pub exit_code: u32,
}

impl ExitResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Terminal dimensions reported by a process handle.
///
/// Pipe-backed processes have no terminal and report zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowSize {
    pub rows: u16,
    pub cols: u16,
}

/// A spawned child process, seen as a pid plus raw byte streams.
///
/// The streams are extracted once each (`take_*`) so they can be moved onto
/// dedicated I/O threads; blocking reads and writes never go through the
/// handle itself, which keeps `destroy` and `try_wait` responsive.
pub trait ProcessHandle: Send {
    fn pid(&self) -> u32;

    fn window_size(&self) -> WindowSize;

    /// Extract the child's stdin writer. Returns `None` after the first call.
    fn take_writer(&mut self) -> Option<Box<dyn Write + Send>>;

    /// Extract the child's stdout reader. Returns `None` after the first call.
    fn take_reader(&mut self) -> Option<Box<dyn Read + Send>>;

    /// Extract the child's stderr reader, when the backend keeps stderr
    /// separate from stdout. PTY-backed processes merge the two and always
    /// return `None`.
    fn take_error_reader(&mut self) -> Option<Box<dyn Read + Send>>;

    /// Best-effort kill of the child process.
    fn destroy(&mut self);

    /// Non-blocking exit probe. Returns `Some` once the child has exited.
    fn try_wait(&mut self) -> Option<ExitResult>;
}

/// Spawns a child process in a working directory with an argument vector.
pub trait ProcessSpawner: Send {
    fn spawn(&self) -> Result<Box<dyn ProcessHandle>, SpawnError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_result_success() {
        assert!(ExitResult { exit_code: 0 }.success());
        assert!(!ExitResult { exit_code: 1 }.success());
        assert!(!ExitResult { exit_code: 137 }.success());
    }

    #[test]
    fn test_spawn_error_display() {
        let err = SpawnError::SpawnFailed("no such program".to_string());
        assert_eq!(err.to_string(), "spawn failed: no such program");

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(SpawnError::from(io).to_string().contains("gone"));
    }
}
