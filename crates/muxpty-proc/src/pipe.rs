use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;

use crate::handle::{ExitResult, ProcessHandle, ProcessSpawner, SpawnError, WindowSize};

/// Spawns a child on plain pipes via `std::process::Command`.
///
/// There is no terminal, so the window size reports zeros. Unlike the PTY
/// backend, stderr stays on its own pipe and is exposed through
/// `take_error_reader`.
pub struct PipeSpawner {
    dir: PathBuf,
    argv: Vec<String>,
}

impl PipeSpawner {
    /// Describe a command to spawn in `dir`. The first element of `argv` is
    /// the program, the rest its arguments.
    pub fn new(dir: impl Into<PathBuf>, argv: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            dir: dir.into(),
            argv: argv.into_iter().map(Into::into).collect(),
        }
    }
}

impl ProcessSpawner for PipeSpawner {
    fn spawn(&self) -> Result<Box<dyn ProcessHandle>, SpawnError> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| SpawnError::SpawnFailed("empty argument vector".to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .current_dir(&self.dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let writer = child
            .stdin
            .take()
            .map(|s| Box::new(s) as Box<dyn Write + Send>);
        let reader = child
            .stdout
            .take()
            .map(|s| Box::new(s) as Box<dyn Read + Send>);
        let error = child
            .stderr
            .take()
            .map(|s| Box::new(s) as Box<dyn Read + Send>);

        Ok(Box::new(PipeProcess {
            pid: child.id(),
            child,
            writer,
            reader,
            error,
        }))
    }
}

/// A pipe-backed child process.
struct PipeProcess {
    pid: u32,
    child: Child,
    writer: Option<Box<dyn Write + Send>>,
    reader: Option<Box<dyn Read + Send>>,
    error: Option<Box<dyn Read + Send>>,
}

impl ProcessHandle for PipeProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn window_size(&self) -> WindowSize {
        WindowSize { rows: 0, cols: 0 }
    }

    fn take_writer(&mut self) -> Option<Box<dyn Write + Send>> {
        self.writer.take()
    }

    fn take_reader(&mut self) -> Option<Box<dyn Read + Send>> {
        self.reader.take()
    }

    fn take_error_reader(&mut self) -> Option<Box<dyn Read + Send>> {
        self.error.take()
    }

    fn destroy(&mut self) {
        if let Err(e) = self.child.kill() {
            log::debug!("kill of pid {} failed: {e}", self.pid);
        }
    }

    fn try_wait(&mut self) -> Option<ExitResult> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(ExitResult {
                exit_code: exit_code_of(status),
            }),
            _ => None,
        }
    }
}

/// Map an `ExitStatus` to a single code; a signal death becomes `128 + signo`.
fn exit_code_of(status: std::process::ExitStatus) -> u32 {
    if let Some(code) = status.code() {
        return code as u32;
    }
    #[cfg(unix)]
    if let Some(signal) = status.signal() {
        return 128 + signal as u32;
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn wait_exit(handle: &mut Box<dyn ProcessHandle>, timeout: Duration) -> Option<ExitResult> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(exit) = handle.try_wait() {
                return Some(exit);
            }
            if Instant::now() > deadline {
                return None;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn test_exit_code_captured() {
        let spawner = PipeSpawner::new(".", ["/bin/sh", "-c", "exit 3"]);
        let mut handle = spawner.spawn().unwrap();
        let exit = wait_exit(&mut handle, Duration::from_secs(5)).unwrap();
        assert_eq!(exit.exit_code, 3);
        assert!(!exit.success());
    }

    #[test]
    fn test_no_terminal_window() {
        let spawner = PipeSpawner::new(".", ["/bin/sh", "-c", "exit 0"]);
        let mut handle = spawner.spawn().unwrap();
        assert_eq!(handle.window_size(), WindowSize { rows: 0, cols: 0 });
        assert!(handle.pid() > 0);
        wait_exit(&mut handle, Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_stdout_and_stderr_are_separate() {
        let spawner = PipeSpawner::new(".", ["/bin/sh", "-c", "echo OUT; echo ERR 1>&2"]);
        let mut handle = spawner.spawn().unwrap();
        let mut out_reader = handle.take_reader().unwrap();
        let mut err_reader = handle.take_error_reader().unwrap();

        let mut out = Vec::new();
        let mut err = Vec::new();
        out_reader.read_to_end(&mut out).unwrap();
        err_reader.read_to_end(&mut err).unwrap();

        assert_eq!(out, b"OUT\n");
        assert_eq!(err, b"ERR\n");
    }

    #[test]
    fn test_stdin_reaches_child() {
        let spawner = PipeSpawner::new(".", ["cat"]);
        let mut handle = spawner.spawn().unwrap();
        let mut writer = handle.take_writer().unwrap();
        let mut reader = handle.take_reader().unwrap();

        writer.write_all(b"ping").unwrap();
        writer.flush().unwrap();
        drop(writer); // close stdin so cat exits

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"ping");
    }

    #[cfg(unix)]
    #[test]
    fn test_signal_death_maps_to_code() {
        let spawner = PipeSpawner::new(".", ["/bin/sh", "-c", "sleep 30"]);
        let mut handle = spawner.spawn().unwrap();
        handle.destroy();
        let exit = wait_exit(&mut handle, Duration::from_secs(5)).unwrap();
        // destroy() delivers SIGKILL
        assert_eq!(exit.exit_code, 128 + 9);
    }
}
