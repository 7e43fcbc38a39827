use std::io::{Read, Write};
use std::path::PathBuf;

use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};

use crate::handle::{ExitResult, ProcessHandle, ProcessSpawner, SpawnError, WindowSize};

/// Spawns a child on a pseudo-terminal via `portable-pty`.
///
/// The PTY merges stderr into the terminal stream, so handles produced here
/// never expose a separate error reader.
pub struct PtySpawner {
    dir: PathBuf,
    argv: Vec<String>,
    size: WindowSize,
}

impl PtySpawner {
    /// Describe a command to spawn in `dir`. The first element of `argv` is
    /// the program, the rest its arguments.
    pub fn new(dir: impl Into<PathBuf>, argv: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            dir: dir.into(),
            argv: argv.into_iter().map(Into::into).collect(),
            size: WindowSize { rows: 24, cols: 80 },
        }
    }

    /// Override the initial terminal dimensions (default 24x80).
    pub fn with_size(mut self, rows: u16, cols: u16) -> Self {
        self.size = WindowSize { rows, cols };
        self
    }
}

impl ProcessSpawner for PtySpawner {
    fn spawn(&self) -> Result<Box<dyn ProcessHandle>, SpawnError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows: self.size.rows,
                cols: self.size.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SpawnError::SpawnFailed(format!("failed to open PTY: {e}")))?;

        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| SpawnError::SpawnFailed("empty argument vector".to_string()))?;
        let mut cmd = CommandBuilder::new(program);
        cmd.args(args);
        cmd.cwd(&self.dir);

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| SpawnError::SpawnFailed(format!("failed to spawn command: {e}")))?;

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| SpawnError::SpawnFailed(format!("failed to clone reader: {e}")))?;

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| SpawnError::SpawnFailed(format!("failed to take writer: {e}")))?;

        let pid = child.process_id().unwrap_or(0);

        Ok(Box::new(PtyProcess {
            _master: pair.master,
            size: self.size,
            pid,
            reader: Some(reader),
            writer: Some(writer),
            child,
        }))
    }
}

/// A PTY-backed child process. The master half is kept alive for the
/// lifetime of the handle so the child's terminal stays open.
struct PtyProcess {
    _master: Box<dyn MasterPty + Send>,
    size: WindowSize,
    pid: u32,
    reader: Option<Box<dyn Read + Send>>,
    writer: Option<Box<dyn Write + Send>>,
    child: Box<dyn Child + Send + Sync>,
}

impl ProcessHandle for PtyProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn window_size(&self) -> WindowSize {
        self.size
    }

    fn take_writer(&mut self) -> Option<Box<dyn Write + Send>> {
        self.writer.take()
    }

    fn take_reader(&mut self) -> Option<Box<dyn Read + Send>> {
        self.reader.take()
    }

    fn take_error_reader(&mut self) -> Option<Box<dyn Read + Send>> {
        None
    }

    fn destroy(&mut self) {
        if let Err(e) = self.child.kill() {
            log::debug!("kill of pid {} failed: {e}", self.pid);
        }
    }

    fn try_wait(&mut self) -> Option<ExitResult> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(ExitResult {
                exit_code: status.exit_code(),
            }),
            _ => None,
        }
    }
}
