use std::collections::VecDeque;
use std::io::Read;
use std::sync::{Arc, Mutex};

use crate::status::{RunState, WorkerState};

/// Buffered, non-blocking view over one blocking readable stream.
///
/// A dedicated thread pulls available bytes into an ordered chunk buffer; the
/// event loop drains that buffer without ever touching the blocking read.
/// Each chunk is exactly what one read returned, never split or merged.
/// End-of-input finishes the worker cleanly; a read failure stops it with the
/// error captured in its run-state.
#[derive(Clone)]
pub struct StreamReader {
    chunks: Arc<Mutex<VecDeque<Vec<u8>>>>,
    state: Arc<RunState>,
}

impl StreamReader {
    /// Start the read loop on a dedicated OS thread named `muxpty-{name}`.
    pub fn spawn(name: &str, reader: Box<dyn Read + Send>) -> Self {
        let handle = Self {
            chunks: Arc::new(Mutex::new(VecDeque::new())),
            state: Arc::new(RunState::new()),
        };

        let chunks = Arc::clone(&handle.chunks);
        let state = Arc::clone(&handle.state);
        let spawned = std::thread::Builder::new()
            .name(format!("muxpty-{name}"))
            .spawn(move || read_loop(reader, &chunks, &state));
        if let Err(e) = spawned {
            handle.state.fail(format!("failed to spawn reader thread: {e}"));
        }

        handle
    }

    pub fn state(&self) -> WorkerState {
        self.state.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Remove and return every chunk buffered since the last drain, in read
    /// order. Never blocks; empty when nothing has arrived.
    pub(crate) fn drain(&self) -> Vec<Vec<u8>> {
        match self.chunks.lock() {
            Ok(mut chunks) => chunks.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }
}

fn read_loop(
    mut reader: Box<dyn Read + Send>,
    chunks: &Mutex<VecDeque<Vec<u8>>>,
    state: &RunState,
) {
    let mut buf = [0u8; 4096];

    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                // EOF — the stream closed.
                state.finish();
                return;
            }
            Ok(n) => {
                if let Ok(mut chunks) = chunks.lock() {
                    chunks.push_back(buf[..n].to_vec());
                }
            }
            Err(e) => {
                log::debug!("stream read failed: {e}");
                state.fail(format!("read failed: {e}"));
                return;
            }
        }
    }
}
