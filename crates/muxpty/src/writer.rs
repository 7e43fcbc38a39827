use std::io::Write;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::status::{RunState, WorkerState};

/// Queue-fed writer over one blocking writable stream.
///
/// [`submit`](Self::submit) never blocks; a dedicated thread dequeues chunks
/// in FIFO order and writes each one fully before the next. On a write
/// failure the worker stops with the error captured and the remaining queue
/// is abandoned. Chunks submitted after the worker has stopped are accepted
/// but never flushed — check [`state`](Self::state) to detect that.
///
/// The event loop closes the queue once the process has exited; chunks
/// already queued are still flushed before the worker finishes.
#[derive(Clone)]
pub struct StreamWriter {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>>,
    state: Arc<RunState>,
}

impl StreamWriter {
    /// Start the write loop on a dedicated OS thread named `muxpty-{name}`.
    pub fn spawn(name: &str, writer: Box<dyn Write + Send>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(RunState::new());

        let thread_state = Arc::clone(&state);
        let spawned = std::thread::Builder::new()
            .name(format!("muxpty-{name}"))
            .spawn(move || write_loop(writer, rx, &thread_state));
        if let Err(e) = spawned {
            state.fail(format!("failed to spawn writer thread: {e}"));
        }

        Self {
            tx: Arc::new(Mutex::new(Some(tx))),
            state,
        }
    }

    /// Enqueue one chunk for writing. Callable from any thread.
    pub fn submit(&self, chunk: Vec<u8>) {
        // Accepted even after the worker stopped; the chunk is dropped then.
        if let Ok(tx) = self.tx.lock() {
            if let Some(tx) = tx.as_ref() {
                let _ = tx.send(chunk);
            }
        }
    }

    /// Close the queue. Chunks already queued are still flushed; the worker
    /// finishes cleanly once the queue runs dry.
    pub(crate) fn close(&self) {
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }
}

fn write_loop(
    mut writer: Box<dyn Write + Send>,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
    state: &RunState,
) {
    while let Some(chunk) = rx.blocking_recv() {
        if let Err(e) = writer.write_all(&chunk).and_then(|_| writer.flush()) {
            log::debug!("stream write failed: {e}");
            state.fail(format!("write failed: {e}"));
            return;
        }
    }
    // Queue closed and drained; nothing more can arrive.
    state.finish();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct FailingWriter {
        attempts: Arc<AtomicUsize>,
    }

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdin closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_chunks_flushed_in_submission_order() {
        let buf = SharedBuf::default();
        let writer = StreamWriter::spawn("test", Box::new(buf.clone()));

        writer.submit(b"alpha ".to_vec());
        writer.submit(b"beta ".to_vec());
        writer.submit(b"gamma".to_vec());

        let deadline = Instant::now() + Duration::from_secs(5);
        while buf.contents().len() < 16 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(buf.contents(), b"alpha beta gamma");
        assert!(writer.is_running());
    }

    #[test]
    fn test_write_failure_stops_worker_and_abandons_queue() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let writer = StreamWriter::spawn(
            "test",
            Box::new(FailingWriter {
                attempts: Arc::clone(&attempts),
            }),
        );

        writer.submit(b"first".to_vec());
        writer.submit(b"second".to_vec());
        writer.submit(b"third".to_vec());

        let deadline = Instant::now() + Duration::from_secs(5);
        while writer.is_running() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }

        match writer.state() {
            WorkerState::Failed(msg) => assert!(msg.contains("stdin closed"), "got: {msg}"),
            other => panic!("expected failure, got {other:?}"),
        }
        // Only the first chunk was attempted; no retry, the rest abandoned.
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        // Submitting after termination is accepted but goes nowhere.
        writer.submit(b"late".to_vec());
        assert!(!writer.is_running());
    }

    #[test]
    fn test_close_flushes_queued_chunks_then_finishes() {
        let buf = SharedBuf::default();
        let writer = StreamWriter::spawn("test", Box::new(buf.clone()));

        writer.submit(b"bye".to_vec());
        writer.close();

        let deadline = Instant::now() + Duration::from_secs(5);
        while writer.is_running() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(writer.state(), WorkerState::Done);
        assert_eq!(buf.contents(), b"bye");

        // Submitting after close is accepted and dropped.
        writer.submit(b"late".to_vec());
        assert_eq!(buf.contents(), b"bye");
    }
}
