//! muxpty: a non-blocking multiplexer over a child process's standard streams.
//!
//! Raw process I/O is blocking and single-consumer. This crate decouples it:
//! input chunks are queued and flushed from a dedicated writer thread, output
//! is pulled into ordered buffers by reader threads, and an event loop fans
//! each chunk out to a dynamic set of named listeners. The owner polls a
//! status snapshot for liveness, captured failures, and the exit result.
//!
//! # Architecture
//!
//! - [`StreamWriter`] — queue-fed writer thread over the child's stdin.
//! - [`StreamReader`] — reader thread buffering chunks from stdout or stderr.
//! - [`Listeners`] — named callback registry, safe to mutate during dispatch.
//! - [`EventLoop`] — drains the readers, fans chunks out, captures the exit
//!   result.
//! - [`ProcessSession`] — the facade composing all of the above over a
//!   process spawned by a `muxpty-proc` spawner.

pub mod event_loop;
pub mod listeners;
pub mod reader;
pub mod session;
pub mod status;
pub mod writer;

pub use event_loop::EventLoop;
pub use listeners::{Listener, Listeners};
pub use muxpty_proc::{ExitResult, PipeSpawner, ProcessHandle, ProcessSpawner, PtySpawner, WindowSize};
pub use reader::StreamReader;
pub use session::{ProcessSession, SessionError};
pub use status::{RunState, Status, WorkerState};
pub use writer::StreamWriter;
