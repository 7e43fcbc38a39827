//! muxpty-proc: child process spawning for muxpty.
//!
//! Provides the process-provider side of the multiplexer: spawning a child
//! with a working directory and argument vector, and handing back an opaque
//! [`ProcessHandle`] exposing the pid, window size, raw byte streams,
//! destroy, and a non-blocking exit probe.
//!
//! # Architecture
//!
//! - [`ProcessHandle`] / [`ProcessSpawner`] — the contract the multiplexer
//!   core consumes.
//! - [`PtySpawner`] — spawns on a pseudo-terminal via `portable-pty`; stderr
//!   is merged into the terminal stream.
//! - [`PipeSpawner`] — spawns on plain pipes via `std::process::Command`;
//!   stderr stays on its own stream.

pub mod handle;
pub mod pipe;
pub mod pty;

pub use handle::{ExitResult, ProcessHandle, ProcessSpawner, SpawnError, WindowSize};
pub use pipe::PipeSpawner;
pub use pty::PtySpawner;
