//! Non-blocking named pipe transport.
//!
//! One [`Pipe`] is a named, duplex, message-framed channel to exactly one
//! peer:
//! - Named pipes (Windows)
//! - Unix domain sockets with record framing (Linux/macOS)
//!
//! Connection management is polled, never awaited: call [`Pipe::connect`]
//! once per tick and it advances `Disconnected → ConnectPending → Connected`
//! as far as it can without blocking. Reads never block. Writes are
//! synchronous and all-or-nothing.

pub mod config;
pub mod error;
pub mod pipe;

#[cfg(unix)]
pub mod record;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
use unix as sys;
#[cfg(windows)]
use windows as sys;

pub use config::{PipeConfig, DEFAULT_MAX_MESSAGE_SIZE};
pub use error::{PipeError, Result};
pub use pipe::{Pipe, PipeRole, PipeState, PipeStatus};
