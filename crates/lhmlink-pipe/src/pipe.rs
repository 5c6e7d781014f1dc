use bytes::BytesMut;
use tracing::{debug, error, info, trace, warn};

use crate::config::PipeConfig;
use crate::error::{PipeError, Result};
use crate::sys;

/// Which end of the channel a [`Pipe`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeRole {
    /// Owns the name and waits for a peer to connect.
    Server,
    /// Connects to a server that owns the name.
    Client,
}

/// Connection state of a [`Pipe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeState {
    /// No channel, or the last one was torn down. `connect` starts over.
    Disconnected,
    /// A connection attempt is outstanding. `connect` polls it.
    ConnectPending,
    /// The channel is usable for reads and writes.
    Connected,
}

/// Non-error outcome of a pipe operation.
///
/// `Err(PipeError)` is the third tier: an unexpected failure.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeStatus {
    /// The operation completed.
    Success,
    /// Nothing happened this time (not connected yet, nothing to read, peer
    /// busy). Retry on a later tick; no state was changed.
    Transient,
}

impl PipeStatus {
    pub fn is_success(self) -> bool {
        self == PipeStatus::Success
    }
}

/// Progress reported by the platform layer for a connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectProgress {
    Connected,
    Pending,
    /// No server is listening yet, or another server already owns the name.
    Unavailable,
    /// The channel is being torn down by the peer.
    TornDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteOutcome {
    Written(usize),
    /// The peer did not drain the channel within the stall bound and no
    /// bytes were written.
    Stalled,
    PeerClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadOutcome {
    Empty,
    Message(usize),
    PeerClosed,
}

/// A single named, duplex, message-framed channel to exactly one peer.
///
/// All operations are non-blocking except [`Pipe::write`], which is
/// synchronous and all-or-nothing. Call [`Pipe::connect`] once per tick
/// before reading or writing; it is a no-op once connected.
pub struct Pipe {
    name: String,
    role: PipeRole,
    state: PipeState,
    config: PipeConfig,
    sys: sys::PipeImpl,
}

impl Pipe {
    /// Create the server end of the pipe `name` and attempt a first connect.
    ///
    /// Another server already owning the name is not an error; the pipe
    /// stays disconnected and later `connect` calls retry.
    pub fn create_server(name: &str, config: PipeConfig) -> Result<Self> {
        Self::create(name, PipeRole::Server, config)
    }

    /// Create the client end of the pipe `name` and attempt a first connect.
    ///
    /// No server listening yet is not an error; later `connect` calls retry.
    pub fn create_client(name: &str, config: PipeConfig) -> Result<Self> {
        Self::create(name, PipeRole::Client, config)
    }

    fn create(name: &str, role: PipeRole, config: PipeConfig) -> Result<Self> {
        let sys = sys::PipeImpl::new(role, name, &config)?;
        let mut pipe = Self {
            name: name.to_string(),
            role,
            state: PipeState::Disconnected,
            config,
            sys,
        };
        debug!(pipe = %pipe.name, address = %pipe.sys.address(), ?role, "created pipe");

        let _ = pipe.connect()?;
        Ok(pipe)
    }

    /// Drive the connection state machine one step.
    ///
    /// Returns `Success` once connected. While a connection attempt is
    /// outstanding, or no peer is available, returns `Transient`.
    pub fn connect(&mut self) -> Result<PipeStatus> {
        let progress = match self.state {
            PipeState::Connected => return Ok(PipeStatus::Success),
            PipeState::ConnectPending => self.sys.poll_connect(&self.config)?,
            PipeState::Disconnected => self.sys.begin_connect(&self.config)?,
        };

        match progress {
            ConnectProgress::Connected => {
                self.state = PipeState::Connected;
                info!(pipe = %self.name, role = ?self.role, "pipe connected");
                Ok(PipeStatus::Success)
            }
            ConnectProgress::Pending => {
                if self.state != PipeState::ConnectPending {
                    debug!(pipe = %self.name, "waiting for peer");
                }
                self.state = PipeState::ConnectPending;
                Ok(PipeStatus::Transient)
            }
            ConnectProgress::Unavailable => {
                self.state = PipeState::Disconnected;
                Ok(PipeStatus::Transient)
            }
            ConnectProgress::TornDown => {
                debug!(pipe = %self.name, "peer is tearing down the channel");
                self.disconnect()?;
                Ok(PipeStatus::Transient)
            }
        }
    }

    /// Drop the current connection, abandoning any outstanding attempt.
    ///
    /// The server flushes and releases its channel instance but keeps owning
    /// the name; the client closes its handle. Idempotent.
    pub fn disconnect(&mut self) -> Result<()> {
        let was = self.state;
        self.state = PipeState::Disconnected;
        self.sys.disconnect()?;
        if was == PipeState::Connected {
            info!(pipe = %self.name, role = ?self.role, "pipe disconnected");
        }
        Ok(())
    }

    /// Write one whole message (blocking).
    ///
    /// Anything other than all of `bytes` being accepted is a fatal
    /// [`PipeError::ShortWrite`]: the receiver frames by message.
    pub fn write(&mut self, bytes: &[u8]) -> Result<PipeStatus> {
        if self.state != PipeState::Connected {
            return Ok(PipeStatus::Transient);
        }

        match self.sys.write(bytes, &self.config)? {
            WriteOutcome::Written(n) if n == bytes.len() => {
                trace!(pipe = %self.name, size = n, "wrote message");
                Ok(PipeStatus::Success)
            }
            WriteOutcome::Written(n) => {
                error!(pipe = %self.name, expected = bytes.len(), actual = n, "short pipe write");
                Err(PipeError::ShortWrite {
                    expected: bytes.len(),
                    actual: n,
                })
            }
            WriteOutcome::Stalled => {
                warn!(pipe = %self.name, size = bytes.len(), "peer is not draining the pipe");
                Ok(PipeStatus::Transient)
            }
            WriteOutcome::PeerClosed => {
                self.disconnect()?;
                Ok(PipeStatus::Transient)
            }
        }
    }

    /// Read the next whole message into `out` (non-blocking).
    ///
    /// `out` is cleared first. With nothing available, returns `Transient`
    /// and leaves `out` empty; this is the normal idle case.
    pub fn read(&mut self, out: &mut BytesMut) -> Result<PipeStatus> {
        out.clear();
        if self.state != PipeState::Connected {
            return Ok(PipeStatus::Transient);
        }

        match self.sys.read(out, &self.config) {
            Ok(ReadOutcome::Empty) => Ok(PipeStatus::Transient),
            Ok(ReadOutcome::Message(n)) => {
                trace!(pipe = %self.name, size = n, "read message");
                Ok(PipeStatus::Success)
            }
            Ok(ReadOutcome::PeerClosed) => {
                out.clear();
                self.disconnect()?;
                Ok(PipeStatus::Transient)
            }
            Err(err) => {
                out.clear();
                if err.is_fatal() {
                    error!(pipe = %self.name, %err, "pipe read broke framing");
                }
                Err(err)
            }
        }
    }

    /// Block until everything written so far has been handed to the peer.
    pub fn flush(&mut self) -> Result<()> {
        if self.state != PipeState::Connected {
            return Ok(());
        }
        self.sys.flush()
    }

    /// The name this pipe was created with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The platform address derived from the name.
    pub fn address(&self) -> &str {
        self.sys.address()
    }

    pub fn role(&self) -> PipeRole {
        self.role
    }

    pub fn state(&self) -> PipeState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == PipeState::Connected
    }

    pub fn config(&self) -> &PipeConfig {
        &self.config
    }
}

impl Drop for Pipe {
    fn drop(&mut self) {
        if let Err(err) = self.disconnect() {
            debug!(pipe = %self.name, %err, "disconnect during drop failed");
        }
    }
}

impl std::fmt::Debug for Pipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipe")
            .field("name", &self.name)
            .field("address", &self.sys.address())
            .field("role", &self.role)
            .field("state", &self.state)
            .finish()
    }
}
