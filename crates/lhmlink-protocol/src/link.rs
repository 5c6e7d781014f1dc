use bytes::BytesMut;
use lhmlink_pipe::{Pipe, PipeConfig, PipeStatus};
use tracing::info;

use crate::error::Result;
use crate::exchange::{receive_message, send_message};
use crate::messages::{DecodedMessage, Message, MessageId};
use crate::sequencer::Sequencer;

/// Pipe name shared by the render host and the GUI.
pub const DEFAULT_PIPE_NAME: &str = "LCDHardwareMonitor GUI Pipe";

/// Protocol version announced in `Connect`.
pub const PROTOCOL_VERSION: u32 = 1;

/// Configuration for one end of the link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub pipe_name: String,
    pub pipe: PipeConfig,
    pub version: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            pipe_name: DEFAULT_PIPE_NAME.to_string(),
            pipe: PipeConfig::default(),
            version: PROTOCOL_VERSION,
        }
    }
}

impl LinkConfig {
    pub fn with_pipe_name(mut self, name: impl Into<String>) -> Self {
        self.pipe_name = name.into();
        self
    }

    pub fn with_pipe_config(mut self, pipe: PipeConfig) -> Self {
        self.pipe = pipe;
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }
}

/// What the last [`Link::update`] observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Unchanged,
    /// A peer attached. Both sequencers were reset to `Connect`.
    Connected,
    Disconnected,
}

/// One pipe plus the send and receive sequencers for its conversation.
///
/// Every operation polls the connection first. Whenever the pipe goes from
/// disconnected to connected, both directions start over at `Connect`.
#[derive(Debug)]
pub struct Link {
    pipe: Pipe,
    send: Sequencer,
    recv: Sequencer,
    was_connected: bool,
}

impl Link {
    /// Create the server end (the render host).
    pub fn server(config: &LinkConfig) -> Result<Self> {
        let pipe = Pipe::create_server(&config.pipe_name, config.pipe.clone())?;
        Ok(Self::from_pipe(pipe))
    }

    /// Create the client end (the GUI).
    pub fn client(config: &LinkConfig) -> Result<Self> {
        let pipe = Pipe::create_client(&config.pipe_name, config.pipe.clone())?;
        Ok(Self::from_pipe(pipe))
    }

    /// Wrap an existing pipe. A pipe that is already connected counts as a
    /// fresh connection.
    pub fn from_pipe(pipe: Pipe) -> Self {
        Self {
            pipe,
            send: Sequencer::new(),
            recv: Sequencer::new(),
            was_connected: false,
        }
    }

    /// Poll the connection and reset the conversation on a new connection.
    pub fn update(&mut self) -> Result<LinkEvent> {
        let _ = self.pipe.connect()?;
        Ok(self.observe())
    }

    /// Send `message` if the pipe is connected. See [`send_message`].
    pub fn send<M: Message>(&mut self, message: &M) -> Result<PipeStatus> {
        self.update()?;
        if !self.pipe.is_connected() {
            return Ok(PipeStatus::Transient);
        }
        let result = send_message(&mut self.pipe, message, &mut self.send);
        self.observe();
        result
    }

    /// Receive the next message if one arrived. See [`receive_message`].
    pub fn receive<'a>(&mut self, buffer: &'a mut BytesMut) -> Result<Option<DecodedMessage<'a>>> {
        self.update()?;
        if !self.pipe.is_connected() {
            buffer.clear();
            return Ok(None);
        }
        let result = receive_message(&mut self.pipe, &mut self.recv, buffer);
        self.observe();
        result
    }

    /// Drop the current peer. The next update retries the connection.
    pub fn disconnect(&mut self) -> Result<()> {
        self.pipe.disconnect()?;
        self.observe();
        Ok(())
    }

    /// Next message this end will send.
    pub fn send_expected(&self) -> MessageId {
        self.send.expected()
    }

    /// Next message this end will accept.
    pub fn recv_expected(&self) -> MessageId {
        self.recv.expected()
    }

    pub fn is_connected(&self) -> bool {
        self.pipe.is_connected()
    }

    pub fn pipe(&self) -> &Pipe {
        &self.pipe
    }

    fn observe(&mut self) -> LinkEvent {
        let connected = self.pipe.is_connected();
        let event = match (self.was_connected, connected) {
            (false, true) => {
                self.send.reset();
                self.recv.reset();
                info!(pipe = %self.pipe.name(), "link connected, conversation restarts");
                LinkEvent::Connected
            }
            (true, false) => {
                info!(
                    pipe = %self.pipe.name(),
                    send = %self.send.expected(),
                    recv = %self.recv.expected(),
                    "link lost"
                );
                LinkEvent::Disconnected
            }
            _ => LinkEvent::Unchanged,
        };
        self.was_connected = connected;
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = LinkConfig::default();
        assert_eq!(config.pipe_name, "LCDHardwareMonitor GUI Pipe");
        assert_eq!(config.version, 1);
    }

    #[test]
    fn config_builders() {
        let config = LinkConfig::default()
            .with_pipe_name("bench")
            .with_version(3)
            .with_pipe_config(PipeConfig::default().with_max_message_size(1024));
        assert_eq!(config.pipe_name, "bench");
        assert_eq!(config.version, 3);
        assert_eq!(config.pipe.max_message_size, 1024);
    }
}
