use std::path::PathBuf;
use std::time::Duration;

/// Default pipe buffer size hint: 64 KiB.
pub const DEFAULT_BUFFER_SIZE: u32 = 64 * 1024;

/// Default maximum inbound message size: 16 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Default bound on how long a synchronous write may stall.
pub const DEFAULT_WRITE_STALL_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for a [`Pipe`](crate::Pipe).
#[derive(Debug, Clone)]
pub struct PipeConfig {
    /// Size hint for the platform's in/out pipe buffers. Default: 64 KiB.
    pub buffer_size: u32,
    /// Largest inbound message accepted. Default: 16 MiB.
    pub max_message_size: usize,
    /// How long a write may wait for the peer to drain the channel.
    ///
    /// A write that cannot start within this bound reports a transient
    /// failure; a write that stalls part-way through is a short write.
    pub write_stall_timeout: Duration,
    /// Directory Unix socket addresses are derived in. Default: temp dir.
    pub socket_dir: PathBuf,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            write_stall_timeout: DEFAULT_WRITE_STALL_TIMEOUT,
            socket_dir: std::env::temp_dir(),
        }
    }
}

impl PipeConfig {
    /// Override the directory Unix socket addresses are derived in.
    pub fn with_socket_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.socket_dir = dir.into();
        self
    }

    /// Override the maximum inbound message size.
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Override the write stall bound.
    pub fn with_write_stall_timeout(mut self, timeout: Duration) -> Self {
        self.write_stall_timeout = timeout;
        self
    }
}
