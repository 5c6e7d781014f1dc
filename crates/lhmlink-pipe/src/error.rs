use std::path::PathBuf;

/// Errors that can occur in pipe transport operations.
///
/// Any `Err` returned by the transport is the "unexpected failure" tier: a
/// genuine I/O or link error the caller must decide how to recover from.
/// The "transient failure" tier is reported as [`PipeStatus::Transient`].
///
/// [`PipeStatus::Transient`]: crate::PipeStatus::Transient
#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    /// Failed to create (bind) the server side of the pipe.
    #[error("failed to create pipe {address}: {source}")]
    Create {
        address: String,
        source: std::io::Error,
    },

    /// Failed to connect to, or accept on, the pipe.
    #[error("failed to connect pipe {address}: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the connected channel.
    #[error("pipe I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The derived socket path is too long for the platform.
    #[error("pipe path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// The pipe accepted fewer bytes than were handed to it.
    #[error("short write on pipe ({actual} of {expected} bytes)")]
    ShortWrite { expected: usize, actual: usize },

    /// The pipe yielded fewer bytes than it reported as available.
    #[error("short read on pipe ({actual} of {expected} bytes)")]
    ShortRead { expected: usize, actual: usize },

    /// An inbound record exceeds the configured maximum.
    #[error("inbound message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// An outbound message cannot be represented in the record framing.
    #[error("outbound message too large ({size} bytes)")]
    OutboundTooLarge { size: usize },
}

impl PipeError {
    /// Returns true for errors that indicate a bug or a broken framing
    /// assumption rather than an ordinary link failure.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipeError::ShortWrite { .. } | PipeError::ShortRead { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PipeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_violations_are_fatal() {
        assert!(PipeError::ShortWrite {
            expected: 8,
            actual: 4
        }
        .is_fatal());
        assert!(PipeError::ShortRead {
            expected: 8,
            actual: 0
        }
        .is_fatal());
        assert!(!PipeError::Io(std::io::Error::other("boom")).is_fatal());
        assert!(!PipeError::MessageTooLarge { size: 2, max: 1 }.is_fatal());
    }
}
