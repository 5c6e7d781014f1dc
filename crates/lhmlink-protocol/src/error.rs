use lhmlink_codec::{CodecError, HEADER_SIZE};

use crate::messages::MessageId;

/// Errors that can occur while exchanging messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Transport-level error.
    #[error("pipe error: {0}")]
    Pipe(#[from] lhmlink_pipe::PipeError),

    /// Encoding an outbound message failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl ProtocolError {
    /// Whether the error points at a bug or resource exhaustion rather than
    /// a link problem.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Pipe(e) => e.is_fatal(),
            Self::Codec(e) => e.is_fatal(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Why a received message was discarded.
///
/// Rejections are logged and dropped, never surfaced as errors: the sender
/// keeps resending until the receiver accepts.
#[derive(Debug, thiserror::Error)]
pub enum Rejection {
    #[error("message too short ({len} bytes, header needs {HEADER_SIZE})")]
    TooShort { len: usize },

    #[error("message size mismatch (header says {declared}, received {actual})")]
    SizeMismatch { declared: u32, actual: usize },

    #[error("unknown message id {id}")]
    UnknownId { id: u32 },

    #[error("unexpected {actual} message (expected {expected})")]
    UnexpectedId {
        expected: MessageId,
        actual: MessageId,
    },

    #[error("malformed {id} message: {source}")]
    Malformed {
        id: MessageId,
        #[source]
        source: CodecError,
    },
}
