use crate::stream::StreamMode;

/// Errors that can occur while encoding or decoding a message.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The output buffer for an encoded message could not be allocated.
    #[error("failed to allocate {size} bytes for message")]
    Allocation { size: usize },

    /// The encoded message doesn't fit the 32-bit size field.
    #[error("message too large ({size} bytes, max {max})", max = u32::MAX)]
    TooLarge { size: usize },

    /// The stream ran out of bytes before a field could be read or written.
    #[error("{mode} ran past end of buffer (offset {offset}, need {needed}, len {len})")]
    Truncated {
        mode: StreamMode,
        offset: usize,
        needed: usize,
        len: usize,
    },

    /// A text field did not hold valid UTF-8.
    #[error("invalid UTF-8 in text field at offset {offset}")]
    InvalidUtf8 { offset: usize },

    /// A pass finished somewhere other than where the layout says it must.
    #[error("{mode} cursor mismatch (expected {expected}, actual {actual})")]
    CursorMismatch {
        mode: StreamMode,
        expected: usize,
        actual: usize,
    },
}

impl CodecError {
    /// Whether this error means the encoder itself is broken or out of
    /// memory, as opposed to the input being bad.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Allocation { .. } => true,
            Self::CursorMismatch { mode, .. } => *mode != StreamMode::Read,
            Self::Truncated { mode, .. } => *mode != StreamMode::Read,
            Self::TooLarge { .. } | Self::InvalidUtf8 { .. } => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
