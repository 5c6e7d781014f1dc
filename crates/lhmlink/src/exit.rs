use std::fmt;
use std::io;

use lhmlink_codec::CodecError;
use lhmlink_pipe::PipeError;
use lhmlink_protocol::ProtocolError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut => TIMEOUT,
        io::ErrorKind::AlreadyExists | io::ErrorKind::AddrInUse => FAILURE,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn pipe_error(context: &str, err: PipeError) -> CliError {
    match err {
        PipeError::Create { source, .. }
        | PipeError::Connect { source, .. }
        | PipeError::Io(source) => io_error(context, source),
        PipeError::PathTooLong { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        PipeError::MessageTooLarge { .. } | PipeError::OutboundTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        PipeError::ShortWrite { .. } | PipeError::ShortRead { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
    }
}

pub fn codec_error(context: &str, err: CodecError) -> CliError {
    match err {
        CodecError::TooLarge { .. } => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn protocol_error(context: &str, err: ProtocolError) -> CliError {
    match err {
        ProtocolError::Pipe(err) => pipe_error(context, err),
        ProtocolError::Codec(err) => codec_error(context, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lhmlink_codec::StreamMode;

    #[test]
    fn blocked_pipe_name_maps_to_1() {
        let err = pipe_error(
            "create server pipe failed",
            PipeError::Create {
                address: "/tmp/lhml/gui.sock".to_string(),
                source: io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                ),
            },
        );
        assert_eq!(err.code, FAILURE);
        assert!(err.message.contains("not a unix socket"));
    }

    #[test]
    fn permission_denied_maps_to_50() {
        let err = pipe_error(
            "create failed",
            PipeError::Create {
                address: "/tmp/x.sock".to_string(),
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            },
        );
        assert_eq!(err.code, PERMISSION_DENIED);
        assert!(err.message.starts_with("create failed: "));
    }

    #[test]
    fn long_path_is_usage_error() {
        let err = pipe_error(
            "create failed",
            PipeError::PathTooLong {
                path: std::path::PathBuf::from("/very/long"),
                len: 200,
                max: 108,
            },
        );
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn short_write_is_transport_error() {
        let err = protocol_error(
            "send failed",
            ProtocolError::Pipe(PipeError::ShortWrite {
                expected: 64,
                actual: 12,
            }),
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
    }

    #[test]
    fn encoder_bug_is_internal() {
        let err = protocol_error(
            "send failed",
            ProtocolError::Codec(CodecError::CursorMismatch {
                mode: StreamMode::Write,
                expected: 40,
                actual: 36,
            }),
        );
        assert_eq!(err.code, INTERNAL);
    }
}
