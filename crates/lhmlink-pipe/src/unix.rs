use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Instant;

use bytes::BytesMut;
use tracing::{debug, info, trace};

use crate::config::PipeConfig;
use crate::error::{PipeError, Result};
use crate::pipe::{ConnectProgress, PipeRole, ReadOutcome, WriteOutcome};
use crate::record::{decode_record, encode_record, RECORD_PREFIX_SIZE};

/// Unix domain socket backing for a [`Pipe`](crate::Pipe).
///
/// The pipe name maps to a socket file in the configured socket directory.
/// Sockets are non-blocking; message boundaries are kept with the record
/// framing in [`crate::record`]. A server owns the name while it holds an
/// advisory lock on `<socket>.lock`; the lock file itself is never removed.
pub(crate) struct PipeImpl {
    role: PipeRole,
    path: PathBuf,
    lock_path: PathBuf,
    address: String,
    lock: Option<File>,
    listener: Option<UnixListener>,
    created_inode: Option<(u64, u64)>,
    stream: Option<UnixStream>,
    staging: BytesMut,
    outbound: BytesMut,
}

impl PipeImpl {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    pub(crate) fn new(role: PipeRole, name: &str, config: &PipeConfig) -> Result<Self> {
        let path = socket_path(&config.socket_dir, name);

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(PipeError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");

        Ok(Self {
            role,
            address: path.display().to_string(),
            path,
            lock_path: PathBuf::from(lock_path),
            lock: None,
            listener: None,
            created_inode: None,
            stream: None,
            staging: BytesMut::new(),
            outbound: BytesMut::new(),
        })
    }

    pub(crate) fn address(&self) -> &str {
        &self.address
    }

    pub(crate) fn begin_connect(&mut self, _config: &PipeConfig) -> Result<ConnectProgress> {
        match self.role {
            PipeRole::Server => self.server_connect(),
            PipeRole::Client => self.client_connect(),
        }
    }

    pub(crate) fn poll_connect(&mut self, config: &PipeConfig) -> Result<ConnectProgress> {
        // Accept and connect are both retried from scratch each poll.
        self.begin_connect(config)
    }

    pub(crate) fn disconnect(&mut self) -> Result<()> {
        self.staging.clear();
        if let Some(mut stream) = self.stream.take() {
            if self.role == PipeRole::Server {
                let _ = stream.flush();
                let _ = stream.shutdown(std::net::Shutdown::Both);
            }
        }
        Ok(())
    }

    pub(crate) fn flush(&mut self) -> Result<()> {
        match self.stream.as_mut() {
            Some(stream) => stream.flush().map_err(Into::into),
            None => Ok(()),
        }
    }

    pub(crate) fn write(&mut self, bytes: &[u8], config: &PipeConfig) -> Result<WriteOutcome> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(WriteOutcome::PeerClosed);
        };

        self.outbound.clear();
        encode_record(bytes, &mut self.outbound)?;

        let deadline = Instant::now() + config.write_stall_timeout;
        let mut offset = 0usize;
        while offset < self.outbound.len() {
            match stream.write(&self.outbound[offset..]) {
                Ok(0) => break,
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        if offset == 0 {
                            return Ok(WriteOutcome::Stalled);
                        }
                        break;
                    }
                    std::thread::yield_now();
                }
                Err(err) if is_peer_closed(&err) => return Ok(WriteOutcome::PeerClosed),
                Err(err) => return Err(PipeError::Io(err)),
            }
        }

        Ok(WriteOutcome::Written(
            offset.saturating_sub(RECORD_PREFIX_SIZE),
        ))
    }

    pub(crate) fn read(&mut self, out: &mut BytesMut, config: &PipeConfig) -> Result<ReadOutcome> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(ReadOutcome::PeerClosed);
        };

        // A previous drain may already hold the next record.
        if let Some(message) = decode_record(&mut self.staging, config.max_message_size)? {
            out.extend_from_slice(&message);
            return Ok(ReadOutcome::Message(message.len()));
        }

        let available = bytes_available(stream)?;
        if available == 0 {
            // FIONREAD reports zero both when idle and when the peer hung up.
            let mut probe = [0u8; 1];
            match stream.read(&mut probe) {
                Ok(0) => return Ok(ReadOutcome::PeerClosed),
                Ok(n) => self.staging.extend_from_slice(&probe[..n]),
                Err(err)
                    if err.kind() == ErrorKind::WouldBlock
                        || err.kind() == ErrorKind::Interrupted =>
                {
                    return Ok(ReadOutcome::Empty)
                }
                Err(err) if is_peer_closed(&err) => return Ok(ReadOutcome::PeerClosed),
                Err(err) => return Err(PipeError::Io(err)),
            }
        } else {
            let start = self.staging.len();
            self.staging.resize(start + available, 0);
            let read = loop {
                match stream.read(&mut self.staging[start..]) {
                    Ok(n) => break n,
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(err) => {
                        self.staging.truncate(start);
                        if is_peer_closed(&err) {
                            return Ok(ReadOutcome::PeerClosed);
                        }
                        return Err(PipeError::Io(err));
                    }
                }
            };
            self.staging.truncate(start + read);

            if read != available {
                return Err(PipeError::ShortRead {
                    expected: available,
                    actual: read,
                });
            }
        }

        match decode_record(&mut self.staging, config.max_message_size)? {
            Some(message) => {
                out.extend_from_slice(&message);
                Ok(ReadOutcome::Message(message.len()))
            }
            None => Ok(ReadOutcome::Empty),
        }
    }

    fn server_connect(&mut self) -> Result<ConnectProgress> {
        if self.listener.is_none() && !self.bind()? {
            return Ok(ConnectProgress::Unavailable);
        }
        let Some(listener) = self.listener.as_ref() else {
            return Ok(ConnectProgress::Unavailable);
        };

        match listener.accept() {
            Ok((stream, _addr)) => {
                stream.set_nonblocking(true)?;
                debug!(path = ?self.path, "accepted connection");
                self.stream = Some(stream);
                Ok(ConnectProgress::Connected)
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(ConnectProgress::Pending),
            Err(err) if err.kind() == ErrorKind::Interrupted => Ok(ConnectProgress::Pending),
            Err(err) if err.kind() == ErrorKind::ConnectionAborted => {
                Ok(ConnectProgress::TornDown)
            }
            Err(err) => Err(PipeError::Connect {
                address: self.address.clone(),
                source: err,
            }),
        }
    }

    fn client_connect(&mut self) -> Result<ConnectProgress> {
        match connect_nonblocking(&self.path) {
            Ok(Some(stream)) => {
                debug!(path = ?self.path, "connected to server");
                self.stream = Some(stream);
                Ok(ConnectProgress::Connected)
            }
            Ok(None) => {
                trace!(path = ?self.path, "server backlog is full");
                Ok(ConnectProgress::Unavailable)
            }
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::NotFound | ErrorKind::ConnectionRefused
                ) =>
            {
                Ok(ConnectProgress::Unavailable)
            }
            Err(err) => Err(PipeError::Connect {
                address: self.address.clone(),
                source: err,
            }),
        }
    }

    /// Bind the listening socket. Returns `false` if a live server owns the
    /// name already.
    fn bind(&mut self) -> Result<bool> {
        let path = self.path.clone();
        let bind_err = |source: std::io::Error| PipeError::Create {
            address: path.display().to_string(),
            source,
        };

        let Some(lock) = try_lock_name(&self.lock_path).map_err(bind_err)? else {
            trace!(path = ?self.path, "pipe name owned by another server");
            return Ok(false);
        };

        // With the lock held, a socket at the path was left by a dead server.
        // A non-socket file is never removed.
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if !metadata.file_type().is_socket() {
                return Err(bind_err(std::io::Error::new(
                    ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                )));
            }
            debug!(path = ?self.path, "removing stale socket");
            std::fs::remove_file(&self.path).map_err(bind_err)?;
        }

        let listener = UnixListener::bind(&self.path).map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;
        std::fs::set_permissions(
            &self.path,
            std::fs::Permissions::from_mode(Self::DEFAULT_SOCKET_MODE),
        )
        .map_err(bind_err)?;
        let created = std::fs::symlink_metadata(&self.path).map_err(bind_err)?;

        info!(path = ?self.path, "listening on pipe");
        self.created_inode = Some((created.dev(), created.ino()));
        self.listener = Some(listener);
        self.lock = Some(lock);
        Ok(true)
    }
}

impl Drop for PipeImpl {
    fn drop(&mut self) {
        self.stream = None;
        if self.listener.take().is_none() {
            return;
        }
        if let Some((expected_dev, expected_ino)) = self.created_inode {
            if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
                if metadata.file_type().is_socket()
                    && metadata.dev() == expected_dev
                    && metadata.ino() == expected_ino
                {
                    debug!(path = ?self.path, "cleaning up socket file");
                    let _ = std::fs::remove_file(&self.path);
                } else {
                    debug!(
                        path = ?self.path,
                        "socket path identity changed; skipping cleanup"
                    );
                }
            }
        }
    }
}

/// Derive the socket path for a pipe name.
///
/// Anything other than ASCII alphanumerics, `-`, `_` and `.` maps to `-`.
fn socket_path(dir: &Path, name: &str) -> PathBuf {
    let file: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    dir.join(format!("{file}.sock"))
}

/// Number of bytes queued on the socket, without consuming them.
fn bytes_available(stream: &UnixStream) -> Result<usize> {
    let mut available: libc::c_int = 0;

    // SAFETY: `available` is a valid writable `c_int`, which is what FIONREAD
    // stores through, and the fd is an open socket owned by `stream`.
    let rc = unsafe {
        libc::ioctl(
            stream.as_raw_fd(),
            libc::FIONREAD,
            &mut available as *mut libc::c_int,
        )
    };

    if rc == -1 {
        return Err(PipeError::Io(std::io::Error::last_os_error()));
    }
    Ok(available.max(0) as usize)
}

/// Take the advisory lock that marks a live owner of a pipe name.
///
/// Returns `None` if another server holds it.
fn try_lock_name(path: &Path) -> std::io::Result<Option<File>> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .mode(PipeImpl::DEFAULT_SOCKET_MODE)
        .open(path)?;

    // SAFETY: the fd is open and owned by `file` for the whole call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(Some(file));
    }

    let err = std::io::Error::last_os_error();
    if err.kind() == ErrorKind::WouldBlock {
        Ok(None)
    } else {
        Err(err)
    }
}

/// Connect to a listening socket without blocking.
///
/// Returns `None` when the server's accept backlog is full.
fn connect_nonblocking(path: &Path) -> std::io::Result<Option<UnixStream>> {
    let (addr, addr_len) = socket_addr(path)?;

    // SAFETY: plain socket creation, no pointers are passed.
    let fd = unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_STREAM, 0) };
    if fd == -1 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: `fd` was just returned by socket() and nothing else owns it.
    let stream = UnixStream::from(unsafe { OwnedFd::from_raw_fd(fd) });

    // SAFETY: the fd is an open socket owned by `stream`.
    if unsafe { libc::fcntl(stream.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) } == -1 {
        return Err(std::io::Error::last_os_error());
    }
    stream.set_nonblocking(true)?;

    // SAFETY: `addr` is an initialised sockaddr_un and `addr_len` does not
    // exceed its size.
    let rc = unsafe {
        libc::connect(
            stream.as_raw_fd(),
            (&addr as *const libc::sockaddr_un).cast::<libc::sockaddr>(),
            addr_len,
        )
    };
    if rc == 0 {
        return Ok(Some(stream));
    }

    let err = std::io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::EAGAIN) | Some(libc::EINPROGRESS) => Ok(None),
        _ => Err(err),
    }
}

fn socket_addr(path: &Path) -> std::io::Result<(libc::sockaddr_un, libc::socklen_t)> {
    // SAFETY: sockaddr_un is plain data and all-zero is a valid value.
    let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;

    let bytes = path.as_os_str().as_bytes();
    if bytes.len() >= addr.sun_path.len() {
        return Err(std::io::Error::new(
            ErrorKind::InvalidInput,
            "socket path does not fit sun_path",
        ));
    }
    for (dst, src) in addr.sun_path.iter_mut().zip(bytes) {
        *dst = *src as libc::c_char;
    }

    let len = std::mem::offset_of!(libc::sockaddr_un, sun_path) + bytes.len() + 1;
    #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
    {
        addr.sun_len = len as u8;
    }
    Ok((addr, len as libc::socklen_t))
}

fn is_peer_closed(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
    )
}
