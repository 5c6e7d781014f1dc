use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle};

use bytes::BytesMut;
use tracing::{debug, info};
use windows_sys::Win32::Foundation::{
    GetLastError, ERROR_ACCESS_DENIED, ERROR_BROKEN_PIPE, ERROR_FILE_NOT_FOUND,
    ERROR_IO_INCOMPLETE, ERROR_IO_PENDING, ERROR_MORE_DATA, ERROR_NO_DATA, ERROR_PIPE_BUSY,
    ERROR_PIPE_CONNECTED, ERROR_PIPE_NOT_CONNECTED, GENERIC_READ, GENERIC_WRITE, HANDLE,
    INVALID_HANDLE_VALUE, WIN32_ERROR,
};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, FlushFileBuffers, ReadFile, WriteFile, FILE_FLAG_FIRST_PIPE_INSTANCE,
    FILE_FLAG_OVERLAPPED, OPEN_EXISTING, PIPE_ACCESS_DUPLEX,
};
use windows_sys::Win32::System::Pipes::{
    ConnectNamedPipe, CreateNamedPipeW, DisconnectNamedPipe, PeekNamedPipe,
    SetNamedPipeHandleState, PIPE_READMODE_MESSAGE, PIPE_REJECT_REMOTE_CLIENTS,
    PIPE_TYPE_MESSAGE, PIPE_WAIT,
};
use windows_sys::Win32::System::Threading::CreateEventW;
use windows_sys::Win32::System::IO::{CancelIo, GetOverlappedResult, OVERLAPPED};

use crate::config::PipeConfig;
use crate::error::{PipeError, Result};
use crate::pipe::{ConnectProgress, PipeRole, ReadOutcome, WriteOutcome};

/// Windows named pipe backing for a [`Pipe`](crate::Pipe).
///
/// The server owns a single message-mode instance opened for overlapped I/O
/// so that `ConnectNamedPipe` can be polled. Reads and writes on it wait on
/// the overlapped result, which keeps them synchronous. The client opens a
/// plain synchronous handle.
pub(crate) struct PipeImpl {
    role: PipeRole,
    address: String,
    wide_address: Vec<u16>,
    handle: Option<OwnedHandle>,
    event: Option<OwnedHandle>,
    // Boxed: the kernel holds its address while a connect is outstanding.
    overlapped: Box<OVERLAPPED>,
    connect_outstanding: bool,
}

impl PipeImpl {
    pub(crate) fn new(role: PipeRole, name: &str, _config: &PipeConfig) -> Result<Self> {
        let address = format!(r"\\.\pipe\{name}");
        let wide_address = OsStr::new(&address)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        Ok(Self {
            role,
            address,
            wide_address,
            handle: None,
            event: None,
            // SAFETY: OVERLAPPED is a plain C struct for which all-zero is the
            // documented initial state.
            overlapped: Box::new(unsafe { std::mem::zeroed() }),
            connect_outstanding: false,
        })
    }

    pub(crate) fn address(&self) -> &str {
        &self.address
    }

    pub(crate) fn begin_connect(&mut self, config: &PipeConfig) -> Result<ConnectProgress> {
        match self.role {
            PipeRole::Server => self.server_begin_connect(config),
            PipeRole::Client => self.client_connect(),
        }
    }

    pub(crate) fn poll_connect(&mut self, config: &PipeConfig) -> Result<ConnectProgress> {
        if self.role == PipeRole::Client || !self.connect_outstanding {
            return self.begin_connect(config);
        }

        let handle = self.raw_handle();
        let mut transferred = 0u32;
        // SAFETY: `handle` is the open pipe instance and `overlapped` is the
        // same pinned OVERLAPPED the outstanding ConnectNamedPipe was given.
        let ok = unsafe { GetOverlappedResult(handle, &*self.overlapped, &mut transferred, 0) };
        if ok != 0 {
            self.connect_outstanding = false;
            return Ok(ConnectProgress::Connected);
        }

        match last_error() {
            ERROR_IO_INCOMPLETE => Ok(ConnectProgress::Pending),
            ERROR_NO_DATA | ERROR_BROKEN_PIPE => {
                self.connect_outstanding = false;
                Ok(ConnectProgress::TornDown)
            }
            code => {
                self.connect_outstanding = false;
                Err(PipeError::Connect {
                    address: self.address.clone(),
                    source: os_error(code),
                })
            }
        }
    }

    pub(crate) fn disconnect(&mut self) -> Result<()> {
        match self.role {
            PipeRole::Server => {
                let Some(handle) = self.handle.as_ref().map(|h| h.as_raw_handle() as HANDLE)
                else {
                    return Ok(());
                };
                self.cancel_connect();
                // SAFETY: `handle` is an open pipe instance owned by `self`.
                unsafe {
                    FlushFileBuffers(handle);
                    DisconnectNamedPipe(handle);
                }
            }
            PipeRole::Client => {
                self.handle = None;
            }
        }
        Ok(())
    }

    pub(crate) fn flush(&mut self) -> Result<()> {
        let Some(handle) = self.handle.as_ref().map(|h| h.as_raw_handle() as HANDLE) else {
            return Ok(());
        };
        // SAFETY: `handle` is an open pipe handle owned by `self`.
        if unsafe { FlushFileBuffers(handle) } == 0 {
            return Err(PipeError::Io(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    pub(crate) fn write(&mut self, bytes: &[u8], _config: &PipeConfig) -> Result<WriteOutcome> {
        if self.handle.is_none() {
            return Ok(WriteOutcome::PeerClosed);
        }
        let len = u32::try_from(bytes.len())
            .map_err(|_| PipeError::OutboundTooLarge { size: bytes.len() })?;

        let handle = self.raw_handle();
        let overlapped = self.io_overlapped();
        let mut written = 0u32;
        // SAFETY: `bytes` is valid for `len` bytes for the duration of the
        // call, which completes before returning (synchronously or by waiting
        // on the overlapped result below).
        let ok = unsafe { WriteFile(handle, bytes.as_ptr(), len, &mut written, overlapped) };
        if ok == 0 {
            match last_error() {
                ERROR_IO_PENDING => {
                    // SAFETY: same handle and OVERLAPPED as the pending write.
                    let ok =
                        unsafe { GetOverlappedResult(handle, overlapped, &mut written, 1) };
                    if ok == 0 {
                        return classify_io_error(last_error()).map(|_| WriteOutcome::PeerClosed);
                    }
                }
                code => return classify_io_error(code).map(|_| WriteOutcome::PeerClosed),
            }
        }

        Ok(WriteOutcome::Written(written as usize))
    }

    pub(crate) fn read(&mut self, out: &mut BytesMut, config: &PipeConfig) -> Result<ReadOutcome> {
        if self.handle.is_none() {
            return Ok(ReadOutcome::PeerClosed);
        }
        let handle = self.raw_handle();

        let mut total = 0u32;
        let mut this_message = 0u32;
        // SAFETY: a zero-sized peek only writes the two counters.
        let ok = unsafe {
            PeekNamedPipe(
                handle,
                std::ptr::null_mut(),
                0,
                std::ptr::null_mut(),
                &mut total,
                &mut this_message,
            )
        };
        if ok == 0 {
            return classify_io_error(last_error()).map(|_| ReadOutcome::PeerClosed);
        }
        if total == 0 {
            return Ok(ReadOutcome::Empty);
        }

        let available = if this_message > 0 { this_message } else { total } as usize;
        if available > config.max_message_size {
            return Err(PipeError::MessageTooLarge {
                size: available,
                max: config.max_message_size,
            });
        }

        out.resize(available, 0);
        let overlapped = self.io_overlapped();
        let mut read = 0u32;
        // SAFETY: `out` holds `available` writable bytes and outlives the
        // read, which completes before this function returns.
        let ok = unsafe {
            ReadFile(
                handle,
                out.as_mut_ptr(),
                available as u32,
                &mut read,
                overlapped,
            )
        };
        if ok == 0 {
            let mut code = last_error();
            if code == ERROR_IO_PENDING {
                // SAFETY: same handle and OVERLAPPED as the pending read.
                let ok = unsafe { GetOverlappedResult(handle, overlapped, &mut read, 1) };
                code = if ok == 0 { last_error() } else { 0 };
            }
            match code {
                0 => {}
                ERROR_MORE_DATA => {
                    out.clear();
                    return Err(PipeError::ShortRead {
                        expected: available,
                        actual: read as usize,
                    });
                }
                code => {
                    out.clear();
                    return classify_io_error(code).map(|_| ReadOutcome::PeerClosed);
                }
            }
        }

        if read as usize != available {
            out.clear();
            return Err(PipeError::ShortRead {
                expected: available,
                actual: read as usize,
            });
        }
        Ok(ReadOutcome::Message(available))
    }

    fn server_begin_connect(&mut self, config: &PipeConfig) -> Result<ConnectProgress> {
        if self.handle.is_none() && !self.create_instance(config)? {
            return Ok(ConnectProgress::Unavailable);
        }
        let handle = self.raw_handle();

        self.reset_overlapped();
        // SAFETY: `handle` is our open instance; `overlapped` is boxed and
        // lives in `self` until the connect completes or is cancelled.
        let ok = unsafe { ConnectNamedPipe(handle, &mut *self.overlapped) };
        if ok != 0 {
            return Ok(ConnectProgress::Connected);
        }

        match last_error() {
            ERROR_IO_PENDING => {
                self.connect_outstanding = true;
                Ok(ConnectProgress::Pending)
            }
            ERROR_PIPE_CONNECTED => Ok(ConnectProgress::Connected),
            ERROR_NO_DATA => Ok(ConnectProgress::TornDown),
            code => Err(PipeError::Connect {
                address: self.address.clone(),
                source: os_error(code),
            }),
        }
    }

    /// Create the single pipe instance. Returns `false` if another server
    /// already owns the name.
    fn create_instance(&mut self, config: &PipeConfig) -> Result<bool> {
        if self.event.is_none() {
            // SAFETY: creates an unnamed manual-reset event; no pointers in.
            let event = unsafe { CreateEventW(std::ptr::null(), 1, 0, std::ptr::null()) };
            if event.is_null() {
                return Err(PipeError::Create {
                    address: self.address.clone(),
                    source: std::io::Error::last_os_error(),
                });
            }
            // SAFETY: `event` is a freshly created handle we exclusively own.
            self.event = Some(unsafe { OwnedHandle::from_raw_handle(event as _) });
        }

        // SAFETY: `wide_address` is a NUL-terminated UTF-16 string.
        let handle = unsafe {
            CreateNamedPipeW(
                self.wide_address.as_ptr(),
                PIPE_ACCESS_DUPLEX | FILE_FLAG_OVERLAPPED | FILE_FLAG_FIRST_PIPE_INSTANCE,
                PIPE_TYPE_MESSAGE | PIPE_READMODE_MESSAGE | PIPE_WAIT | PIPE_REJECT_REMOTE_CLIENTS,
                1,
                config.buffer_size,
                config.buffer_size,
                0,
                std::ptr::null(),
            )
        };

        if handle == INVALID_HANDLE_VALUE {
            return match last_error() {
                ERROR_ACCESS_DENIED | ERROR_PIPE_BUSY => {
                    debug!(address = %self.address, "pipe name owned by another server");
                    Ok(false)
                }
                code => Err(PipeError::Create {
                    address: self.address.clone(),
                    source: os_error(code),
                }),
            };
        }

        info!(address = %self.address, "listening on pipe");
        // SAFETY: `handle` is a freshly created pipe instance we exclusively own.
        self.handle = Some(unsafe { OwnedHandle::from_raw_handle(handle as _) });
        Ok(true)
    }

    fn client_connect(&mut self) -> Result<ConnectProgress> {
        // SAFETY: `wide_address` is a NUL-terminated UTF-16 string.
        let handle = unsafe {
            CreateFileW(
                self.wide_address.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                0,
                std::ptr::null(),
                OPEN_EXISTING,
                0,
                std::ptr::null_mut(),
            )
        };

        if handle == INVALID_HANDLE_VALUE {
            return match last_error() {
                ERROR_FILE_NOT_FOUND | ERROR_PIPE_BUSY => Ok(ConnectProgress::Unavailable),
                code => Err(PipeError::Connect {
                    address: self.address.clone(),
                    source: os_error(code),
                }),
            };
        }
        // SAFETY: `handle` is a freshly opened pipe handle we exclusively own.
        let owned = unsafe { OwnedHandle::from_raw_handle(handle as _) };

        let mode = PIPE_READMODE_MESSAGE;
        // SAFETY: `mode` outlives the call; the other settings are left as-is.
        let ok = unsafe {
            SetNamedPipeHandleState(handle, &mode, std::ptr::null(), std::ptr::null())
        };
        if ok == 0 {
            return Err(PipeError::Connect {
                address: self.address.clone(),
                source: std::io::Error::last_os_error(),
            });
        }

        debug!(address = %self.address, "connected to server");
        self.handle = Some(owned);
        Ok(ConnectProgress::Connected)
    }

    fn raw_handle(&self) -> HANDLE {
        self.handle
            .as_ref()
            .map(|h| h.as_raw_handle() as HANDLE)
            .unwrap_or(INVALID_HANDLE_VALUE)
    }

    /// OVERLAPPED for a read or write: required on the server's overlapped
    /// instance, absent on the client's synchronous handle.
    fn io_overlapped(&mut self) -> *mut OVERLAPPED {
        match self.role {
            PipeRole::Server => {
                self.reset_overlapped();
                &mut *self.overlapped
            }
            PipeRole::Client => std::ptr::null_mut(),
        }
    }

    /// Cancel an outstanding `ConnectNamedPipe` and wait until the kernel
    /// has let go of the OVERLAPPED.
    fn cancel_connect(&mut self) {
        if !self.connect_outstanding {
            return;
        }
        let handle = self.raw_handle();
        let mut transferred = 0u32;
        // SAFETY: `handle` is the instance the connect was issued on and
        // `overlapped` is the OVERLAPPED it was given. The blocking
        // GetOverlappedResult returns only once the cancelled (or already
        // finished) connect has completed, so neither is touched afterwards.
        // ERROR_OPERATION_ABORTED is the expected result and is ignored.
        unsafe {
            if CancelIo(handle) != 0 {
                GetOverlappedResult(handle, &*self.overlapped, &mut transferred, 1);
            }
        }
        self.connect_outstanding = false;
    }

    fn reset_overlapped(&mut self) {
        debug_assert!(!self.connect_outstanding, "OVERLAPPED still owned by a connect");
        let event = self
            .event
            .as_ref()
            .map(|e| e.as_raw_handle() as HANDLE)
            .unwrap_or(std::ptr::null_mut());
        // SAFETY: all-zero is a valid OVERLAPPED; no I/O is outstanding on it.
        *self.overlapped = unsafe { std::mem::zeroed() };
        self.overlapped.hEvent = event;
    }
}

impl Drop for PipeImpl {
    fn drop(&mut self) {
        self.cancel_connect();
    }
}

fn last_error() -> WIN32_ERROR {
    // SAFETY: reads thread-local error state only.
    unsafe { GetLastError() }
}

fn os_error(code: WIN32_ERROR) -> std::io::Error {
    std::io::Error::from_raw_os_error(code as i32)
}

/// `Ok(())` for codes meaning the peer went away, `Err` for anything else.
fn classify_io_error(code: WIN32_ERROR) -> Result<()> {
    match code {
        ERROR_BROKEN_PIPE | ERROR_NO_DATA | ERROR_PIPE_NOT_CONNECTED => Ok(()),
        code => Err(PipeError::Io(os_error(code))),
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use crate::{Pipe, PipeConfig, PipeState, PipeStatus};

    fn unique_name(tag: &str) -> String {
        format!("lhmlink-test-{tag}-{}", std::process::id())
    }

    fn connect_pair(server: &mut Pipe, client: &mut Pipe) {
        for _ in 0..400 {
            let server_up = server.connect().unwrap().is_success();
            let client_up = client.connect().unwrap().is_success();
            if server_up && client_up {
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        panic!("pipes did not connect");
    }

    #[test]
    fn dropping_a_pending_server_releases_the_name() {
        let name = unique_name("pending-drop");
        let server = Pipe::create_server(&name, PipeConfig::default()).unwrap();
        assert_eq!(server.state(), PipeState::ConnectPending);
        drop(server);

        let mut next = Pipe::create_server(&name, PipeConfig::default()).unwrap();
        assert_eq!(next.state(), PipeState::ConnectPending);
        let mut client = Pipe::create_client(&name, PipeConfig::default()).unwrap();
        connect_pair(&mut next, &mut client);
    }

    #[test]
    fn disconnect_while_pending_can_connect_again() {
        let name = unique_name("pending-disconnect");
        let mut server = Pipe::create_server(&name, PipeConfig::default()).unwrap();
        assert_eq!(server.state(), PipeState::ConnectPending);

        server.disconnect().unwrap();
        assert_eq!(server.state(), PipeState::Disconnected);
        assert_eq!(server.connect().unwrap(), PipeStatus::Transient);
        assert_eq!(server.state(), PipeState::ConnectPending);

        let mut client = Pipe::create_client(&name, PipeConfig::default()).unwrap();
        connect_pair(&mut server, &mut client);

        assert!(client.write(b"after cancel").unwrap().is_success());
        let mut out = BytesMut::new();
        for _ in 0..400 {
            if server.read(&mut out).unwrap().is_success() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(out.as_ref(), b"after cancel");
    }
}
