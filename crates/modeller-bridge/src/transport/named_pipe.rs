//! Kernel named-pipe transport (Windows).
//!
//! Pipe name format: `\\.\pipe\{uuid}`, one inbound-only and one
//! outbound-only pipe per connection.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{FromRawHandle, RawHandle};
use std::ptr;

use uuid::Uuid;
use windows_sys::Win32::Foundation::{
    CloseHandle, ERROR_PIPE_CONNECTED, HANDLE, INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::Storage::FileSystem::{PIPE_ACCESS_INBOUND, PIPE_ACCESS_OUTBOUND};
use windows_sys::Win32::System::Pipes::{
    ConnectNamedPipe, CreateNamedPipeW, PIPE_READMODE_BYTE, PIPE_TYPE_BYTE, PIPE_WAIT,
};

use crate::error::Result;

use super::{BridgeStreams, Transport};

const PIPE_BUFFER_SIZE: u32 = 64 * 1024;

/// Owned server end of a named pipe that has not been handed out yet.
struct PipeHandle(HANDLE);

// SAFETY: the handle is exclusively owned and only used from one thread at a time.
unsafe impl Send for PipeHandle {}

impl PipeHandle {
    fn into_file(mut self) -> File {
        let handle = std::mem::replace(&mut self.0, INVALID_HANDLE_VALUE);
        // SAFETY: we own the handle and give up ownership to File.
        unsafe { File::from_raw_handle(handle as RawHandle) }
    }
}

impl Drop for PipeHandle {
    fn drop(&mut self) {
        if self.0 != INVALID_HANDLE_VALUE {
            // SAFETY: the handle was returned by CreateNamedPipeW and not closed yet.
            unsafe {
                CloseHandle(self.0);
            }
        }
    }
}

pub struct NamedPipeTransport {
    inbound_name: String,
    outbound_name: String,
    inbound: Option<PipeHandle>,
    outbound: Option<PipeHandle>,
}

impl NamedPipeTransport {
    pub fn create() -> Result<Self> {
        let inbound_name = format!(r"\\.\pipe\{}", Uuid::new_v4());
        let outbound_name = format!(r"\\.\pipe\{}", Uuid::new_v4());

        tracing::debug!(transport_type = "named-pipe", %inbound_name, %outbound_name, "Creating bridge transport");

        let inbound = create_pipe(&inbound_name, PIPE_ACCESS_INBOUND)?;
        let outbound = create_pipe(&outbound_name, PIPE_ACCESS_OUTBOUND)?;

        Ok(Self {
            inbound_name,
            outbound_name,
            inbound: Some(inbound),
            outbound: Some(outbound),
        })
    }
}

fn create_pipe(name: &str, access: u32) -> Result<PipeHandle> {
    let wide: Vec<u16> = std::ffi::OsStr::new(name)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();

    // SAFETY: `wide` is a NUL-terminated UTF-16 string that outlives the call.
    let handle = unsafe {
        CreateNamedPipeW(
            wide.as_ptr(),
            access,
            PIPE_TYPE_BYTE | PIPE_READMODE_BYTE | PIPE_WAIT,
            1,
            PIPE_BUFFER_SIZE,
            PIPE_BUFFER_SIZE,
            0,
            ptr::null(),
        )
    };
    if handle == INVALID_HANDLE_VALUE {
        return Err(io::Error::last_os_error().into());
    }
    tracing::trace!(name, "Created named pipe");
    Ok(PipeHandle(handle))
}

fn wait_for_connection(pipe: &PipeHandle) -> Result<()> {
    // SAFETY: valid pipe handle, synchronous (non-overlapped) connect.
    let connected = unsafe { ConnectNamedPipe(pipe.0, ptr::null_mut()) };
    if connected == 0 {
        let err = io::Error::last_os_error();
        // The client connected between create and connect
        if err.raw_os_error() != Some(ERROR_PIPE_CONNECTED as i32) {
            return Err(err.into());
        }
    }
    Ok(())
}

impl Transport for NamedPipeTransport {
    fn inbound_id(&self) -> String {
        self.inbound_name.clone()
    }

    fn outbound_id(&self) -> String {
        self.outbound_name.clone()
    }

    // ConnectNamedPipe cannot be polled without overlapped IO, so the
    // liveness check only runs between the two connects.
    fn accept(&mut self, check_alive: &mut dyn FnMut() -> Result<()>) -> Result<BridgeStreams> {
        let (Some(inbound), Some(outbound)) = (self.inbound.take(), self.outbound.take()) else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "transport endpoints were already accepted",
            )
            .into());
        };

        tracing::trace!("Waiting for engine connection");
        wait_for_connection(&inbound)?;
        check_alive()?;
        wait_for_connection(&outbound)?;
        tracing::trace!("Engine connected");

        Ok(BridgeStreams {
            inbound: Box::new(BufReader::new(inbound.into_file())),
            outbound: Box::new(BufWriter::new(outbound.into_file())),
        })
    }
}

/// Engine side: open both pipes as plain files.
pub(super) fn connect(
    inbound_id: &str,
    outbound_id: &str,
) -> Result<(Box<dyn Write + Send>, Box<dyn Read + Send>)> {
    let to_host = OpenOptions::new().write(true).open(inbound_id)?;
    let from_host = OpenOptions::new().read(true).open(outbound_id)?;
    Ok((
        Box::new(BufWriter::new(to_host)),
        Box::new(BufReader::new(from_host)),
    ))
}
