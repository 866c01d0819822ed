//! Component C, canonical transport: a private named pipe whose client side
//! the parent opens itself, so the server never has to authenticate an
//! anonymous peer — it trusts the handle because it created it.

use gpii_core::{Message, OsError};

use crate::handle::OwnedHandle;

#[cfg(target_os = "windows")]
use windows::Win32::Foundation::{
    GetLastError, ERROR_IO_PENDING, ERROR_PIPE_CONNECTED, HANDLE, INVALID_HANDLE_VALUE,
    WAIT_OBJECT_0,
};
#[cfg(target_os = "windows")]
use windows::Win32::Storage::FileSystem::{
    CreateFileW, ReadFile, WriteFile, FILE_ATTRIBUTE_NORMAL, FILE_FLAGS_AND_ATTRIBUTES,
    FILE_FLAG_OVERLAPPED, FILE_GENERIC_READ, FILE_GENERIC_WRITE, FILE_SHARE_NONE, OPEN_EXISTING,
};
#[cfg(target_os = "windows")]
use windows::Win32::System::IO::{GetOverlappedResult, OVERLAPPED};
#[cfg(target_os = "windows")]
use windows::Win32::System::Pipes::{
    ConnectNamedPipe, CreateNamedPipeW, DisconnectNamedPipe, PIPE_READMODE_BYTE, PIPE_TYPE_BYTE,
    PIPE_WAIT,
};
#[cfg(target_os = "windows")]
use windows::Win32::System::Threading::{CreateEventW, WaitForSingleObject, INFINITE};
#[cfg(target_os = "windows")]
use windows::core::PCWSTR;

const PIPE_BUFFER_SIZE: u32 = 256 * 1024;
#[cfg(target_os = "windows")]
const PIPE_ACCESS_DUPLEX: u32 = 0x0000_0003;

#[cfg(target_os = "windows")]
fn to_wide(s: &str) -> Vec<u16> {
    use std::os::windows::ffi::OsStrExt;
    std::ffi::OsStr::new(s)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

/// The server side of a private pipe endpoint: owned by this process,
/// dropped (and the pipe disconnected) when the caller is done with it.
pub struct PipeServer {
    raw: isize,
    name: String,
}

/// The client side: opened by this process, then transferred into the
/// child's inheritance set and closed here immediately afterward.
pub struct PipeClientHandle(pub(crate) OwnedHandle);

impl PipeClientHandle {
    pub fn into_owned(self) -> OwnedHandle {
        self.0
    }
}

/// Create a named pipe server, then immediately open the client side
/// ourselves — both halves must succeed or the endpoint is not considered
/// ready (§4.3). The client handle comes back inheritable.
#[cfg(target_os = "windows")]
pub fn create_pipe(name: &str) -> Result<(PipeServer, PipeClientHandle), OsError> {
    let wide_name = to_wide(name);

    let server_handle = unsafe {
        CreateNamedPipeW(
            PCWSTR(wide_name.as_ptr()),
            FILE_FLAGS_AND_ATTRIBUTES(PIPE_ACCESS_DUPLEX | FILE_FLAG_OVERLAPPED.0),
            PIPE_TYPE_BYTE | PIPE_READMODE_BYTE | PIPE_WAIT,
            1,
            PIPE_BUFFER_SIZE,
            PIPE_BUFFER_SIZE,
            0,
            None,
        )
    };

    if server_handle == INVALID_HANDLE_VALUE {
        return Err(OsError::SystemCallFailed {
            call: "CreateNamedPipeW",
            code: unsafe { GetLastError().0 },
        });
    }
    let server_raw = server_handle.0 as isize;

    let client_handle = unsafe {
        CreateFileW(
            PCWSTR(wide_name.as_ptr()),
            (FILE_GENERIC_READ | FILE_GENERIC_WRITE).0,
            FILE_SHARE_NONE,
            Some(&inheritable_security_attributes()),
            OPEN_EXISTING,
            FILE_ATTRIBUTE_NORMAL | FILE_FLAG_OVERLAPPED,
            None,
        )
    };

    let client_handle = match client_handle {
        Ok(h) if h != INVALID_HANDLE_VALUE => OwnedHandle::new(h),
        _ => {
            let code = unsafe { GetLastError().0 };
            // Neither half survives a partial failure: close the server
            // side we already created before reporting the error.
            unsafe {
                let _ = windows::Win32::Foundation::CloseHandle(HANDLE(server_raw as *mut std::ffi::c_void));
            }
            return Err(OsError::SystemCallFailed {
                call: "CreateFileW",
                code,
            });
        }
    };

    Ok((
        PipeServer {
            raw: server_raw,
            name: name.to_string(),
        },
        PipeClientHandle(client_handle),
    ))
}

#[cfg(target_os = "windows")]
fn inheritable_security_attributes() -> windows::Win32::Security::SECURITY_ATTRIBUTES {
    windows::Win32::Security::SECURITY_ATTRIBUTES {
        nLength: std::mem::size_of::<windows::Win32::Security::SECURITY_ATTRIBUTES>() as u32,
        lpSecurityDescriptor: std::ptr::null_mut(),
        bInheritHandle: true.into(),
    }
}

#[cfg(target_os = "windows")]
impl PipeServer {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block (on the blocking-task pool) until the client side connects.
    pub async fn wait_for_connection(&self) -> Result<(), OsError> {
        let raw = self.raw;
        tokio::task::spawn_blocking(move || unsafe {
            let handle = HANDLE(raw as *mut std::ffi::c_void);
            let event = CreateEventW(None, true, false, None).map_err(|e| OsError::SystemCallFailed {
                call: "CreateEventW",
                code: e.code().0 as u32,
            })?;
            let mut overlapped = OVERLAPPED::default();
            overlapped.hEvent = event;

            let result = ConnectNamedPipe(handle, Some(&mut overlapped));
            let outcome = if result.is_err() {
                match GetLastError() {
                    ERROR_IO_PENDING => {
                        if WaitForSingleObject(event, INFINITE) != WAIT_OBJECT_0 {
                            Err(OsError::SystemCallFailed {
                                call: "WaitForSingleObject(pipe connect)",
                                code: unsafe { GetLastError().0 },
                            })
                        } else {
                            Ok(())
                        }
                    }
                    ERROR_PIPE_CONNECTED => Ok(()),
                    other => Err(OsError::SystemCallFailed {
                        call: "ConnectNamedPipe",
                        code: other.0,
                    }),
                }
            } else {
                Ok(())
            };
            let _ = windows::Win32::Foundation::CloseHandle(event);
            outcome
        })
        .await
        .map_err(|_| OsError::SystemCallFailed {
            call: "ConnectNamedPipe(join)",
            code: 0,
        })?
    }

    /// Split into independent reader/writer halves for framed message I/O.
    /// Ownership of the underlying handle moves to the reader; the writer
    /// shares the same raw value but never closes it (see `PipeReader`'s
    /// `Drop`).
    pub fn into_reader_writer(self) -> (PipeReader, PipeWriter) {
        let raw = self.raw;
        std::mem::forget(self);
        (PipeReader { raw }, PipeWriter { raw })
    }
}

#[cfg(target_os = "windows")]
impl Drop for PipeServer {
    fn drop(&mut self) {
        unsafe {
            let handle = HANDLE(self.raw as *mut std::ffi::c_void);
            let _ = DisconnectNamedPipe(handle);
            let _ = windows::Win32::Foundation::CloseHandle(handle);
        }
    }
}

/// Reads length-prefixed [`Message`] frames off the pipe.
#[cfg(target_os = "windows")]
pub struct PipeReader {
    raw: isize,
}

/// Writes length-prefixed [`Message`] frames to the pipe.
#[cfg(target_os = "windows")]
pub struct PipeWriter {
    raw: isize,
}

#[cfg(target_os = "windows")]
impl PipeReader {
    pub async fn recv(&mut self) -> Result<Message, OsError> {
        let header = self.read_exact(gpii_core::message::HEADER_SIZE).await?;
        let mut header_bytes = [0u8; gpii_core::message::HEADER_SIZE];
        header_bytes.copy_from_slice(&header);
        let len = Message::parse_length_prefix(header_bytes).map_err(|_| OsError::SystemCallFailed {
            call: "parse_length_prefix",
            code: 0,
        })?;
        let body = self.read_exact(len as usize).await?;
        Message::decode_body(&body).map_err(|_| OsError::SystemCallFailed {
            call: "decode_body",
            code: 0,
        })
    }

    async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>, OsError> {
        let raw = self.raw;
        tokio::task::spawn_blocking(move || unsafe {
            let handle = HANDLE(raw as *mut std::ffi::c_void);
            let mut buffer = vec![0u8; n];
            let mut offset = 0;
            while offset < n {
                let event = CreateEventW(None, true, false, None).map_err(|e| {
                    OsError::SystemCallFailed { call: "CreateEventW", code: e.code().0 as u32 }
                })?;
                let mut overlapped = OVERLAPPED::default();
                overlapped.hEvent = event;
                let mut bytes_read = 0u32;

                let ok = ReadFile(handle, Some(&mut buffer[offset..]), Some(&mut bytes_read), Some(&mut overlapped));
                if ok.is_err() {
                    if GetLastError() == ERROR_IO_PENDING {
                        if WaitForSingleObject(event, INFINITE) != WAIT_OBJECT_0 {
                            let _ = windows::Win32::Foundation::CloseHandle(event);
                            return Err(OsError::SystemCallFailed { call: "WaitForSingleObject(read)", code: 0 });
                        }
                        GetOverlappedResult(handle, &overlapped, &mut bytes_read, false).map_err(|e| {
                            OsError::SystemCallFailed { call: "GetOverlappedResult", code: e.code().0 as u32 }
                        })?;
                    } else {
                        let code = GetLastError().0;
                        let _ = windows::Win32::Foundation::CloseHandle(event);
                        return Err(OsError::SystemCallFailed { call: "ReadFile", code });
                    }
                }
                let _ = windows::Win32::Foundation::CloseHandle(event);
                if bytes_read == 0 {
                    return Err(OsError::SystemCallFailed { call: "ReadFile(eof)", code: 0 });
                }
                offset += bytes_read as usize;
            }
            Ok(buffer)
        })
        .await
        .map_err(|_| OsError::SystemCallFailed { call: "read_exact(join)", code: 0 })?
    }
}

#[cfg(target_os = "windows")]
impl PipeWriter {
    pub async fn send(&self, message: &Message) -> Result<(), OsError> {
        let frame = message.encode_frame().map_err(|_| OsError::SystemCallFailed {
            call: "encode_frame",
            code: 0,
        })?;
        self.write_all(frame).await
    }

    async fn write_all(&self, data: Vec<u8>) -> Result<(), OsError> {
        let raw = self.raw;
        tokio::task::spawn_blocking(move || unsafe {
            let handle = HANDLE(raw as *mut std::ffi::c_void);
            let mut offset = 0;
            while offset < data.len() {
                let event = CreateEventW(None, true, false, None).map_err(|e| {
                    OsError::SystemCallFailed { call: "CreateEventW", code: e.code().0 as u32 }
                })?;
                let mut overlapped = OVERLAPPED::default();
                overlapped.hEvent = event;
                let mut bytes_written = 0u32;

                let ok = WriteFile(handle, Some(&data[offset..]), Some(&mut bytes_written), Some(&mut overlapped));
                if ok.is_err() {
                    if GetLastError() == ERROR_IO_PENDING {
                        if WaitForSingleObject(event, INFINITE) != WAIT_OBJECT_0 {
                            let _ = windows::Win32::Foundation::CloseHandle(event);
                            return Err(OsError::SystemCallFailed { call: "WaitForSingleObject(write)", code: 0 });
                        }
                        GetOverlappedResult(handle, &overlapped, &mut bytes_written, false).map_err(|e| {
                            OsError::SystemCallFailed { call: "GetOverlappedResult", code: e.code().0 as u32 }
                        })?;
                    } else {
                        let code = GetLastError().0;
                        let _ = windows::Win32::Foundation::CloseHandle(event);
                        return Err(OsError::SystemCallFailed { call: "WriteFile", code });
                    }
                }
                let _ = windows::Win32::Foundation::CloseHandle(event);
                if bytes_written == 0 {
                    return Err(OsError::SystemCallFailed { call: "WriteFile(eof)", code: 0 });
                }
                offset += bytes_written as usize;
            }
            Ok(())
        })
        .await
        .map_err(|_| OsError::SystemCallFailed { call: "write_all(join)", code: 0 })?
    }
}

#[cfg(target_os = "windows")]
impl Drop for PipeReader {
    fn drop(&mut self) {
        unsafe {
            let _ = windows::Win32::Foundation::CloseHandle(HANDLE(self.raw as *mut std::ffi::c_void));
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn pipe_buffer_size_is_reasonable() {
        assert_eq!(super::PIPE_BUFFER_SIZE, 256 * 1024);
    }
}
