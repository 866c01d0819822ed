//! Component C, authenticated fallback: a loopback TCP listener whose
//! accept-time authentication walks the system TCP table instead of
//! trusting the OS to hand us an already-verified peer, since TCP (unlike
//! the named pipe) accepts any local connector.

use gpii_core::{Message, OsError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::warn;

use crate::process_table::ProcessTable;
use crate::tcp_table;

/// Ancestor-walk depth tolerated when matching the remote peer's pid
/// against the expected child (§4.3).
const MAX_ANCESTOR_DEPTH: u32 = 5;

pub struct TcpServer {
    listener: TcpListener,
}

impl TcpServer {
    pub async fn bind() -> Result<Self, OsError> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.map_err(|e| {
            OsError::SystemCallFailed {
                call: "TcpListener::bind",
                code: e.raw_os_error().unwrap_or(0) as u32,
            }
        })?;
        Ok(Self { listener })
    }

    pub fn local_port(&self) -> Result<u16, OsError> {
        self.listener
            .local_addr()
            .map(|addr| addr.port())
            .map_err(|e| OsError::SystemCallFailed {
                call: "local_addr",
                code: e.raw_os_error().unwrap_or(0) as u32,
            })
    }

    /// Accept connections until one authenticates against `expected_pid`,
    /// rejecting (and logging, never surfacing a `message.*` event for)
    /// anything that doesn't.
    pub async fn accept_authenticated(&self, expected_pid: u32) -> Result<TcpStream, OsError> {
        loop {
            let (stream, _peer_addr) = self.listener.accept().await.map_err(|e| {
                OsError::SystemCallFailed {
                    call: "TcpListener::accept",
                    code: e.raw_os_error().unwrap_or(0) as u32,
                }
            })?;

            let local_port = stream
                .local_addr()
                .map_err(|e| OsError::SystemCallFailed {
                    call: "local_addr",
                    code: e.raw_os_error().unwrap_or(0) as u32,
                })?
                .port();
            let peer_port = stream
                .peer_addr()
                .map_err(|e| OsError::SystemCallFailed {
                    call: "peer_addr",
                    code: e.raw_os_error().unwrap_or(0) as u32,
                })?
                .port();

            match authenticate(local_port, peer_port, expected_pid) {
                Ok(true) => return Ok(stream),
                Ok(false) => {
                    warn!(expected_pid, "rejected TCP peer failing ownership check");
                    drop(stream);
                }
                Err(e) => {
                    warn!(error = %e, "TCP peer authentication check failed, rejecting connection");
                    drop(stream);
                }
            }
        }
    }
}

#[cfg(target_os = "windows")]
fn authenticate(local_port: u16, peer_port: u16, expected_pid: u32) -> Result<bool, OsError> {
    let rows = tcp_table::enumerate()?;

    // (a) our own socket's row must be owned by this process.
    let our_row = match tcp_table::find_by_local_port(&rows, local_port) {
        Some(row) => row,
        None => return Ok(false),
    };
    if our_row.owning_pid != std::process::id() {
        return Ok(false);
    }

    // (b) the peer's own socket (its local port is our remote port) must
    // be owned by the expected child, or an ancestor within depth 5.
    let peer_row = match tcp_table::find_by_local_port(&rows, peer_port) {
        Some(row) => row,
        None => return Ok(false),
    };

    let table = ProcessTable::snapshot()?;
    Ok(table.is_within_ancestor_depth(peer_row.owning_pid, expected_pid, MAX_ANCESTOR_DEPTH))
}

#[cfg(not(target_os = "windows"))]
fn authenticate(_local_port: u16, _peer_port: u16, _expected_pid: u32) -> Result<bool, OsError> {
    Ok(false)
}

/// Write one frame, then read one in reply — used by the supervisor's
/// connection handler regardless of which transport variant is active.
pub async fn send_message(stream: &mut TcpStream, message: &Message) -> Result<(), OsError> {
    let frame = message
        .encode_frame()
        .map_err(|_| OsError::SystemCallFailed { call: "encode_frame", code: 0 })?;
    stream
        .write_all(&frame)
        .await
        .map_err(|e| OsError::SystemCallFailed {
            call: "TcpStream::write_all",
            code: e.raw_os_error().unwrap_or(0) as u32,
        })
}

pub async fn recv_message(stream: &mut TcpStream) -> Result<Message, OsError> {
    let mut header = [0u8; gpii_core::message::HEADER_SIZE];
    stream
        .read_exact(&mut header)
        .await
        .map_err(|e| OsError::SystemCallFailed {
            call: "TcpStream::read_exact(header)",
            code: e.raw_os_error().unwrap_or(0) as u32,
        })?;
    let len = Message::parse_length_prefix(header).map_err(|_| OsError::SystemCallFailed {
        call: "parse_length_prefix",
        code: 0,
    })?;
    let mut body = vec![0u8; len as usize];
    stream
        .read_exact(&mut body)
        .await
        .map_err(|e| OsError::SystemCallFailed {
            call: "TcpStream::read_exact(body)",
            code: e.raw_os_error().unwrap_or(0) as u32,
        })?;
    Message::decode_body(&body).map_err(|_| OsError::SystemCallFailed {
        call: "decode_body",
        code: 0,
    })
}
