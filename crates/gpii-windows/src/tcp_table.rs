//! Component A/C: the IPv4 TCP table walk backing loopback-TCP peer
//! authentication. Ports come back with the high 16 bits of the packed
//! field documented as uninitialized, and in network byte order — both
//! are corrected here before ports are compared.

use gpii_core::OsError;

#[cfg(target_os = "windows")]
use windows::Win32::Foundation::NO_ERROR;
#[cfg(target_os = "windows")]
use windows::Win32::NetworkManagement::IpHelper::{
    GetExtendedTcpTable, MIB_TCPROW_OWNER_PID, MIB_TCPTABLE_OWNER_PID, TCP_TABLE_OWNER_PID_ALL,
};
#[cfg(target_os = "windows")]
use windows::Win32::Networking::WinSock::AF_INET;

/// A single row: one side's address/port/owning pid.
#[derive(Debug, Clone, Copy)]
pub struct TcpRow {
    pub local_port: u16,
    pub remote_port: u16,
    pub owning_pid: u32,
}

/// Growth margin added between the size probe and the actual fetch, to
/// tolerate the table growing between the two calls.
const REALLOC_MARGIN: u32 = 100;

/// Enumerate every row of the system's IPv4 TCP table.
#[cfg(target_os = "windows")]
pub fn enumerate() -> Result<Vec<TcpRow>, OsError> {
    unsafe {
        let mut size: u32 = 0;
        let probe = GetExtendedTcpTable(
            None,
            &mut size,
            false,
            AF_INET.0 as u32,
            TCP_TABLE_OWNER_PID_ALL,
            0,
        );
        if probe != NO_ERROR.0 && size == 0 {
            return Err(OsError::SystemCallFailed {
                call: "GetExtendedTcpTable(size probe)",
                code: probe,
            });
        }

        size += REALLOC_MARGIN;
        let mut buffer = vec![0u8; size as usize];

        let result = GetExtendedTcpTable(
            Some(buffer.as_mut_ptr() as *mut _),
            &mut size,
            false,
            AF_INET.0 as u32,
            TCP_TABLE_OWNER_PID_ALL,
            0,
        );
        if result != NO_ERROR.0 {
            return Err(OsError::SystemCallFailed {
                call: "GetExtendedTcpTable",
                code: result,
            });
        }

        let table = &*(buffer.as_ptr() as *const MIB_TCPTABLE_OWNER_PID);
        let count = table.dwNumEntries as usize;
        let rows_ptr = table.table.as_ptr();
        let rows = std::slice::from_raw_parts(rows_ptr, count);

        Ok(rows.iter().map(|row| to_tcp_row(row)).collect())
    }
}

#[cfg(target_os = "windows")]
fn to_tcp_row(row: &MIB_TCPROW_OWNER_PID) -> TcpRow {
    TcpRow {
        local_port: mask_and_swap(row.dwLocalPort),
        remote_port: mask_and_swap(row.dwRemotePort),
        owning_pid: row.dwOwningPid,
    }
}

/// Mask to the low 16 bits (the high bits are documented as uninitialized)
/// and byte-swap out of network order.
fn mask_and_swap(raw: u32) -> u16 {
    ((raw & 0xFFFF) as u16).swap_bytes()
}

/// Find the row whose local port matches `local_port`.
pub fn find_by_local_port(rows: &[TcpRow], local_port: u16) -> Option<&TcpRow> {
    rows.iter().find(|r| r.local_port == local_port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_and_swap_corrects_network_byte_order() {
        // 0x901F = port 0x1F90 (8080) in network order, with garbage high bits.
        let raw: u32 = 0xDEAD_901F;
        assert_eq!(mask_and_swap(raw), 8080);
    }

    #[test]
    fn find_by_local_port_returns_matching_row() {
        let rows = vec![
            TcpRow { local_port: 1, remote_port: 2, owning_pid: 100 },
            TcpRow { local_port: 50, remote_port: 9, owning_pid: 200 },
        ];
        let found = find_by_local_port(&rows, 50).unwrap();
        assert_eq!(found.owning_pid, 200);
    }
}
