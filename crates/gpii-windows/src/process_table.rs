//! Component A: a snapshot of the system process table and the
//! parent-of-ancestor walk used by TCP peer authentication.

use std::collections::HashMap;

#[cfg(target_os = "windows")]
use windows::Win32::Foundation::CloseHandle;
#[cfg(target_os = "windows")]
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W,
    TH32CS_SNAPPROCESS,
};

/// Maps pid → parent pid for every process visible at snapshot time.
pub struct ProcessTable {
    parent_of: HashMap<u32, u32>,
}

impl ProcessTable {
    #[cfg(target_os = "windows")]
    pub fn snapshot() -> Result<Self, gpii_core::OsError> {
        let mut parent_of = HashMap::new();
        unsafe {
            let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0).map_err(|e| {
                gpii_core::OsError::SystemCallFailed {
                    call: "CreateToolhelp32Snapshot",
                    code: e.code().0 as u32,
                }
            })?;

            let mut entry = PROCESSENTRY32W {
                dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
                ..Default::default()
            };

            if Process32FirstW(snapshot, &mut entry).is_ok() {
                loop {
                    parent_of.insert(entry.th32ProcessID, entry.th32ParentProcessID);
                    if Process32NextW(snapshot, &mut entry).is_err() {
                        break;
                    }
                }
            }

            let _ = CloseHandle(snapshot);
        }
        Ok(Self { parent_of })
    }

    #[cfg(not(target_os = "windows"))]
    pub fn snapshot() -> Result<Self, gpii_core::OsError> {
        Ok(Self {
            parent_of: HashMap::new(),
        })
    }

    /// True if `candidate` is `expected`, or a descendant of it reached by
    /// following parent links at most `max_depth` times.
    pub fn is_within_ancestor_depth(&self, candidate: u32, expected: u32, max_depth: u32) -> bool {
        if candidate == expected {
            return true;
        }
        let mut pid = candidate;
        for _ in 0..max_depth {
            match self.parent_of.get(&pid) {
                Some(&parent) if parent == expected => return true,
                Some(&parent) => pid = parent,
                None => return false,
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(pairs: &[(u32, u32)]) -> ProcessTable {
        ProcessTable {
            parent_of: pairs.iter().copied().collect(),
        }
    }

    #[test]
    fn candidate_equal_to_expected_is_within_depth() {
        let t = table(&[]);
        assert!(t.is_within_ancestor_depth(10, 10, 5));
    }

    #[test]
    fn direct_child_is_within_depth() {
        let t = table(&[(20, 10)]);
        assert!(t.is_within_ancestor_depth(20, 10, 5));
    }

    #[test]
    fn depth_beyond_limit_is_rejected() {
        // 60 -> 50 -> 40 -> 30 -> 20 -> 10 is depth 5 from 60 to 10.
        let t = table(&[(60, 50), (50, 40), (40, 30), (30, 20), (20, 10)]);
        assert!(t.is_within_ancestor_depth(60, 10, 5));
        assert!(!t.is_within_ancestor_depth(60, 10, 4));
    }

    #[test]
    fn unrelated_pid_is_rejected() {
        let t = table(&[(20, 10)]);
        assert!(!t.is_within_ancestor_depth(99, 10, 5));
    }
}
