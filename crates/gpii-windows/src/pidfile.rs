//! The pid-file read side of component E's external-instance detection:
//! a hint, never an authority (§9 — pid reuse is a known, accepted gap).

use std::path::PathBuf;

use async_trait::async_trait;
use gpii_core::traits::{PidFileStore, ProcessProbe};

#[cfg(target_os = "windows")]
use windows::Win32::Foundation::CloseHandle;
#[cfg(target_os = "windows")]
use windows::Win32::System::Threading::{
    GetExitCodeProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
};

pub struct PidFileProbe {
    path: PathBuf,
}

impl PidFileProbe {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl PidFileStore for PidFileProbe {
    async fn running_pid(&self) -> Option<u32> {
        let content = tokio::fs::read_to_string(&self.path).await.ok()?;
        let pid: u32 = content.trim().parse().ok()?;
        let probe = WindowsProcessProbe;
        if tokio::task::spawn_blocking(move || probe.is_alive(pid))
            .await
            .unwrap_or(false)
        {
            Some(pid)
        } else {
            None
        }
    }
}

#[derive(Clone, Copy)]
pub struct WindowsProcessProbe;

impl ProcessProbe for WindowsProcessProbe {
    #[cfg(target_os = "windows")]
    fn is_alive(&self, pid: u32) -> bool {
        unsafe {
            let Ok(handle) = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) else {
                return false;
            };
            let mut exit_code = 0u32;
            let alive = GetExitCodeProcess(handle, &mut exit_code).is_ok() && exit_code == 259;
            let _ = CloseHandle(handle);
            alive
        }
    }

    #[cfg(not(target_os = "windows"))]
    fn is_alive(&self, _pid: u32) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_pid_file_yields_no_running_pid() {
        let probe = PidFileProbe::new(PathBuf::from("/nonexistent/gpii.pid"));
        assert_eq!(probe.running_pid().await, None);
    }
}
