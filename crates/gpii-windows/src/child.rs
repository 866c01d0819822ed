//! Wires components C and D together behind the [`ChildLauncher`] trait:
//! opens a private pipe endpoint, spawns the child with its client side
//! inherited, and keeps the process handle (for waiting/killing) and the
//! server side of the endpoint (for the driver to read/write) around,
//! keyed by pid.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use gpii_core::traits::ChildLauncher;
use gpii_core::{pipe_name, SupervisorError};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::handle::OwnedHandle;
use crate::launcher::{self, SpawnOptions};
use crate::pipe::{self, PipeServer};
use crate::session::SessionTokenManager;

#[cfg(target_os = "windows")]
use windows::Win32::Foundation::HANDLE;
#[cfg(target_os = "windows")]
use windows::Win32::System::Threading::{TerminateProcess, WaitForSingleObject, INFINITE};

struct SpawnedState {
    process_handle: OwnedHandle,
    pipe_server: Option<PipeServer>,
}

/// The product name is used both as the pipe-name prefix and (via the
/// caller) the `APPDATA` folder; kept here only for the former.
pub struct WindowsChildLauncher {
    product: String,
    token_provider: Arc<SessionTokenManager>,
    spawned: Mutex<HashMap<u32, SpawnedState>>,
    pid_file_path: Mutex<Option<PathBuf>>,
}

impl WindowsChildLauncher {
    /// `token_provider` is the same instance the driver uses for its own
    /// session/token checks, so a spawn always runs under the token
    /// `CreateProcessAsUserW` would resolve to right now — not a second,
    /// independently-derived one.
    pub fn new(product: impl Into<String>, token_provider: Arc<SessionTokenManager>) -> Arc<Self> {
        Arc::new(Self {
            product: product.into(),
            token_provider,
            spawned: Mutex::new(HashMap::new()),
            pid_file_path: Mutex::new(None),
        })
    }

    /// Set the pid-file path to consult when classifying an exit as a
    /// crash (§4.5); resolved once the driver knows the console user's
    /// data directory.
    pub async fn set_pid_file_path(&self, path: PathBuf) {
        *self.pid_file_path.lock().await = Some(path);
    }

    /// Take ownership of the server side of the pipe endpoint opened for
    /// `pid`, for the driver to await connection and exchange frames on.
    /// Returns `None` if already taken or the pid is unknown.
    pub async fn take_pipe_server(&self, pid: u32) -> Option<PipeServer> {
        let mut guard = self.spawned.lock().await;
        guard.get_mut(&pid).and_then(|s| s.pipe_server.take())
    }

    /// True if the pid file still names `pid` — the only proof of a crash
    /// this design trusts (§9: pid reuse is a known, accepted limitation).
    async fn pid_file_still_names(&self, pid: u32) -> bool {
        let Some(path) = self.pid_file_path.lock().await.clone() else {
            return false;
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => content.trim().parse::<u32>().ok() == Some(pid),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl ChildLauncher for WindowsChildLauncher {
    #[cfg(target_os = "windows")]
    async fn spawn(&self, command: &str, always_run: bool) -> Result<u32, SupervisorError> {
        let command = command.to_string();
        let product = self.product.clone();
        let token_provider = self.token_provider.clone();

        let (pid, process_handle, pipe_server) = tokio::task::spawn_blocking(move || {
            let pipe_endpoint_name = format!(
                r"\\.\pipe\{}",
                pipe_name::generate(&product)
            );
            let (server, client) = pipe::create_pipe(&pipe_endpoint_name)
                .map_err(|e| SupervisorError::ChildStartFailed(e.to_string()))?;

            let token = token_provider
                .acquire_for_spawn(always_run)
                .map_err(|e| SupervisorError::ChildStartFailed(e.to_string()))?;

            let opts = SpawnOptions::default();
            let spawned = launcher::spawn_child(&token, &command, Some(client), opts)
                .map_err(|e| SupervisorError::ChildStartFailed(e.to_string()))?;

            Ok::<_, SupervisorError>((spawned.pid, spawned.process_handle, server))
        })
        .await
        .map_err(|e| SupervisorError::ChildStartFailed(e.to_string()))??;

        info!(pid, "spawned child process");
        self.spawned.lock().await.insert(
            pid,
            SpawnedState {
                process_handle,
                pipe_server: Some(pipe_server),
            },
        );
        Ok(pid)
    }

    #[cfg(not(target_os = "windows"))]
    async fn spawn(&self, _command: &str, _always_run: bool) -> Result<u32, SupervisorError> {
        Err(SupervisorError::ChildStartFailed(
            "cross-session spawn is only implemented on Windows".to_string(),
        ))
    }

    #[cfg(target_os = "windows")]
    async fn kill(&self, pid: u32) -> Result<(), SupervisorError> {
        let mut guard = self.spawned.lock().await;
        let Some(state) = guard.remove(&pid) else {
            warn!(pid, "kill requested for unknown pid");
            return Ok(());
        };
        let raw = state.process_handle.raw();
        tokio::task::spawn_blocking(move || unsafe {
            let _ = TerminateProcess(raw, 1);
        })
        .await
        .map_err(|e| SupervisorError::ChildStartFailed(e.to_string()))?;
        Ok(())
    }

    #[cfg(not(target_os = "windows"))]
    async fn kill(&self, _pid: u32) -> Result<(), SupervisorError> {
        Ok(())
    }

    #[cfg(target_os = "windows")]
    async fn wait(&self, pid: u32) -> bool {
        let handle_raw = {
            let guard = self.spawned.lock().await;
            guard.get(&pid).map(|s| s.process_handle.raw().0 as isize)
        };
        let Some(raw) = handle_raw else {
            return self.pid_file_still_names(pid).await;
        };
        let _ = tokio::task::spawn_blocking(move || unsafe {
            WaitForSingleObject(HANDLE(raw as *mut std::ffi::c_void), INFINITE)
        })
        .await;
        self.spawned.lock().await.remove(&pid);
        self.pid_file_still_names(pid).await
    }

    #[cfg(not(target_os = "windows"))]
    async fn wait(&self, _pid: u32) -> bool {
        false
    }
}
