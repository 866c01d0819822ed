//! Collaborator traits the supervisor is built against, injected rather than
//! reached for through a shared registry (see DESIGN.md, open question on
//! the cyclic module graph).

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::{OsError, SupervisorError};

/// Component B: resolves the console session to a usable primary token and
/// the environment/paths derived from it.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns `Ok(true)` if an interactive user is currently logged on.
    /// Never holds the token open past the check.
    async fn is_user_logged_on(&self) -> bool;

    /// Per-user data directory (`%APPDATA%\<product>`), resolved from the
    /// console user's own environment block, never the service's.
    async fn user_data_dir(&self) -> Result<PathBuf, OsError>;
}

/// Component D: spawns the helper process under the console user's token.
#[async_trait]
pub trait ChildLauncher: Send + Sync {
    /// Spawn the child and return its pid. `always_run` controls whether a
    /// missing interactive-user token falls back to the caller's own token;
    /// only set when the host is not itself a service.
    async fn spawn(&self, command: &str, always_run: bool) -> Result<u32, SupervisorError>;

    /// Best-effort termination of a previously spawned child.
    async fn kill(&self, pid: u32) -> Result<(), SupervisorError>;

    /// Wait for the child to exit, classifying the exit as a crash (pid
    /// file still present) or a clean exit (pid file absent/renamed).
    async fn wait(&self, pid: u32) -> bool;
}

/// Component E's external-instance check: does the pid file name a pid
/// that is still alive? This never confirms the pid *is* the expected
/// application — see the documented limitation in the design notes.
#[async_trait]
pub trait PidFileStore: Send + Sync {
    async fn running_pid(&self) -> Option<u32>;
}

/// Probes whether a given pid is currently alive, independent of whether it
/// is the expected child — used both by `PidFileStore` implementations and
/// directly by the TCP-table peer-authentication path.
pub trait ProcessProbe: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}
