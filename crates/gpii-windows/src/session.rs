//! Component B: the session/token manager. Resolves the console session to
//! a primary token (or the current process's own, outside service mode),
//! and derives the per-user data directory from it.

use async_trait::async_trait;
use gpii_core::traits::TokenProvider;
use gpii_core::OsError;

use crate::environment;
use crate::token;

/// Whether this process is the Windows service itself, or a foreground/dev
/// invocation running as the interactive user already. Replaces a
/// module-level "is service" flag with an explicit value passed in at
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostRole {
    ForegroundUser,
    WindowsService,
}

pub struct SessionTokenManager {
    role: HostRole,
    product: String,
}

impl SessionTokenManager {
    pub fn new(role: HostRole, product: impl Into<String>) -> Self {
        Self {
            role,
            product: product.into(),
        }
    }

    #[cfg(target_os = "windows")]
    fn acquire(&self) -> Result<token::Token, OsError> {
        match self.role {
            HostRole::ForegroundUser => token::current_process_token(),
            HostRole::WindowsService => match token::active_console_session_id() {
                Some(session_id) => token::session_user_token(session_id),
                None => Err(OsError::NoInteractiveUser),
            },
        }
    }

    /// The token a spawn should run under: the console user's primary token,
    /// or — only when `always_run` is set, meaning the host is not itself a
    /// service (§4.4) — this process's own token as a fallback when there is
    /// no interactive session to borrow from.
    #[cfg(target_os = "windows")]
    pub fn acquire_for_spawn(&self, always_run: bool) -> Result<token::Token, OsError> {
        match self.acquire() {
            Ok(t) => Ok(t),
            Err(OsError::NoInteractiveUser) if always_run => token::current_process_token(),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl TokenProvider for SessionTokenManager {
    #[cfg(target_os = "windows")]
    async fn is_user_logged_on(&self) -> bool {
        let role = self.role;
        tokio::task::spawn_blocking(move || {
            let manager = SessionTokenManager::new(role, String::new());
            manager.acquire().is_ok()
        })
        .await
        .unwrap_or(false)
    }

    #[cfg(not(target_os = "windows"))]
    async fn is_user_logged_on(&self) -> bool {
        false
    }

    #[cfg(target_os = "windows")]
    async fn user_data_dir(&self) -> Result<std::path::PathBuf, OsError> {
        let role = self.role;
        let product = self.product.clone();
        let token = tokio::task::spawn_blocking(move || {
            let manager = SessionTokenManager::new(role, String::new());
            manager.acquire()
        })
        .await
        .map_err(|_| OsError::NoInteractiveUser)??;
        let env = environment::build_for_token(&token)?;
        env.user_data_dir(&product)
    }

    #[cfg(not(target_os = "windows"))]
    async fn user_data_dir(&self) -> Result<std::path::PathBuf, OsError> {
        Err(OsError::NoInteractiveUser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_role_variants_are_distinguishable() {
        assert_ne!(HostRole::ForegroundUser, HostRole::WindowsService);
    }
}
