//! Component A: token acquisition. Every exit path — success, soft
//! "no interactive user", or hard failure — closes whatever handles it
//! opened along the way exactly once.

use gpii_core::OsError;

use crate::handle::OwnedHandle;

#[cfg(target_os = "windows")]
use windows::Win32::Foundation::HANDLE;
#[cfg(target_os = "windows")]
use windows::Win32::Security::{
    DuplicateTokenEx, SecurityIdentification, TokenPrimary, ASSIGN_PRIMARY, DUPLICATE, TOKEN_QUERY,
};
#[cfg(target_os = "windows")]
use windows::Win32::System::RemoteDesktop::{WTSGetActiveConsoleSessionId, WTSQueryUserToken};
#[cfg(target_os = "windows")]
use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

/// Sentinel the console APIs use for "no session attached to the console".
pub const NO_SESSION: u32 = 0xFFFF_FFFF;

/// A duplicatable primary access token, ready for `create_process_as_user`.
pub struct Token(pub(crate) OwnedHandle);

#[cfg(target_os = "windows")]
impl Token {
    pub fn raw(&self) -> HANDLE {
        self.0.raw()
    }
}

/// Returns the id of the session attached to the physical console, or
/// `None` if no user is logged on there (`0xFFFFFFFF`).
#[cfg(target_os = "windows")]
pub fn active_console_session_id() -> Option<u32> {
    let id = unsafe { WTSGetActiveConsoleSessionId() };
    if id == NO_SESSION {
        None
    } else {
        Some(id)
    }
}

/// Duplicate the current process's own primary token, for use when the
/// host is not itself running as a service (`always_run`, or foreground/dev
/// mode).
#[cfg(target_os = "windows")]
pub fn current_process_token() -> Result<Token, OsError> {
    unsafe {
        let mut raw = HANDLE::default();
        OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY | ASSIGN_PRIMARY | DUPLICATE, &mut raw)
            .map_err(|e| OsError::from_token_query("OpenProcessToken", e.code().0 as u32))?;
        let opened = OwnedHandle::new(raw);

        duplicate_primary(&opened)
    }
}

/// Query and duplicate the primary token of the user logged into
/// `session_id`. The Win32 error codes that mean "no interactive user"
/// (`ERROR_SUCCESS` returned on a failing call,
/// `ERROR_ACCESS_DENIED`, `ERROR_PRIVILEGE_NOT_HELD`, and the absence of
/// a token) are mapped to [`OsError::NoInteractiveUser`], not an error.
#[cfg(target_os = "windows")]
pub fn session_user_token(session_id: u32) -> Result<Token, OsError> {
    unsafe {
        let mut raw = HANDLE::default();
        if let Err(e) = WTSQueryUserToken(session_id, &mut raw) {
            return Err(OsError::from_token_query("WTSQueryUserToken", e.code().0 as u32));
        }
        if raw.is_invalid() {
            return Err(OsError::NoInteractiveUser);
        }
        let opened = OwnedHandle::new(raw);
        duplicate_primary(&opened)
    }
}

#[cfg(target_os = "windows")]
fn duplicate_primary(source: &OwnedHandle) -> Result<Token, OsError> {
    unsafe {
        let mut dup = HANDLE::default();
        DuplicateTokenEx(
            source.raw(),
            windows::Win32::Security::TOKEN_ALL_ACCESS,
            None,
            SecurityIdentification,
            TokenPrimary,
            &mut dup,
        )
        .map_err(|e| OsError::from_token_query("DuplicateTokenEx", e.code().0 as u32))?;
        Ok(Token(OwnedHandle::new(dup)))
    }
}

#[cfg(not(target_os = "windows"))]
pub struct Token;

#[cfg(test)]
mod tests {
    use gpii_core::OsError;

    #[test]
    fn query_error_classification_matches_the_binding_layer() {
        assert!(matches!(
            OsError::from_token_query("WTSQueryUserToken", 0),
            OsError::NoInteractiveUser
        ));
        assert!(matches!(
            OsError::from_token_query("WTSQueryUserToken", 5),
            OsError::NoInteractiveUser
        ));
        assert!(matches!(
            OsError::from_token_query("WTSQueryUserToken", 1314),
            OsError::NoInteractiveUser
        ));
        assert!(matches!(
            OsError::from_token_query("WTSQueryUserToken", 1008),
            OsError::NoInteractiveUser
        ));
        assert!(matches!(
            OsError::from_token_query("WTSQueryUserToken", 2),
            OsError::SystemCallFailed { .. }
        ));
    }
}
