use thiserror::Error;

/// Error surfaced by the OS binding layer. Every native call failure is
/// captured here with its numeric code intact; nothing downstream converts
/// it to a string before it has been logged as a structured field.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OsError {
    #[error("no interactive user is logged on")]
    NoInteractiveUser,

    #[error("{call} failed with code {code}")]
    SystemCallFailed { call: &'static str, code: u32 },
}

impl OsError {
    /// Map a raw Win32 last-error code from a user-token query to the
    /// soft `NoInteractiveUser` outcome when it is one of the expected
    /// "no console user yet" codes, or a hard error otherwise.
    pub fn from_token_query(call: &'static str, code: u32) -> Self {
        const ERROR_SUCCESS: u32 = 0;
        const ERROR_ACCESS_DENIED: u32 = 5;
        const ERROR_PRIVILEGE_NOT_HELD: u32 = 1314;
        const NO_TOKEN: u32 = 1008;
        match code {
            ERROR_SUCCESS | ERROR_ACCESS_DENIED | ERROR_PRIVILEGE_NOT_HELD | NO_TOKEN => {
                OsError::NoInteractiveUser
            }
            other => OsError::SystemCallFailed { call, code: other },
        }
    }
}

/// Error surfaced by the supervisor-level components (C/D/E). Maps directly
/// onto the error kinds enumerated in the error handling design.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("no interactive user is logged on")]
    NoInteractiveUser,

    #[error("system call failed: {0}")]
    SystemCallFailed(#[from] OsError),

    #[error("peer authentication failed: {0}")]
    PeerAuthenticationFailed(String),

    #[error("failed to start child process: {0}")]
    ChildStartFailed(String),

    #[error("child process crashed")]
    ChildCrashed,

    #[error("restart ledger exhausted after {attempts} failed starts")]
    GivingUp { attempts: u32 },
}
