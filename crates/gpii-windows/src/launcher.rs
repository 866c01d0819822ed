//! Component D: the cross-session process launcher. Builds the
//! environment block, the startup info (with inherited standard handles
//! and the CRT-compatible handle-inheritance blob), and calls
//! `CreateProcessAsUserW` under the console user's token.

use gpii_core::OsError;

use crate::environment::{self, EnvironmentBlock};
use crate::handle::OwnedHandle;
use crate::pipe::PipeClientHandle;
use crate::token::Token;

#[cfg(target_os = "windows")]
use windows::Win32::Foundation::HANDLE;
#[cfg(target_os = "windows")]
use windows::Win32::System::Threading::{
    CreateProcessAsUserW, GetStdHandle, CREATE_NEW_CONSOLE, CREATE_UNICODE_ENVIRONMENT,
    PROCESS_INFORMATION, STARTF_USESTDHANDLES, STARTUPINFOW, STD_ERROR_HANDLE, STD_INPUT_HANDLE,
    STD_OUTPUT_HANDLE,
};
#[cfg(target_os = "windows")]
use windows::core::PWSTR;

/// Flag value the common runtime uses for an inherited handle opened for
/// reading and writing (`FOPEN`).
const FOPEN: u8 = 0x01;

/// Options accepted by [`spawn_child`], mirroring the cross-session
/// launcher's inputs (§4.4). Token acquisition is the caller's
/// responsibility — see [`crate::session::SessionTokenManager`] — so this
/// holds only what shapes the spawned process itself.
#[derive(Default)]
pub struct SpawnOptions {
    pub env: Vec<(String, String)>,
    pub current_dir: Option<String>,
    pub inherit_handles: Vec<OwnedHandle>,
}

/// The result of a successful spawn: enough to monitor and later kill the
/// child, plus its inherited client pipe handle (already transferred, so
/// the caller's copy has been closed).
pub struct SpawnedChild {
    pub pid: u32,
    #[cfg(target_os = "windows")]
    pub process_handle: OwnedHandle,
}

#[cfg(target_os = "windows")]
fn to_wide(s: &str) -> Vec<u16> {
    use std::os::windows::ffi::OsStrExt;
    std::ffi::OsStr::new(s)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

/// The packed CRT handle-inheritance blob: `int count; u8 flags[count];
/// u64 handles[count];`, attached via the startup-info reserved-2 fields.
#[cfg(target_os = "windows")]
fn build_inheritance_blob(handles: &[HANDLE]) -> Vec<u8> {
    let count = handles.len() as i32;
    let mut blob = Vec::with_capacity(4 + handles.len() + handles.len() * 8);
    blob.extend_from_slice(&count.to_le_bytes());
    blob.extend(std::iter::repeat(FOPEN).take(handles.len()));
    for h in handles {
        blob.extend_from_slice(&(h.0 as u64).to_le_bytes());
    }
    blob
}

/// Spawn `command` under `token` — already acquired by the caller via the
/// injected [`crate::session::SessionTokenManager`] — transferring
/// `opts.inherit_handles` plus standard I/O into the child.
#[cfg(target_os = "windows")]
pub fn spawn_child(
    token: &Token,
    command: &str,
    pipe_client: Option<PipeClientHandle>,
    opts: SpawnOptions,
) -> Result<SpawnedChild, OsError> {
    let mut env = environment::build_for_token(token)?;
    env.merge(opts.env.iter().cloned());

    spawn_with_token(token, command, &env, pipe_client, opts)
}

#[cfg(target_os = "windows")]
fn spawn_with_token(
    user_token: &Token,
    command: &str,
    env: &EnvironmentBlock,
    pipe_client: Option<PipeClientHandle>,
    opts: SpawnOptions,
) -> Result<SpawnedChild, OsError> {
    let mut env_wide = env.to_wide_block();
    let mut cmd_wide = to_wide(command);
    let dir_wide = opts.current_dir.as_deref().map(to_wide);
    let desktop_wide = to_wide("winsta0\\default");

    let mut inherited: Vec<HANDLE> = Vec::new();
    let client_handle = pipe_client.map(|c| c.into_owned());
    let mut startup = STARTUPINFOW {
        cb: std::mem::size_of::<STARTUPINFOW>() as u32,
        lpDesktop: PWSTR(desktop_wide.as_ptr() as *mut u16),
        ..Default::default()
    };

    let should_inherit = client_handle.is_some() || !opts.inherit_handles.is_empty();
    let mut blob;
    if should_inherit {
        unsafe {
            startup.dwFlags |= STARTF_USESTDHANDLES;
            startup.hStdInput = GetStdHandle(STD_INPUT_HANDLE).unwrap_or_default();
            startup.hStdOutput = GetStdHandle(STD_OUTPUT_HANDLE).unwrap_or_default();
            startup.hStdError = GetStdHandle(STD_ERROR_HANDLE).unwrap_or_default();
        }
        inherited.push(startup.hStdInput);
        inherited.push(startup.hStdOutput);
        inherited.push(startup.hStdError);
        if let Some(ref h) = client_handle {
            inherited.push(h.raw());
        }
        for h in &opts.inherit_handles {
            inherited.push(h.raw());
        }

        blob = build_inheritance_blob(&inherited);
        startup.cbReserved2 = blob.len() as u16;
        startup.lpReserved2 = windows::core::PSTR(blob.as_mut_ptr());
    } else {
        blob = Vec::new();
        let _ = &blob;
    }

    let mut process_info = PROCESS_INFORMATION::default();

    let create_result = unsafe {
        CreateProcessAsUserW(
            user_token.raw(),
            None,
            Some(windows::core::PWSTR(cmd_wide.as_mut_ptr())),
            None,
            None,
            should_inherit,
            CREATE_UNICODE_ENVIRONMENT | CREATE_NEW_CONSOLE,
            Some(env_wide.as_mut_ptr() as *mut std::ffi::c_void),
            dir_wide
                .as_ref()
                .map(|d| windows::core::PCWSTR(d.as_ptr()))
                .unwrap_or(windows::core::PCWSTR::null()),
            &startup,
            &mut process_info,
        )
    };

    // `client_handle` and `opts.inherit_handles` drop at the end of this
    // function, closing the parent's copy of every handle offered for
    // inheritance whether or not creation succeeded — the child (if any)
    // has its own duplicated copies.
    if let Err(e) = create_result {
        return Err(OsError::SystemCallFailed {
            call: "CreateProcessAsUserW",
            code: e.code().0 as u32,
        });
    }

    unsafe {
        let _ = windows::Win32::Foundation::CloseHandle(process_info.hThread);
    }

    Ok(SpawnedChild {
        pid: process_info.dwProcessId,
        process_handle: OwnedHandle::new(process_info.hProcess),
    })
}

#[cfg(test)]
mod tests {
    #[cfg(target_os = "windows")]
    #[test]
    fn inheritance_blob_matches_crt_layout() {
        use super::build_inheritance_blob;
        use windows::Win32::Foundation::HANDLE;

        let handles = vec![HANDLE(1 as *mut _), HANDLE(2 as *mut _)];
        let blob = build_inheritance_blob(&handles);

        assert_eq!(&blob[0..4], &2i32.to_le_bytes());
        assert_eq!(blob[4], super::FOPEN);
        assert_eq!(blob[5], super::FOPEN);
        assert_eq!(&blob[6..14], &1u64.to_le_bytes());
        assert_eq!(&blob[14..22], &2u64.to_le_bytes());
    }
}
