//! A uniquely-owned OS handle. Every Win32 handle in this crate is wrapped
//! in one of these so that closing happens exactly once, on exactly one
//! path, including the error paths the raw Win32 calls don't clean up after
//! themselves.

#[cfg(target_os = "windows")]
use windows::Win32::Foundation::{CloseHandle, HANDLE};

/// An owned kernel handle. `Send + Sync` because a handle value is just an
/// opaque integer as far as any thread other than the one that closes it
/// is concerned.
#[cfg(target_os = "windows")]
pub struct OwnedHandle(HANDLE);

#[cfg(target_os = "windows")]
unsafe impl Send for OwnedHandle {}
#[cfg(target_os = "windows")]
unsafe impl Sync for OwnedHandle {}

#[cfg(target_os = "windows")]
impl OwnedHandle {
    /// Wrap a handle returned by a Win32 call that already checked it for
    /// validity. Use [`OwnedHandle::try_new`] when `INVALID_HANDLE_VALUE`
    /// or a null handle is still possible.
    pub fn new(handle: HANDLE) -> Self {
        Self(handle)
    }

    pub fn raw(&self) -> HANDLE {
        self.0
    }

    /// Hand the handle to a child process's inheritance set, transferring
    /// ownership of the close obligation to whoever receives the process.
    pub fn into_raw(self) -> HANDLE {
        let raw = self.0;
        std::mem::forget(self);
        raw
    }
}

#[cfg(target_os = "windows")]
impl Drop for OwnedHandle {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            unsafe {
                let _ = CloseHandle(self.0);
            }
        }
    }
}

#[cfg(target_os = "windows")]
impl std::fmt::Debug for OwnedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OwnedHandle({:?})", self.0 .0)
    }
}
