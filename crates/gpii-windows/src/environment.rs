//! Component A/B: environment block construction and the `APPDATA` lookup
//! that locates the per-user data directory.

use std::collections::BTreeMap;

use gpii_core::OsError;

#[cfg(target_os = "windows")]
use windows::Win32::System::Environment::{CreateEnvironmentBlock, DestroyEnvironmentBlock};

use crate::token::Token;

/// An ordered `NAME=VALUE` environment, read-only after creation except for
/// the caller-supplied overrides merged in before serialization.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentBlock {
    vars: BTreeMap<String, String>,
}

impl EnvironmentBlock {
    fn from_raw_block(raw: &[u16]) -> Self {
        let mut vars = BTreeMap::new();
        let mut start = 0;
        for (i, &c) in raw.iter().enumerate() {
            if c == 0 {
                if i == start {
                    break; // double NUL: end of block
                }
                if let Some(entry) = String::from_utf16(&raw[start..i]).ok() {
                    if let Some((name, value)) = entry.split_once('=') {
                        vars.insert(name.to_string(), value.to_string());
                    }
                }
                start = i + 1;
            }
        }
        Self { vars }
    }

    /// Merge caller-supplied `NAME=VALUE` overrides on top of this block.
    pub fn merge(&mut self, overrides: impl IntoIterator<Item = (String, String)>) {
        for (name, value) in overrides {
            self.vars.insert(name, value);
        }
    }

    /// Locate `APPDATA` case-insensitively and append the product folder.
    /// The block is the only source of truth: substituting the service's
    /// own environment here would point at `%SystemProfile%` instead of
    /// the console user's roaming profile.
    pub fn user_data_dir(&self, product: &str) -> Result<std::path::PathBuf, OsError> {
        let appdata = self
            .vars
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("APPDATA"))
            .map(|(_, v)| v.clone())
            .ok_or(OsError::NoInteractiveUser)?;
        Ok(std::path::PathBuf::from(appdata).join(product))
    }

    /// Serialize to the double-NUL-terminated UCS-2 block `CreateProcess`
    /// expects when `CREATE_UNICODE_ENVIRONMENT` is set.
    pub fn to_wide_block(&self) -> Vec<u16> {
        let mut block = Vec::new();
        for (name, value) in &self.vars {
            block.extend(format!("{name}={value}").encode_utf16());
            block.push(0);
        }
        block.push(0);
        block
    }
}

/// Build an [`EnvironmentBlock`] for `token` via `CreateEnvironmentBlock`.
#[cfg(target_os = "windows")]
pub fn build_for_token(token: &Token) -> Result<EnvironmentBlock, OsError> {
    unsafe {
        let mut raw: *mut std::ffi::c_void = std::ptr::null_mut();
        CreateEnvironmentBlock(&mut raw, token.raw(), false)
            .map_err(|e| OsError::SystemCallFailed {
                call: "CreateEnvironmentBlock",
                code: e.code().0 as u32,
            })?;

        let mut len = 0usize;
        let ptr = raw as *const u16;
        loop {
            if *ptr.add(len) == 0 && *ptr.add(len + 1) == 0 {
                len += 2;
                break;
            }
            len += 1;
        }
        let slice = std::slice::from_raw_parts(ptr, len);
        let block = EnvironmentBlock::from_raw_block(slice);

        let _ = DestroyEnvironmentBlock(raw);
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_block_parses_pairs_up_to_double_nul() {
        let mut raw: Vec<u16> = Vec::new();
        raw.extend("APPDATA=C:\\Users\\bob\\AppData\\Roaming".encode_utf16());
        raw.push(0);
        raw.extend("PATH=C:\\Windows".encode_utf16());
        raw.push(0);
        raw.push(0);

        let env = EnvironmentBlock::from_raw_block(&raw);
        assert_eq!(
            env.user_data_dir("gpii").unwrap().to_string_lossy(),
            "C:\\Users\\bob\\AppData\\Roaming\\gpii"
        );
    }

    #[test]
    fn missing_appdata_is_no_interactive_user() {
        let env = EnvironmentBlock::default();
        assert!(matches!(
            env.user_data_dir("gpii"),
            Err(OsError::NoInteractiveUser)
        ));
    }

    #[test]
    fn merge_overrides_take_priority() {
        let mut env = EnvironmentBlock::default();
        env.merge([("APPDATA".to_string(), "C:\\base".to_string())]);
        env.merge([("APPDATA".to_string(), "C:\\override".to_string())]);
        assert_eq!(
            env.user_data_dir("gpii").unwrap().to_string_lossy(),
            "C:\\override\\gpii"
        );
    }

    #[test]
    fn wide_block_is_double_nul_terminated() {
        let mut env = EnvironmentBlock::default();
        env.merge([("A".to_string(), "1".to_string())]);
        let block = env.to_wide_block();
        assert_eq!(&block[block.len() - 2..], &[0, 0]);
    }
}
