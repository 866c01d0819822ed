//! Install/uninstall orchestration for `--mode install`/`--mode uninstall`:
//! copies the running binary into place, registers it with the SCM, and
//! starts it. Windows-only — there is no other supported host.

use anyhow::{Context, Result};
use gpii_core::SupervisorConfig;
use gpii_platform::service::ServiceManager;
use tracing::info;

#[cfg(target_os = "windows")]
const DEFAULT_INSTALL_DIR: &str = r"C:\Program Files\GPII";
#[cfg(not(target_os = "windows"))]
const DEFAULT_INSTALL_DIR: &str = "/opt/gpii";

#[cfg(target_os = "windows")]
const BINARY_NAME: &str = "gpii-service.exe";
#[cfg(not(target_os = "windows"))]
const BINARY_NAME: &str = "gpii-service";

/// Copy the current binary into `DEFAULT_INSTALL_DIR`, register it with the
/// SCM under `config.service_name`, and start it. `gpii`/`node_args`/
/// `program_args` are the raw CLI inputs — kept as separate argv entries all
/// the way to the SCM binPath, so `--mode service` parses them back with the
/// same `clap` derive instead of re-splitting a pre-joined string.
pub fn run_install(
    config: &SupervisorConfig,
    gpii: Option<&str>,
    node_args: &[String],
    program_args: &[String],
) -> Result<()> {
    ensure_elevated()?;

    let install_dir = std::path::Path::new(DEFAULT_INSTALL_DIR);
    std::fs::create_dir_all(install_dir)
        .with_context(|| format!("failed to create install dir {}", install_dir.display()))?;

    let binary_dest = install_dir.join(BINARY_NAME);
    let current_exe = std::env::current_exe().context("failed to get current exe path")?;
    if current_exe != binary_dest {
        std::fs::copy(&current_exe, &binary_dest).with_context(|| {
            format!(
                "failed to copy binary from {} to {}",
                current_exe.display(),
                binary_dest.display()
            )
        })?;
        info!(dest = %binary_dest.display(), "binary copied to install location");
    }

    let scm_args = build_helper_args(gpii, node_args, program_args);
    let manager = service_manager(config.service_name.clone(), binary_dest.to_string_lossy().into_owned(), scm_args);
    manager.install()?;
    info!(service = %config.service_name, "service registered");
    manager.start()?;
    info!(service = %config.service_name, "service started");

    Ok(())
}

/// Stop and remove the service registration.
pub fn run_uninstall(config: &SupervisorConfig) -> Result<()> {
    ensure_elevated()?;

    let manager = service_manager(config.service_name.clone(), String::new(), Vec::new());
    manager.uninstall()?;
    info!(service = %config.service_name, "service uninstalled");
    Ok(())
}

/// Build the argv tail appended after `--mode service` in the SCM binPath:
/// `--gpii`/`--node-args`/`--program-args`, matching `Cli`'s own flag names
/// so the installed service parses its command line the same way
/// `--mode service` would if invoked directly, instead of collapsing
/// everything into one pre-joined flag value.
fn build_helper_args(gpii: Option<&str>, node_args: &[String], program_args: &[String]) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(gpii) = gpii {
        args.push("--gpii".to_string());
        args.push(quote_if_needed(gpii));
    }
    if !node_args.is_empty() {
        args.push("--node-args".to_string());
        args.push(quote_if_needed(&node_args.join(",")));
    }
    if !program_args.is_empty() {
        args.push("--program-args".to_string());
        args.push(quote_if_needed(&program_args.join(",")));
    }
    args
}

/// `sc.exe create binPath=` is a single space-joined command line; any token
/// containing a space must be quoted or it would be split into two argv
/// entries by the child's own `CommandLineToArgvW` parsing.
fn quote_if_needed(value: &str) -> String {
    if value.contains(' ') {
        format!("\"{value}\"")
    } else {
        value.to_string()
    }
}

#[cfg(target_os = "windows")]
fn service_manager(
    service_name: String,
    binary_path: String,
    program_args: Vec<String>,
) -> gpii_windows::WindowsServiceManager {
    gpii_windows::WindowsServiceManager::new(service_name, binary_path, program_args)
}

#[cfg(target_os = "windows")]
fn ensure_elevated() -> Result<()> {
    if !gpii_windows::elevation::is_elevated() {
        anyhow::bail!("this command must be run as Administrator (use an elevated command prompt)");
    }
    Ok(())
}

#[cfg(not(target_os = "windows"))]
fn ensure_elevated() -> Result<()> {
    anyhow::bail!("install/uninstall is only supported on Windows")
}

#[cfg(not(target_os = "windows"))]
fn service_manager(
    _service_name: String,
    _binary_path: String,
    _program_args: Vec<String>,
) -> NullServiceManager {
    NullServiceManager
}

#[cfg(not(target_os = "windows"))]
struct NullServiceManager;

#[cfg(not(target_os = "windows"))]
impl gpii_platform::service::ServiceManager for NullServiceManager {
    fn install(&self) -> Result<()> {
        anyhow::bail!("install/uninstall is only supported on Windows")
    }
    fn uninstall(&self) -> Result<()> {
        anyhow::bail!("install/uninstall is only supported on Windows")
    }
    fn start(&self) -> Result<()> {
        anyhow::bail!("install/uninstall is only supported on Windows")
    }
    fn stop(&self) -> Result<()> {
        anyhow::bail!("install/uninstall is only supported on Windows")
    }
    fn is_running(&self) -> Result<bool> {
        anyhow::bail!("install/uninstall is only supported on Windows")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_helper_args_keeps_flags_separate() {
        let args = build_helper_args(
            Some(r"C:\gpii\main.exe"),
            &["--inspect".to_string()],
            &["--flag".to_string(), "value".to_string()],
        );
        assert_eq!(
            args,
            vec![
                "--gpii".to_string(),
                r"C:\gpii\main.exe".to_string(),
                "--node-args".to_string(),
                "--inspect".to_string(),
                "--program-args".to_string(),
                "--flag,value".to_string(),
            ]
        );
    }

    #[test]
    fn build_helper_args_omits_empty_groups() {
        assert!(build_helper_args(None, &[], &[]).is_empty());
    }

    #[test]
    fn quote_if_needed_wraps_only_values_with_spaces() {
        assert_eq!(quote_if_needed("no-spaces"), "no-spaces");
        assert_eq!(quote_if_needed("has space"), "\"has space\"");
    }
}
