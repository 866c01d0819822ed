//! Component G: the Windows Service Control Manager surface — registering
//! the service via `sc.exe` (install/uninstall/start/stop, matching
//! [`gpii_platform::service::ServiceManager`]) and, when actually running
//! as a service, the real SCM dispatcher that turns control codes into
//! [`gpii_core::state::Event`]s for the supervisor.

use anyhow::{bail, Context, Result};
use gpii_platform::service::ServiceManager;
use tracing::info;

const DISPLAY_NAME: &str = "GPII Morphic Supervisor";

pub struct WindowsServiceManager {
    service_name: String,
    binary_path: String,
    program_args: Vec<String>,
}

impl WindowsServiceManager {
    pub fn new(service_name: String, binary_path: String, program_args: Vec<String>) -> Self {
        Self {
            service_name,
            binary_path,
            program_args,
        }
    }
}

impl ServiceManager for WindowsServiceManager {
    fn install(&self) -> Result<()> {
        info!("installing Windows service: {}", self.service_name);

        let mut bin_path = format!("\"{}\" --mode service", self.binary_path);
        for arg in &self.program_args {
            bin_path.push_str(&format!(" {}", arg));
        }

        let output = std::process::Command::new("sc.exe")
            .args([
                "create",
                &self.service_name,
                &format!("binPath={}", bin_path),
                &format!("DisplayName={}", DISPLAY_NAME),
                "start=auto",
                "type=own",
            ])
            .output()
            .context("failed to run sc.exe create")?;

        if !output.status.success() {
            bail!("sc.exe create failed: {}", String::from_utf8_lossy(&output.stderr));
        }

        let _ = std::process::Command::new("sc.exe")
            .args([
                "description",
                &self.service_name,
                "Launches and supervises the Morphic user-session helper process.",
            ])
            .output();

        let _ = std::process::Command::new("sc.exe")
            .args([
                "failure",
                &self.service_name,
                "reset=86400",
                "actions=restart/5000/restart/30000/restart/60000",
            ])
            .output();

        info!("service installed: {}", self.service_name);
        Ok(())
    }

    fn uninstall(&self) -> Result<()> {
        info!("uninstalling Windows service: {}", self.service_name);
        let _ = self.stop();
        std::thread::sleep(std::time::Duration::from_secs(2));

        let output = std::process::Command::new("sc.exe")
            .args(["delete", &self.service_name])
            .output()
            .context("failed to run sc.exe delete")?;

        if !output.status.success() {
            bail!("sc.exe delete failed: {}", String::from_utf8_lossy(&output.stderr));
        }
        info!("service uninstalled: {}", self.service_name);
        Ok(())
    }

    fn start(&self) -> Result<()> {
        let output = std::process::Command::new("sc.exe")
            .args(["start", &self.service_name])
            .output()
            .context("failed to start service")?;
        if !output.status.success() {
            bail!("sc.exe start failed: {}", String::from_utf8_lossy(&output.stderr));
        }
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let output = std::process::Command::new("sc.exe")
            .args(["stop", &self.service_name])
            .output()
            .context("failed to stop service")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.contains("has not been started") && !stderr.contains("1062") {
                bail!("sc.exe stop failed: {}", stderr);
            }
        }
        Ok(())
    }

    fn is_running(&self) -> Result<bool> {
        let output = std::process::Command::new("sc.exe")
            .args(["query", &self.service_name])
            .output()
            .context("failed to query service")?;
        Ok(String::from_utf8_lossy(&output.stdout).contains("RUNNING"))
    }
}

/// The real SCM dispatcher, used only when `--mode service` is selected.
/// Translates service control codes into [`gpii_core::state::Event`]s and
/// forwards them to the supervisor driver over an mpsc channel; the
/// driver owns the actual event loop (§5 — a single cooperative loop).
#[cfg(target_os = "windows")]
pub mod dispatch {
    use gpii_core::state::{Event, SessionChangeKind};
    use tokio::sync::mpsc::UnboundedSender;
    use windows_service::service::{
        ServiceControl, ServiceControlAccept, ServiceExitCode, ServiceState, ServiceStatus,
        ServiceType,
    };
    use windows_service::service_control_handler::{self, ServiceControlHandlerResult};

    /// Registers a control handler with the SCM that republishes every
    /// control code this core understands onto `events`, and reports
    /// `SERVICE_RUNNING` back once registration succeeds.
    pub fn register(
        service_name: &str,
        events: UnboundedSender<Event>,
    ) -> windows_service::Result<service_control_handler::ServiceStatusHandle> {
        let handler = move |control: ServiceControl| -> ServiceControlHandlerResult {
            match control {
                ServiceControl::Stop => {
                    let _ = events.send(Event::ServiceStop);
                    ServiceControlHandlerResult::NoError
                }
                ServiceControl::Shutdown => {
                    let _ = events.send(Event::ServiceShutdown);
                    ServiceControlHandlerResult::NoError
                }
                ServiceControl::SessionChange(session_change) => {
                    let kind = if session_change.reason == windows_service::service::SessionChangeReason::SessionLogon
                    {
                        SessionChangeKind::SessionLogon
                    } else {
                        SessionChangeKind::Other(format!("{:?}", session_change.reason))
                    };
                    let _ = events.send(Event::SessionChange(kind));
                    ServiceControlHandlerResult::NoError
                }
                ServiceControl::Interrogate => ServiceControlHandlerResult::NoError,
                _ => ServiceControlHandlerResult::NotImplemented,
            }
        };

        let status_handle = service_control_handler::register(service_name, handler)?;
        status_handle.set_service_status(ServiceStatus {
            service_type: ServiceType::OWN_PROCESS,
            current_state: ServiceState::Running,
            controls_accepted: ServiceControlAccept::STOP
                | ServiceControlAccept::SHUTDOWN
                | ServiceControlAccept::SESSION_CHANGE,
            exit_code: ServiceExitCode::Win32(0),
            checkpoint: 0,
            wait_hint: std::time::Duration::default(),
            process_id: None,
        })?;
        Ok(status_handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bin_path_includes_service_mode_flag() {
        let manager = WindowsServiceManager::new(
            "gpii-service".to_string(),
            "C:\\gpii\\gpii.exe".to_string(),
            vec!["--gpii".to_string(), "C:\\gpii\\main.exe".to_string()],
        );
        assert_eq!(manager.service_name, "gpii-service");
        assert_eq!(manager.binary_path, "C:\\gpii\\gpii.exe");
    }
}
