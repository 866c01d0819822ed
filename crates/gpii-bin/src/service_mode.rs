//! SCM entry point for `--mode service`: registers the Windows service
//! dispatcher and hands the resulting event stream to the supervisor
//! driver loop.

use std::ffi::OsString;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use gpii_core::state::Event;
use gpii_core::SupervisorConfig;
use tracing::{error, info};
use windows_service::service_dispatcher;
use windows_service::{define_windows_service, service::ServiceState};

static STARTUP: OnceLock<(SupervisorConfig, String)> = OnceLock::new();

define_windows_service!(ffi_service_main, service_main);

/// Blocks until the SCM stops the service. Must be called from the
/// process's original thread — `service_dispatcher::start` hands control
/// to the SCM, which calls back into `service_main` on its own thread.
pub fn run(config: SupervisorConfig, command: String) -> Result<()> {
    let service_name = config.service_name.clone();
    STARTUP
        .set((config, command))
        .map_err(|_| anyhow::anyhow!("service_mode::run called more than once"))?;
    service_dispatcher::start(service_name, ffi_service_main).context("service dispatcher failed")
}

fn service_main(_arguments: Vec<OsString>) {
    let (config, command) = STARTUP.get().expect("run() stores startup state before dispatch");

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build async runtime in service process");
            return;
        }
    };

    let (event_tx, event_rx) = tokio::sync::mpsc::unbounded_channel();

    let status_handle = match gpii_windows::service::dispatch::register(&config.service_name, event_tx.clone()) {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "failed to register service control handler");
            return;
        }
    };

    let _ = event_tx.send(Event::ServiceStart);

    info!("service control handler registered, entering supervisor loop");
    if let Err(e) = runtime.block_on(crate::driver::run_service(config.clone(), command.clone(), event_rx)) {
        error!(error = %e, "supervisor loop exited with error");
    }

    let _ = status_handle.set_service_status(windows_service::service::ServiceStatus {
        service_type: windows_service::service::ServiceType::OWN_PROCESS,
        current_state: ServiceState::Stopped,
        controls_accepted: windows_service::service::ServiceControlAccept::empty(),
        exit_code: windows_service::service::ServiceExitCode::Win32(0),
        checkpoint: 0,
        wait_hint: std::time::Duration::default(),
        process_id: None,
    });
}
