//! The supervisor event loop: turns [`gpii_core::state::Action`]s into real
//! calls against the Windows binding layer and feeds their outcomes back in
//! as [`gpii_core::state::Event`]s.
//!
//! Deliberately the only place in this binary that owns mutable state; the
//! core's `step` function stays a pure, synchronously-testable match.

use anyhow::Result;
use gpii_core::state::Event;
use gpii_core::SupervisorConfig;
use tokio::sync::mpsc;

#[cfg(target_os = "windows")]
pub async fn run_foreground(config: SupervisorConfig, command: String) -> Result<()> {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let _ = event_tx.send(Event::ServiceStart);

    let ctrl_c_tx = event_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctrl_c_tx.send(Event::ServiceStop);
        }
    });

    windows_impl::run(config, command, windows_impl::HostRole::ForegroundUser, event_rx).await
}

#[cfg(not(target_os = "windows"))]
pub async fn run_foreground(_config: SupervisorConfig, _command: String) -> Result<()> {
    anyhow::bail!("the supervisor event loop is only implemented on Windows")
}

#[cfg(target_os = "windows")]
pub async fn run_service(
    config: SupervisorConfig,
    command: String,
    event_rx: mpsc::UnboundedReceiver<Event>,
) -> Result<()> {
    windows_impl::run(config, command, windows_impl::HostRole::WindowsService, event_rx).await
}

#[cfg(not(target_os = "windows"))]
pub async fn run_service(
    _config: SupervisorConfig,
    _command: String,
    _event_rx: mpsc::UnboundedReceiver<Event>,
) -> Result<()> {
    anyhow::bail!("the supervisor event loop is only implemented on Windows")
}

#[cfg(target_os = "windows")]
mod windows_impl {
    use std::path::PathBuf;
    use std::sync::Arc;

    use anyhow::Result;
    use gpii_core::state::{Action, Event, SupervisorState};
    use gpii_core::traits::{ChildLauncher, PidFileStore, TokenProvider};
    use gpii_core::{EventBus, Message, Supervisor, SupervisorConfig};
    use gpii_windows::pipe::PipeWriter;
    use gpii_windows::{HostRole as HostRoleImpl, PidFileProbe, SessionTokenManager, WindowsChildLauncher};
    use tokio::sync::mpsc;
    use tokio::time::{Duration, Instant};
    use tracing::{info, warn};

    pub use HostRoleImpl as HostRole;

    pub async fn run(
        config: SupervisorConfig,
        command: String,
        role: HostRole,
        mut event_rx: mpsc::UnboundedReceiver<Event>,
    ) -> Result<()> {
        let token_provider = Arc::new(SessionTokenManager::new(role, config.product_name.clone()));
        let child_launcher = WindowsChildLauncher::new(config.product_name.clone(), token_provider.clone());
        let bus = Arc::new(EventBus::default());
        // Only a non-service host may fall back to its own token (§4.4).
        let always_run = role == HostRole::ForegroundUser;

        let mut supervisor = Supervisor::new(config);
        let mut restart_timer: Option<tokio::time::Sleep> = None;
        let mut wait_task: Option<tokio::task::JoinHandle<Event>> = None;

        loop {
            let incoming = tokio::select! {
                maybe = event_rx.recv() => match maybe {
                    Some(e) => e,
                    None => break,
                },
                _ = async { restart_timer.as_mut().unwrap().await }, if restart_timer.is_some() => {
                    restart_timer = None;
                    Event::BackoffElapsed
                }
                joined = async { wait_task.as_mut().unwrap().await }, if wait_task.is_some() => {
                    wait_task = None;
                    joined.unwrap_or(Event::ChildExited { crashed: true })
                }
            };

            // An event may unlock an action whose outcome is itself the next
            // event (spawn succeeds/fails, the external-instance check
            // resolves); drain that chain synchronously before going back to
            // `select!`, matching the core's own treatment of `step` as a
            // single-threaded, re-entrant state machine.
            let mut next_event = Some(incoming);
            while let Some(event) = next_event.take() {
                let now = Instant::now();
                let previous = supervisor.state().clone();
                info!(state = ?previous, ?event, "supervisor event");

                if let (SupervisorState::Running { pid }, Event::ChildExited { crashed }) = (&previous, &event) {
                    bus.publish("stopped-gpii", serde_json::json!({ "pid": pid, "crashed": crashed }));
                }

                let action = supervisor.handle(event, now);
                info!(state = ?supervisor.state(), ?action, "supervisor transition");

                next_event = match action {
                    Action::None => None,

                    Action::CheckExternalInstance => {
                        if external_instance_running(&token_provider).await {
                            info!("another instance is already running, staying idle");
                            Some(Event::ExternalInstanceFound)
                        } else {
                            Some(Event::ExternalInstanceAbsent)
                        }
                    }

                    Action::SpawnChild => Some(
                        match spawn_child(&child_launcher, &token_provider, &command, always_run, &bus, &mut wait_task)
                            .await
                        {
                            Ok(pid) => Event::ChildSpawned { pid },
                            Err(()) => Event::ChildSpawnFailed,
                        },
                    ),

                    Action::KillChild => {
                        if let SupervisorState::Running { pid } = previous {
                            info!(pid, "stopping supervised child");
                            if let Err(e) = child_launcher.kill(pid).await {
                                warn!(pid, error = %e, "failed to kill child");
                            }
                            bus.publish("stopped-gpii", serde_json::json!({ "pid": pid }));
                        }
                        if let Some(task) = wait_task.take() {
                            task.abort();
                        }
                        None
                    }

                    Action::ScheduleRestart(delay) => {
                        info!(delay_secs = delay.as_secs(), "scheduling restart");
                        restart_timer = Some(tokio::time::sleep(delay));
                        None
                    }
                };
            }
        }

        Ok(())
    }

    async fn pid_file_path(token_provider: &SessionTokenManager) -> Option<PathBuf> {
        token_provider
            .user_data_dir()
            .await
            .ok()
            .map(|dir| dir.join(gpii_core::config::DEFAULT_PID_FILE_NAME))
    }

    async fn external_instance_running(token_provider: &SessionTokenManager) -> bool {
        let Some(path) = pid_file_path(token_provider).await else {
            return false;
        };
        PidFileProbe::new(path).running_pid().await.is_some()
    }

    /// Spawn the helper, open its IPC endpoint, and register a waiter that
    /// feeds `ChildExited` back into the loop once the process terminates.
    /// `Err(())` means the caller should fold this into `ChildSpawnFailed`.
    async fn spawn_child(
        child_launcher: &Arc<WindowsChildLauncher>,
        token_provider: &SessionTokenManager,
        command: &str,
        always_run: bool,
        bus: &Arc<EventBus>,
        wait_task: &mut Option<tokio::task::JoinHandle<Event>>,
    ) -> Result<u32, ()> {
        if let Some(path) = pid_file_path(token_provider).await {
            child_launcher.set_pid_file_path(path).await;
        }

        let pid = match child_launcher.spawn(command, always_run).await {
            Ok(pid) => pid,
            Err(e) => {
                warn!(error = %e, "failed to spawn child");
                return Err(());
            }
        };

        info!(pid, "child spawned");
        bus.publish("started-gpii", serde_json::json!({ "pid": pid }));

        if let Some(pipe) = child_launcher.take_pipe_server(pid).await {
            let bus = bus.clone();
            tokio::spawn(async move {
                if let Err(e) = pipe.wait_for_connection().await {
                    warn!(pid, error = %e, "child never connected to its pipe");
                    return;
                }
                let (mut reader, writer) = pipe.into_reader_writer();
                // One hello frame a second while the child is connected
                // (§6); the first tick fires immediately, so skip it.
                let mut heartbeat = tokio::time::interval(Duration::from_secs(1));
                heartbeat.tick().await;
                loop {
                    tokio::select! {
                        message = reader.recv() => match message {
                            Ok(message) => handle_message(pid, &bus, &writer, message).await,
                            Err(e) => {
                                info!(pid, error = %e, "pipe closed");
                                break;
                            }
                        },
                        _ = heartbeat.tick() => {
                            if let Err(e) = writer.send(&Message::hello(serde_json::json!({}))).await {
                                warn!(pid, error = %e, "failed to send hello heartbeat");
                                break;
                            }
                        }
                    }
                }
            });
        }

        let launcher = child_launcher.clone();
        *wait_task = Some(tokio::spawn(async move {
            let crashed = launcher.wait(pid).await;
            Event::ChildExited { crashed }
        }));

        Ok(pid)
    }

    async fn handle_message(pid: u32, bus: &Arc<EventBus>, writer: &PipeWriter, message: Message) {
        match message.kind.as_str() {
            gpii_core::message::TYPE_PING => {
                let reply = Message::pong(message.payload);
                if let Err(e) = writer.send(&reply).await {
                    warn!(pid, error = %e, "failed to send pong");
                }
            }
            other => {
                bus.publish(format!("gpii.message.{other}"), message.payload);
            }
        }
    }
}
