//! The supervisor state machine's pure transition function.
//!
//! Deliberately free of I/O: every OS call (token acquisition, spawning,
//! pid-file probing) is modeled as an [`Action`] the driver performs, whose
//! outcome comes back in as the next [`Event`]. That keeps the restart
//! policy itself a plain, deterministically-testable function of
//! `(state, ledger, event, now)`.

use tokio::time::{Duration, Instant};

use crate::ledger::{backoff_delay, RestartLedger};

/// Sub-events of the `sessionchange` service control code. Only
/// `SessionLogon` is meaningful to the core; everything else is reported
/// (for logging) but otherwise ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChangeKind {
    SessionLogon,
    Other(String),
}

/// One of `Idle`, `Starting`, `Running`, `Backoff`, `GivingUp` (§3).
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorState {
    Idle,
    Starting,
    Running { pid: u32 },
    Backoff { attempts: u32, resume_at: Instant },
    GivingUp,
}

/// Inputs to the state machine: service lifecycle events, the internal
/// `child.exited` signal, and the two-phase outcome of actions the driver
/// performed on the core's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ServiceStart,
    SessionChange(SessionChangeKind),
    ServiceStop,
    ServiceShutdown,
    ExternalInstanceFound,
    ExternalInstanceAbsent,
    ChildSpawned { pid: u32 },
    ChildSpawnFailed,
    ChildExited { crashed: bool },
    BackoffElapsed,
}

/// Outputs of the state machine: what the driver should now go do.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    None,
    CheckExternalInstance,
    SpawnChild,
    KillChild,
    ScheduleRestart(Duration),
}

/// Apply `event` to `(state, ledger)` at wall-clock time `now`, returning the
/// new state/ledger and the action the driver should take.
///
/// This is the entire restart policy in one place: every transition the
/// supervisor can make is one arm of this match.
pub fn step(
    state: &SupervisorState,
    ledger: &mut RestartLedger,
    event: Event,
    now: Instant,
) -> (SupervisorState, Action) {
    use SupervisorState::*;

    match (state, event) {
        // Idle and Backoff both accept a start request; Starting/Running
        // are re-entrant-guarded (ignored) and GivingUp only reopens on
        // session-logon, handled in its own arm below.
        (Idle, Event::ServiceStart)
        | (Idle, Event::SessionChange(SessionChangeKind::SessionLogon))
        | (Backoff { .. }, Event::ServiceStart)
        | (Backoff { .. }, Event::SessionChange(SessionChangeKind::SessionLogon)) => {
            (Starting, Action::CheckExternalInstance)
        }

        (GivingUp, Event::SessionChange(SessionChangeKind::SessionLogon)) => {
            ledger.consecutive_failures = 0;
            (Starting, Action::CheckExternalInstance)
        }

        (Backoff { .. }, Event::BackoffElapsed) => (Starting, Action::CheckExternalInstance),

        (Starting, Event::ExternalInstanceFound) => (Idle, Action::None),

        (Starting, Event::ExternalInstanceAbsent) => {
            ledger.record_start(now);
            (Starting, Action::SpawnChild)
        }

        (Starting, Event::ChildSpawned { pid }) => (Running { pid }, Action::None),

        (Starting, Event::ChildSpawnFailed) => fail(ledger, now),

        (Running { .. }, Event::ChildExited { crashed: false }) => (Idle, Action::None),

        (Running { .. }, Event::ChildExited { crashed: true }) => fail(ledger, now),

        // service.stop is accepted from any state and is terminal.
        (Running { .. }, Event::ServiceStop) | (Running { .. }, Event::ServiceShutdown) => {
            (Idle, Action::KillChild)
        }
        (_, Event::ServiceStop) | (_, Event::ServiceShutdown) => (Idle, Action::None),

        // Ignore start requests while already starting/running, and any
        // sub-events of sessionchange other than session-logon.
        (other, _) => (other.clone(), Action::None),
    }
}

/// Shared tail of the "failed to start" and "crashed while running" arms:
/// classify against `MIN_HEALTHY_RUNTIME` and update the ledger accordingly.
fn fail(ledger: &mut RestartLedger, now: Instant) -> (SupervisorState, Action) {
    let attempts = if ledger.ran_healthily(now) {
        ledger.record_healthy_reset()
    } else {
        ledger.record_fast_failure()
    };

    if ledger.exceeded_max_failed_starts() {
        (SupervisorState::GivingUp, Action::None)
    } else {
        let delay = backoff_delay(attempts);
        (
            SupervisorState::Backoff {
                attempts,
                resume_at: now + delay,
            },
            Action::ScheduleRestart(delay),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> Instant {
        Instant::now()
    }

    #[test]
    fn idle_start_goes_to_starting() {
        let mut ledger = RestartLedger::new();
        let (state, action) = step(&SupervisorState::Idle, &mut ledger, Event::ServiceStart, now());
        assert_eq!(state, SupervisorState::Starting);
        assert_eq!(action, Action::CheckExternalInstance);
    }

    #[test]
    fn external_instance_found_returns_to_idle() {
        let mut ledger = RestartLedger::new();
        let (state, action) = step(
            &SupervisorState::Starting,
            &mut ledger,
            Event::ExternalInstanceFound,
            now(),
        );
        assert_eq!(state, SupervisorState::Idle);
        assert_eq!(action, Action::None);
    }

    #[test]
    fn external_instance_absent_spawns_and_records_start() {
        let mut ledger = RestartLedger::new();
        let t0 = now();
        let (state, action) = step(
            &SupervisorState::Starting,
            &mut ledger,
            Event::ExternalInstanceAbsent,
            t0,
        );
        assert_eq!(state, SupervisorState::Starting);
        assert_eq!(action, Action::SpawnChild);
        assert_eq!(ledger.last_start, Some(t0));
    }

    #[test]
    fn clean_exit_goes_idle_without_touching_ledger() {
        let mut ledger = RestartLedger::new();
        ledger.consecutive_failures = 2;
        let (state, _) = step(
            &SupervisorState::Running { pid: 4242 },
            &mut ledger,
            Event::ChildExited { crashed: false },
            now(),
        );
        assert_eq!(state, SupervisorState::Idle);
        assert_eq!(ledger.consecutive_failures, 2);
    }

    #[test]
    fn crash_loop_reaches_giving_up_after_four_fast_failures() {
        let mut ledger = RestartLedger::new();
        let mut t = now();
        let mut state = SupervisorState::Running { pid: 1 };

        let mut delays = Vec::new();
        for _ in 0..3 {
            let (next_state, action) = step(&state, &mut ledger, Event::ChildExited { crashed: true }, t);
            match action {
                Action::ScheduleRestart(d) => delays.push(d),
                other => panic!("expected a scheduled restart, got {other:?}"),
            }
            state = next_state;
            t += Duration::from_secs(1);
            let (starting, _) = step(&state, &mut ledger, Event::BackoffElapsed, t);
            state = starting;
            let (spawned, _) = step(&state, &mut ledger, Event::ExternalInstanceAbsent, t);
            state = spawned;
            let (running, _) = step(&state, &mut ledger, Event::ChildSpawned { pid: 1 }, t);
            state = running;
        }

        // Fourth fast failure exceeds MAX_FAILED_STARTS and gives up.
        let (final_state, final_action) =
            step(&state, &mut ledger, Event::ChildExited { crashed: true }, t);
        assert_eq!(final_state, SupervisorState::GivingUp);
        assert_eq!(final_action, Action::None);

        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(11),
                Duration::from_secs(21),
            ]
        );
    }

    #[test]
    fn healthy_run_resets_ledger_to_one() {
        let mut ledger = RestartLedger::new();
        ledger.consecutive_failures = 3;
        let t0 = now();
        ledger.record_start(t0);
        let t_exit = t0 + Duration::from_secs(60);

        let (state, action) = step(
            &SupervisorState::Running { pid: 9 },
            &mut ledger,
            Event::ChildExited { crashed: true },
            t_exit,
        );

        assert_eq!(ledger.consecutive_failures, 1);
        assert_eq!(action, Action::ScheduleRestart(Duration::from_secs(1)));
        assert!(matches!(state, SupervisorState::Backoff { attempts: 1, .. }));
    }

    #[test]
    fn giving_up_only_reopens_on_session_logon() {
        let mut ledger = RestartLedger::new();
        ledger.consecutive_failures = 5;
        let (state, action) = step(&SupervisorState::GivingUp, &mut ledger, Event::ServiceStart, now());
        assert_eq!(state, SupervisorState::GivingUp);
        assert_eq!(action, Action::None);

        let (state, action) = step(
            &SupervisorState::GivingUp,
            &mut ledger,
            Event::SessionChange(SessionChangeKind::SessionLogon),
            now(),
        );
        assert_eq!(state, SupervisorState::Starting);
        assert_eq!(action, Action::CheckExternalInstance);
        assert_eq!(ledger.consecutive_failures, 0);
    }

    #[test]
    fn stop_from_running_kills_child_and_goes_idle() {
        let mut ledger = RestartLedger::new();
        let (state, action) = step(
            &SupervisorState::Running { pid: 7 },
            &mut ledger,
            Event::ServiceStop,
            now(),
        );
        assert_eq!(state, SupervisorState::Idle);
        assert_eq!(action, Action::KillChild);
    }

    #[test]
    fn start_is_ignored_while_already_starting() {
        let mut ledger = RestartLedger::new();
        let (state, action) = step(&SupervisorState::Starting, &mut ledger, Event::ServiceStart, now());
        assert_eq!(state, SupervisorState::Starting);
        assert_eq!(action, Action::None);
    }

    #[test]
    fn backoff_accepts_immediate_restart_request() {
        let mut ledger = RestartLedger::new();
        let state = SupervisorState::Backoff {
            attempts: 1,
            resume_at: now() + Duration::from_secs(1),
        };
        let (next, action) = step(&state, &mut ledger, Event::ServiceStart, now());
        assert_eq!(next, SupervisorState::Starting);
        assert_eq!(action, Action::CheckExternalInstance);
    }
}
