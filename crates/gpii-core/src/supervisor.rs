//! A thin stateful wrapper around [`crate::state::step`]: owns the current
//! `SupervisorState` and `RestartLedger` so the driver in `gpii-bin` just
//! feeds events in and gets actions out, without juggling the pair itself.

use tokio::time::Instant;

use crate::config::SupervisorConfig;
use crate::ledger::RestartLedger;
use crate::state::{self, Action, Event, SupervisorState};

/// Owns the mutable halves of the restart policy: the current state and the
/// failure ledger behind it. Not `Clone` — there is exactly one supervisor
/// per running service instance.
pub struct Supervisor {
    config: SupervisorConfig,
    state: SupervisorState,
    ledger: RestartLedger,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let ledger = RestartLedger::with_policy(config.min_healthy_runtime, config.max_failed_starts);
        Self {
            config,
            state: SupervisorState::Idle,
            ledger,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn state(&self) -> &SupervisorState {
        &self.state
    }

    pub fn ledger(&self) -> &RestartLedger {
        &self.ledger
    }

    /// Feed one event through the transition function, updating `self` in
    /// place and returning the action the driver should now perform.
    pub fn handle(&mut self, event: Event, now: Instant) -> Action {
        let (next_state, action) = state::step(&self.state, &mut self.ledger, event, now);
        self.state = next_state;
        action
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SessionChangeKind;

    #[test]
    fn fresh_supervisor_starts_idle() {
        let supervisor = Supervisor::new(SupervisorConfig::default());
        assert_eq!(supervisor.state(), &SupervisorState::Idle);
        assert_eq!(supervisor.ledger().consecutive_failures, 0);
    }

    #[test]
    fn handle_drives_state_forward() {
        let mut supervisor = Supervisor::new(SupervisorConfig::default());
        let action = supervisor.handle(Event::ServiceStart, Instant::now());
        assert_eq!(action, Action::CheckExternalInstance);
        assert_eq!(supervisor.state(), &SupervisorState::Starting);
    }

    #[test]
    fn session_logon_reopens_after_giving_up() {
        let mut supervisor = Supervisor::new(SupervisorConfig::default());
        supervisor.state = SupervisorState::GivingUp;
        supervisor.ledger.consecutive_failures = 4;

        let action = supervisor.handle(
            Event::SessionChange(SessionChangeKind::SessionLogon),
            Instant::now(),
        );
        assert_eq!(action, Action::CheckExternalInstance);
        assert_eq!(supervisor.ledger().consecutive_failures, 0);
    }
}
