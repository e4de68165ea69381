//! Per-command-class time budgets

use std::time::Duration;
use steprunner_shared::{limits, Action, Command};

/// Time limits applied while dispatching commands
#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    /// How long a locator may take to resolve
    pub element_wait: Duration,
    /// Page load budget for navigate
    pub navigation: Duration,
    /// Budget for actions that should return at once, and slack added to the others
    pub instant_action: Duration,
    /// Budget for starting a driver session
    pub acquire: Duration,
    /// Poll interval while a locator is unresolved
    pub poll_interval: Duration,
    /// Pause between consecutive commands
    pub pacing: Duration,
    /// Bound on driver teardown
    pub teardown_grace: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            element_wait: Duration::from_millis(limits::ELEMENT_WAIT_TIMEOUT_MS),
            navigation: Duration::from_millis(limits::NAVIGATION_TIMEOUT_MS),
            instant_action: Duration::from_millis(limits::INSTANT_ACTION_TIMEOUT_MS),
            acquire: Duration::from_millis(limits::NAVIGATION_TIMEOUT_MS),
            poll_interval: Duration::from_millis(limits::ELEMENT_POLL_INTERVAL_MS),
            pacing: Duration::from_millis(limits::COMMAND_PACING_MS),
            teardown_grace: Duration::from_millis(limits::TEARDOWN_GRACE_MS),
        }
    }
}

impl TimeoutPolicy {
    /// Hard upper bound for dispatching `command`, after which it fails with a timeout
    pub fn budget_for(&self, command: &Command) -> Duration {
        match &command.action {
            Action::Navigate { .. } => self.navigation + self.instant_action,
            Action::Wait { duration_ms } => Duration::from_millis(*duration_ms) + self.instant_action,
            Action::Screenshot => self.instant_action,
            Action::Click { .. }
            | Action::Type { .. }
            | Action::AssertPresent { .. }
            | Action::AssertText { .. } => self.element_wait + self.instant_action,
        }
    }
}

#[cfg(test)]
impl TimeoutPolicy {
    /// Millisecond budgets for exercising sessions in tests
    pub fn quick() -> Self {
        Self {
            element_wait: Duration::from_millis(60),
            navigation: Duration::from_millis(200),
            instant_action: Duration::from_millis(100),
            acquire: Duration::from_millis(200),
            poll_interval: Duration::from_millis(10),
            pacing: Duration::ZERO,
            teardown_grace: Duration::from_millis(100),
        }
    }
}
