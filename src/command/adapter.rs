//! Driver adapter - owns one driver session and dispatches commands to it

use super::handlers::{self, HandlerContext};
use super::{CommandResult, TimeoutPolicy};
use crate::driver::{AutomationDriver, DriverError, DriverFactory};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use steprunner_shared::{ActionKind, Command};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

/// Outcome of one dispatched command
#[derive(Debug)]
pub struct Dispatch {
    pub result: CommandResult,
    /// Screenshot taken after the command, or the error screenshot on failure
    pub artifact: Option<Bytes>,
    pub elapsed: Duration,
}

/// Owns at most one driver session for the lifetime of an execution
pub struct DriverAdapter {
    factory: Arc<dyn DriverFactory>,
    timeouts: TimeoutPolicy,
    driver: Option<Box<dyn AutomationDriver>>,
}

impl DriverAdapter {
    pub fn new(factory: Arc<dyn DriverFactory>, timeouts: TimeoutPolicy) -> Self {
        Self {
            factory,
            timeouts,
            driver: None,
        }
    }

    pub fn timeouts(&self) -> &TimeoutPolicy {
        &self.timeouts
    }

    #[cfg(test)]
    pub fn is_acquired(&self) -> bool {
        self.driver.is_some()
    }

    /// Start a driver session if none is held
    pub async fn acquire(&mut self) -> Result<(), DriverError> {
        if self.driver.is_some() {
            return Ok(());
        }

        let started = Instant::now();
        let driver = match timeout(self.timeouts.acquire, self.factory.acquire()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(DriverError::Unavailable(format!(
                    "{} did not start within {}ms",
                    self.factory.name(),
                    self.timeouts.acquire.as_millis()
                )));
            }
        };

        info!(
            backend = self.factory.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "driver session acquired"
        );
        self.driver = Some(driver);
        Ok(())
    }

    /// Execute one command, acquiring the driver first when needed
    pub async fn dispatch(&mut self, command: &Command) -> Dispatch {
        let started = Instant::now();

        if let Err(e) = self.acquire().await {
            return Dispatch {
                result: CommandResult::Broken {
                    reason: e.to_string(),
                },
                artifact: None,
                elapsed: started.elapsed(),
            };
        }

        let Some(driver) = self.driver.as_mut() else {
            return Dispatch {
                result: CommandResult::Broken {
                    reason: "driver session not available".into(),
                },
                artifact: None,
                elapsed: started.elapsed(),
            };
        };

        let budget = self.timeouts.budget_for(command);
        let mut ctx = HandlerContext::new(&mut **driver, &self.timeouts);

        let result = match timeout(budget, handlers::handle(&mut ctx, command)).await {
            Ok(result) => result,
            Err(_) => CommandResult::Failed {
                reason: DriverError::Timeout(budget.as_millis() as u64).to_string(),
            },
        };

        let mut artifact = ctx.artifact.take();
        let wants_capture = match &result {
            CommandResult::Completed { .. } => {
                command.kind().captures_screenshot() && command.kind() != ActionKind::Screenshot
            }
            CommandResult::Failed { .. } => true,
            CommandResult::Broken { .. } => false,
        };

        if artifact.is_none() && wants_capture {
            // A missing screenshot never changes the command's result
            match timeout(self.timeouts.instant_action, ctx.driver.screenshot()).await {
                Ok(Ok(image)) => artifact = Some(image),
                Ok(Err(e)) => debug!(error = %e, "screenshot skipped"),
                Err(_) => debug!("screenshot timed out"),
            }
        }

        debug!(
            action = command.kind().as_str(),
            completed = result.is_completed(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "command dispatched"
        );

        if let CommandResult::Broken { reason } = &result {
            warn!(%reason, "driver broke, discarding session");
            self.discard().await;
        }

        Dispatch {
            result,
            artifact,
            elapsed: started.elapsed(),
        }
    }

    /// Quit the held session within the teardown grace
    pub async fn release(&mut self) {
        if let Some(driver) = self.driver.take() {
            quit_within(driver, self.timeouts.teardown_grace, "release").await;
        }
    }

    /// Drop a broken session; a quit is attempted but not waited on for long
    pub async fn discard(&mut self) {
        if let Some(driver) = self.driver.take() {
            quit_within(driver, self.timeouts.instant_action, "discard").await;
        }
    }
}

/// End a driver session within `grace`; failures are logged, never raised
async fn quit_within(mut driver: Box<dyn AutomationDriver>, grace: Duration, reason: &'static str) {
    match timeout(grace, driver.quit()).await {
        Ok(Ok(())) => info!(reason, "driver session released"),
        Ok(Err(e)) => warn!(reason, error = %e, "driver quit failed"),
        Err(_) => warn!(reason, grace_ms = grace.as_millis() as u64, "driver quit timed out"),
    }
}

impl Drop for DriverAdapter {
    fn drop(&mut self) {
        let Some(driver) = self.driver.take() else {
            return;
        };

        // Reached when a session task is aborted mid-command
        let grace = self.timeouts.teardown_grace;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(quit_within(driver, grace, "abort"));
            }
            Err(_) => warn!("no runtime to release driver session"),
        }
    }
}
