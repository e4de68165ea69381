//! Click and type handlers, plus locator resolution shared by assertions

use super::HandlerContext;
use crate::command::CommandResult;
use crate::driver::{DriverError, ElementHandle};
use steprunner_shared::Locator;
use tokio::time::Instant;

/// Poll for `locator` until it resolves or the element wait runs out
pub async fn resolve(
    ctx: &mut HandlerContext<'_>,
    locator: &Locator,
) -> Result<ElementHandle, DriverError> {
    let deadline = Instant::now() + ctx.timeouts.element_wait;
    loop {
        match ctx.driver.find_element(locator).await {
            Ok(element) => return Ok(element),
            Err(DriverError::NotFound(_)) if Instant::now() < deadline => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                tokio::time::sleep(ctx.timeouts.poll_interval.min(remaining)).await;
            }
            Err(DriverError::NotFound(_)) => {
                return Err(DriverError::NotFound(locator.to_string()));
            }
            Err(e) => return Err(e),
        }
    }
}

pub async fn handle_click(ctx: &mut HandlerContext<'_>, target: &Locator) -> CommandResult {
    let element = match resolve(ctx, target).await {
        Ok(element) => element,
        Err(e) => return CommandResult::from_driver_error(e),
    };

    match ctx.driver.click(&element).await {
        Ok(()) => CommandResult::Completed {
            message: format!("clicked {target}"),
        },
        Err(e) => CommandResult::from_driver_error(e),
    }
}

/// Replace the element's content with `text`
pub async fn handle_type(ctx: &mut HandlerContext<'_>, target: &Locator, text: &str) -> CommandResult {
    let element = match resolve(ctx, target).await {
        Ok(element) => element,
        Err(e) => return CommandResult::from_driver_error(e),
    };

    match ctx.driver.clear_and_type(&element, text).await {
        Ok(()) => CommandResult::Completed {
            message: format!("typed into {target}"),
        },
        Err(e) => CommandResult::from_driver_error(e),
    }
}
