//! Assertion handlers
//!
//! A missing element fails the assertion after the element wait; text
//! matching is a case-sensitive substring test.

use super::{resolve, HandlerContext};
use crate::command::CommandResult;
use steprunner_shared::Locator;

pub async fn handle_assert_present(ctx: &mut HandlerContext<'_>, target: &Locator) -> CommandResult {
    match resolve(ctx, target).await {
        Ok(_) => CommandResult::Completed {
            message: format!("{target} is present"),
        },
        Err(e) => CommandResult::from_driver_error(e),
    }
}

pub async fn handle_assert_text(
    ctx: &mut HandlerContext<'_>,
    target: &Locator,
    expected: &str,
) -> CommandResult {
    let element = match resolve(ctx, target).await {
        Ok(element) => element,
        Err(e) => return CommandResult::from_driver_error(e),
    };

    let actual = match ctx.driver.element_text(&element).await {
        Ok(text) => text,
        Err(e) => return CommandResult::from_driver_error(e),
    };

    if actual.contains(expected) {
        CommandResult::Completed {
            message: format!("{target} contains '{expected}'"),
        }
    } else {
        CommandResult::Failed {
            reason: format!("assertion failed: expected '{expected}' in {target}, found '{actual}'"),
        }
    }
}
