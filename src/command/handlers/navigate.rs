//! Navigate handler

use super::HandlerContext;
use crate::command::CommandResult;
use tracing::debug;

/// Load `url` and wait for the page to settle
pub async fn handle_navigate(ctx: &mut HandlerContext<'_>, url: &str) -> CommandResult {
    debug!(url, "navigating");
    match ctx.driver.navigate(url).await {
        Ok(()) => CommandResult::Completed {
            message: format!("navigated to {url}"),
        },
        Err(e) => CommandResult::from_driver_error(e),
    }
}
