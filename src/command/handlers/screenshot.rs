//! Explicit screenshot handler

use super::HandlerContext;
use crate::command::CommandResult;

pub async fn handle_screenshot(ctx: &mut HandlerContext<'_>) -> CommandResult {
    match ctx.driver.screenshot().await {
        Ok(image) => {
            ctx.artifact = Some(image);
            CommandResult::Completed {
                message: "screenshot captured".into(),
            }
        }
        Err(e) => CommandResult::from_driver_error(e),
    }
}
