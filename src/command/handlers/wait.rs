//! Fixed pause handler

use super::HandlerContext;
use crate::command::CommandResult;
use std::time::Duration;

pub async fn handle_wait(_ctx: &mut HandlerContext<'_>, duration_ms: u64) -> CommandResult {
    tokio::time::sleep(Duration::from_millis(duration_ms)).await;
    CommandResult::Completed {
        message: format!("waited {duration_ms}ms"),
    }
}
