//! Command handlers for each action

mod assert;
mod element;
mod navigate;
mod screenshot;
mod wait;

pub use assert::{handle_assert_present, handle_assert_text};
pub use element::{handle_click, handle_type, resolve};
pub use navigate::handle_navigate;
pub use screenshot::handle_screenshot;
pub use wait::handle_wait;

use super::{CommandResult, TimeoutPolicy};
use crate::driver::AutomationDriver;
use bytes::Bytes;
use steprunner_shared::{Action, Command};

/// Context passed to command handlers
pub struct HandlerContext<'a> {
    pub driver: &'a mut (dyn AutomationDriver + 'static),
    pub timeouts: &'a TimeoutPolicy,
    /// Image produced by the command itself
    pub artifact: Option<Bytes>,
}

impl<'a> HandlerContext<'a> {
    pub fn new(driver: &'a mut (dyn AutomationDriver + 'static), timeouts: &'a TimeoutPolicy) -> Self {
        Self {
            driver,
            timeouts,
            artifact: None,
        }
    }
}

/// Route a command to its handler
pub async fn handle(ctx: &mut HandlerContext<'_>, command: &Command) -> CommandResult {
    match &command.action {
        Action::Navigate { url } => handle_navigate(ctx, url).await,
        Action::Click { target } => handle_click(ctx, target).await,
        Action::Type { target, text } => handle_type(ctx, target, text).await,
        Action::Wait { duration_ms } => handle_wait(ctx, *duration_ms).await,
        Action::AssertPresent { target } => handle_assert_present(ctx, target).await,
        Action::AssertText { target, expected } => handle_assert_text(ctx, target, expected).await,
        Action::Screenshot => handle_screenshot(ctx).await,
    }
}
