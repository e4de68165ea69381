//! steprunner Shared Protocol Types
//!
//! This crate provides the wire protocol, the command descriptor model and
//! the command validator shared by the execution server and its clients.

pub mod codec;
pub mod command;
pub mod protocol;
pub mod state_machine;
pub mod validator;

// Re-export commonly used types at crate root
pub use command::{Action, ActionKind, Command, Locator, LocatorStrategy};
pub use protocol::{
    CaseId, ClientMessage, ExecutionStatus, RunOutcome, ServerMessage, StepId,
};
pub use validator::{validate, ValidationError};

/// Timing and sizing limits for step execution
pub mod limits {
    /// How long to wait for a locator to resolve before failing the command
    pub const ELEMENT_WAIT_TIMEOUT_MS: u64 = 10_000;

    /// Page load timeout for navigate commands
    pub const NAVIGATION_TIMEOUT_MS: u64 = 30_000;

    /// Timeout for actions that should complete immediately (screenshot)
    pub const INSTANT_ACTION_TIMEOUT_MS: u64 = 5_000;

    /// Longest explicit wait a stored command may request
    pub const MAX_WAIT_DURATION_MS: u64 = 60_000;

    /// Poll interval while waiting for a locator to resolve
    pub const ELEMENT_POLL_INTERVAL_MS: u64 = 250;

    /// Delay between consecutive commands in a run
    pub const COMMAND_PACING_MS: u64 = 500;

    /// Bounded retries for a terminal persistence write
    pub const PERSIST_MAX_RETRIES: u32 = 3;

    /// Grace period for driver teardown after cancellation
    pub const TEARDOWN_GRACE_MS: u64 = 5_000;

    /// Outbound event buffer per channel
    pub const EVENT_BUFFER: usize = 100;
}
