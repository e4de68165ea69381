//! Command dispatch against an automation driver
//!
//! This module handles:
//! - Lazily acquiring a driver session
//! - Dispatching each command to its handler under a per-class time budget
//! - Capturing screenshots after page-affecting commands and on failure
//! - Tearing the driver down on every exit path

mod adapter;
pub mod handlers;
mod timeout;

pub use adapter::{Dispatch, DriverAdapter};
pub use timeout::TimeoutPolicy;

use crate::driver::DriverError;

/// Result of dispatching one command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// Command did what it promised
    Completed { message: String },
    /// The page under test did not behave as the command expected
    Failed { reason: String },
    /// The driver itself broke; the session cannot continue on it
    Broken { reason: String },
}

impl CommandResult {
    pub fn from_driver_error(err: DriverError) -> Self {
        if err.is_infrastructure() {
            Self::Broken {
                reason: err.to_string(),
            }
        } else {
            Self::Failed {
                reason: err.to_string(),
            }
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}
