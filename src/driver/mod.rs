//! Automation Driver Bridge
//!
//! Capability interface over a browser automation driver, plus the W3C
//! WebDriver implementation used in production.

mod webdriver;

#[cfg(test)]
pub mod scripted;

pub use webdriver::{WebDriverConfig, WebDriverFactory};

use async_trait::async_trait;
use bytes::Bytes;
use steprunner_shared::Locator;
use thiserror::Error;

/// Opaque reference to a located element, valid for the driver that returned it
pub type ElementHandle = String;

/// Failures reported by a driver
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    #[error("locator not found: {0}")]
    NotFound(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("element not interactable: {0}")]
    NotInteractable(String),

    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("driver session lost: {0}")]
    Disconnected(String),

    #[error("driver protocol error: {0}")]
    Protocol(String),

    #[error("could not start driver session: {0}")]
    Unavailable(String),
}

impl DriverError {
    /// True when the automation tooling broke, as opposed to the page under
    /// test behaving unexpectedly
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Disconnected(_) | Self::Protocol(_) | Self::Unavailable(_)
        )
    }
}

/// One live browser session
#[async_trait]
pub trait AutomationDriver: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    /// Single lookup attempt; `NotFound` when nothing matches right now
    async fn find_element(&mut self, locator: &Locator) -> Result<ElementHandle, DriverError>;

    async fn click(&mut self, element: &ElementHandle) -> Result<(), DriverError>;

    async fn clear_and_type(&mut self, element: &ElementHandle, text: &str) -> Result<(), DriverError>;

    async fn element_text(&mut self, element: &ElementHandle) -> Result<String, DriverError>;

    /// PNG bytes of the current viewport
    async fn screenshot(&mut self) -> Result<Bytes, DriverError>;

    /// End the browser session
    async fn quit(&mut self) -> Result<(), DriverError>;
}

/// Factory for driver sessions
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn AutomationDriver>, DriverError>;

    /// Human-readable name for this driver backend
    fn name(&self) -> &'static str;
}
