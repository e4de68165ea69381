//! Scripted in-memory driver for exercising sessions without a browser

use super::{AutomationDriver, DriverError, DriverFactory, ElementHandle};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use steprunner_shared::Locator;

/// How the fake page behaves
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Locator values that never resolve
    pub missing: HashSet<String>,
    /// URL or locator value whose use kills the driver session
    pub crash_on: Option<String>,
    /// URL or locator value whose use never returns
    pub hang_on: Option<String>,
    /// Element text by locator value
    pub texts: HashMap<String, String>,
    /// Refuse to start a session
    pub fail_acquire: bool,
    /// Report an error when the session is ended
    pub fail_quit: bool,
    /// How long ending the session takes
    pub quit_delay: Duration,
}

impl Script {
    pub fn missing(mut self, value: &str) -> Self {
        self.missing.insert(value.to_string());
        self
    }

    pub fn crash_on(mut self, value: &str) -> Self {
        self.crash_on = Some(value.to_string());
        self
    }

    pub fn hang_on(mut self, value: &str) -> Self {
        self.hang_on = Some(value.to_string());
        self
    }

    pub fn text(mut self, value: &str, text: &str) -> Self {
        self.texts.insert(value.to_string(), text.to_string());
        self
    }
}

/// Everything the fake drivers were asked to do
#[derive(Debug, Default)]
pub struct JournalState {
    pub actions: Vec<String>,
    pub acquired: usize,
    pub quits: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<JournalState>>);

impl Journal {
    fn record(&self, f: impl FnOnce(&mut JournalState)) {
        if let Ok(mut state) = self.0.lock() {
            f(&mut state);
        }
    }

    /// Page-affecting actions in order (lookups and screenshots excluded)
    pub fn actions(&self) -> Vec<String> {
        self.0.lock().map(|s| s.actions.clone()).unwrap_or_default()
    }

    pub fn acquired(&self) -> usize {
        self.0.lock().map(|s| s.acquired).unwrap_or_default()
    }

    pub fn quits(&self) -> usize {
        self.0.lock().map(|s| s.quits).unwrap_or_default()
    }
}

pub struct ScriptedFactory {
    script: Script,
    journal: Journal,
}

impl ScriptedFactory {
    pub fn new(script: Script) -> (Self, Journal) {
        let journal = Journal::default();
        (
            Self {
                script,
                journal: journal.clone(),
            },
            journal,
        )
    }
}

#[async_trait]
impl DriverFactory for ScriptedFactory {
    async fn acquire(&self) -> Result<Box<dyn AutomationDriver>, DriverError> {
        if self.script.fail_acquire {
            return Err(DriverError::Unavailable("chrome not installed".into()));
        }
        self.journal.record(|s| s.acquired += 1);
        Ok(Box::new(ScriptedDriver {
            script: self.script.clone(),
            journal: self.journal.clone(),
            dead: false,
        }))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

pub struct ScriptedDriver {
    script: Script,
    journal: Journal,
    dead: bool,
}

impl ScriptedDriver {
    async fn touch(&mut self, key: &str) -> Result<(), DriverError> {
        if self.dead {
            return Err(DriverError::Disconnected("chrome not reachable".into()));
        }
        if self.script.crash_on.as_deref() == Some(key) {
            self.dead = true;
            return Err(DriverError::Disconnected("chrome not reachable".into()));
        }
        if self.script.hang_on.as_deref() == Some(key) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(())
    }
}

#[async_trait]
impl AutomationDriver for ScriptedDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.touch(url).await?;
        self.journal.record(|s| s.actions.push(format!("navigate {url}")));
        Ok(())
    }

    async fn find_element(&mut self, locator: &Locator) -> Result<ElementHandle, DriverError> {
        self.touch(&locator.value).await?;
        if self.script.missing.contains(&locator.value) {
            return Err(DriverError::NotFound(locator.to_string()));
        }
        Ok(locator.value.clone())
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        self.journal.record(|s| s.actions.push(format!("click {element}")));
        Ok(())
    }

    async fn clear_and_type(&mut self, element: &ElementHandle, text: &str) -> Result<(), DriverError> {
        self.journal
            .record(|s| s.actions.push(format!("type {element} {text}")));
        Ok(())
    }

    async fn element_text(&mut self, element: &ElementHandle) -> Result<String, DriverError> {
        Ok(self.script.texts.get(element).cloned().unwrap_or_default())
    }

    async fn screenshot(&mut self) -> Result<Bytes, DriverError> {
        if self.dead {
            return Err(DriverError::Disconnected("chrome not reachable".into()));
        }
        Ok(Bytes::from_static(b"\x89PNG"))
    }

    async fn quit(&mut self) -> Result<(), DriverError> {
        if !self.script.quit_delay.is_zero() {
            tokio::time::sleep(self.script.quit_delay).await;
        }
        self.journal.record(|s| s.quits += 1);
        if self.script.fail_quit {
            return Err(DriverError::Protocol("invalid session id".into()));
        }
        Ok(())
    }
}
