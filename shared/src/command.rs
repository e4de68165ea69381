//! Typed command descriptors
//!
//! Stored command arrays are untyped JSON. The validator converts each record
//! into a [`Command`] before any execution logic sees it, and [`Command`]
//! serializes back into the canonical flat-record form.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;
use std::fmt;

/// How a target element is located on the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorStrategy {
    Id,
    Name,
    Class,
    Tag,
    Xpath,
    Css,
    LinkText,
    PartialLinkText,
}

impl LocatorStrategy {
    /// Parse a stored strategy name, accepting the common long forms
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "id" => Some(Self::Id),
            "name" => Some(Self::Name),
            "class" | "class_name" => Some(Self::Class),
            "tag" | "tag_name" => Some(Self::Tag),
            "xpath" => Some(Self::Xpath),
            "css" | "css_selector" => Some(Self::Css),
            "link_text" => Some(Self::LinkText),
            "partial_link_text" => Some(Self::PartialLinkText),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Class => "class",
            Self::Tag => "tag",
            Self::Xpath => "xpath",
            Self::Css => "css",
            Self::LinkText => "link_text",
            Self::PartialLinkText => "partial_link_text",
        }
    }
}

impl fmt::Display for LocatorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A target element: strategy plus strategy-specific value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    pub strategy: LocatorStrategy,
    pub value: String,
}

impl Locator {
    pub fn new(strategy: LocatorStrategy, value: impl Into<String>) -> Self {
        Self {
            strategy,
            value: value.into(),
        }
    }

    /// CSS selector locator, the default for a bare `target`
    pub fn css(value: impl Into<String>) -> Self {
        Self::new(LocatorStrategy::Css, value)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy, self.value)
    }
}

/// The closed set of executable actions
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Navigate { url: String },
    Click { target: Locator },
    Type { target: Locator, text: String },
    Wait { duration_ms: u64 },
    AssertPresent { target: Locator },
    AssertText { target: Locator, expected: String },
    Screenshot,
}

/// Action tag without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Navigate,
    Click,
    Type,
    Wait,
    AssertPresent,
    AssertText,
    Screenshot,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::Click => "click",
            Self::Type => "type",
            Self::Wait => "wait",
            Self::AssertPresent | Self::AssertText => "assert",
            Self::Screenshot => "screenshot",
        }
    }

    /// Whether a screenshot is captured after this action succeeds
    pub fn captures_screenshot(&self) -> bool {
        matches!(
            self,
            Self::Navigate | Self::Click | Self::Type | Self::Screenshot
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validated, executable command
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub action: Action,
    pub description: Option<String>,
}

impl Command {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn kind(&self) -> ActionKind {
        match &self.action {
            Action::Navigate { .. } => ActionKind::Navigate,
            Action::Click { .. } => ActionKind::Click,
            Action::Type { .. } => ActionKind::Type,
            Action::Wait { .. } => ActionKind::Wait,
            Action::AssertPresent { .. } => ActionKind::AssertPresent,
            Action::AssertText { .. } => ActionKind::AssertText,
            Action::Screenshot => ActionKind::Screenshot,
        }
    }

    /// Human readable label used in progress events
    pub fn label(&self) -> String {
        if let Some(description) = self.description.as_deref() {
            if !description.trim().is_empty() {
                return description.to_string();
            }
        }
        match &self.action {
            Action::Navigate { url } => format!("navigate to {url}"),
            Action::Click { target } => format!("click {target}"),
            Action::Type { target, .. } => format!("type into {target}"),
            Action::Wait { duration_ms } => format!("wait {duration_ms}ms"),
            Action::AssertPresent { target } => format!("assert {target} is present"),
            Action::AssertText { target, expected } => {
                format!("assert {target} contains '{expected}'")
            }
            Action::Screenshot => "capture screenshot".to_string(),
        }
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("action", self.kind().as_str())?;
        match &self.action {
            Action::Navigate { url } => map.serialize_entry("url", url)?,
            Action::Click { target } | Action::AssertPresent { target } => {
                map.serialize_entry("strategy", target.strategy.as_str())?;
                map.serialize_entry("target", &target.value)?;
            }
            Action::Type { target, text } => {
                map.serialize_entry("strategy", target.strategy.as_str())?;
                map.serialize_entry("target", &target.value)?;
                map.serialize_entry("value", text)?;
            }
            Action::AssertText { target, expected } => {
                map.serialize_entry("strategy", target.strategy.as_str())?;
                map.serialize_entry("target", &target.value)?;
                map.serialize_entry("value", expected)?;
            }
            Action::Wait { duration_ms } => map.serialize_entry("duration_ms", duration_ms)?,
            Action::Screenshot => {}
        }
        if let Some(description) = &self.description {
            map.serialize_entry("description", description)?;
        }
        map.end()
    }
}
