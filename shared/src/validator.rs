//! Command validator
//!
//! Only the structured JSON command array stored for a step is ever executed.
//! Human-readable script text stored next to it is display-only, so any
//! payload that looks like source code is rejected outright, before parsing.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::command::{Action, Command, Locator, LocatorStrategy};
use crate::limits;

/// Reasons a stored command payload is refused
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("invalid command payload: {marker} detected; only JSON command arrays are executed")]
    CodeDetected { marker: &'static str },

    #[error("invalid command payload: not valid JSON ({0})")]
    Malformed(String),

    #[error("invalid command payload: expected a JSON array of commands, got {0}")]
    NotASequence(&'static str),

    #[error("invalid command payload: command list is empty")]
    Empty,

    #[error("invalid command {index}: expected a JSON object, got {found}")]
    NotARecord { index: usize, found: &'static str },

    #[error("invalid command {index}: field `{field}` is nested, commands must be flat records")]
    NotFlat { index: usize, field: String },

    #[error("invalid command {index}: missing `action` field")]
    MissingAction { index: usize },

    #[error("invalid command {index}: unknown action `{action}`")]
    UnknownAction { index: usize, action: String },

    #[error("invalid command {index}: `{action}` requires `{field}`")]
    MissingField {
        index: usize,
        action: &'static str,
        field: &'static str,
    },

    #[error("invalid command {index}: {reason}")]
    InvalidField { index: usize, reason: String },
}

/// Source-code indicators, checked against the raw payload text
static CODE_MARKERS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("import statement", r"(?m)^\s*import\s+[A-Za-z_]"),
        ("import statement", r"(?m)^\s*from\s+[A-Za-z_][\w.]*\s+import\b"),
        ("function definition", r"(?m)^\s*(?:async\s+)?def\s+[A-Za-z_]\w*\s*\("),
        ("class definition", r"(?m)^\s*class\s+[A-Za-z_]\w*\s*[(:]"),
        ("indented block", r"(?m):[ \t]*\r?\n[ \t]+\S"),
        ("driver construction", r"driver\s*=\s*webdriver\b"),
        ("driver teardown call", r"\.quit\(\s*\)"),
    ]
    .into_iter()
    .filter_map(|(marker, pattern)| Regex::new(pattern).ok().map(|re| (marker, re)))
    .collect()
});

/// Return the first source-code indicator found in `raw`, if any
pub fn detect_code(raw: &str) -> Option<&'static str> {
    CODE_MARKERS
        .iter()
        .find(|(_, re)| re.is_match(raw))
        .map(|(marker, _)| *marker)
}

/// Validate a step's stored command payload into typed commands.
///
/// Pure: no driver or store access. Fails on the first offending record.
pub fn validate(raw: &str) -> Result<Vec<Command>, ValidationError> {
    if let Some(marker) = detect_code(raw) {
        return Err(ValidationError::CodeDetected { marker });
    }

    let value: Value =
        serde_json::from_str(raw).map_err(|e| ValidationError::Malformed(e.to_string()))?;

    let items = match value {
        Value::Array(items) => items,
        other => return Err(ValidationError::NotASequence(kind_of(&other))),
    };

    if items.is_empty() {
        return Err(ValidationError::Empty);
    }

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| parse_record(i + 1, item))
        .collect()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Untyped command record, with the legacy field names as aliases
#[derive(Debug, Default, Deserialize)]
struct RawCommand {
    action: Option<String>,
    #[serde(alias = "locator_type")]
    strategy: Option<String>,
    #[serde(alias = "locator_value", alias = "selector")]
    target: Option<String>,
    #[serde(alias = "text", alias = "expected_text")]
    value: Option<String>,
    url: Option<String>,
    duration: Option<f64>,
    duration_ms: Option<u64>,
    description: Option<String>,
}

fn parse_record(index: usize, item: Value) -> Result<Command, ValidationError> {
    let map = match item {
        Value::Object(map) => map,
        other => {
            return Err(ValidationError::NotARecord {
                index,
                found: kind_of(&other),
            })
        }
    };
    ensure_flat(index, &map)?;

    let raw: RawCommand =
        serde_json::from_value(Value::Object(map)).map_err(|e| ValidationError::InvalidField {
            index,
            reason: e.to_string(),
        })?;

    let action_name = raw
        .action
        .as_deref()
        .map(|a| a.trim().to_ascii_lowercase())
        .filter(|a| !a.is_empty())
        .ok_or(ValidationError::MissingAction { index })?;

    let action = match action_name.as_str() {
        "navigate" | "open" => {
            let url = raw
                .url
                .as_deref()
                .or(raw.target.as_deref())
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .ok_or(ValidationError::MissingField {
                    index,
                    action: "navigate",
                    field: "url",
                })?;
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ValidationError::InvalidField {
                    index,
                    reason: format!("navigate url '{url}' must start with http:// or https://"),
                });
            }
            Action::Navigate {
                url: url.to_string(),
            }
        }
        "click" => Action::Click {
            target: locator(index, "click", &raw)?,
        },
        "type" | "input" => Action::Type {
            target: locator(index, "type", &raw)?,
            text: raw.value.clone().unwrap_or_default(),
        },
        "wait" => Action::Wait {
            duration_ms: wait_duration(index, &raw)?,
        },
        "assert" | "verify_element_present" => {
            let target = locator(index, "assert", &raw)?;
            match raw.value.clone() {
                Some(expected) if action_name == "assert" => Action::AssertText { target, expected },
                _ => Action::AssertPresent { target },
            }
        }
        "verify_text" => {
            let target = locator(index, "verify_text", &raw)?;
            let expected = raw
                .value
                .clone()
                .filter(|v| !v.is_empty())
                .ok_or(ValidationError::MissingField {
                    index,
                    action: "verify_text",
                    field: "value",
                })?;
            Action::AssertText { target, expected }
        }
        "screenshot" => Action::Screenshot,
        _ => {
            return Err(ValidationError::UnknownAction {
                index,
                action: action_name,
            })
        }
    };

    Ok(Command {
        action,
        description: raw.description.filter(|d| !d.trim().is_empty()),
    })
}

fn ensure_flat(index: usize, map: &Map<String, Value>) -> Result<(), ValidationError> {
    match map
        .iter()
        .find(|(_, v)| matches!(v, Value::Array(_) | Value::Object(_)))
    {
        Some((field, _)) => Err(ValidationError::NotFlat {
            index,
            field: field.clone(),
        }),
        None => Ok(()),
    }
}

fn locator(index: usize, action: &'static str, raw: &RawCommand) -> Result<Locator, ValidationError> {
    let value = raw
        .target
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ValidationError::MissingField {
            index,
            action,
            field: "target",
        })?;

    let strategy = match raw.strategy.as_deref() {
        None => LocatorStrategy::Css,
        Some(name) => LocatorStrategy::parse(name).ok_or_else(|| ValidationError::InvalidField {
            index,
            reason: format!("unknown locator strategy `{name}`"),
        })?,
    };

    Ok(Locator::new(strategy, value))
}

fn wait_duration(index: usize, raw: &RawCommand) -> Result<u64, ValidationError> {
    let duration_ms = match (raw.duration_ms, raw.duration) {
        (Some(ms), _) => ms,
        (None, Some(secs)) => {
            if !secs.is_finite() || secs < 0.0 {
                return Err(ValidationError::InvalidField {
                    index,
                    reason: format!("wait duration must be a number >= 0, got {secs}"),
                });
            }
            (secs * 1000.0).round() as u64
        }
        (None, None) => 1_000,
    };

    if duration_ms > limits::MAX_WAIT_DURATION_MS {
        return Err(ValidationError::InvalidField {
            index,
            reason: format!(
                "wait of {duration_ms}ms exceeds the {}ms maximum",
                limits::MAX_WAIT_DURATION_MS
            ),
        });
    }
    Ok(duration_ms)
}
