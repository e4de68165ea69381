//! Wire protocol between a client channel and the execution server
//!
//! Every message is a JSON object tagged by `type`. Session events carry a
//! `seq` that strictly increases within one session; the terminal event of a
//! session always has the highest `seq`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Persistent identity of a step
pub type StepId = i64;

/// Persistent identity of a test case
pub type CaseId = i64;

/// Last known execution status of a stored step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    NotRun,
    Running,
    Passed,
    Failed,
    Error,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotRun => "not_run",
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "not_run" => Some(Self::NotRun),
            "running" => Some(Self::Running),
            "passed" => Some(Self::Passed),
            "failed" => Some(Self::Failed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome reported by `execution_complete`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Passed,
    Failed,
}

impl From<RunOutcome> for ExecutionStatus {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Passed => ExecutionStatus::Passed,
            RunOutcome::Failed => ExecutionStatus::Failed,
        }
    }
}

/// Client -> server requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Run one step, with the login prefix unless it is the login step
    ExecuteStep { step_id: StepId },
    /// Run every non-login step of a case in ordinal order
    ExecuteAll { test_case_id: CaseId },
}

/// Server -> client messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    StatusUpdate {
        step_id: StepId,
        seq: u64,
        status: ExecutionStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Progress {
        step_id: StepId,
        seq: u64,
        index: usize,
        total: usize,
        action: String,
        message: String,
    },
    Screenshot {
        step_id: StepId,
        seq: u64,
        /// base64 encoded PNG
        image: String,
    },
    ExecutionComplete {
        step_id: StepId,
        seq: u64,
        status: RunOutcome,
        duration_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    ExecutionError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_id: Option<StepId>,
        seq: u64,
        error: String,
    },
    /// Case-level summary, the last event of an `execute_all` run
    AllStepsComplete {
        test_case_id: CaseId,
        seq: u64,
        passed: usize,
        failed: usize,
        errored: usize,
        duration_ms: u64,
    },
    /// Protocol-level rejection, outside of any session
    Error { code: String, message: String },
}

impl ServerMessage {
    /// Session sequence number, if this is a session event
    pub fn seq(&self) -> Option<u64> {
        match self {
            Self::StatusUpdate { seq, .. }
            | Self::Progress { seq, .. }
            | Self::Screenshot { seq, .. }
            | Self::ExecutionComplete { seq, .. }
            | Self::ExecutionError { seq, .. }
            | Self::AllStepsComplete { seq, .. } => Some(*seq),
            Self::Error { .. } => None,
        }
    }

    /// Whether this message ends a step-level or case-level session
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ExecutionComplete { .. } | Self::ExecutionError { .. } | Self::AllStepsComplete { .. }
        )
    }

    /// Protocol error helper
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}
