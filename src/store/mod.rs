//! Persistence seam for steps and their run results
//!
//! The execution core reads a step's stored command payload and writes back
//! one terminal result per run. Everything else about storage belongs to the
//! application that owns the test cases.

#[cfg(test)]
mod memory;
mod reconciler;
mod sqlite;

#[cfg(test)]
pub use memory::MemoryStore;
pub use reconciler::{ReconcilerConfig, ResultReconciler, StepOutcome};
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use steprunner_shared::{CaseId, ExecutionStatus, StepId};
use thiserror::Error;

/// A stored step as the execution core sees it
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub id: StepId,
    pub test_case_id: CaseId,
    /// Position within the case, lowest runs first
    pub ordinal: i64,
    pub description: String,
    pub expected_result: String,
    /// Raw stored command array; validated on every run
    pub commands_raw: Option<String>,
    /// Human-readable script shown in the UI, never executed
    pub script_text: Option<String>,
    pub status: ExecutionStatus,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
    pub screenshot_ref: Option<String>,
    pub actual_result: Option<String>,
    pub last_executed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
impl StepRecord {
    pub fn new(id: StepId, test_case_id: CaseId, ordinal: i64, commands_raw: impl Into<String>) -> Self {
        Self {
            id,
            test_case_id,
            ordinal,
            description: String::new(),
            expected_result: String::new(),
            commands_raw: Some(commands_raw.into()),
            script_text: None,
            status: ExecutionStatus::NotRun,
            duration_ms: None,
            error: None,
            screenshot_ref: None,
            actual_result: None,
            last_executed_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_expected_result(mut self, expected: impl Into<String>) -> Self {
        self.expected_result = expected.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseRecord {
    pub id: CaseId,
    pub name: String,
    /// Step replayed before every other step of the case
    pub login_step_id: Option<StepId>,
}

/// Terminal write for one step run
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub status: ExecutionStatus,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub screenshot_ref: Option<String>,
    pub actual_result: Option<String>,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("step {0} not found")]
    StepNotFound(StepId),
    #[error("test case {0} not found")]
    CaseNotFound(CaseId),
    #[error("invalid persisted value for '{field}': {value}")]
    InvalidPersistedValue { field: &'static str, value: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait StepStore: Send + Sync {
    async fn step(&self, id: StepId) -> StoreResult<StepRecord>;

    async fn case(&self, id: CaseId) -> StoreResult<CaseRecord>;

    /// Steps of a case ordered by ordinal, then id
    async fn steps_for_case(&self, id: CaseId) -> StoreResult<Vec<StepRecord>>;

    /// Record that a run of the step has started
    async fn mark_running(&self, id: StepId) -> StoreResult<()>;

    async fn record_result(&self, id: StepId, result: &StepResult) -> StoreResult<()>;
}
