//! SQLite-backed `StepStore`

use super::{CaseRecord, StepRecord, StepResult, StepStore, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::time::Duration;
use steprunner_shared::{CaseId, ExecutionStatus, StepId};

const STEP_COLUMNS: &str = r#"
    id, test_case_id, step_number, description, expected_result, commands_json,
    script_text, status, execution_time_ms, error_message, screenshot_path,
    actual_result, last_executed_at
"#;

/// Durable store over a single SQLite file
#[derive(Debug)]
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    /// Opens the database at `path`, creating the file and schema if needed
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let store = Self { db_path };
        let connection = store.open_connection()?;
        store.initialize_schema(&connection)?;
        Ok(store)
    }

    fn open_connection(&self) -> StoreResult<Connection> {
        let connection = Connection::open(&self.db_path)?;
        connection.busy_timeout(Duration::from_secs(5))?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;
        Ok(connection)
    }

    fn initialize_schema(&self, connection: &Connection) -> StoreResult<()> {
        connection.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS test_cases (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                login_step_id INTEGER NULL
            );

            CREATE TABLE IF NOT EXISTS test_steps (
                id INTEGER PRIMARY KEY,
                test_case_id INTEGER NOT NULL,
                step_number INTEGER NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                expected_result TEXT NOT NULL DEFAULT '',
                commands_json TEXT NULL,
                script_text TEXT NULL,
                status TEXT NOT NULL DEFAULT 'not_run',
                execution_time_ms INTEGER NULL,
                error_message TEXT NULL,
                screenshot_path TEXT NULL,
                actual_result TEXT NULL,
                last_executed_at TEXT NULL,
                FOREIGN KEY(test_case_id) REFERENCES test_cases(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_test_steps_case
                ON test_steps (test_case_id, step_number);
            "#,
        )?;
        Ok(())
    }
}

/// Fixture writers
#[cfg(test)]
impl SqliteStore {
    pub fn insert_case(&self, case: &CaseRecord) -> StoreResult<()> {
        let connection = self.open_connection()?;
        connection.execute(
            "INSERT INTO test_cases (id, name, login_step_id) VALUES (?1, ?2, ?3)",
            params![case.id, case.name, case.login_step_id],
        )?;
        Ok(())
    }

    pub fn insert_step(&self, step: &StepRecord) -> StoreResult<()> {
        let connection = self.open_connection()?;
        connection.execute(
            r#"
            INSERT INTO test_steps (
                id, test_case_id, step_number, description, expected_result,
                commands_json, script_text, status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                step.id,
                step.test_case_id,
                step.ordinal,
                step.description,
                step.expected_result,
                step.commands_raw,
                step.script_text,
                step.status.as_str(),
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl StepStore for SqliteStore {
    async fn step(&self, id: StepId) -> StoreResult<StepRecord> {
        let connection = self.open_connection()?;
        let row = connection
            .query_row(
                &format!("SELECT {STEP_COLUMNS} FROM test_steps WHERE id = ?1"),
                params![id],
                read_step_row,
            )
            .optional()?;
        row.ok_or(StoreError::StepNotFound(id))?.into_record()
    }

    async fn case(&self, id: CaseId) -> StoreResult<CaseRecord> {
        let connection = self.open_connection()?;
        connection
            .query_row(
                "SELECT id, name, login_step_id FROM test_cases WHERE id = ?1",
                params![id],
                |row| {
                    Ok(CaseRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        login_step_id: row.get(2)?,
                    })
                },
            )
            .optional()?
            .ok_or(StoreError::CaseNotFound(id))
    }

    async fn steps_for_case(&self, id: CaseId) -> StoreResult<Vec<StepRecord>> {
        // Surfaces CaseNotFound for unknown cases
        self.case(id).await?;

        let connection = self.open_connection()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {STEP_COLUMNS} FROM test_steps WHERE test_case_id = ?1 ORDER BY step_number ASC, id ASC"
        ))?;
        let rows = statement.query_map(params![id], read_step_row)?;

        let mut steps = Vec::new();
        for row in rows {
            steps.push(row?.into_record()?);
        }
        Ok(steps)
    }

    async fn mark_running(&self, id: StepId) -> StoreResult<()> {
        let connection = self.open_connection()?;
        let updated = connection.execute(
            "UPDATE test_steps SET status = ?2 WHERE id = ?1",
            params![id, ExecutionStatus::Running.as_str()],
        )?;
        if updated == 0 {
            return Err(StoreError::StepNotFound(id));
        }
        Ok(())
    }

    async fn record_result(&self, id: StepId, result: &StepResult) -> StoreResult<()> {
        let connection = self.open_connection()?;
        let updated = connection.execute(
            r#"
            UPDATE test_steps SET
                status = ?2,
                execution_time_ms = ?3,
                error_message = ?4,
                screenshot_path = ?5,
                actual_result = COALESCE(?6, actual_result),
                last_executed_at = ?7
            WHERE id = ?1
            "#,
            params![
                id,
                result.status.as_str(),
                i64::try_from(result.duration_ms).unwrap_or(i64::MAX),
                result.error,
                result.screenshot_ref,
                result.actual_result,
                timestamp_to_db(result.executed_at),
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::StepNotFound(id));
        }
        Ok(())
    }
}

/// Raw column values of one `test_steps` row
struct StepRow {
    id: StepId,
    test_case_id: CaseId,
    ordinal: i64,
    description: String,
    expected_result: String,
    commands_raw: Option<String>,
    script_text: Option<String>,
    status: String,
    duration_ms: Option<i64>,
    error: Option<String>,
    screenshot_ref: Option<String>,
    actual_result: Option<String>,
    last_executed_at: Option<String>,
}

fn read_step_row(row: &Row<'_>) -> rusqlite::Result<StepRow> {
    Ok(StepRow {
        id: row.get(0)?,
        test_case_id: row.get(1)?,
        ordinal: row.get(2)?,
        description: row.get(3)?,
        expected_result: row.get(4)?,
        commands_raw: row.get(5)?,
        script_text: row.get(6)?,
        status: row.get(7)?,
        duration_ms: row.get(8)?,
        error: row.get(9)?,
        screenshot_ref: row.get(10)?,
        actual_result: row.get(11)?,
        last_executed_at: row.get(12)?,
    })
}

impl StepRow {
    fn into_record(self) -> StoreResult<StepRecord> {
        let status = ExecutionStatus::parse(&self.status).ok_or_else(|| {
            StoreError::InvalidPersistedValue {
                field: "status",
                value: self.status.clone(),
            }
        })?;
        let duration_ms = self
            .duration_ms
            .map(|ms| {
                u64::try_from(ms).map_err(|_| StoreError::InvalidPersistedValue {
                    field: "execution_time_ms",
                    value: ms.to_string(),
                })
            })
            .transpose()?;

        Ok(StepRecord {
            id: self.id,
            test_case_id: self.test_case_id,
            ordinal: self.ordinal,
            description: self.description,
            expected_result: self.expected_result,
            commands_raw: self.commands_raw,
            script_text: self.script_text,
            status,
            duration_ms,
            error: self.error,
            screenshot_ref: self.screenshot_ref,
            actual_result: self.actual_result,
            last_executed_at: option_timestamp_from_db(self.last_executed_at)?,
        })
    }
}

fn timestamp_to_db(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn timestamp_from_db(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| StoreError::InvalidPersistedValue {
            field: "last_executed_at",
            value: value.to_string(),
        })
}

fn option_timestamp_from_db(value: Option<String>) -> StoreResult<Option<DateTime<Utc>>> {
    value.as_deref().map(timestamp_from_db).transpose()
}
