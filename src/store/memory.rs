//! In-memory step store

use super::{CaseRecord, StepRecord, StepResult, StepStore, StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use steprunner_shared::{CaseId, ExecutionStatus, StepId};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct State {
    cases: HashMap<CaseId, CaseRecord>,
    steps: HashMap<StepId, StepRecord>,
}

/// Store kept entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    /// Number of upcoming writes that fail
    failing_writes: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_case(&self, case: CaseRecord) {
        self.state.write().await.cases.insert(case.id, case);
    }

    pub async fn insert_step(&self, step: StepRecord) {
        self.state.write().await.steps.insert(step.id, step);
    }

    pub async fn remove_step(&self, id: StepId) {
        self.state.write().await.steps.remove(&id);
    }

    /// Make the next `count` writes fail
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Total write attempts, failed ones included
    pub fn write_attempts(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_write(&self) -> StoreResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl StepStore for MemoryStore {
    async fn step(&self, id: StepId) -> StoreResult<StepRecord> {
        self.state
            .read()
            .await
            .steps
            .get(&id)
            .cloned()
            .ok_or(StoreError::StepNotFound(id))
    }

    async fn case(&self, id: CaseId) -> StoreResult<CaseRecord> {
        self.state
            .read()
            .await
            .cases
            .get(&id)
            .cloned()
            .ok_or(StoreError::CaseNotFound(id))
    }

    async fn steps_for_case(&self, id: CaseId) -> StoreResult<Vec<StepRecord>> {
        let state = self.state.read().await;
        if !state.cases.contains_key(&id) {
            return Err(StoreError::CaseNotFound(id));
        }
        let mut steps: Vec<StepRecord> = state
            .steps
            .values()
            .filter(|s| s.test_case_id == id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| (s.ordinal, s.id));
        Ok(steps)
    }

    async fn mark_running(&self, id: StepId) -> StoreResult<()> {
        self.check_write()?;
        let mut state = self.state.write().await;
        let step = state.steps.get_mut(&id).ok_or(StoreError::StepNotFound(id))?;
        step.status = ExecutionStatus::Running;
        Ok(())
    }

    async fn record_result(&self, id: StepId, result: &StepResult) -> StoreResult<()> {
        self.check_write()?;
        let mut state = self.state.write().await;
        let step = state.steps.get_mut(&id).ok_or(StoreError::StepNotFound(id))?;
        step.status = result.status;
        step.duration_ms = Some(result.duration_ms);
        step.error = result.error.clone();
        step.screenshot_ref = result.screenshot_ref.clone();
        if result.actual_result.is_some() {
            step.actual_result = result.actual_result.clone();
        }
        step.last_executed_at = Some(result.executed_at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_steps_ordered_by_ordinal() {
        let store = MemoryStore::new();
        store
            .insert_case(CaseRecord {
                id: 1,
                name: "checkout".into(),
                login_step_id: None,
            })
            .await;
        store.insert_step(StepRecord::new(30, 1, 3, "[]")).await;
        store.insert_step(StepRecord::new(10, 1, 1, "[]")).await;
        store.insert_step(StepRecord::new(20, 1, 2, "[]")).await;
        store.insert_step(StepRecord::new(99, 2, 1, "[]")).await;

        let ids: Vec<StepId> = store
            .steps_for_case(1)
            .await
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![10, 20, 30]);

        assert!(matches!(
            store.steps_for_case(7).await,
            Err(StoreError::CaseNotFound(7))
        ));
    }

    #[tokio::test]
    async fn test_injected_write_failures() {
        let store = MemoryStore::new();
        store.insert_step(StepRecord::new(1, 1, 1, "[]")).await;
        store.fail_next_writes(1);

        assert!(store.mark_running(1).await.is_err());
        assert!(store.mark_running(1).await.is_ok());
        assert_eq!(store.write_attempts(), 2);

        let result = StepResult {
            status: ExecutionStatus::Passed,
            duration_ms: 12,
            error: None,
            screenshot_ref: None,
            actual_result: Some("dashboard shown".into()),
            executed_at: Utc::now(),
        };
        store.record_result(1, &result).await.unwrap();

        let step = store.step(1).await.unwrap();
        assert_eq!(step.status, ExecutionStatus::Passed);
        assert_eq!(step.duration_ms, Some(12));
        assert_eq!(step.actual_result.as_deref(), Some("dashboard shown"));
    }
}
