//! Result reconciler - writes run outcomes back to the store
//!
//! Persistence is best effort and off the event path. Writes are queued to a
//! single writer task, which applies them in submission order. A failed write
//! is retried a bounded number of times and then dropped with a log entry; the
//! terminal event the client already received stays authoritative.

use super::{StepResult, StepStore};
use bytes::Bytes;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use steprunner_shared::{limits, ExecutionStatus, StepId};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Retries after the first failed write
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each following one
    pub retry_delay: Duration,
    /// Where step screenshots are written; screenshots are not kept when unset
    pub screenshot_dir: Option<PathBuf>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_retries: limits::PERSIST_MAX_RETRIES,
            retry_delay: Duration::from_millis(200),
            screenshot_dir: None,
        }
    }
}

/// Terminal outcome of one step-level run
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step_id: StepId,
    pub status: ExecutionStatus,
    pub duration: Duration,
    pub error: Option<String>,
    /// Last screenshot captured during the run
    pub screenshot: Option<Bytes>,
    /// Copied into the actual result when the run passed
    pub expected_result: Option<String>,
}

enum Job {
    Running(StepId),
    Outcome(StepOutcome),
    Flush(oneshot::Sender<()>),
}

/// Handle to the result writer. Submitting never waits on the store.
pub struct ResultReconciler {
    jobs: mpsc::UnboundedSender<Job>,
}

impl ResultReconciler {
    /// Spawn the writer task; must be called inside a tokio runtime
    pub fn new(store: Arc<dyn StepStore>, config: ReconcilerConfig) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        tokio::spawn(Writer { store, config }.run(rx));
        Self { jobs }
    }

    /// Queue the running flag for a step
    pub fn mark_running(&self, step_id: StepId) {
        self.enqueue(Job::Running(step_id));
    }

    /// Queue a terminal outcome
    pub fn submit(&self, outcome: StepOutcome) {
        self.enqueue(Job::Outcome(outcome));
    }

    /// Wait until every write queued so far has landed or been dropped
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        self.enqueue(Job::Flush(done));
        let _ = wait.await;
    }

    fn enqueue(&self, job: Job) {
        if self.jobs.send(job).is_err() {
            error!("result writer stopped, dropping write");
        }
    }
}

struct Writer {
    store: Arc<dyn StepStore>,
    config: ReconcilerConfig,
}

impl Writer {
    async fn run(self, mut jobs: mpsc::UnboundedReceiver<Job>) {
        while let Some(job) = jobs.recv().await {
            match job {
                Job::Running(step_id) => self.mark_running(step_id).await,
                Job::Outcome(outcome) => {
                    self.persist(outcome).await;
                }
                Job::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        debug!("result writer stopped");
    }

    /// Flag the step as running; a failure is only logged
    async fn mark_running(&self, step_id: StepId) {
        if let Err(e) = self.store.mark_running(step_id).await {
            warn!(step_id, error = %e, "could not mark step running");
        }
    }

    /// Persist a terminal outcome. Returns whether the write landed.
    async fn persist(&self, outcome: StepOutcome) -> bool {
        let screenshot_ref = match &outcome.screenshot {
            Some(image) => self.save_screenshot(outcome.step_id, image).await,
            None => None,
        };

        let actual_result = match outcome.status {
            ExecutionStatus::Passed => outcome.expected_result.clone(),
            _ => None,
        };

        let result = StepResult {
            status: outcome.status,
            duration_ms: outcome.duration.as_millis() as u64,
            error: outcome.error.clone(),
            screenshot_ref,
            actual_result,
            executed_at: Utc::now(),
        };

        let mut delay = self.config.retry_delay;
        for attempt in 0..=self.config.max_retries {
            match self.store.record_result(outcome.step_id, &result).await {
                Ok(()) => {
                    debug!(
                        step_id = outcome.step_id,
                        status = %result.status,
                        attempt,
                        "step result persisted"
                    );
                    return true;
                }
                Err(e) if attempt < self.config.max_retries => {
                    warn!(step_id = outcome.step_id, attempt, error = %e, "persist failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Err(e) => {
                    error!(
                        step_id = outcome.step_id,
                        status = %result.status,
                        error = %e,
                        "dropping step result after {} attempts",
                        attempt + 1
                    );
                }
            }
        }
        false
    }

    async fn save_screenshot(&self, step_id: StepId, image: &Bytes) -> Option<String> {
        let dir = self.config.screenshot_dir.as_ref()?;
        let path = dir.join(format!(
            "step-{step_id}-{}.png",
            Utc::now().format("%Y%m%dT%H%M%S%3f")
        ));

        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!(step_id, error = %e, "could not create screenshot directory");
            return None;
        }
        match tokio::fs::write(&path, image).await {
            Ok(()) => Some(path.to_string_lossy().into_owned()),
            Err(e) => {
                warn!(step_id, error = %e, "could not write screenshot");
                None
            }
        }
    }
}
