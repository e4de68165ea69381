//! Step-level session
//!
//! Idle -> Initializing -> Running -> terminal, exactly one terminal event per
//! run. A cancelled run sends nothing further but still tears down and
//! records that it did not finish.

use super::events::EventSink;
use super::plan::{Plan, PlanError};
use super::ExecutionContext;
use crate::command::{CommandResult, DriverAdapter};
use crate::store::StepOutcome;
use bytes::Bytes;
use steprunner_shared::codec;
use steprunner_shared::state_machine::{SessionEvent, SessionState, SessionStateMachine, TransitionResult};
use steprunner_shared::{ExecutionStatus, RunOutcome, ServerMessage, StepId};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const CANCELLED: &str = "execution cancelled";

/// How a step-level session ended
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub step_id: StepId,
    pub state: SessionState,
    /// Status reported for the step; `None` if the step does not exist
    pub status: Option<ExecutionStatus>,
}

struct StepRun<'a> {
    ctx: &'a ExecutionContext,
    sink: &'a mut EventSink,
    fsm: SessionStateMachine,
    step_id: StepId,
    started: Instant,
    /// The target step has been marked running in the store
    marked: bool,
    last_artifact: Option<Bytes>,
    expected_result: Option<String>,
}

/// Run one planned step to its terminal state
pub async fn execute_step(
    ctx: &ExecutionContext,
    adapter: &mut DriverAdapter,
    sink: &mut EventSink,
    step_id: StepId,
    plan: Result<Plan, PlanError>,
) -> StepReport {
    let mut run = StepRun {
        ctx,
        sink,
        fsm: SessionStateMachine::new(),
        step_id,
        started: Instant::now(),
        marked: false,
        last_artifact: None,
        expected_result: None,
    };
    run.transition(SessionEvent::RequestAccepted);
    info!(step_id, "step execution accepted");

    let plan = match plan {
        Ok(plan) => plan,
        Err(e) => return run.rejected(e).await,
    };

    run.run(adapter, plan).await
}

impl StepRun<'_> {
    async fn run(mut self, adapter: &mut DriverAdapter, plan: Plan) -> StepReport {
        let step_id = self.step_id;
        let total = plan.commands.len();
        self.expected_result = Some(plan.target.expected_result.clone());

        self.ctx.reconciler.mark_running(step_id);
        self.marked = true;

        let description = Some(plan.target.description.clone()).filter(|d| !d.is_empty());
        if !self
            .sink
            .emit(|seq| ServerMessage::StatusUpdate {
                step_id,
                seq,
                status: ExecutionStatus::Running,
                message: description,
            })
            .await
        {
            return self.cancelled().await;
        }

        let cancel = self.sink.cancel_token().clone();
        let acquired = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.cancelled().await,
            acquired = adapter.acquire() => acquired,
        };
        if let Err(e) = acquired {
            error!(step_id, error = %e, "driver unavailable");
            return self.errored(e.to_string()).await;
        }
        self.transition(SessionEvent::DriverReady);

        for (index, command) in plan.commands.iter().enumerate() {
            let action = command.kind().as_str().to_string();
            let message = command.label();
            if !self
                .sink
                .emit(|seq| ServerMessage::Progress {
                    step_id,
                    seq,
                    index: index + 1,
                    total,
                    action,
                    message,
                })
                .await
            {
                return self.cancelled().await;
            }

            let dispatch = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancelled().await,
                dispatch = adapter.dispatch(command) => dispatch,
            };
            debug!(
                step_id,
                index = index + 1,
                prefix = index < plan.login_prefix,
                elapsed_ms = dispatch.elapsed.as_millis() as u64,
                "command finished"
            );

            if let Some(image) = dispatch.artifact {
                let encoded = codec::encode_image(&image);
                self.last_artifact = Some(image);
                if !self
                    .sink
                    .emit(|seq| ServerMessage::Screenshot {
                        step_id,
                        seq,
                        image: encoded,
                    })
                    .await
                {
                    return self.cancelled().await;
                }
            }

            match dispatch.result {
                CommandResult::Completed { .. } => {}
                CommandResult::Failed { reason } => {
                    return self.finished(RunOutcome::Failed, Some(reason)).await;
                }
                CommandResult::Broken { reason } => {
                    error!(step_id, %reason, "driver failure");
                    return self.errored(reason).await;
                }
            }

            let pacing = adapter.timeouts().pacing;
            if index + 1 < total && !pacing.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return self.cancelled().await,
                    _ = tokio::time::sleep(pacing) => {}
                }
            }
        }

        self.finished(RunOutcome::Passed, None).await
    }

    fn transition(&mut self, event: SessionEvent) {
        match self.fsm.process_event(event) {
            TransitionResult::Success(state) => debug!(step_id = self.step_id, %state, "session transition"),
            other => warn!(step_id = self.step_id, ?event, ?other, "unexpected session event"),
        }
    }

    fn report(&self, status: Option<ExecutionStatus>) -> StepReport {
        StepReport {
            step_id: self.step_id,
            state: self.fsm.state(),
            status,
        }
    }

    /// The plan could not be built; no driver is touched
    async fn rejected(mut self, err: PlanError) -> StepReport {
        let step_id = self.step_id;
        if err.is_infrastructure() {
            error!(step_id, error = %err, "could not load step");
            self.transition(SessionEvent::InfrastructureFailure);
        } else {
            warn!(step_id, error = %err, "step rejected");
            self.transition(SessionEvent::ValidationFailed);
        }

        let message = err.to_string();
        self.sink
            .emit(|seq| ServerMessage::ExecutionError {
                step_id: Some(step_id),
                seq,
                error: message.clone(),
            })
            .await;

        match err {
            PlanError::StepNotFound(_) => self.report(None),
            _ => {
                self.persist(ExecutionStatus::Error, Some(message));
                self.report(Some(ExecutionStatus::Error))
            }
        }
    }

    async fn finished(mut self, outcome: RunOutcome, reason: Option<String>) -> StepReport {
        let step_id = self.step_id;
        self.transition(match outcome {
            RunOutcome::Passed => SessionEvent::AllCommandsSucceeded,
            RunOutcome::Failed => SessionEvent::CommandFailed,
        });

        let duration_ms = self.started.elapsed().as_millis() as u64;
        let error = reason.clone();
        self.sink
            .emit(|seq| ServerMessage::ExecutionComplete {
                step_id,
                seq,
                status: outcome,
                duration_ms,
                error,
            })
            .await;
        info!(step_id, ?outcome, duration_ms, "step finished");

        let status = ExecutionStatus::from(outcome);
        self.persist(status, reason);
        self.report(Some(status))
    }

    async fn errored(mut self, reason: String) -> StepReport {
        let step_id = self.step_id;
        self.transition(SessionEvent::InfrastructureFailure);

        let error = reason.clone();
        self.sink
            .emit(|seq| ServerMessage::ExecutionError {
                step_id: Some(step_id),
                seq,
                error,
            })
            .await;

        self.persist(ExecutionStatus::Error, Some(reason));
        self.report(Some(ExecutionStatus::Error))
    }

    async fn cancelled(mut self) -> StepReport {
        self.transition(SessionEvent::ChannelClosed);
        info!(step_id = self.step_id, "step cancelled");

        if self.marked {
            self.persist(ExecutionStatus::Error, Some(CANCELLED.to_string()));
        }
        self.report(Some(ExecutionStatus::Error))
    }

    /// Hand the outcome to the reconciler without waiting on the store
    fn persist(&mut self, status: ExecutionStatus, error: Option<String>) {
        let outcome = StepOutcome {
            step_id: self.step_id,
            status,
            duration: self.started.elapsed(),
            error,
            screenshot: self.last_artifact.take(),
            expected_result: self.expected_result.take(),
        };
        self.ctx.reconciler.submit(outcome);
    }
}
