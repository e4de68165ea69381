//! Execution sessions
//!
//! A session owns one execution attempt, either a single step (with the
//! login prefix) or a whole case. It drives the command sequence through a
//! `DriverAdapter`, streams ordered events into an `EventSink` and hands
//! every step-level terminal outcome to the `ResultReconciler`.

mod case;
mod events;
mod plan;
mod step;

#[cfg(test)]
pub mod testkit;

pub use events::EventSink;

use case::execute_case;
use plan::plan_step;
use step::execute_step;

use crate::command::{DriverAdapter, TimeoutPolicy};
use crate::driver::DriverFactory;
use crate::store::{ReconcilerConfig, ResultReconciler, StepStore};
use std::sync::Arc;
use steprunner_shared::ClientMessage;
use tracing::debug;

/// Collaborators shared by every session
pub struct ExecutionContext {
    pub store: Arc<dyn StepStore>,
    pub reconciler: ResultReconciler,
    pub factory: Arc<dyn DriverFactory>,
    pub timeouts: TimeoutPolicy,
}

impl ExecutionContext {
    pub fn new(
        store: Arc<dyn StepStore>,
        factory: Arc<dyn DriverFactory>,
        timeouts: TimeoutPolicy,
        reconciler: ReconcilerConfig,
    ) -> Self {
        Self {
            reconciler: ResultReconciler::new(store.clone(), reconciler),
            store,
            factory,
            timeouts,
        }
    }

    fn adapter(&self) -> DriverAdapter {
        DriverAdapter::new(self.factory.clone(), self.timeouts.clone())
    }
}

/// Run one client request up to its terminal event. The returned adapter may
/// still hold a driver session; releasing it is left to the caller so the
/// channel is free as soon as the client has seen the outcome.
pub async fn run_request(ctx: Arc<ExecutionContext>, request: ClientMessage, mut sink: EventSink) -> DriverAdapter {
    let mut adapter = ctx.adapter();

    match request {
        ClientMessage::ExecuteStep { step_id } => {
            let plan = plan_step(ctx.store.as_ref(), step_id).await;
            let report = execute_step(&ctx, &mut adapter, &mut sink, step_id, plan).await;
            debug!(
                step_id = report.step_id,
                state = ?report.state,
                status = ?report.status,
                "step request finished"
            );
        }
        ClientMessage::ExecuteAll { test_case_id } => {
            let report = execute_case(&ctx, &mut adapter, &mut sink, test_case_id).await;
            debug!(
                test_case_id,
                passed = report.passed,
                failed = report.failed,
                errored = report.errored,
                cancelled = report.cancelled,
                "case request finished"
            );
        }
    }

    adapter
}
