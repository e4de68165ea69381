//! Case-level session
//!
//! Runs every non-login step of a case in ordinal order on one shared driver
//! adapter. Each step reports its own terminal event; a failing step does not
//! stop the ones after it. The case ends with an `all_steps_complete` summary.

use super::events::EventSink;
use super::plan::{build_plan, resolve_login_step};
use super::step::execute_step;
use super::ExecutionContext;
use crate::command::DriverAdapter;
use steprunner_shared::state_machine::SessionState;
use steprunner_shared::{CaseId, ExecutionStatus, ServerMessage};
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Tally of one case run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseReport {
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub cancelled: bool,
}

pub async fn execute_case(
    ctx: &ExecutionContext,
    adapter: &mut DriverAdapter,
    sink: &mut EventSink,
    case_id: CaseId,
) -> CaseReport {
    let started = Instant::now();
    let mut report = CaseReport::default();

    let loaded = async {
        let case = ctx.store.case(case_id).await?;
        let steps = ctx.store.steps_for_case(case_id).await?;
        Ok::<_, crate::store::StoreError>((case, steps))
    }
    .await;
    let (case, steps) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            error!(case_id, error = %e, "could not load case");
            emit_case_error(sink, e.to_string()).await;
            return report;
        }
    };

    if steps.is_empty() {
        warn!(case_id, "case has no steps");
        emit_case_error(sink, format!("test case {case_id} has no steps")).await;
        return report;
    }

    let login_id = match resolve_login_step(&case, &steps) {
        Ok(id) => id,
        Err(e) => {
            warn!(case_id, error = %e, "cannot resolve login step");
            emit_case_error(sink, e.to_string()).await;
            return report;
        }
    };
    let login = login_id.and_then(|id| steps.iter().find(|s| s.id == id));

    info!(case_id, steps = steps.len(), login_step = ?login_id, "case execution accepted");

    for step in steps.iter().filter(|s| Some(s.id) != login_id) {
        if sink.is_cancelled() {
            report.cancelled = true;
            break;
        }

        let plan = build_plan(step.clone(), login);
        let outcome = execute_step(ctx, adapter, sink, step.id, plan).await;

        if outcome.state == SessionState::Cancelled {
            report.cancelled = true;
            break;
        }
        match outcome.status {
            Some(ExecutionStatus::Passed) => report.passed += 1,
            Some(ExecutionStatus::Failed) => report.failed += 1,
            _ => report.errored += 1,
        }
    }

    if report.cancelled {
        info!(case_id, "case cancelled");
        return report;
    }

    let duration_ms = started.elapsed().as_millis() as u64;
    let CaseReport {
        passed,
        failed,
        errored,
        ..
    } = report;
    sink.emit(|seq| ServerMessage::AllStepsComplete {
        test_case_id: case_id,
        seq,
        passed,
        failed,
        errored,
        duration_ms,
    })
    .await;
    info!(case_id, passed, failed, errored, duration_ms, "case finished");

    report
}

async fn emit_case_error(sink: &mut EventSink, error: String) {
    sink.emit(|seq| ServerMessage::ExecutionError {
        step_id: None,
        seq,
        error,
    })
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::scripted::Script;
    use crate::session::testkit::{drain, Harness, CASE_ID, LOGIN_ID};
    use crate::store::{CaseRecord, StepStore};
    use steprunner_shared::RunOutcome;

    async fn run(harness: &Harness, case_id: CaseId) -> (CaseReport, Vec<ServerMessage>) {
        let (mut sink, mut rx, _cancel) = harness.sink();
        let mut adapter = harness.ctx.adapter();
        let report = execute_case(&harness.ctx, &mut adapter, &mut sink, case_id).await;
        adapter.release().await;
        harness.ctx.reconciler.flush().await;
        (report, drain(&mut rx))
    }

    fn click(target: &str) -> String {
        format!(r#"[{{"action": "click", "target": "{target}"}}]"#)
    }

    #[tokio::test]
    async fn test_scenario_e_failure_does_not_stop_siblings() {
        let harness = Harness::new(Script::default().missing("#broken")).await;
        harness.add_step(2, 2, &click("#first")).await;
        harness.add_step(3, 3, &click("#broken")).await;
        harness.add_step(4, 4, &click("#third")).await;

        let (report, events) = run(&harness, CASE_ID).await;

        assert_eq!(
            report,
            CaseReport {
                passed: 2,
                failed: 1,
                errored: 0,
                cancelled: false
            }
        );

        let terminals: Vec<(i64, RunOutcome)> = events
            .iter()
            .filter_map(|e| match e {
                ServerMessage::ExecutionComplete {
                    step_id, status, ..
                } => Some((*step_id, *status)),
                _ => None,
            })
            .collect();
        assert_eq!(
            terminals,
            vec![
                (2, RunOutcome::Passed),
                (3, RunOutcome::Failed),
                (4, RunOutcome::Passed)
            ]
        );

        assert!(matches!(
            events.last(),
            Some(ServerMessage::AllStepsComplete {
                test_case_id: CASE_ID,
                passed: 2,
                failed: 1,
                errored: 0,
                ..
            })
        ));

        let seqs: Vec<u64> = events.iter().filter_map(ServerMessage::seq).collect();
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));

        assert_eq!(harness.journal.acquired(), 1, "one driver serves the whole case");
        assert_eq!(harness.journal.quits(), 1);
        assert_eq!(harness.store.step(3).await.unwrap().status, ExecutionStatus::Failed);
        assert_eq!(harness.store.step(4).await.unwrap().status, ExecutionStatus::Passed);
    }

    #[tokio::test]
    async fn test_every_step_replays_login() {
        let harness = Harness::new(Script::default()).await;
        harness.add_step(2, 2, &click("#a")).await;
        harness.add_step(3, 3, &click("#b")).await;

        run(&harness, CASE_ID).await;

        let logins = harness
            .journal
            .actions()
            .iter()
            .filter(|a| a.as_str() == "navigate https://app.test/login")
            .count();
        assert_eq!(logins, 2);
        assert_eq!(
            harness.store.step(LOGIN_ID).await.unwrap().status,
            ExecutionStatus::NotRun
        );
    }

    #[tokio::test]
    async fn test_invalid_step_counts_as_errored() {
        let harness = Harness::new(Script::default()).await;
        harness.add_step(2, 2, "import selenium").await;
        harness.add_step(3, 3, &click("#b")).await;

        let (report, events) = run(&harness, CASE_ID).await;

        assert_eq!(report.errored, 1);
        assert_eq!(report.passed, 1);
        assert!(events.iter().any(|e| matches!(
            e,
            ServerMessage::ExecutionError { step_id: Some(2), .. }
        )));
    }

    #[tokio::test]
    async fn test_login_only_case_reports_zero_counts() {
        let harness = Harness::new(Script::default()).await;

        let (report, events) = run(&harness, CASE_ID).await;

        assert_eq!(report, CaseReport::default());
        assert!(matches!(
            events.as_slice(),
            [ServerMessage::AllStepsComplete {
                passed: 0,
                failed: 0,
                errored: 0,
                ..
            }]
        ));
        assert_eq!(harness.journal.acquired(), 0);
    }

    #[tokio::test]
    async fn test_empty_and_unknown_cases() {
        let harness = Harness::new(Script::default()).await;
        harness
            .store
            .insert_case(CaseRecord {
                id: 77,
                name: "empty".into(),
                login_step_id: None,
            })
            .await;

        for case_id in [77, 404] {
            let (_, events) = run(&harness, case_id).await;
            assert!(matches!(
                events.as_slice(),
                [ServerMessage::ExecutionError { step_id: None, .. }]
            ));
        }
    }

    #[tokio::test]
    async fn test_deleted_login_step() {
        let harness = Harness::new(Script::default()).await;
        harness
            .store
            .insert_case(CaseRecord {
                id: CASE_ID,
                name: "smoke".into(),
                login_step_id: Some(LOGIN_ID),
            })
            .await;
        harness.add_step(2, 2, &click("#a")).await;
        harness.store.remove_step(LOGIN_ID).await;

        let (_, events) = run(&harness, CASE_ID).await;
        match events.as_slice() {
            [ServerMessage::ExecutionError { step_id: None, error, .. }] => {
                assert!(error.contains("login step 1 no longer exists"));
            }
            other => panic!("unexpected events: {other:?}"),
        }
        assert_eq!(harness.journal.acquired(), 0);
    }

    #[tokio::test]
    async fn test_store_outage_leaves_step_results_intact() {
        let harness = Harness::new(Script::default().missing("#broken")).await;
        harness.add_step(2, 2, &click("#first")).await;
        harness.add_step(3, 3, &click("#broken")).await;
        harness.add_step(4, 4, &click("#third")).await;
        harness.store.fail_next_writes(usize::MAX);

        let (report, events) = run(&harness, CASE_ID).await;

        assert_eq!(report.passed, 2);
        assert_eq!(report.failed, 1);
        let terminals: Vec<(i64, RunOutcome)> = events
            .iter()
            .filter_map(|e| match e {
                ServerMessage::ExecutionComplete {
                    step_id, status, ..
                } => Some((*step_id, *status)),
                _ => None,
            })
            .collect();
        assert_eq!(
            terminals,
            vec![
                (2, RunOutcome::Passed),
                (3, RunOutcome::Failed),
                (4, RunOutcome::Passed)
            ]
        );
        assert!(matches!(
            events.last(),
            Some(ServerMessage::AllStepsComplete {
                passed: 2,
                failed: 1,
                errored: 0,
                ..
            })
        ));

        for step_id in [2, 3, 4] {
            assert_eq!(
                harness.store.step(step_id).await.unwrap().status,
                ExecutionStatus::NotRun
            );
        }
    }
}
