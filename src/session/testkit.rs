//! Fixtures for exercising sessions against the scripted driver

use super::{EventSink, ExecutionContext};
use crate::command::TimeoutPolicy;
use crate::driver::scripted::{Journal, Script, ScriptedFactory};
use crate::store::{CaseRecord, MemoryStore, ReconcilerConfig, StepRecord};
use std::sync::Arc;
use std::time::Duration;
use steprunner_shared::{CaseId, ServerMessage, StepId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const CASE_ID: CaseId = 10;
pub const LOGIN_ID: StepId = 1;

pub const LOGIN_COMMANDS: &str = r##"[
    {"action": "navigate", "url": "https://app.test/login", "description": "open login page"},
    {"action": "type", "target": "#user", "value": "a"},
    {"action": "click", "target": "#login"}
]"##;

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub ctx: Arc<ExecutionContext>,
    pub journal: Journal,
}

impl Harness {
    /// Case `CASE_ID` with login step `LOGIN_ID` at ordinal 1
    pub async fn new(script: Script) -> Self {
        Self::with_reconciler(
            script,
            ReconcilerConfig {
                max_retries: 1,
                retry_delay: Duration::from_millis(1),
                screenshot_dir: None,
            },
        )
        .await
    }

    pub async fn with_reconciler(script: Script, reconciler: ReconcilerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_case(CaseRecord {
                id: CASE_ID,
                name: "smoke".into(),
                login_step_id: None,
            })
            .await;
        store
            .insert_step(StepRecord::new(LOGIN_ID, CASE_ID, 1, LOGIN_COMMANDS).with_description("log in"))
            .await;

        let (factory, journal) = ScriptedFactory::new(script);
        let ctx = Arc::new(ExecutionContext::new(
            store.clone(),
            Arc::new(factory),
            TimeoutPolicy::quick(),
            reconciler,
        ));

        Self { store, ctx, journal }
    }

    pub async fn add_step(&self, id: StepId, ordinal: i64, commands: &str) {
        self.store
            .insert_step(
                StepRecord::new(id, CASE_ID, ordinal, commands)
                    .with_description(format!("step {id}"))
                    .with_expected_result(format!("step {id} done")),
            )
            .await;
    }

    /// Sink with room for every event a test run produces
    pub fn sink(&self) -> (EventSink, mpsc::Receiver<ServerMessage>, CancellationToken) {
        let (tx, rx) = mpsc::channel(512);
        let cancel = CancellationToken::new();
        (EventSink::new(tx, cancel.clone()), rx, cancel)
    }
}

/// Everything currently queued on the receiver
pub fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Sequence numbers strictly increase and the last event is the only terminal one
pub fn assert_well_ordered(events: &[ServerMessage]) {
    let seqs: Vec<u64> = events.iter().filter_map(ServerMessage::seq).collect();
    assert!(
        seqs.windows(2).all(|w| w[0] < w[1]),
        "sequence numbers not strictly increasing: {seqs:?}"
    );
    let terminal: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_terminal())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(terminal, vec![events.len() - 1], "terminal event must be last and unique");
}
