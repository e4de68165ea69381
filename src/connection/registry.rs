//! Registry mapping each open channel to at most one active run

use crate::session::{run_request, EventSink, ExecutionContext};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use steprunner_shared::{ClientMessage, ServerMessage};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type ChannelId = Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a run is already active on this channel")]
    Conflict,

    #[error("unknown channel {0}")]
    UnknownChannel(ChannelId),
}

struct ActiveRun {
    run_id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct ChannelEntry {
    outbound: mpsc::Sender<ServerMessage>,
    active: Option<ActiveRun>,
    /// Runs past their terminal event that are still releasing a driver
    teardown: Vec<JoinHandle<()>>,
}

struct Inner {
    channels: Mutex<HashMap<ChannelId, ChannelEntry>>,
    ctx: Arc<ExecutionContext>,
    /// How long a cancelled run may take to wind down before it is aborted
    grace: Duration,
}

/// Owns every channel's binding; the only state shared across channels
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Inner>,
}

impl SessionRegistry {
    pub fn new(ctx: Arc<ExecutionContext>) -> Self {
        let grace = ctx.timeouts.teardown_grace * 2;
        Self {
            inner: Arc::new(Inner {
                channels: Mutex::new(HashMap::new()),
                ctx,
                grace,
            }),
        }
    }

    /// Register a new channel whose events go to `outbound`
    pub async fn accept(&self, outbound: mpsc::Sender<ServerMessage>) -> ChannelId {
        let channel = Uuid::new_v4();
        self.inner.channels.lock().await.insert(
            channel,
            ChannelEntry {
                outbound,
                active: None,
                teardown: Vec::new(),
            },
        );
        info!(%channel, "channel accepted");
        channel
    }

    /// Start a run for `request` on `channel`, refusing if one is already active
    pub async fn dispatch(&self, channel: ChannelId, request: ClientMessage) -> Result<Uuid, RegistryError> {
        let mut channels = self.inner.channels.lock().await;
        let entry = channels
            .get_mut(&channel)
            .ok_or(RegistryError::UnknownChannel(channel))?;

        if entry
            .active
            .as_ref()
            .is_some_and(|run| !run.task.is_finished())
        {
            warn!(%channel, ?request, "rejecting request, run already active");
            return Err(RegistryError::Conflict);
        }

        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let sink = EventSink::new(entry.outbound.clone(), cancel.clone());
        let ctx = self.inner.ctx.clone();
        let registry = self.clone();

        info!(%channel, %run_id, ?request, "starting run");
        let task = tokio::spawn(async move {
            let mut adapter = run_request(ctx, request, sink).await;
            registry.finish(channel, run_id).await;
            adapter.release().await;
        });

        entry.active = Some(ActiveRun {
            run_id,
            cancel,
            task,
        });
        Ok(run_id)
    }

    /// Free the channel once its run has emitted its terminal event. The
    /// run's task keeps going until the driver is released.
    async fn finish(&self, channel: ChannelId, run_id: Uuid) {
        let mut channels = self.inner.channels.lock().await;
        let Some(entry) = channels.get_mut(&channel) else {
            return;
        };
        if !entry.active.as_ref().is_some_and(|run| run.run_id == run_id) {
            return;
        }
        if let Some(run) = entry.active.take() {
            entry.teardown.retain(|task| !task.is_finished());
            entry.teardown.push(run.task);
            debug!(%channel, %run_id, "run finished");
        }
    }

    /// Drop the channel's binding and cancel its run, waiting a bounded time
    /// for the driver to be released
    pub async fn on_close(&self, channel: ChannelId) {
        let entry = self.inner.channels.lock().await.remove(&channel);
        let Some(entry) = entry else {
            return;
        };
        info!(%channel, "channel closed");

        let mut tasks = entry.teardown;
        if let Some(run) = entry.active {
            run.cancel.cancel();
            tasks.push(run.task);
        }

        let deadline = Instant::now() + self.inner.grace;
        for mut task in tasks {
            if timeout_at(deadline, &mut task).await.is_err() {
                warn!(
                    %channel,
                    grace_ms = self.inner.grace.as_millis() as u64,
                    "run did not stop in time, aborting"
                );
                task.abort();
            }
        }
    }

    /// Number of channels with a run in progress
    pub async fn active_sessions(&self) -> usize {
        self.inner
            .channels
            .lock()
            .await
            .values()
            .filter(|e| e.active.is_some())
            .count()
    }

    pub async fn channel_count(&self) -> usize {
        self.inner.channels.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::scripted::Script;
    use crate::session::testkit::{Harness, CASE_ID};
    use crate::store::{ReconcilerConfig, StepStore};
    use steprunner_shared::{ExecutionStatus, RunOutcome};
    use tokio::time::timeout;

    const HANGING: &str = r##"[{"action": "click", "target": "#spinner"}]"##;

    async fn wait_idle(registry: &SessionRegistry) {
        timeout(Duration::from_secs(2), async {
            while registry.active_sessions().await > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("run finishes");
    }

    #[tokio::test]
    async fn test_one_active_run_per_channel() {
        let harness = Harness::new(Script::default().hang_on("#spinner")).await;
        harness.add_step(2, 2, HANGING).await;
        let registry = SessionRegistry::new(harness.ctx.clone());

        let (tx, _rx) = mpsc::channel(64);
        let channel = registry.accept(tx).await;

        registry
            .dispatch(channel, ClientMessage::ExecuteStep { step_id: 2 })
            .await
            .unwrap();
        assert_eq!(
            registry
                .dispatch(channel, ClientMessage::ExecuteAll { test_case_id: CASE_ID })
                .await,
            Err(RegistryError::Conflict)
        );

        // Another channel is unaffected
        let (tx2, _rx2) = mpsc::channel(64);
        let other = registry.accept(tx2).await;
        assert!(registry
            .dispatch(other, ClientMessage::ExecuteStep { step_id: 1 })
            .await
            .is_ok());

        registry.on_close(channel).await;
        registry.on_close(other).await;
        assert_eq!(registry.channel_count().await, 0);
    }

    #[tokio::test]
    async fn test_channel_free_after_run_completes() {
        let harness = Harness::new(Script::default()).await;
        let registry = SessionRegistry::new(harness.ctx.clone());

        let (tx, mut rx) = mpsc::channel(64);
        let channel = registry.accept(tx).await;

        for _ in 0..2 {
            registry
                .dispatch(channel, ClientMessage::ExecuteStep { step_id: 1 })
                .await
                .unwrap();
            loop {
                let event = rx.recv().await.expect("event");
                if event.is_terminal() {
                    break;
                }
            }
            wait_idle(&registry).await;
        }
        assert_eq!(harness.journal.acquired(), 2);
    }

    async fn next_terminal(rx: &mut mpsc::Receiver<ServerMessage>) -> ServerMessage {
        loop {
            let event = rx.recv().await.expect("event");
            if event.is_terminal() {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn test_channel_free_as_soon_as_terminal_event_sent() {
        let script = Script {
            quit_delay: Duration::from_millis(50),
            ..Script::default()
        };
        let harness = Harness::with_reconciler(
            script,
            ReconcilerConfig {
                max_retries: 3,
                retry_delay: Duration::from_millis(200),
                screenshot_dir: None,
            },
        )
        .await;
        harness.store.fail_next_writes(usize::MAX);
        let registry = SessionRegistry::new(harness.ctx.clone());

        let (tx, mut rx) = mpsc::channel(64);
        let channel = registry.accept(tx).await;

        registry
            .dispatch(channel, ClientMessage::ExecuteStep { step_id: 1 })
            .await
            .unwrap();
        assert!(matches!(
            next_terminal(&mut rx).await,
            ServerMessage::ExecutionComplete {
                status: RunOutcome::Passed,
                ..
            }
        ));

        // Store retries and driver quit are both still pending here
        assert_eq!(harness.journal.quits(), 0);
        let second = registry
            .dispatch(channel, ClientMessage::ExecuteStep { step_id: 1 })
            .await;
        assert!(second.is_ok(), "second request refused: {second:?}");
        assert!(matches!(
            next_terminal(&mut rx).await,
            ServerMessage::ExecutionComplete {
                status: RunOutcome::Passed,
                ..
            }
        ));

        registry.on_close(channel).await;
        assert_eq!(harness.journal.quits(), 2, "both drivers released before close returns");
    }

    #[tokio::test]
    async fn test_scenario_d_close_mid_run() {
        let harness = Harness::new(Script::default().hang_on("#spinner")).await;
        harness.add_step(2, 2, HANGING).await;
        let registry = SessionRegistry::new(harness.ctx.clone());

        let (tx, mut rx) = mpsc::channel(64);
        let channel = registry.accept(tx).await;
        registry
            .dispatch(channel, ClientMessage::ExecuteStep { step_id: 2 })
            .await
            .unwrap();

        // Login prefix has three commands, the hanging click is the fourth
        loop {
            match rx.recv().await.expect("event") {
                ServerMessage::Progress { index: 4, .. } => break,
                event => assert!(!event.is_terminal()),
            }
        }

        registry.on_close(channel).await;
        harness.ctx.reconciler.flush().await;

        assert!(rx.recv().await.is_none(), "no events after close");
        assert_eq!(harness.journal.quits(), 1, "driver released");
        assert_eq!(registry.active_sessions().await, 0);

        let stored = harness.store.step(2).await.unwrap();
        assert_eq!(stored.status, ExecutionStatus::Error);
    }

    #[tokio::test]
    async fn test_unknown_channel() {
        let harness = Harness::new(Script::default()).await;
        let registry = SessionRegistry::new(harness.ctx.clone());

        let channel = Uuid::new_v4();
        assert_eq!(
            registry
                .dispatch(channel, ClientMessage::ExecuteStep { step_id: 1 })
                .await,
            Err(RegistryError::UnknownChannel(channel))
        );
        registry.on_close(channel).await;
    }
}
