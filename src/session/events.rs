//! Ordered event emission for one session

use steprunner_shared::ServerMessage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Numbers and sends session events, and carries the session's cancellation
///
/// Once the token is cancelled nothing more is sent, so an in-flight result
/// that lands after channel closure is never forwarded.
pub struct EventSink {
    tx: mpsc::Sender<ServerMessage>,
    cancel: CancellationToken,
    seq: u64,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<ServerMessage>, cancel: CancellationToken) -> Self {
        Self { tx, cancel, seq: 0 }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Build the next event with a fresh sequence number and send it.
    /// Returns false when the session has been cancelled.
    pub async fn emit(&mut self, build: impl FnOnce(u64) -> ServerMessage) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }

        self.seq += 1;
        let message = build(self.seq);

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.tx.send(message) => match sent {
                Ok(()) => true,
                Err(_) => {
                    // Receiver gone means the channel closed
                    self.cancel.cancel();
                    false
                }
            },
        }
    }
}
