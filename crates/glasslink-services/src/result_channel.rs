//! Result channel: a single-assignment slot per write batch.
//!
//! The scheduler holds the [`ResultSender`] (inside the batch) and the
//! submitter holds the [`ResultReceiver`]. Resolving is at-most-once: a
//! second attempt is a silent no-op. Dropping the receiver, or giving up on
//! a wait, never touches the batch's progress through its queue.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};

use glasslink_core::{Arm, FailureKind, QueueResult};

/// Create a connected sender/receiver pair for one batch.
///
/// `progress` is the batch's running byte count, read when a wait has to
/// fabricate a result of its own.
pub fn channel(
    arm: Arm,
    label: impl Into<String>,
    packets: usize,
    progress: Arc<AtomicUsize>,
) -> (ResultSender, ResultReceiver) {
    let (tx, rx) = oneshot::channel();
    let sender = ResultSender {
        slot: Mutex::new(Some(tx)),
    };
    let receiver = ResultReceiver {
        rx,
        arm,
        label: label.into(),
        packets,
        progress,
    };
    (sender, receiver)
}

#[derive(Debug)]
pub struct ResultSender {
    slot: Mutex<Option<oneshot::Sender<QueueResult>>>,
}

impl ResultSender {
    /// Resolve the channel. Returns false if it was already resolved.
    ///
    /// A receiver that has gone away still counts as resolved here; the
    /// result is simply discarded.
    pub fn resolve(&self, result: QueueResult) -> bool {
        let Some(tx) = self.slot.lock().take() else {
            return false;
        };
        let _ = tx.send(result);
        true
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.lock().is_none()
    }
}

/// Receiving half, handed to the submitter.
#[derive(Debug)]
pub struct ResultReceiver {
    rx: oneshot::Receiver<QueueResult>,
    arm: Arm,
    label: String,
    packets: usize,
    progress: Arc<AtomicUsize>,
}

impl ResultReceiver {
    /// Non-blocking check; `Some` once the batch has resolved.
    /// The result is handed out once; poll a resolved receiver no further.
    pub fn try_result(&mut self) -> Option<QueueResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(self.closed()),
        }
    }

    /// Wait for the batch to resolve.
    pub async fn wait(self) -> QueueResult {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => closed_result(self.arm, &self.label, self.packets, &self.progress),
        }
    }

    /// Wait for the batch, giving up when `shutdown` fires or closes.
    ///
    /// Giving up yields a `WaitInterrupted` result; the batch stays where it
    /// is in its queue and will still be written.
    pub async fn wait_until(self, shutdown: &mut broadcast::Receiver<()>) -> QueueResult {
        let ResultReceiver {
            rx,
            arm,
            label,
            packets,
            progress,
        } = self;
        tokio::select! {
            biased;

            outcome = rx => match outcome {
                Ok(result) => result,
                Err(_) => closed_result(arm, &label, packets, &progress),
            },

            _ = shutdown.recv() => {
                let message = format!("interrupted while waiting for {label} on {arm}");
                tracing::warn!(%arm, %label, "wait interrupted");
                QueueResult::failure(
                    arm,
                    packets,
                    progress.load(Ordering::Acquire),
                    FailureKind::WaitInterrupted,
                    message,
                )
            }
        }
    }

    /// Blocking form of [`wait`](Self::wait) for synchronous callers.
    ///
    /// Must not be called from inside an async task; use `wait` there.
    pub fn wait_blocking(self) -> QueueResult {
        futures::executor::block_on(self.wait())
    }

    /// Blocking form of [`wait_until`](Self::wait_until).
    pub fn wait_blocking_until(self, shutdown: &mut broadcast::Receiver<()>) -> QueueResult {
        futures::executor::block_on(self.wait_until(shutdown))
    }

    fn closed(&self) -> QueueResult {
        closed_result(self.arm, &self.label, self.packets, &self.progress)
    }
}

fn closed_result(arm: Arm, label: &str, packets: usize, progress: &AtomicUsize) -> QueueResult {
    let message = format!("queue failure waiting for {label} on {arm}: result channel closed");
    tracing::error!(%arm, %label, "result channel dropped without a result");
    QueueResult::failure(
        arm,
        packets,
        progress.load(Ordering::Acquire),
        FailureKind::ChannelClosed,
        message,
    )
}
