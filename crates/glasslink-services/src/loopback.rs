//! Loopback link: an in-process transport that acknowledges writes
//! asynchronously, the way a radio stack does.
//!
//! Each accepted write is queued to a background task, which waits
//! `ack_delay` and then reports the completion through the arm's
//! [`CompletionSink`]. Faults can be injected for exercising the failure
//! paths: a synchronous refusal of the next write, or a non-success status
//! on the n-th next acknowledgment.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use glasslink_core::config::LoopbackConfig;
use glasslink_core::{WriteStatus, WriteTarget};

use crate::link::{LinkWriter, TransportError};
use crate::scheduler::CompletionSink;

#[derive(Debug, Clone)]
pub struct LoopbackOptions {
    pub ack_delay: Duration,
    pub max_packet_len: usize,
    pub fail_status: WriteStatus,
}

impl Default for LoopbackOptions {
    fn default() -> Self {
        Self::from(&LoopbackConfig::default())
    }
}

impl From<&LoopbackConfig> for LoopbackOptions {
    fn from(config: &LoopbackConfig) -> Self {
        Self {
            ack_delay: Duration::from_millis(config.ack_delay_ms),
            max_packet_len: config.max_packet_len,
            fail_status: WriteStatus(config.fail_status),
        }
    }
}

struct PendingAck {
    target: WriteTarget,
    status: WriteStatus,
}

pub struct LoopbackLink {
    options: LoopbackOptions,
    ack_tx: mpsc::UnboundedSender<PendingAck>,
    written: Mutex<Vec<Bytes>>,
    refuse_next: AtomicBool,
    /// Countdown to an injected failure; 0 = none armed.
    fail_in: AtomicUsize,
}

impl LoopbackLink {
    /// Create the link and spawn its acknowledgment task.
    /// Must be called from within a tokio runtime.
    pub fn spawn(sink: CompletionSink, options: LoopbackOptions) -> Arc<Self> {
        let (ack_tx, ack_rx) = mpsc::unbounded_channel();
        tokio::spawn(ack_loop(sink, options.ack_delay, ack_rx));
        Arc::new(Self {
            options,
            ack_tx,
            written: Mutex::new(Vec::new()),
            refuse_next: AtomicBool::new(false),
            fail_in: AtomicUsize::new(0),
        })
    }

    /// Refuse the next write synchronously.
    pub fn refuse_next(&self) {
        self.refuse_next.store(true, Ordering::SeqCst);
    }

    /// Report `fail_status` for the n-th next accepted write (1 = the next one).
    pub fn fail_next(&self, n: usize) {
        self.fail_in.store(n, Ordering::SeqCst);
    }

    /// Every payload accepted so far, in write order.
    pub fn written(&self) -> Vec<Bytes> {
        self.written.lock().clone()
    }

    fn next_status(&self) -> WriteStatus {
        let armed = self
            .fail_in
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match armed {
            Ok(1) => self.options.fail_status,
            _ => WriteStatus::SUCCESS,
        }
    }
}

impl LinkWriter for LoopbackLink {
    fn write(&self, target: &WriteTarget, payload: &Bytes) -> Result<(), TransportError> {
        if self.refuse_next.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Refused);
        }
        if payload.len() > self.options.max_packet_len {
            return Err(TransportError::PayloadTooLarge {
                len: payload.len(),
                max: self.options.max_packet_len,
            });
        }
        let status = self.next_status();
        // Record before the ack is queued; the ack may trigger the next write.
        let mut written = self.written.lock();
        written.push(payload.clone());
        let sent = self.ack_tx.send(PendingAck {
            target: target.clone(),
            status,
        });
        if sent.is_err() {
            written.pop();
            return Err(TransportError::LinkUnavailable);
        }
        Ok(())
    }
}

async fn ack_loop(
    sink: CompletionSink,
    delay: Duration,
    mut ack_rx: mpsc::UnboundedReceiver<PendingAck>,
) {
    while let Some(ack) = ack_rx.recv().await {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        sink.write_completed(&ack.target, ack.status);
    }
    tracing::debug!(arm = %sink.arm(), "loopback link closed");
}
