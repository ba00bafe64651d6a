//! Write scheduler: the only caller of the transport write primitive and
//! the only interpreter of its completion signals.
//!
//! Flow per arm:
//!   submit → enqueue (idle: start packet 0 | busy: wait in FIFO)
//!   completion(ok)   → next packet, or resolve and promote the next batch
//!   completion(fail) → resolve failed, cascade-abort everything pending
//!   refusal          → same drain/cascade as an async failure
//!
//! Queue locks are never held across a transport write or a result
//! resolution. Log lines are emitted after the lock is released.

use std::sync::{Arc, Weak};

use glasslink_core::payload::to_hex;
use glasslink_core::{Arm, FailureKind, QueueResult, WriteStatus, WriteTarget};

use crate::batch::WriteBatch;
use crate::link::{LinkHandle, LinkWriter, TransportError};
use crate::queue::{Completion, Enqueued, IssuePlan, LinkQueue, QueueSnapshot};
use crate::result_channel::ResultReceiver;

/// Owns the two per-arm queues. Construct one per connection lifecycle and
/// share it behind an `Arc`.
pub struct WriteScheduler {
    queues: [LinkQueue; 2],
}

/// Results of a submission to both arms.
#[derive(Debug, Clone)]
pub struct BothArms {
    pub left: QueueResult,
    pub right: QueueResult,
}

impl BothArms {
    pub fn get(&self, arm: Arm) -> &QueueResult {
        match arm {
            Arm::Left => &self.left,
            Arm::Right => &self.right,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.left.success && self.right.success
    }
}

enum IssueOutcome {
    Accepted,
    Refused {
        message: String,
        cause: TransportError,
    },
    Superseded,
}

impl Default for WriteScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteScheduler {
    pub fn new() -> Self {
        Self {
            queues: Arm::ALL.map(LinkQueue::new),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn queue(&self, arm: Arm) -> &LinkQueue {
        &self.queues[arm.index()]
    }

    // ── Link lifecycle ───────────────────────────────────────────────────────

    /// Replace the link bound to `arm`. If either half is absent, all work
    /// queued on the arm fails with `TargetUnavailable`.
    pub fn bind_target(
        &self,
        arm: Arm,
        writer: Option<Arc<dyn LinkWriter>>,
        target: Option<WriteTarget>,
        reason: &str,
    ) {
        let bound = target.clone();
        let cancelled = self.queue(arm).bind(writer, target, reason);
        if cancelled.is_empty() {
            match bound {
                Some(target) => tracing::debug!(%arm, %target, reason, "write target bound"),
                None => tracing::debug!(%arm, reason, "write target cleared"),
            }
            return;
        }

        let message = format!("queue cleared for {arm}: {reason}");
        tracing::warn!(%arm, reason, cancelled = cancelled.len(), "queue cleared, link unavailable");
        for batch in cancelled {
            batch.resolve(batch.failure_result(FailureKind::TargetUnavailable, message.clone()));
        }
    }

    pub fn bind(&self, arm: Arm, link: LinkHandle) {
        self.bind_target(arm, Some(link.writer), Some(link.target), "link bound");
    }

    pub fn unbind(&self, arm: Arm, reason: &str) {
        self.bind_target(arm, None, None, reason);
    }

    /// Handle the transport uses to report completions for `arm`.
    pub fn completion_sink(self: &Arc<Self>, arm: Arm) -> CompletionSink {
        CompletionSink {
            arm,
            scheduler: Arc::downgrade(self),
        }
    }

    // ── Submission ───────────────────────────────────────────────────────────

    /// Queue a batch and return the receiver its outcome will arrive on.
    ///
    /// An empty packet list resolves immediately without touching the queue.
    pub fn submit<I, P>(&self, arm: Arm, packets: I, label: &str) -> ResultReceiver
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        let (batch, receiver) = WriteBatch::new(arm, label, packets);
        if batch.packet_count() == 0 {
            tracing::debug!(%arm, label, "nothing to send");
            batch.resolve(QueueResult::nothing_to_send(arm));
            return receiver;
        }

        let queue = self.queue(arm);
        match queue.enqueue(batch.clone()) {
            Enqueued::MissingTarget(missing) => {
                let message = format!("unable to enqueue {label} for {arm}: {missing}");
                tracing::error!(%arm, label, missing, "unable to enqueue batch");
                batch.resolve(batch.failure_result(FailureKind::TargetUnavailable, message));
            }
            Enqueued::StartNow => {
                tracing::debug!(%arm, label, packets = batch.packet_count(), "starting batch");
                self.start(queue, batch);
            }
            Enqueued::Queued(snapshot) => {
                tracing::debug!(
                    %arm,
                    label,
                    packets = batch.packet_count(),
                    queue = %snapshot,
                    "batch queued"
                );
            }
        }
        receiver
    }

    /// Submit and block until the batch resolves.
    pub fn submit_batch<I, P>(&self, arm: Arm, packets: I, label: &str) -> QueueResult
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        self.submit(arm, packets, label).wait_blocking()
    }

    pub async fn submit_batch_async<I, P>(&self, arm: Arm, packets: I, label: &str) -> QueueResult
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        self.submit(arm, packets, label).wait().await
    }

    /// Submit to the left arm, then the right, and wait for each.
    ///
    /// Both batches are queued before either wait begins, so a stalled or
    /// failing left arm never holds back the right one.
    pub fn submit_to_both_arms<L, R, P, Q>(&self, left: L, right: R, label: &str) -> BothArms
    where
        L: IntoIterator<Item = P>,
        R: IntoIterator<Item = Q>,
        P: AsRef<[u8]>,
        Q: AsRef<[u8]>,
    {
        let (left_rx, right_rx) = self.submit_both(left, right, label);
        BothArms {
            left: left_rx.wait_blocking(),
            right: right_rx.wait_blocking(),
        }
    }

    pub async fn submit_to_both_arms_async<L, R, P, Q>(
        &self,
        left: L,
        right: R,
        label: &str,
    ) -> BothArms
    where
        L: IntoIterator<Item = P>,
        R: IntoIterator<Item = Q>,
        P: AsRef<[u8]>,
        Q: AsRef<[u8]>,
    {
        let (left_rx, right_rx) = self.submit_both(left, right, label);
        BothArms {
            left: left_rx.wait().await,
            right: right_rx.wait().await,
        }
    }

    /// Send the same packets to both arms.
    pub fn submit_same_to_both_arms<P>(&self, packets: &[P], label: &str) -> BothArms
    where
        P: AsRef<[u8]>,
    {
        self.submit_to_both_arms(packets, packets, label)
    }

    pub async fn submit_same_to_both_arms_async<P>(&self, packets: &[P], label: &str) -> BothArms
    where
        P: AsRef<[u8]>,
    {
        self.submit_to_both_arms_async(packets, packets, label).await
    }

    /// Queue a batch on each arm (left first) without waiting. Labels get
    /// `-left` / `-right` suffixes.
    fn submit_both<L, R, P, Q>(
        &self,
        left: L,
        right: R,
        label: &str,
    ) -> (ResultReceiver, ResultReceiver)
    where
        L: IntoIterator<Item = P>,
        R: IntoIterator<Item = Q>,
        P: AsRef<[u8]>,
        Q: AsRef<[u8]>,
    {
        let left_rx = self.submit(Arm::Left, left, &format!("{label}-left"));
        let right_rx = self.submit(Arm::Right, right, &format!("{label}-right"));
        (left_rx, right_rx)
    }

    // ── Administration & observation ─────────────────────────────────────────

    /// True while the arm has an active batch or anything pending.
    pub fn has_pending_work(&self, arm: Arm) -> bool {
        self.queue(arm).has_pending_work()
    }

    /// Fail everything active or queued on `arm`. The bound link is kept.
    ///
    /// A write the transport already accepted cannot be recalled, and its
    /// completion carries no batch identity. Wait for the transport to go
    /// quiet before resubmitting, or a late completion for the cancelled
    /// write is credited to the next batch's first packet.
    pub fn fail_queue(&self, arm: Arm, reason: &str) {
        let cancelled = self.queue(arm).cancel_all(reason);
        if !cancelled.is_empty() {
            tracing::warn!(%arm, reason, cancelled = cancelled.len(), "queue failed");
        }
        for batch in cancelled {
            batch.resolve(batch.failure_result(FailureKind::Cancelled, reason));
        }
    }

    pub fn last_error(&self, arm: Arm) -> Option<String> {
        self.queue(arm).last_error()
    }

    pub fn snapshot(&self, arm: Arm) -> QueueSnapshot {
        self.queue(arm).snapshot()
    }

    // ── Transport signals ────────────────────────────────────────────────────

    /// Apply a completion signal for the packet in flight on `arm`.
    pub fn on_write_completed(&self, arm: Arm, target: &WriteTarget, status: WriteStatus) {
        let queue = self.queue(arm);
        match queue.complete(target, status) {
            Completion::Ignored(why) => {
                tracing::trace!(%arm, %target, %status, why, "ignoring write completion");
            }
            Completion::Failed {
                batch,
                message,
                aborted,
            } => {
                tracing::error!(%arm, label = %batch.label, %status, "write failed");
                batch.resolve(
                    batch
                        .failure_result(FailureKind::TransportFailed, message)
                        .with_status(status),
                );
                self.cascade(arm, aborted);
            }
            Completion::Advanced { batch, next_index } => {
                self.issue_or_fail(queue, batch, next_index, "follow-up packet");
            }
            Completion::Finished { batch, next } => {
                tracing::debug!(
                    %arm,
                    label = %batch.label,
                    bytes = batch.bytes_written(),
                    elapsed_ms = batch.age().as_millis() as u64,
                    "batch completed"
                );
                batch.resolve(batch.success_result());
                if let Some(next) = next {
                    tracing::debug!(%arm, label = %next.label, packets = next.packet_count(), "starting batch");
                    self.start(queue, next);
                }
            }
        }
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn start(&self, queue: &LinkQueue, batch: Arc<WriteBatch>) {
        self.issue_or_fail(queue, batch, 0, "initial packet");
    }

    fn issue_or_fail(&self, queue: &LinkQueue, batch: Arc<WriteBatch>, index: usize, what: &str) {
        match self.issue(queue, &batch, index) {
            IssueOutcome::Accepted | IssueOutcome::Superseded => {}
            IssueOutcome::Refused { message, cause } => {
                let message = format!("{message} ({what})");
                self.fail_immediately(queue, &batch, message, cause);
            }
        }
    }

    /// Read the link under the lock, write outside it.
    fn issue(&self, queue: &LinkQueue, batch: &Arc<WriteBatch>, index: usize) -> IssueOutcome {
        let arm = queue.arm();
        let (writer, target, payload) = match queue.prepare_write(batch, index) {
            IssuePlan::Write {
                writer,
                target,
                payload,
            } => (writer, target, payload),
            IssuePlan::Superseded => {
                tracing::trace!(%arm, label = %batch.label, packet = index, "write superseded");
                return IssueOutcome::Superseded;
            }
        };

        match writer.write(&target, &payload) {
            Ok(()) => {
                tracing::trace!(
                    %arm,
                    label = %batch.label,
                    packet = index,
                    bytes = payload.len(),
                    payload = %to_hex(&payload),
                    "packet written"
                );
                IssueOutcome::Accepted
            }
            Err(e) => {
                tracing::error!(%arm, label = %batch.label, packet = index, error = %e, "transport refused packet");
                IssueOutcome::Refused {
                    message: format!("{arm} {}: transport refused packet {index}", batch.label),
                    cause: e,
                }
            }
        }
    }

    /// Synchronous refusal: same drain and cascade as an async failure.
    fn fail_immediately(
        &self,
        queue: &LinkQueue,
        batch: &Arc<WriteBatch>,
        message: String,
        cause: TransportError,
    ) {
        let aborted = queue.abort(batch, &message);
        batch.resolve(
            batch
                .failure_result(FailureKind::TransportRefused, message)
                .with_cause(Arc::new(cause)),
        );

        if let Some(aborted) = aborted {
            self.cascade(queue.arm(), aborted.drained);
        }
    }

    fn cascade(&self, arm: Arm, aborted: Vec<Arc<WriteBatch>>) {
        if aborted.is_empty() {
            return;
        }
        tracing::warn!(%arm, aborted = aborted.len(), "aborting queued batches after failure");
        let message = format!("aborted because a previous write on {arm} failed");
        for batch in aborted {
            batch.resolve(batch.failure_result(FailureKind::CascadeAborted, message.clone()));
        }
    }
}

/// Per-arm completion handle given to the transport.
///
/// Holds the scheduler weakly so a transport that outlives it (or that the
/// scheduler itself owns through a bound link) does not keep it alive.
#[derive(Debug, Clone)]
pub struct CompletionSink {
    arm: Arm,
    scheduler: Weak<WriteScheduler>,
}

impl CompletionSink {
    pub fn arm(&self) -> Arm {
        self.arm
    }

    /// Report that the packet last accepted on this arm has completed.
    pub fn write_completed(&self, target: &WriteTarget, status: WriteStatus) {
        match self.scheduler.upgrade() {
            Some(scheduler) => scheduler.on_write_completed(self.arm, target, status),
            None => tracing::trace!(arm = %self.arm, "scheduler gone, dropping completion"),
        }
    }
}
