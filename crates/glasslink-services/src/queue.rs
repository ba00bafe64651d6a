//! Per-link queue: FIFO of pending batches plus at most one active batch
//! with at most one packet in flight.
//!
//! Every method takes the queue's own lock for a short, non-blocking
//! critical section and returns what the scheduler must do next. Nothing
//! here calls into the transport or resolves a result channel; those happen
//! after the lock is released, using the values returned.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;

use glasslink_core::{Arm, WriteStatus, WriteTarget};

use crate::batch::{InFlightWrite, WriteBatch};
use crate::link::LinkWriter;

/// Queue for a single arm. One lock per arm; the two arms never contend.
pub struct LinkQueue {
    arm: Arm,
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    writer: Option<Arc<dyn LinkWriter>>,
    target: Option<WriteTarget>,
    pending: VecDeque<Arc<WriteBatch>>,
    active: Option<Arc<WriteBatch>>,
    in_flight: Option<InFlightWrite>,
    last_error: Option<String>,
}

/// Outcome of [`LinkQueue::enqueue`].
#[derive(Debug)]
pub enum Enqueued {
    /// No link is bound; the batch was not queued.
    MissingTarget(&'static str),
    /// The link was idle. The batch is active and packet 0 must be issued.
    StartNow,
    /// The batch is waiting behind the active one.
    Queued(QueueSnapshot),
}

/// Everything needed to perform one write outside the lock.
pub enum IssuePlan {
    Write {
        writer: Arc<dyn LinkWriter>,
        target: WriteTarget,
        payload: Bytes,
    },
    /// The batch is no longer the in-flight one (cancelled or replaced); it
    /// has already been resolved by whoever removed it. Unbinding always
    /// clears the in-flight slot, so a missing link lands here too.
    Superseded,
}

/// What a completion signal did to the queue.
#[derive(Debug)]
pub enum Completion {
    /// Not for this queue's current binding, or nothing was in flight.
    Ignored(&'static str),
    /// The in-flight packet failed. The batch and everything behind it are out.
    Failed {
        batch: Arc<WriteBatch>,
        message: String,
        aborted: Vec<Arc<WriteBatch>>,
    },
    /// The packet landed and the same batch has another one to send.
    Advanced {
        batch: Arc<WriteBatch>,
        next_index: usize,
    },
    /// The batch's last packet landed. `next` is the batch promoted to active.
    Finished {
        batch: Arc<WriteBatch>,
        next: Option<Arc<WriteBatch>>,
    },
}

/// Batches removed by an immediate (synchronous) failure.
#[derive(Debug)]
pub struct Aborted {
    /// The remaining pending batches, in FIFO order.
    pub drained: Vec<Arc<WriteBatch>>,
}

impl LinkQueue {
    pub fn new(arm: Arm) -> Self {
        Self {
            arm,
            state: Mutex::new(QueueState::default()),
        }
    }

    pub fn arm(&self) -> Arm {
        self.arm
    }

    /// Replace the bound link. When either half is absent the queue is
    /// emptied in the same critical section and the cancelled batches
    /// (active first, then pending in order) are returned for resolution.
    pub fn bind(
        &self,
        writer: Option<Arc<dyn LinkWriter>>,
        target: Option<WriteTarget>,
        reason: &str,
    ) -> Vec<Arc<WriteBatch>> {
        let mut state = self.state.lock();
        let unavailable = writer.is_none() || target.is_none();
        state.writer = writer;
        state.target = target;
        if unavailable {
            state.last_error = Some(format!("{reason}: link unavailable"));
            state.take_all()
        } else {
            state.last_error = None;
            Vec::new()
        }
    }

    /// Admit a batch. The bound-target check and the idle check happen
    /// under one lock acquisition.
    pub fn enqueue(&self, batch: Arc<WriteBatch>) -> Enqueued {
        let mut state = self.state.lock();
        let missing = if state.writer.is_none() {
            Some("link not connected")
        } else if state.target.is_none() {
            Some("write target missing")
        } else {
            None
        };
        if let Some(missing) = missing {
            state.last_error = Some(missing.to_string());
            return Enqueued::MissingTarget(missing);
        }

        if state.active.is_none() && state.in_flight.is_none() {
            state.in_flight = Some(InFlightWrite::new(batch.clone(), 0));
            state.active = Some(batch);
            Enqueued::StartNow
        } else {
            state.pending.push_back(batch);
            Enqueued::Queued(state.snapshot())
        }
    }

    /// Empty the pending FIFO. The active batch is left alone.
    pub fn drain(&self) -> Vec<Arc<WriteBatch>> {
        self.state.lock().drain_pending()
    }

    /// Remove the active batch and every pending one, keeping the binding.
    pub fn cancel_all(&self, reason: &str) -> Vec<Arc<WriteBatch>> {
        let mut state = self.state.lock();
        state.last_error = Some(reason.to_string());
        state.take_all()
    }

    /// Read the link and payload for `packet_index` of `batch`, provided it
    /// is still the in-flight write.
    pub fn prepare_write(&self, batch: &Arc<WriteBatch>, packet_index: usize) -> IssuePlan {
        let state = self.state.lock();
        match &state.in_flight {
            Some(in_flight) if in_flight.is_for(batch, packet_index) => {}
            _ => return IssuePlan::Superseded,
        }
        match (&state.writer, &state.target, batch.packet(packet_index)) {
            (Some(writer), Some(target), Some(payload)) => IssuePlan::Write {
                writer: writer.clone(),
                target: target.clone(),
                payload: payload.clone(),
            },
            _ => IssuePlan::Superseded,
        }
    }

    /// Apply a transport completion signal.
    pub fn complete(&self, target: &WriteTarget, status: WriteStatus) -> Completion {
        let mut state = self.state.lock();
        if state.target.as_ref() != Some(target) {
            return Completion::Ignored("completion for a target that is not bound");
        }
        let Some(in_flight) = state.in_flight.take() else {
            return Completion::Ignored("completion with no write in flight");
        };
        let batch = in_flight.batch.clone();

        if !status.is_success() {
            let message = format!(
                "{} {}: write failed with status {status}",
                self.arm, batch.label
            );
            state.last_error = Some(message.clone());
            state.active = None;
            let aborted = state.drain_pending();
            return Completion::Failed {
                batch,
                message,
                aborted,
            };
        }

        if let Some(packet) = batch.packet(in_flight.packet_index) {
            batch.record_written(packet.len());
        }

        if !in_flight.is_last() {
            let next_index = in_flight.packet_index + 1;
            state.in_flight = Some(InFlightWrite::new(batch.clone(), next_index));
            return Completion::Advanced { batch, next_index };
        }

        state.active = None;
        state.last_error = None;
        let next = state.pending.pop_front();
        if let Some(next) = &next {
            state.active = Some(next.clone());
            state.in_flight = Some(InFlightWrite::new(next.clone(), 0));
        }
        Completion::Finished { batch, next }
    }

    /// Take `batch` out of the queue after a synchronous refusal, clear the
    /// in-flight slot and drain everything pending behind it.
    ///
    /// Returns `None` when the batch is no longer queued anywhere, in which
    /// case it was already resolved and the queue is left untouched.
    pub fn abort(&self, batch: &Arc<WriteBatch>, message: &str) -> Option<Aborted> {
        let mut state = self.state.lock();
        let was_active = state
            .active
            .as_ref()
            .is_some_and(|active| Arc::ptr_eq(active, batch));
        if was_active {
            state.active = None;
            state.in_flight = None;
        } else {
            let position = state.pending.iter().position(|b| Arc::ptr_eq(b, batch))?;
            state.pending.remove(position);
        }
        state.last_error = Some(message.to_string());
        Some(Aborted {
            drained: state.drain_pending(),
        })
    }

    pub fn has_pending_work(&self) -> bool {
        let state = self.state.lock();
        state.active.is_some() || state.in_flight.is_some() || !state.pending.is_empty()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.state.lock().snapshot()
    }
}

impl QueueState {
    fn drain_pending(&mut self) -> Vec<Arc<WriteBatch>> {
        self.pending.drain(..).collect()
    }

    fn take_all(&mut self) -> Vec<Arc<WriteBatch>> {
        let mut cancelled = Vec::with_capacity(self.pending.len() + 1);
        let in_flight = self.in_flight.take().map(|w| w.batch);
        let active = self.active.take();
        if let Some(batch) = active.or(in_flight) {
            cancelled.push(batch);
        }
        cancelled.extend(self.drain_pending());
        cancelled
    }

    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            target: self.target.clone(),
            active: self.active.as_ref().map(|batch| ActiveEntry {
                label: batch.label.clone(),
                packet_index: self
                    .in_flight
                    .as_ref()
                    .map(|w| w.packet_index as i64)
                    .unwrap_or(-1),
                packets: batch.packet_count(),
                bytes_written: batch.bytes_written(),
            }),
            pending: self.pending.iter().map(|b| b.label.clone()).collect(),
            last_error: self.last_error.clone(),
        }
    }
}

/// Read-only view of a queue, for logs and status output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub target: Option<WriteTarget>,
    pub active: Option<ActiveEntry>,
    pub pending: Vec<String>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveEntry {
    pub label: String,
    /// Index of the packet in flight, -1 if none.
    pub packet_index: i64,
    pub packets: usize,
    pub bytes_written: usize,
}

impl QueueSnapshot {
    pub fn is_empty(&self) -> bool {
        self.active.is_none() && self.pending.is_empty()
    }
}

impl fmt::Display for QueueSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("empty");
        }
        let mut parts = Vec::with_capacity(self.pending.len() + 1);
        if let Some(active) = &self.active {
            parts.push(format!(
                "inFlight={}#{}/{}",
                active.label, active.packet_index, active.packets
            ));
        }
        parts.extend(self.pending.iter().map(|label| format!("pending={label}")));
        f.write_str(&parts.join(","))
    }
}
