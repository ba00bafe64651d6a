//! Write batches: ordered packets that succeed or fail as one unit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use glasslink_core::{Arm, FailureKind, QueueResult};

use crate::result_channel::{self, ResultReceiver, ResultSender};

/// An ordered group of packets bound for one arm.
///
/// Packets are copied at construction and never change afterwards; only the
/// byte counter moves, and only while the batch is active on its queue.
#[derive(Debug)]
pub struct WriteBatch {
    pub arm: Arm,
    pub label: String,
    packets: Vec<Bytes>,
    created_at: Instant,
    bytes_written: Arc<AtomicUsize>,
    result: ResultSender,
}

impl WriteBatch {
    /// Build a batch and the receiver its outcome will be delivered to.
    pub fn new<I, P>(arm: Arm, label: impl Into<String>, packets: I) -> (Arc<Self>, ResultReceiver)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        let label = label.into();
        let packets: Vec<Bytes> = packets
            .into_iter()
            .map(|p| Bytes::copy_from_slice(p.as_ref()))
            .collect();
        let bytes_written = Arc::new(AtomicUsize::new(0));
        let (result, receiver) =
            result_channel::channel(arm, label.clone(), packets.len(), bytes_written.clone());
        let batch = Arc::new(Self {
            arm,
            label,
            packets,
            created_at: Instant::now(),
            bytes_written,
            result,
        });
        (batch, receiver)
    }

    pub fn packet(&self, index: usize) -> Option<&Bytes> {
        self.packets.get(index)
    }

    pub fn packet_count(&self) -> usize {
        self.packets.len()
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written.load(Ordering::Acquire)
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Credit an acknowledged packet. Called under the owning queue's lock.
    pub(crate) fn record_written(&self, len: usize) -> usize {
        self.bytes_written.fetch_add(len, Ordering::AcqRel) + len
    }

    pub fn success_result(&self) -> QueueResult {
        QueueResult::success(self.arm, self.packet_count(), self.bytes_written())
    }

    pub fn failure_result(&self, kind: FailureKind, message: impl Into<String>) -> QueueResult {
        QueueResult::failure(
            self.arm,
            self.packet_count(),
            self.bytes_written(),
            kind,
            message,
        )
    }

    /// Resolve this batch's result channel. At most once; later calls are ignored.
    pub fn resolve(&self, result: QueueResult) -> bool {
        self.result.resolve(result)
    }
}

/// The packet of the active batch currently awaiting a completion signal.
/// Replaced, never mutated, as the batch advances.
#[derive(Debug, Clone)]
pub struct InFlightWrite {
    pub batch: Arc<WriteBatch>,
    pub packet_index: usize,
}

impl InFlightWrite {
    pub fn new(batch: Arc<WriteBatch>, packet_index: usize) -> Self {
        Self {
            batch,
            packet_index,
        }
    }

    pub fn is_for(&self, batch: &Arc<WriteBatch>, packet_index: usize) -> bool {
        Arc::ptr_eq(&self.batch, batch) && self.packet_index == packet_index
    }

    pub fn is_last(&self) -> bool {
        self.packet_index + 1 >= self.batch.packet_count()
    }
}
