//! Queue results: the single outcome record produced for every batch.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::arm::Arm;
use crate::link::WriteStatus;

/// Why a batch did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No link or no write target was bound when the batch was submitted,
    /// or the link was unbound while the batch was queued.
    TargetUnavailable,
    /// The transport refused a write synchronously.
    TransportRefused,
    /// The transport reported a non-success status for a written packet.
    TransportFailed,
    /// Queued behind a batch that failed; never attempted.
    CascadeAborted,
    /// Dropped by an explicit `fail_queue`.
    Cancelled,
    /// The caller stopped waiting. The batch itself is unaffected.
    WaitInterrupted,
    /// The resolving side went away without producing a result.
    ChannelClosed,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::TargetUnavailable => "target_unavailable",
            FailureKind::TransportRefused => "transport_refused",
            FailureKind::TransportFailed => "transport_failed",
            FailureKind::CascadeAborted => "cascade_aborted",
            FailureKind::Cancelled => "cancelled",
            FailureKind::WaitInterrupted => "wait_interrupted",
            FailureKind::ChannelClosed => "channel_closed",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type FailureCause = Arc<dyn StdError + Send + Sync + 'static>;

/// Immutable outcome of one write batch.
///
/// `packets` is always the size of the batch; `bytes` is how far the batch
/// got before it resolved. A failed batch never reports partial success, the
/// byte count is diagnostic only.
#[derive(Debug, Clone, Serialize)]
pub struct QueueResult {
    pub arm: Arm,
    pub success: bool,
    pub packets: usize,
    pub bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<WriteStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    #[serde(skip)]
    pub cause: Option<FailureCause>,
}

impl QueueResult {
    pub fn success(arm: Arm, packets: usize, bytes: usize) -> Self {
        Self {
            arm,
            success: true,
            packets,
            bytes,
            message: None,
            status: None,
            kind: None,
            cause: None,
        }
    }

    /// Result for an empty submission, which never reaches a queue.
    pub fn nothing_to_send(arm: Arm) -> Self {
        let mut result = Self::success(arm, 0, 0);
        result.message = Some("no packets".into());
        result
    }

    pub fn failure(
        arm: Arm,
        packets: usize,
        bytes: usize,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            arm,
            success: false,
            packets,
            bytes,
            message: Some(message.into()),
            status: None,
            kind: Some(kind),
            cause: None,
        }
    }

    pub fn with_status(mut self, status: WriteStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_cause(mut self, cause: FailureCause) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for QueueResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = if self.success { "ok" } else { "FAILED" };
        write!(
            f,
            "{} {} packets={} bytes={}",
            self.arm, outcome, self.packets, self.bytes
        )?;
        if let Some(status) = self.status {
            write!(f, " status={status}")?;
        }
        if let Some(message) = &self.message {
            write!(f, " {message}")?;
        }
        Ok(())
    }
}
