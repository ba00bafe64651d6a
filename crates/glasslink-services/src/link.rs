//! Link handle: the transport seam the scheduler writes through.
//!
//! The connection manager owns the link and binds/unbinds it per arm. The
//! scheduler only ever reads the bound handle while issuing a write, and
//! never holds a queue lock across [`LinkWriter::write`].

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use glasslink_core::WriteTarget;

/// Synchronous "accept or refuse" half of a transport write.
///
/// `Ok(())` means the transport took the packet and will report its
/// completion later through a [`crate::CompletionSink`]. `Err` is a refusal:
/// no completion will follow.
pub trait LinkWriter: Send + Sync {
    fn write(&self, target: &WriteTarget, payload: &Bytes) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("write refused by transport")]
    Refused,
    #[error("link unavailable")]
    LinkUnavailable,
    #[error("payload of {len} bytes exceeds link MTU of {max}")]
    PayloadTooLarge { len: usize, max: usize },
}

/// A bound link: the write capability plus the target it writes to.
#[derive(Clone)]
pub struct LinkHandle {
    pub writer: Arc<dyn LinkWriter>,
    pub target: WriteTarget,
}

impl LinkHandle {
    pub fn new(writer: Arc<dyn LinkWriter>, target: WriteTarget) -> Self {
        Self { writer, target }
    }
}

impl fmt::Debug for LinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkHandle")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}
