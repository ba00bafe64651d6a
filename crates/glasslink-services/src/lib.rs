//! glasslink-services: per-arm write scheduling over single-outstanding-write links.
//!
//! The transport accepts one write per link at a time and reports its
//! completion later, on its own thread. [`WriteScheduler`] turns that into
//! ordered, batched delivery with one outcome per batch.

pub mod batch;
pub mod link;
pub mod loopback;
pub mod queue;
pub mod result_channel;
pub mod scheduler;

pub use batch::{InFlightWrite, WriteBatch};
pub use link::{LinkHandle, LinkWriter, TransportError};
pub use loopback::{LoopbackLink, LoopbackOptions};
pub use queue::{LinkQueue, QueueSnapshot};
pub use result_channel::{ResultReceiver, ResultSender};
pub use scheduler::{BothArms, CompletionSink, WriteScheduler};
