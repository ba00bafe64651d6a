//! glasslink-core: shared types, configuration, and payload helpers.
//! All other glasslink crates depend on this one.

pub mod arm;
pub mod config;
pub mod link;
pub mod payload;
pub mod result;

pub use arm::{Arm, UnknownArm};
pub use link::{WriteStatus, WriteTarget};
pub use result::{FailureKind, QueueResult};
