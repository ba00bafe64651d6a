//! Link-level primitives shared between the scheduler and a transport.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of the write channel on a link (the characteristic the
/// packets are written to). Completion signals carry one of these and are
/// ignored unless it matches the target currently bound to the arm.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WriteTarget(String);

impl WriteTarget {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WriteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WriteTarget {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Transport status code delivered with a write completion.
/// Zero is success; everything else is transport specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WriteStatus(pub i32);

impl WriteStatus {
    pub const SUCCESS: WriteStatus = WriteStatus(0);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl fmt::Display for WriteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
