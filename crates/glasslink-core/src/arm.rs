//! Arm identity: the two independent links of the glasses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the two physical wireless links. Each arm owns exactly one
/// write queue; the set is fixed and never changes at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arm {
    Left,
    Right,
}

impl Arm {
    /// Both arms, left first. Iteration order for anything touching both links.
    pub const ALL: [Arm; 2] = [Arm::Left, Arm::Right];

    /// Stable slot index, used to address per-arm tables.
    pub const fn index(self) -> usize {
        match self {
            Arm::Left => 0,
            Arm::Right => 1,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Arm::Left => "left",
            Arm::Right => "right",
        }
    }
}

impl fmt::Display for Arm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown arm: {0:?} (expected \"left\" or \"right\")")]
pub struct UnknownArm(pub String);

impl FromStr for Arm {
    type Err = UnknownArm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" | "l" => Ok(Arm::Left),
            "right" | "r" => Ok(Arm::Right),
            _ => Err(UnknownArm(s.to_string())),
        }
    }
}
