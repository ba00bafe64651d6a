//! Status report: both queues, serialized for the `status` command.

use serde::Serialize;

use glasslink_core::Arm;
use glasslink_services::{QueueSnapshot, WriteScheduler};

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub arms: Vec<ArmStatus>,
}

#[derive(Debug, Serialize)]
pub struct ArmStatus {
    pub arm: Arm,
    pub busy: bool,
    pub queue: String,
    #[serde(flatten)]
    pub snapshot: QueueSnapshot,
}

impl StatusReport {
    pub fn collect(scheduler: &WriteScheduler) -> Self {
        let arms = Arm::ALL
            .into_iter()
            .map(|arm| {
                let snapshot = scheduler.snapshot(arm);
                ArmStatus {
                    arm,
                    busy: scheduler.has_pending_work(arm),
                    queue: snapshot.to_string(),
                    snapshot,
                }
            })
            .collect();
        Self { arms }
    }
}
