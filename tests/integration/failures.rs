use crate::*;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use glasslink_core::{Arm, FailureKind, QueueResult, WriteStatus};
use glasslink_services::{ResultReceiver, WriteScheduler};

// ══════════════════════════════════════════════════════════════════════════════
//  Failure propagation: async failures, refusals, cascades
// ══════════════════════════════════════════════════════════════════════════════

struct ThreeBatches {
    scheduler: Arc<WriteScheduler>,
    link: Arc<ScriptedLink>,
    b1: ResultReceiver,
    b2: ResultReceiver,
    b3: ResultReceiver,
}

/// B1 active with its first packet acknowledged, B2 and B3 pending.
/// With `refuse_follow_up`, the transport refuses B1's second packet.
fn three_batches(refuse_follow_up: bool) -> ThreeBatches {
    let scheduler = WriteScheduler::shared();
    let link = ScriptedLink::bound(&scheduler, Arm::Left);
    let b1 = scheduler.submit(Arm::Left, [packet(1, 0), packet(1, 1)], "b1");
    let b2 = scheduler.submit(Arm::Left, [packet(2, 0)], "b2");
    let b3 = scheduler.submit(Arm::Left, [packet(3, 0)], "b3");
    link.set_refusing(refuse_follow_up);
    assert!(link.ack());
    ThreeBatches {
        scheduler,
        link,
        b1,
        b2,
        b3,
    }
}

/// Assert the shared outcome of a failed B1: B1 failed with `kind`, B2 and
/// B3 cascade-aborted in order, and the arm is idle.
fn assert_cascade(setup: ThreeBatches, kind: FailureKind) -> QueueResult {
    let ThreeBatches {
        scheduler,
        link,
        b1,
        b2,
        b3,
    } = setup;

    let b1 = b1.wait_blocking();
    assert!(!b1.is_success());
    assert_eq!(b1.kind, Some(kind));
    assert_eq!(b1.packets, 2);
    assert_eq!(b1.bytes, 4, "first packet was acknowledged");

    for (rx, label) in [(b2, "b2"), (b3, "b3")] {
        let result = rx.wait_blocking();
        assert!(!result.is_success(), "{label} should fail");
        assert_eq!(result.kind, Some(FailureKind::CascadeAborted), "{label}");
        assert_eq!(
            result.message(),
            Some("aborted because a previous write on left failed")
        );
        assert_eq!(result.bytes, 0);
    }

    assert!(!scheduler.has_pending_work(Arm::Left));
    assert!(scheduler.snapshot(Arm::Left).is_empty());
    assert!(scheduler.last_error(Arm::Left).is_some());

    // Neither B2 nor B3 ever reached the wire.
    let written = link.writes();
    assert!(!written.contains(&Bytes::copy_from_slice(&packet(2, 0))));
    assert!(!written.contains(&Bytes::copy_from_slice(&packet(3, 0))));
    b1
}

#[test]
fn test_async_failure_cascades_to_pending_batches() {
    let setup = three_batches(false);
    assert!(setup.link.complete(WriteStatus(133)));
    let b1 = assert_cascade(setup, FailureKind::TransportFailed);
    assert_eq!(b1.status, Some(WriteStatus(133)));
    assert!(b1.message().unwrap().contains("status 133"));
}

/// Same scenario, entered through a synchronous refusal of B1's follow-up
/// packet instead of a failure status.
#[test]
fn test_refused_follow_up_cascades_identically() {
    let setup = three_batches(true);
    assert_eq!(setup.link.outstanding.current(), 0);
    let b1 = assert_cascade(setup, FailureKind::TransportRefused);
    assert!(b1.status.is_none());
    assert!(b1.cause.is_some());
    assert!(b1.message().unwrap().contains("follow-up packet"));
}

#[test]
fn test_refused_initial_write_cascades_to_later_submissions() {
    let scheduler = WriteScheduler::shared();
    let link = ScriptedLink::bound(&scheduler, Arm::Right);

    let first = scheduler.submit(Arm::Right, [packet(1, 0)], "first");
    let second = scheduler.submit(Arm::Right, [packet(2, 0)], "second");
    link.set_refusing(true);
    assert!(link.ack());

    assert!(first.wait_blocking().is_success());
    let second = second.wait_blocking();
    assert_eq!(second.kind, Some(FailureKind::TransportRefused));
    assert!(second.message().unwrap().contains("initial packet"));
    assert!(!scheduler.has_pending_work(Arm::Right));

    // The link recovers; new work goes through.
    link.set_refusing(false);
    let third = scheduler.submit(Arm::Right, [packet(3, 0)], "third");
    assert!(link.ack());
    assert!(third.wait_blocking().is_success());
    assert!(scheduler.last_error(Arm::Right).is_none());
}

/// A completion signal arriving after the batch already failed through the
/// refusal path changes nothing: the first resolution stands.
#[test]
fn test_late_signal_after_immediate_failure_is_ignored() {
    let scheduler = WriteScheduler::shared();
    let link = ScriptedLink::bound(&scheduler, Arm::Left);
    link.set_refusing(true);

    let refused = scheduler.submit_batch(Arm::Left, [packet(1, 0)], "refused");
    assert_eq!(refused.kind, Some(FailureKind::TransportRefused));

    scheduler.on_write_completed(Arm::Left, &tx(), WriteStatus(133));
    scheduler.on_write_completed(Arm::Left, &tx(), WriteStatus::SUCCESS);
    assert!(!scheduler.has_pending_work(Arm::Left));
    assert_eq!(link.write_count(), 0);
}

/// After a failure the arm is idle but usable: the next submission starts
/// immediately without any rebind.
#[test]
fn test_arm_recovers_after_failure_without_rebind() {
    let scheduler = WriteScheduler::shared();
    let bad = Bytes::copy_from_slice(&packet(9, 0));
    let link = ThreadedLink::bound(&scheduler, Arm::Left, Duration::ZERO, vec![bad]);

    let failed = scheduler.submit_batch(Arm::Left, [packet(1, 0), packet(9, 0), packet(1, 2)], "bad");
    assert_eq!(failed.kind, Some(FailureKind::TransportFailed));
    assert_eq!(failed.bytes, 4);

    let ok = scheduler.submit_batch(Arm::Left, [packet(2, 0)], "good");
    assert!(ok.is_success());
    assert_eq!(link.writes().len(), 3);
    link.close();
}

/// Failures on one arm never touch the other.
#[test]
fn test_failure_is_confined_to_its_arm() {
    let scheduler = WriteScheduler::shared();
    let left = ScriptedLink::bound(&scheduler, Arm::Left);
    let right = ScriptedLink::bound(&scheduler, Arm::Right);

    let l1 = scheduler.submit(Arm::Left, [packet(1, 0)], "l1");
    let l2 = scheduler.submit(Arm::Left, [packet(2, 0)], "l2");
    let r1 = scheduler.submit(Arm::Right, [packet(3, 0)], "r1");
    let r2 = scheduler.submit(Arm::Right, [packet(4, 0)], "r2");

    assert!(left.complete(WriteStatus(8)));
    assert!(!l1.wait_blocking().is_success());
    assert_eq!(l2.wait_blocking().kind, Some(FailureKind::CascadeAborted));

    assert!(scheduler.has_pending_work(Arm::Right));
    assert!(scheduler.last_error(Arm::Right).is_none());
    assert_eq!(right.ack_all(), 2);
    assert!(r1.wait_blocking().is_success());
    assert!(r2.wait_blocking().is_success());
}
