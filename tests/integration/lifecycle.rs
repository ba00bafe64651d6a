use crate::*;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use glasslink_core::{Arm, FailureKind, WriteStatus, WriteTarget};
use glasslink_services::{LinkHandle, LinkWriter, WriteScheduler};

// ══════════════════════════════════════════════════════════════════════════════
//  Link lifecycle: bind, unbind, stale signals, administrative failure
// ══════════════════════════════════════════════════════════════════════════════

/// Unbinding while B1 is active and B2 pending resolves both with a
/// target-unavailable failure, and the arm is immediately idle.
#[test]
fn test_unbind_drains_active_and_pending() {
    let scheduler = WriteScheduler::shared();
    let _link = ScriptedLink::bound(&scheduler, Arm::Left);

    let b1 = scheduler.submit(Arm::Left, [packet(1, 0), packet(1, 1)], "b1");
    let b2 = scheduler.submit(Arm::Left, [packet(2, 0)], "b2");
    assert!(scheduler.has_pending_work(Arm::Left));

    scheduler.unbind(Arm::Left, "link lost");
    assert!(!scheduler.has_pending_work(Arm::Left));

    for rx in [b1, b2] {
        let result = rx.wait_blocking();
        assert_eq!(result.kind, Some(FailureKind::TargetUnavailable));
        assert_eq!(result.message(), Some("queue cleared for left: link lost"));
    }
    assert_eq!(
        scheduler.last_error(Arm::Left).as_deref(),
        Some("link lost: link unavailable")
    );
    assert!(scheduler.snapshot(Arm::Left).target.is_none());
}

/// Submitting to an unbound arm fails at once and never queues.
#[test]
fn test_submit_after_unbind_fails_fast() {
    let scheduler = WriteScheduler::shared();
    let link = ScriptedLink::bound(&scheduler, Arm::Right);
    scheduler.unbind(Arm::Right, "powered off");

    let result = scheduler.submit_batch(Arm::Right, [packet(1, 0)], "late");
    assert_eq!(result.kind, Some(FailureKind::TargetUnavailable));
    assert!(result.message().unwrap().contains("link not connected"));
    assert_eq!(link.write_count(), 0);
    assert!(!scheduler.has_pending_work(Arm::Right));
}

/// A half-bound link (writer without target) is treated as unbound.
#[test]
fn test_half_bound_link_counts_as_unavailable() {
    let scheduler = WriteScheduler::shared();
    let link = ScriptedLink::bound(&scheduler, Arm::Left);
    let pending = scheduler.submit(Arm::Left, [packet(1, 0)], "pending");

    let writer: Arc<dyn LinkWriter> = link.clone();
    scheduler.bind_target(Arm::Left, Some(writer), None, "target lost");
    assert_eq!(pending.wait_blocking().kind, Some(FailureKind::TargetUnavailable));

    let result = scheduler.submit_batch(Arm::Left, [packet(2, 0)], "no-target");
    assert!(result.message().unwrap().contains("write target missing"));
}

/// Completions from a superseded binding are ignored once a new target
/// is bound, and the new binding works normally.
#[test]
fn test_stale_completion_from_old_binding_is_ignored() {
    let scheduler = WriteScheduler::shared();
    let old = ScriptedLink::bound(&scheduler, Arm::Left);
    let doomed = scheduler.submit(Arm::Left, [packet(1, 0)], "doomed");

    // Reconnect on a different write channel.
    let fresh = ScriptedLink::new(&scheduler, Arm::Left);
    scheduler.unbind(Arm::Left, "reconnecting");
    scheduler.bind(
        Arm::Left,
        LinkHandle::new(fresh.clone(), WriteTarget::from("new-tx")),
    );
    assert_eq!(doomed.wait_blocking().kind, Some(FailureKind::TargetUnavailable));

    let mut current = scheduler.submit(Arm::Left, [packet(2, 0)], "current");
    assert_eq!(fresh.write_count(), 1);

    // The old link's late callback names the old target.
    assert!(old.ack());
    assert!(current.try_result().is_none());
    assert!(scheduler.has_pending_work(Arm::Left));

    scheduler.on_write_completed(Arm::Left, &WriteTarget::from("new-tx"), WriteStatus::SUCCESS);
    assert!(current.try_result().unwrap().is_success());
}

/// Duplicate completion signals are ignored.
#[test]
fn test_duplicate_completion_is_ignored() {
    let scheduler = WriteScheduler::shared();
    let link = ScriptedLink::bound(&scheduler, Arm::Right);
    let first = scheduler.submit(Arm::Right, [packet(1, 0)], "first");
    assert!(link.ack());
    assert!(first.wait_blocking().is_success());

    scheduler.on_write_completed(Arm::Right, &tx(), WriteStatus::SUCCESS);
    scheduler.on_write_completed(Arm::Right, &tx(), WriteStatus(133));
    assert!(scheduler.last_error(Arm::Right).is_none());

    let second = scheduler.submit(Arm::Right, [packet(2, 0)], "second");
    assert!(link.ack());
    assert!(second.wait_blocking().is_success());
}

/// `fail_queue` cancels everything on one arm and keeps the link bound.
#[test]
fn test_fail_queue_cancels_but_keeps_binding() {
    let scheduler = WriteScheduler::shared();
    let link = ScriptedLink::bound(&scheduler, Arm::Left);
    let a = scheduler.submit(Arm::Left, [packet(1, 0)], "a");
    let b = scheduler.submit(Arm::Left, [packet(2, 0)], "b");

    scheduler.fail_queue(Arm::Left, "operator abort");
    for rx in [a, b] {
        let result = rx.wait_blocking();
        assert_eq!(result.kind, Some(FailureKind::Cancelled));
        assert_eq!(result.message(), Some("operator abort"));
    }
    assert!(!scheduler.has_pending_work(Arm::Left));
    assert_eq!(scheduler.snapshot(Arm::Left).target, Some(tx()));

    // The cancelled write's completion arrives late and is dropped.
    assert!(link.ack());
    let c = scheduler.submit(Arm::Left, [packet(3, 0)], "c");
    assert!(link.ack());
    assert!(c.wait_blocking().is_success());
}

/// Rebinding a link clears the error the unbind recorded, before any batch
/// has run.
#[test]
fn test_rebind_clears_last_error() {
    let scheduler = WriteScheduler::shared();
    let link = ScriptedLink::bound(&scheduler, Arm::Left);

    scheduler.unbind(Arm::Left, "out of range");
    assert_eq!(
        scheduler.last_error(Arm::Left).as_deref(),
        Some("out of range: link unavailable")
    );

    scheduler.bind(Arm::Left, link.handle());
    assert!(scheduler.last_error(Arm::Left).is_none());
    assert_eq!(scheduler.snapshot(Arm::Left).target, Some(tx()));
    assert!(!scheduler.has_pending_work(Arm::Left));
}

/// Resubmitting while a cancelled write is still with the transport: the
/// late completion cannot be told apart from the new write's and advances
/// the new batch. Callers wait for the transport to go quiet first.
#[test]
fn test_late_completion_after_resubmit_advances_new_batch() {
    let scheduler = WriteScheduler::shared();
    let link = ScriptedLink::bound(&scheduler, Arm::Left);
    let doomed = scheduler.submit(Arm::Left, [packet(1, 0)], "doomed");
    scheduler.fail_queue(Arm::Left, "operator abort");
    assert_eq!(doomed.wait_blocking().kind, Some(FailureKind::Cancelled));

    let mut next = scheduler.submit(Arm::Left, [packet(2, 0), packet(2, 1)], "next");
    assert_eq!(link.write_count(), 2);

    // Completion for the cancelled write lands on `next`'s packet 0.
    assert!(link.ack());
    assert_eq!(link.write_count(), 3);
    assert_eq!(scheduler.snapshot(Arm::Left).to_string(), "inFlight=next#1/2");
    assert!(next.try_result().is_none());

    assert!(link.ack());
    assert!(next.try_result().unwrap().is_success());
    assert_eq!(link.ack_all(), 1);
    assert!(!scheduler.has_pending_work(Arm::Left));
}

/// A caller blocked in `submit_batch` is released by an unbind from the
/// connection manager's thread.
#[test]
fn test_unbind_releases_blocked_caller() {
    let scheduler = WriteScheduler::shared();
    let _link = ScriptedLink::bound(&scheduler, Arm::Right);

    let caller = {
        let scheduler: Arc<WriteScheduler> = scheduler.clone();
        thread::spawn(move || scheduler.submit_batch(Arm::Right, [packet(1, 0)], "blocked"))
    };
    assert!(wait_for(2_000, || scheduler.has_pending_work(Arm::Right)));
    thread::sleep(Duration::from_millis(10));

    scheduler.unbind(Arm::Right, "disconnected");
    let result = caller.join().unwrap();
    assert_eq!(result.kind, Some(FailureKind::TargetUnavailable));
}

/// An empty submission never touches the queue, even on an unbound arm.
#[test]
fn test_empty_batch_short_circuits() {
    let scheduler = WriteScheduler::shared();
    let link = ScriptedLink::bound(&scheduler, Arm::Left);
    let busy = scheduler.submit(Arm::Left, [packet(1, 0)], "busy");

    let empty = scheduler.submit_batch(Arm::Left, Vec::<Vec<u8>>::new(), "x");
    assert!(empty.is_success());
    assert_eq!((empty.packets, empty.bytes), (0, 0));
    assert!(scheduler.snapshot(Arm::Left).pending.is_empty());

    let unbound = scheduler.submit_batch(Arm::Right, Vec::<Vec<u8>>::new(), "x");
    assert!(unbound.is_success());
    assert!(scheduler.last_error(Arm::Right).is_none());

    assert!(link.ack());
    assert!(busy.wait_blocking().is_success());
}

/// Snapshots are read-only and serialize the shape the status command prints.
#[test]
fn test_snapshot_reports_without_mutating() -> anyhow::Result<()> {
    let scheduler = WriteScheduler::shared();
    let link = ScriptedLink::bound(&scheduler, Arm::Right);
    let _a = scheduler.submit(Arm::Right, [packet(1, 0), packet(1, 1)], "a");
    let _b = scheduler.submit(Arm::Right, [packet(2, 0)], "b");
    assert!(link.ack());

    let first = scheduler.snapshot(Arm::Right);
    assert_eq!(first, scheduler.snapshot(Arm::Right));
    assert_eq!(first.to_string(), "inFlight=a#1/2,pending=b");

    let json = serde_json::to_value(&first)?;
    assert_eq!(json["target"], TX);
    assert_eq!(json["active"]["label"], "a");
    assert_eq!(json["active"]["packet_index"], 1);
    assert_eq!(json["active"]["bytes_written"], 4);
    assert_eq!(json["pending"], serde_json::json!(["b"]));
    assert!(json["last_error"].is_null());

    assert_eq!(link.write_count(), 2);
    assert_eq!(link.ack_all(), 2);
    assert!(scheduler.snapshot(Arm::Right).is_empty());
    Ok(())
}
