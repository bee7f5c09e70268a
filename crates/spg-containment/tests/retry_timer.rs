//! Timer behaviour of the fault boundary on a paused clock.

use pretty_assertions::assert_eq;
use spg_containment::{
    BoundaryConfig, ContainmentState, FaultBoundary, PreviewFault, RecoverySurface,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DELAY: Duration = Duration::from_millis(500);

fn boundary() -> FaultBoundary {
    FaultBoundary::new(BoundaryConfig::default()).unwrap()
}

/// Tenet: scenario E, fault then recovery then a second fault ends terminal.
#[tokio::test(start_paused = true)]
async fn one_recovery_then_manual_reload() {
    let boundary = boundary();

    assert_eq!(
        boundary.record_fault(PreviewFault::runtime("undefined is not a function")),
        ContainmentState::Retrying
    );
    assert_eq!(boundary.surface(), RecoverySurface::Recovering);
    assert!(boundary.has_pending_retry());

    tokio::time::sleep(DELAY - Duration::from_millis(1)).await;
    assert_eq!(boundary.state(), ContainmentState::Retrying);

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(boundary.state(), ContainmentState::Stable);
    assert!(boundary.snapshot().recovery_used);
    assert!(!boundary.has_pending_retry());

    assert_eq!(
        boundary.record_fault(PreviewFault::runtime("again")),
        ContainmentState::Terminal
    );
    tokio::time::sleep(DELAY * 4).await;
    assert_eq!(boundary.state(), ContainmentState::Terminal);
    assert!(matches!(
        boundary.surface(),
        RecoverySurface::ManualReload { .. }
    ));
}

/// Tenet: a second fault inside the retry window escalates and cancels the timer.
#[tokio::test(start_paused = true)]
async fn fault_during_retry_window_is_terminal() {
    let boundary = boundary();
    boundary.record_fault(PreviewFault::runtime("first"));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(
        boundary.record_fault(PreviewFault::runtime("second")),
        ContainmentState::Terminal
    );
    assert!(!boundary.has_pending_retry());

    tokio::time::sleep(DELAY * 2).await;
    assert_eq!(boundary.state(), ContainmentState::Terminal);
}

/// Tenet: shutting the boundary down cancels the timer before it fires.
#[tokio::test(start_paused = true)]
async fn shutdown_cancels_pending_retry() {
    let boundary = boundary();
    let mut rx = boundary.subscribe();
    boundary.record_fault(PreviewFault::mount("bad import"));
    rx.borrow_and_update();

    boundary.shutdown();
    assert!(!boundary.has_pending_retry());

    tokio::time::sleep(DELAY * 2).await;
    assert_eq!(boundary.state(), ContainmentState::Retrying);
    assert!(!rx.has_changed().unwrap());
}

/// Tenet: a dropped boundary is never mutated by its timer.
#[tokio::test(start_paused = true)]
async fn drop_releases_timer() {
    let boundary = boundary();
    let mut rx = boundary.subscribe();
    boundary.record_fault(PreviewFault::runtime("x"));
    rx.borrow_and_update();
    drop(boundary);

    tokio::time::sleep(DELAY * 2).await;
    assert_eq!(rx.borrow().state, ContainmentState::Retrying);
    assert!(rx.changed().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn custom_delay_and_observers() {
    let boundary = FaultBoundary::new(
        BoundaryConfig::default()
            .with_name("shell")
            .with_retry_delay(Duration::from_secs(2)),
    )
    .unwrap();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    boundary.on_fault(move |fault, state| {
        assert_eq!(fault.message, "boom");
        assert_eq!(state, ContainmentState::Retrying);
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let out: Option<()> = boundary.contain(|| panic!("boom"));
    assert!(out.is_none());
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    tokio::time::sleep(DELAY * 2).await;
    assert_eq!(boundary.state(), ContainmentState::Retrying);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(boundary.state(), ContainmentState::Stable);
}

#[tokio::test(start_paused = true)]
async fn terminal_boundary_runs_nothing() {
    let boundary = boundary();
    boundary.record_fault(PreviewFault::runtime("a"));
    boundary.record_fault(PreviewFault::runtime("b"));

    let ran = AtomicUsize::new(0);
    let out = boundary.contain(|| {
        ran.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    assert!(out.is_none());
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(boundary.snapshot().last_fault.unwrap().message, "b");
}

/// Tenet: every recovery edge reaches the hooks, even when nothing observes the
/// intermediate `Retrying` state on a worker thread.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn recovery_hook_fires_with_zero_delay_on_worker_threads() {
    let boundary =
        FaultBoundary::new(BoundaryConfig::default().with_retry_delay(Duration::ZERO)).unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel();
    let tx = parking_lot::Mutex::new(Some(tx));
    boundary.on_recover(move || {
        if let Some(tx) = tx.lock().take() {
            let _ = tx.send(());
        }
    });

    boundary.record_fault(PreviewFault::runtime("flaky"));
    tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .expect("recovery hook did not run")
        .unwrap();
    assert_eq!(boundary.state(), ContainmentState::Stable);
    assert!(boundary.snapshot().recovery_used);
}

/// Tenet: a boundary cannot be built without a runtime to own its timer.
#[test]
fn construction_outside_runtime_is_rejected() {
    let err = FaultBoundary::new(BoundaryConfig::default()).unwrap_err();
    assert!(matches!(err, spg_containment::ContainmentError::NoRuntime(_)));
}
