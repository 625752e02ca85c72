//! Tests for cancellation handling

use super::shutdown::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::test]
async fn test_shutdown_channel_initially_not_shutdown() {
    let (_controller, signal) = shutdown_channel();

    assert!(!signal.is_shutdown());
}

#[tokio::test]
async fn test_shutdown_channel_triggers_shutdown() {
    let (controller, signal) = shutdown_channel();

    controller.shutdown();

    assert!(signal.is_shutdown());
}

/// Test that wait completes when shutdown is triggered
#[tokio::test]
async fn test_shutdown_wait_completes_on_signal() {
    let (controller, mut signal) = shutdown_channel();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        controller.shutdown();
    });

    let result = tokio::time::timeout(Duration::from_secs(1), signal.wait()).await;

    assert!(
        result.is_ok(),
        "wait() should complete when shutdown triggered"
    );
    assert!(signal.is_shutdown());
}

/// A dropped controller must not leave waiters hanging
#[tokio::test]
async fn test_shutdown_wait_completes_when_controller_dropped() {
    let (controller, mut signal) = shutdown_channel();
    drop(controller);

    let result = tokio::time::timeout(Duration::from_secs(1), signal.wait()).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_shutdown_signal_clones_share_state() {
    let (controller, signal) = shutdown_channel();
    let signal2 = signal.clone();
    let signal3 = signal.clone();

    controller.shutdown();

    assert!(signal.is_shutdown());
    assert!(signal2.is_shutdown());
    assert!(signal3.is_shutdown());
}

fn exit_flag() -> (Arc<AtomicBool>, impl FnOnce() + Send + 'static) {
    let exited = Arc::new(AtomicBool::new(false));
    let flag = exited.clone();
    (exited, move || flag.store(true, Ordering::SeqCst))
}

/// First signal cancels, second one forces exit
#[tokio::test]
async fn test_two_stage_signal_handling() {
    let (controller, mut signal) = shutdown_channel();
    let (tx, rx) = mpsc::channel(4);
    let (exited, force_exit) = exit_flag();

    let handler = tokio::spawn(handle_signals(rx, controller, force_exit));

    tx.send("SIGTERM").await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), signal.wait())
        .await
        .expect("first signal should trigger shutdown");
    assert!(!exited.load(Ordering::SeqCst), "first signal must not exit");

    tx.send("SIGINT").await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), handler)
        .await
        .expect("handler should finish after second signal")
        .unwrap();
    assert!(exited.load(Ordering::SeqCst));
}

/// Two signals delivered back to back are both seen
#[tokio::test]
async fn test_back_to_back_signals_force_exit() {
    let (controller, signal) = shutdown_channel();
    let (tx, rx) = mpsc::channel(4);
    let (exited, force_exit) = exit_flag();

    tx.send("SIGTERM").await.unwrap();
    tx.send("SIGTERM").await.unwrap();

    tokio::time::timeout(
        Duration::from_secs(1),
        handle_signals(rx, controller, force_exit),
    )
    .await
    .expect("handler should not wait for a third signal");

    assert!(signal.is_shutdown());
    assert!(exited.load(Ordering::SeqCst));
}

/// A closed source after one signal cancels without exiting
#[tokio::test]
async fn test_single_signal_then_closed_source() {
    let (controller, signal) = shutdown_channel();
    let (tx, rx) = mpsc::channel(4);
    let (exited, force_exit) = exit_flag();

    tx.send("SIGINT").await.unwrap();
    drop(tx);

    handle_signals(rx, controller, force_exit).await;

    assert!(signal.is_shutdown());
    assert!(!exited.load(Ordering::SeqCst));
}

#[cfg(unix)]
#[tokio::test]
async fn test_signal_listener_registers() {
    assert!(SignalListener::register().is_ok());
}
