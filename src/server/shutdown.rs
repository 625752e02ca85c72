//! Cancellation plumbing for the sidecar helper
//!
//! Handles SIGTERM and SIGINT signals:
//! - First signal cancels the polling loops at their next iteration boundary
//! - Second signal, while teardown is still running, exits immediately

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Exit code used when a second signal forces termination
pub const FORCED_EXIT_CODE: i32 = 1;

/// Receiving half of the shutdown channel
///
/// Cheap to clone; every clone observes the same cancellation.
#[derive(Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Wait for shutdown signal
    pub async fn wait(&mut self) {
        while !*self.receiver.borrow() {
            if self.receiver.changed().await.is_err() {
                // Sender dropped, treat as shutdown
                break;
            }
        }
    }

    /// Check if shutdown was signaled (non-blocking)
    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }
}

/// Controller for triggering shutdown
pub struct ShutdownController {
    sender: watch::Sender<bool>,
}

impl ShutdownController {
    /// Trigger shutdown
    pub fn shutdown(&self) {
        let _ = self.sender.send(true);
        info!("Shutdown signal sent");
    }
}

/// Create a new shutdown signal pair
///
/// Returns (controller, signal) where:
/// - controller: Used to trigger shutdown
/// - signal: Cloned and passed to the polling loops
pub fn shutdown_channel() -> (ShutdownController, ShutdownSignal) {
    let (sender, receiver) = watch::channel(false);
    (ShutdownController { sender }, ShutdownSignal { receiver })
}

/// A source of process signals
///
/// Listeners stay registered for the lifetime of the source, so a signal
/// delivered between two `next_signal` calls is queued, not lost.
#[async_trait]
pub trait SignalSource: Send {
    /// Next delivered signal name; `None` once the source is closed
    async fn next_signal(&mut self) -> Option<&'static str>;
}

/// SIGTERM and SIGINT listeners, registered once
#[cfg(unix)]
pub struct SignalListener {
    sigterm: tokio::signal::unix::Signal,
    sigint: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SignalListener {
    pub fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
        })
    }
}

#[cfg(unix)]
#[async_trait]
impl SignalSource for SignalListener {
    async fn next_signal(&mut self) -> Option<&'static str> {
        tokio::select! {
            received = self.sigterm.recv() => received.map(|_| "SIGTERM"),
            received = self.sigint.recv() => received.map(|_| "SIGINT"),
        }
    }
}

/// Ctrl+C listener (Windows)
#[cfg(not(unix))]
pub struct SignalListener {
    ctrl_c: tokio::signal::windows::CtrlC,
}

#[cfg(not(unix))]
impl SignalListener {
    pub fn register() -> std::io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }
}

#[cfg(not(unix))]
#[async_trait]
impl SignalSource for SignalListener {
    async fn next_signal(&mut self) -> Option<&'static str> {
        self.ctrl_c.recv().await.map(|_| "CTRL_C")
    }
}

/// Signals forwarded over a channel
#[cfg(test)]
#[async_trait]
impl SignalSource for tokio::sync::mpsc::Receiver<&'static str> {
    async fn next_signal(&mut self) -> Option<&'static str> {
        self.recv().await
    }
}

/// Two-stage interrupt handling
///
/// The first signal triggers `controller`. The second one calls `force_exit`
/// without waiting for teardown.
pub async fn handle_signals<S, E>(mut source: S, controller: ShutdownController, force_exit: E)
where
    S: SignalSource,
    E: FnOnce() + Send,
{
    let Some(signal) = source.next_signal().await else {
        return;
    };
    error!(signal = signal, "Got interruption signal, cancelling");
    controller.shutdown();

    let Some(signal) = source.next_signal().await else {
        return;
    };
    error!(signal = signal, "Second interruption signal, exiting immediately");
    force_exit();
}

/// Install the two-stage interrupt handler for this process
///
/// Listeners are registered before returning; failing to register them is a
/// startup error. A second signal exits with [`FORCED_EXIT_CODE`].
pub fn spawn_signal_handler(controller: ShutdownController) -> std::io::Result<JoinHandle<()>> {
    let listener = SignalListener::register()?;

    Ok(tokio::spawn(handle_signals(listener, controller, || {
        std::process::exit(FORCED_EXIT_CODE);
    })))
}
