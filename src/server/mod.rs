//! Process-level plumbing
//!
//! Signal handling and the cancellation channel shared by the polling loops.

pub mod shutdown;

pub use shutdown::{
    handle_signals, shutdown_channel, spawn_signal_handler, ShutdownController, ShutdownSignal,
    SignalListener, SignalSource,
};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "shutdown_test.rs"]
mod shutdown_tests;
