//! Sleep abstraction for testable polling loops
//!
//! Production code uses `TokioSleeper` which delegates to `tokio::time::sleep`.
//! Tests use `MockSleeper` to count iterations and cancel deterministically
//! without waiting on real time.

use async_trait::async_trait;
use std::time::Duration;

/// Pauses between loop iterations
///
/// Injected into `Coordinator` so tests control pacing.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Mock sleeper for testing
///
/// Returns immediately and records every requested duration. When built with
/// `cancelling_after(n, ..)`, the n-th sleep triggers shutdown and never
/// completes, so the loop observes cancellation at that boundary.
#[cfg(test)]
pub struct MockSleeper {
    sleeps: std::sync::Mutex<Vec<Duration>>,
    cancel: Option<(usize, crate::server::ShutdownController)>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
impl MockSleeper {
    pub fn new() -> Self {
        Self {
            sleeps: std::sync::Mutex::new(Vec::new()),
            cancel: None,
        }
    }

    pub fn cancelling_after(sleeps: usize, controller: crate::server::ShutdownController) -> Self {
        Self {
            sleeps: std::sync::Mutex::new(Vec::new()),
            cancel: Some((sleeps, controller)),
        }
    }

    pub fn count(&self) -> usize {
        self.sleeps.lock().unwrap().len()
    }

    pub fn durations(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
#[allow(clippy::unwrap_used)]
impl Sleeper for MockSleeper {
    async fn sleep(&self, duration: Duration) {
        let count = {
            let mut sleeps = self.sleeps.lock().unwrap();
            sleeps.push(duration);
            sleeps.len()
        };

        if let Some((limit, controller)) = &self.cancel {
            if count >= *limit {
                controller.shutdown();
                std::future::pending::<()>().await;
            }
        }

        tokio::task::yield_now().await;
    }
}
