//! Two-phase lifecycle driver
//!
//! 1. Readiness: poll the sidecar until it answers 200, then write the
//!    sentinel file other containers wait on.
//! 2. Termination: poll the pod status until every watched container has
//!    exited, then ask the sidecar to quit (once).
//!
//! Both loops sleep a fixed interval before each attempt and observe the
//! shutdown signal at every iteration boundary. Nothing inside a loop is
//! fatal; failures are logged and retried on the next tick.

mod pacing;
mod readiness;
mod termination;

pub use pacing::{Sleeper, TokioSleeper};
pub use readiness::{write_sentinel, Readiness, SENTINEL_CONTENT};
pub use termination::{evaluate, is_terminal, Evaluation, Termination, WatchedState};

#[cfg(test)]
pub use pacing::MockSleeper;

use crate::config::Config;
use crate::server::ShutdownSignal;
use crate::sidecar::{self, SidecarControl};
use crate::status::StatusProvider;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result of the final quit call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitOutcome {
    Sent,
    Failed,
    /// Not attempted because the run was cancelled first
    Skipped,
}

/// What a full run did, for the final log line and for tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub readiness: Readiness,
    pub termination: Option<Termination>,
    pub quit: QuitOutcome,
}

/// Runs the readiness and termination phases against injected collaborators
pub struct Coordinator {
    config: Config,
    sidecar: Arc<dyn SidecarControl>,
    status: Arc<dyn StatusProvider>,
    sleeper: Arc<dyn Sleeper>,
    shutdown: ShutdownSignal,
}

impl Coordinator {
    pub fn new(
        config: Config,
        sidecar: Arc<dyn SidecarControl>,
        status: Arc<dyn StatusProvider>,
        sleeper: Arc<dyn Sleeper>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            config,
            sidecar,
            status,
            sleeper,
            shutdown,
        }
    }

    /// Run both phases, then stop the sidecar if the watched containers exited
    ///
    /// Quit is only sent after the termination loop finishes on its own. A
    /// cancelled run leaves the sidecar alone.
    pub async fn run(&self) -> RunSummary {
        let readiness = self.await_ready().await;
        if readiness == Readiness::Cancelled {
            warn!("Cancelled while waiting for sidecar readiness");
            return RunSummary {
                readiness,
                termination: None,
                quit: QuitOutcome::Skipped,
            };
        }

        let termination = self.await_termination().await;
        let quit = match termination {
            Termination::Completed { .. } => self.quit_sidecar().await,
            Termination::Cancelled { .. } => {
                warn!("Cancelled before watched containers stopped, not sending quit");
                QuitOutcome::Skipped
            }
        };

        RunSummary {
            readiness,
            termination: Some(termination),
            quit,
        }
    }

    /// Single, unretried quit call
    async fn quit_sidecar(&self) -> QuitOutcome {
        info!(
            port = self.config.sidecar.quit_port,
            path = %self.config.sidecar.quit_path,
            "Asking sidecar to quit"
        );

        match sidecar::quit(self.sidecar.as_ref(), &self.config.sidecar).await {
            Ok(()) => QuitOutcome::Sent,
            Err(e) => {
                error!(error = %e, "Failed to quit sidecar");
                QuitOutcome::Failed
            }
        }
    }

    /// Sleep one poll interval unless cancelled
    ///
    /// Returns false once shutdown has been signalled, before or during the sleep.
    async fn pace(&self) -> bool {
        let mut shutdown = self.shutdown.clone();
        if shutdown.is_shutdown() {
            return false;
        }

        tokio::select! {
            biased;
            _ = shutdown.wait() => false,
            _ = self.sleeper.sleep(self.config.poll_interval) => !self.shutdown.is_shutdown(),
        }
    }
}

/// Advance a loop counter; sticks at the maximum instead of overflowing
fn next_attempt(count: u32) -> u32 {
    count.saturating_add(1)
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    use crate::config::{KubeConnection, ReadinessConfig, SidecarConfig, WorkloadRef};
    use std::time::Duration;

    Config {
        sidecar: SidecarConfig {
            host: "http://127.0.0.1".to_string(),
            ready_port: 15021,
            quit_port: 15000,
            ready_path: "/ready".to_string(),
            quit_path: "/quitquitquit".to_string(),
            http_timeout: Duration::from_secs(5),
        },
        readiness: ReadinessConfig {
            enabled: true,
            sentinel_path: std::env::temp_dir().join("sidecar-helper-unused.ready"),
        },
        poll_interval: Duration::from_secs(1),
        workload: WorkloadRef {
            namespace: "default".to_string(),
            name: "web-0".to_string(),
        },
        containers: Default::default(),
        require_zero_exit: false,
        kube: KubeConnection::default(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "readiness_test.rs"]
mod readiness_tests;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "termination_test.rs"]
mod termination_tests;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "driver_test.rs"]
mod driver_tests;
