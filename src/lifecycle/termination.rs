use super::{next_attempt, Coordinator};
use crate::status::PodSnapshot;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info};

/// State of one watched container in a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchedState {
    /// The pod reports no status under this name (not started, or misspelled)
    Missing,
    Running,
    Terminated { exit_code: i32 },
}

/// Whether a watched state counts toward completion
///
/// With `require_zero_exit`, only a clean exit counts.
pub fn is_terminal(state: WatchedState, require_zero_exit: bool) -> bool {
    match state {
        WatchedState::Terminated { exit_code } => !require_zero_exit || exit_code == 0,
        WatchedState::Missing | WatchedState::Running => false,
    }
}

/// Watched containers checked against one snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub states: BTreeMap<String, WatchedState>,
    pub require_zero_exit: bool,
}

impl Evaluation {
    pub fn terminal_count(&self) -> usize {
        self.states
            .values()
            .filter(|state| is_terminal(**state, self.require_zero_exit))
            .count()
    }

    /// True once every watched container is terminal
    pub fn is_terminated(&self) -> bool {
        !self.states.is_empty() && self.terminal_count() == self.states.len()
    }

    /// Watched containers that do not count as terminal yet
    pub fn pending(&self) -> Vec<&str> {
        self.states
            .iter()
            .filter(|(_, state)| !is_terminal(**state, self.require_zero_exit))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Build the per-container view for the watched set
///
/// Names are matched by exact string equality.
pub fn evaluate(
    snapshot: &PodSnapshot,
    watched: &BTreeSet<String>,
    require_zero_exit: bool,
) -> Evaluation {
    let states = watched
        .iter()
        .map(|name| {
            let state = match snapshot.containers.get(name) {
                None => WatchedState::Missing,
                Some(None) => WatchedState::Running,
                Some(Some(record)) => WatchedState::Terminated {
                    exit_code: record.exit_code,
                },
            };
            (name.clone(), state)
        })
        .collect();

    Evaluation {
        states,
        require_zero_exit,
    }
}

/// How the termination phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Completed { polls: u32, failed_polls: u32 },
    Cancelled { polls: u32, failed_polls: u32 },
}

impl Coordinator {
    /// Block until every watched container has terminated
    ///
    /// A failed status query counts as "not terminated yet": it is logged and
    /// retried on the next tick, whether the pod is gone or the API is down.
    /// With no explicit watch list, the first declared container from the
    /// first successful snapshot is watched; the set never changes afterwards.
    pub async fn await_termination(&self) -> Termination {
        let config = &self.config;
        let workload = &config.workload;

        info!(
            namespace = %workload.namespace,
            pod = %workload.name,
            containers = ?config.containers,
            require_zero_exit = config.require_zero_exit,
            "Waiting for watched containers to stop"
        );

        let mut watched: Option<BTreeSet<String>> = if config.containers.is_empty() {
            None
        } else {
            Some(config.containers.clone())
        };
        let mut polls = 0u32;
        let mut failed_polls = 0u32;

        loop {
            if !self.pace().await {
                return Termination::Cancelled {
                    polls,
                    failed_polls,
                };
            }

            polls = next_attempt(polls);
            let snapshot = match self
                .status
                .container_states(&workload.namespace, &workload.name)
                .await
            {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    failed_polls = next_attempt(failed_polls);
                    error!(error = %e, attempt = polls, "Failed to get pod status");
                    continue;
                }
            };

            let watched = watched.get_or_insert_with(|| {
                info!(
                    container = %snapshot.first_container,
                    "No containers configured, watching first container"
                );
                BTreeSet::from([snapshot.first_container.clone()])
            });

            let evaluation = evaluate(&snapshot, watched, config.require_zero_exit);
            debug!(
                terminated = evaluation.terminal_count(),
                watched = watched.len(),
                "Checked watched containers"
            );

            if evaluation.is_terminated() {
                break;
            }

            debug!(pending = ?evaluation.pending(), "Containers still running");
        }

        info!(polls = polls, "Watched containers stopped");

        Termination::Completed {
            polls,
            failed_polls,
        }
    }
}
