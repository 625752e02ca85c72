//! Workload status queries
//!
//! The lifecycle loops only need one read-only capability: "what state are
//! this pod's containers in right now". `StatusProvider` abstracts it so the
//! loops can be driven by `MockStatusProvider` in tests and by the Kubernetes
//! API in production.

mod kubernetes;

pub use kubernetes::{init_kube_client, snapshot_from_pod, ClientError, KubeStatusProvider};

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("pod {namespace}/{name} has no spec")]
    MissingSpec { namespace: String, name: String },

    #[error("pod {namespace}/{name} declares no containers")]
    NoContainers { namespace: String, name: String },

    #[error("status backend unavailable: {0}")]
    Unavailable(String),
}

/// Terminal record of a container that has exited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminatedRecord {
    pub exit_code: i32,
}

/// Container states of one workload at one point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSnapshot {
    /// First container declared in the workload spec
    pub first_container: String,
    /// Every container with a reported status; `None` while not terminated
    pub containers: HashMap<String, Option<TerminatedRecord>>,
}

impl PodSnapshot {
    pub fn new(first_container: impl Into<String>) -> Self {
        Self {
            first_container: first_container.into(),
            containers: HashMap::new(),
        }
    }

    pub fn running(mut self, name: impl Into<String>) -> Self {
        self.containers.insert(name.into(), None);
        self
    }

    pub fn terminated(mut self, name: impl Into<String>, exit_code: i32) -> Self {
        self.containers
            .insert(name.into(), Some(TerminatedRecord { exit_code }));
        self
    }
}

/// Read-only access to a workload's container states
#[async_trait]
pub trait StatusProvider: Send + Sync {
    async fn container_states(&self, namespace: &str, name: &str)
        -> Result<PodSnapshot, StatusError>;
}

/// Mock status provider for testing
///
/// Replays scripted results in order. After the script runs out the last
/// successful snapshot is repeated (or an error if there never was one).
#[cfg(test)]
pub struct MockStatusProvider {
    script: std::sync::Mutex<std::collections::VecDeque<Result<PodSnapshot, String>>>,
    last: std::sync::Mutex<Option<PodSnapshot>>,
    queries: std::sync::atomic::AtomicU32,
}

#[cfg(test)]
impl MockStatusProvider {
    pub fn scripted(script: Vec<Result<PodSnapshot, String>>) -> Self {
        Self {
            script: std::sync::Mutex::new(script.into()),
            last: std::sync::Mutex::new(None),
            queries: std::sync::atomic::AtomicU32::new(0),
        }
    }

    pub fn always(snapshot: PodSnapshot) -> Self {
        Self::scripted(vec![Ok(snapshot)])
    }

    pub fn queries(&self) -> u32 {
        self.queries.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl StatusProvider for MockStatusProvider {
    async fn container_states(
        &self,
        _namespace: &str,
        _name: &str,
    ) -> Result<PodSnapshot, StatusError> {
        self.queries
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let next = self
            .script
            .lock()
            .map_err(|_| StatusError::Unavailable("lock poisoned".into()))?
            .pop_front();
        let mut last = self
            .last
            .lock()
            .map_err(|_| StatusError::Unavailable("lock poisoned".into()))?;

        match next {
            Some(Ok(snapshot)) => {
                *last = Some(snapshot.clone());
                Ok(snapshot)
            }
            Some(Err(msg)) => Err(StatusError::Unavailable(msg)),
            None => last
                .clone()
                .ok_or_else(|| StatusError::Unavailable("script exhausted".into())),
        }
    }
}
