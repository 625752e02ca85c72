//! Kubernetes-backed status provider

use super::{PodSnapshot, StatusError, StatusProvider, TerminatedRecord};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::config::{InClusterError, KubeConfigOptions, Kubeconfig, KubeconfigError};
use kube::{Api, Client, Config};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to read kubeconfig {path}: {source}")]
    Kubeconfig {
        path: PathBuf,
        #[source]
        source: KubeconfigError,
    },

    #[error("failed to load in-cluster config: {0}")]
    InCluster(#[from] InClusterError),

    #[error("failed to create Kubernetes client: {0}")]
    Client(#[from] kube::Error),
}

/// Build the Kubernetes client used for status queries
///
/// An explicit kubeconfig path wins; otherwise the pod's service account
/// (in-cluster identity) is used. `insecure` turns off API server certificate
/// verification.
pub async fn init_kube_client(
    kubeconfig: Option<PathBuf>,
    insecure: bool,
) -> Result<Client, ClientError> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(&path).map_err(|source| {
                ClientError::Kubeconfig {
                    path: path.clone(),
                    source,
                }
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|source| ClientError::Kubeconfig { path, source })?
        }
        None => {
            info!("No kubeconfig file, using in-cluster config");
            Config::incluster()?
        }
    };

    if insecure {
        warn!("TLS verification of the Kubernetes API is disabled");
        config.accept_invalid_certs = true;
    }

    Ok(Client::try_from(config)?)
}

/// Convert a `Pod` into the snapshot the watcher evaluates
///
/// Only `status.containerStatuses` is consulted; containers without a
/// reported status are absent from the snapshot.
pub fn snapshot_from_pod(pod: &Pod, namespace: &str, name: &str) -> Result<PodSnapshot, StatusError> {
    let spec = pod.spec.as_ref().ok_or_else(|| StatusError::MissingSpec {
        namespace: namespace.to_string(),
        name: name.to_string(),
    })?;

    let first_container = spec
        .containers
        .first()
        .map(|c| c.name.clone())
        .ok_or_else(|| StatusError::NoContainers {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })?;

    let containers = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .map(|statuses| {
            statuses
                .iter()
                .map(|cs| {
                    let terminated = cs
                        .state
                        .as_ref()
                        .and_then(|state| state.terminated.as_ref())
                        .map(|t| TerminatedRecord {
                            exit_code: t.exit_code,
                        });
                    (cs.name.clone(), terminated)
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(PodSnapshot {
        first_container,
        containers,
    })
}

/// Reads pod status from the Kubernetes API
pub struct KubeStatusProvider {
    client: Client,
}

impl KubeStatusProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusProvider for KubeStatusProvider {
    async fn container_states(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<PodSnapshot, StatusError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pod = pods.get(name).await?;
        debug!(namespace = %namespace, pod = %name, "Fetched pod status");

        snapshot_from_pod(&pod, namespace, name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "kubernetes_test.rs"]
mod tests;
