//! Sidecar control endpoints
//!
//! Follows the trait-based seam used for the other external services:
//! - `SidecarControl` trait for abstraction
//! - `HttpSidecarClient` for production (one reqwest client, bounded timeout)
//! - `MockSidecar` for testing
//!
//! No retries happen here. The readiness loop retries probes itself and the
//! quit call is attempted once.

use crate::config::SidecarConfig;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SidecarError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("{method} {url} failed: {message}")]
    Transport {
        method: Method,
        url: String,
        message: String,
    },

    #[error("{method} {url} returned status {status}")]
    UnexpectedStatus {
        method: Method,
        url: String,
        status: StatusCode,
    },
}

/// Calls against the sidecar's control plane
#[async_trait]
pub trait SidecarControl: Send + Sync {
    /// Issue a single request and classify the outcome
    ///
    /// Only HTTP 200 counts as success; the response body is discarded.
    async fn invoke(&self, method: Method, port: u16, path: &str) -> Result<(), SidecarError>;
}

/// Production client talking HTTP to the sidecar
pub struct HttpSidecarClient {
    client: reqwest::Client,
    host: String,
}

impl HttpSidecarClient {
    /// Build a client whose every request is bounded by `config.http_timeout`
    pub fn new(config: &SidecarConfig) -> Result<Self, SidecarError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| SidecarError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            host: config.host.clone(),
        })
    }

    fn url(&self, port: u16, path: &str) -> String {
        format!("{}:{}{}", self.host, port, path)
    }
}

#[async_trait]
impl SidecarControl for HttpSidecarClient {
    async fn invoke(&self, method: Method, port: u16, path: &str) -> Result<(), SidecarError> {
        let url = self.url(port, path);
        debug!(method = %method, url = %url, "Calling sidecar");

        let response = self
            .client
            .request(method.clone(), &url)
            .send()
            .await
            .map_err(|e| SidecarError::Transport {
                method: method.clone(),
                url: url.clone(),
                message: if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    e.to_string()
                },
            })?;

        let status = response.status();
        // Release the connection before classifying
        drop(response);

        if status != StatusCode::OK {
            return Err(SidecarError::UnexpectedStatus {
                method,
                url,
                status,
            });
        }

        Ok(())
    }
}

/// Probe the readiness endpoint once
pub async fn probe_ready(
    sidecar: &dyn SidecarControl,
    config: &SidecarConfig,
) -> Result<(), SidecarError> {
    sidecar
        .invoke(Method::GET, config.ready_port, &config.ready_path)
        .await
}

/// Ask the sidecar to shut itself down
pub async fn quit(sidecar: &dyn SidecarControl, config: &SidecarConfig) -> Result<(), SidecarError> {
    sidecar
        .invoke(Method::POST, config.quit_port, &config.quit_path)
        .await
}

/// Mock sidecar for testing
///
/// Replays scripted responses in order; once the script runs out every call
/// succeeds. All calls are recorded for assertions.
#[cfg(test)]
pub struct MockSidecar {
    script: std::sync::Mutex<std::collections::VecDeque<Result<(), StatusCode>>>,
    calls: std::sync::Mutex<Vec<(Method, u16, String)>>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
impl MockSidecar {
    pub fn healthy() -> Self {
        Self::scripted(Vec::new())
    }

    pub fn scripted(script: Vec<Result<(), StatusCode>>) -> Self {
        Self {
            script: std::sync::Mutex::new(script.into()),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(Method, u16, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &Method) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _, _)| m == method)
            .count()
    }
}

#[cfg(test)]
#[async_trait]
#[allow(clippy::unwrap_used)]
impl SidecarControl for MockSidecar {
    async fn invoke(&self, method: Method, port: u16, path: &str) -> Result<(), SidecarError> {
        self.calls
            .lock()
            .unwrap()
            .push((method.clone(), port, path.to_string()));

        match self.script.lock().unwrap().pop_front() {
            None | Some(Ok(())) => Ok(()),
            Some(Err(status)) => Err(SidecarError::UnexpectedStatus {
                method,
                url: format!("mock:{}{}", port, path),
                status,
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "client_test.rs"]
mod tests;
