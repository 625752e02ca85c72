//! Startup configuration
//!
//! Flags (with environment fallbacks) are parsed once by `clap` into [`Args`]
//! and validated into an immutable [`Config`] that is handed to every
//! component. Nothing reads process-wide state after startup.

use clap::Parser;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("pod name is required (--pod or POD_NAME)")]
    MissingPodName,

    #[error("namespace is required (--namespace or POD_NAMESPACE)")]
    MissingNamespace,

    #[error("sidecar host cannot be empty")]
    MissingSidecarHost,

    #[error("{0} port must be greater than zero")]
    InvalidPort(&'static str),

    #[error("{0} path must start with '/': {1}")]
    InvalidPath(&'static str, String),
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "sidecar-helper",
    version,
    about = "Waits for the sidecar proxy to become ready, then stops it once the watched containers exit"
)]
pub struct Args {
    #[arg(
        long,
        env = "SIDECAR_HOST",
        default_value = "http://127.0.0.1",
        help = "Sidecar control host including scheme"
    )]
    pub sidecar_host: String,

    #[arg(
        long,
        env = "SIDECAR_READY_PORT",
        default_value_t = 18000,
        help = "Port serving the readiness endpoint"
    )]
    pub ready_port: u16,

    #[arg(
        long,
        env = "SIDECAR_QUIT_PORT",
        default_value_t = 18000,
        help = "Port serving the quit endpoint"
    )]
    pub quit_port: u16,

    #[arg(long, default_value = "/ready", help = "Endpoint to check the sidecar is ready")]
    pub ready_path: String,

    #[arg(long, default_value = "/quitquitquit", help = "Endpoint to quit the sidecar")]
    pub quit_path: String,

    #[arg(
        long,
        env = "SIDECAR_READY_CHECK",
        default_value_t = true,
        action = clap::ArgAction::Set,
        help = "Wait for the sidecar to be ready before watching containers"
    )]
    pub ready_check: bool,

    #[arg(
        long,
        env = "SIDECAR_READY_FILE",
        value_hint = clap::ValueHint::FilePath,
        default_value = "/sidecar-helper/sidecar.ready",
        help = "File written once the sidecar is ready"
    )]
    pub ready_file: PathBuf,

    #[arg(
        long,
        env = "CHECK_INTERVAL",
        default_value = "1s",
        value_parser = parse_duration_arg,
        help = "Interval between readiness probes and container status checks"
    )]
    pub check_interval: Duration,

    #[arg(
        long,
        env = "HTTP_TIMEOUT",
        default_value = "5s",
        value_parser = parse_duration_arg,
        help = "Timeout for each call to the sidecar"
    )]
    pub http_timeout: Duration,

    #[arg(long, env = "POD_NAMESPACE", default_value = "", help = "Namespace of the pod")]
    pub namespace: String,

    #[arg(long, env = "POD_NAME", default_value = "", help = "Name of the pod")]
    pub pod: String,

    #[arg(
        long,
        env = "WATCH_CONTAINERS",
        default_value = "",
        help = "Container or containers to watch, comma separated (default: first container)"
    )]
    pub containers: String,

    #[arg(long, help = "Only count containers that exited with code 0 as terminated")]
    pub require_zero_exit: bool,

    #[arg(
        long,
        env = "KUBECONFIG_PATH",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to kubeconfig file (default: in-cluster service account)"
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(long, help = "Skip TLS verification of the Kubernetes API")]
    pub insecure: bool,

    #[arg(
        long,
        env = "LOG_LEVEL",
        default_value = "info",
        value_parser = clap::value_parser!(LevelFilter),
        help = "Log level (trace, debug, info, warn, error, off)"
    )]
    pub log_level: LevelFilter,

    #[arg(long, help = "Human readable logs instead of JSON")]
    pub log_pretty: bool,

    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        help = "Include file name and line number in logs"
    )]
    pub log_report_caller: bool,
}

/// Logging options, consumed by `main` before anything else runs
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LevelFilter,
    pub pretty: bool,
    pub report_caller: bool,
}

/// How to reach the sidecar control endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarConfig {
    pub host: String,
    pub ready_port: u16,
    pub quit_port: u16,
    pub ready_path: String,
    pub quit_path: String,
    pub http_timeout: Duration,
}

/// Readiness phase settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessConfig {
    pub enabled: bool,
    pub sentinel_path: PathBuf,
}

/// Identity of the workload whose containers are watched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadRef {
    pub namespace: String,
    pub name: String,
}

/// Credential source for the status backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KubeConnection {
    pub kubeconfig: Option<PathBuf>,
    pub insecure: bool,
}

/// Validated, immutable runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub sidecar: SidecarConfig,
    pub readiness: ReadinessConfig,
    pub poll_interval: Duration,
    pub workload: WorkloadRef,
    /// Explicit watch list; empty means the workload's first declared container
    pub containers: BTreeSet<String>,
    pub require_zero_exit: bool,
    pub kube: KubeConnection,
}

impl Args {
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level,
            pretty: self.log_pretty,
            report_caller: self.log_report_caller,
        }
    }

    /// Validate the parsed flags into a [`Config`]
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let namespace = self.namespace.trim().to_string();
        if namespace.is_empty() {
            return Err(ConfigError::MissingNamespace);
        }

        let name = self.pod.trim().to_string();
        if name.is_empty() {
            return Err(ConfigError::MissingPodName);
        }

        let host = self.sidecar_host.trim().trim_end_matches('/').to_string();
        if host.is_empty() {
            return Err(ConfigError::MissingSidecarHost);
        }

        if self.ready_port == 0 {
            return Err(ConfigError::InvalidPort("ready"));
        }
        if self.quit_port == 0 {
            return Err(ConfigError::InvalidPort("quit"));
        }
        if !self.ready_path.starts_with('/') {
            return Err(ConfigError::InvalidPath("ready", self.ready_path));
        }
        if !self.quit_path.starts_with('/') {
            return Err(ConfigError::InvalidPath("quit", self.quit_path));
        }

        Ok(Config {
            sidecar: SidecarConfig {
                host,
                ready_port: self.ready_port,
                quit_port: self.quit_port,
                ready_path: self.ready_path,
                quit_path: self.quit_path,
                http_timeout: self.http_timeout,
            },
            readiness: ReadinessConfig {
                enabled: self.ready_check,
                sentinel_path: self.ready_file,
            },
            poll_interval: self.check_interval,
            workload: WorkloadRef { namespace, name },
            containers: parse_container_list(&self.containers),
            require_zero_exit: self.require_zero_exit,
            kube: KubeConnection {
                kubeconfig: self.kubeconfig,
                insecure: self.insecure,
            },
        })
    }
}

/// Split a comma separated container list
///
/// Whitespace is trimmed, empty segments are dropped and duplicates collapse.
pub fn parse_container_list(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a duration string like "500ms", "30s", "5m", "1h"
///
/// Zero durations are rejected: a zero poll interval would spin.
pub fn parse_duration(duration_str: &str) -> Option<Duration> {
    let duration_str = duration_str.trim();

    let (number_str, unit) = if let Some(ms) = duration_str.strip_suffix("ms") {
        (ms, "ms")
    } else {
        let unit = duration_str.chars().last()?;
        let split = duration_str.len() - unit.len_utf8();
        (&duration_str[..split], &duration_str[split..])
    };

    let number: u64 = number_str.parse().ok()?;
    if number == 0 {
        return None;
    }

    match unit {
        "ms" => Some(Duration::from_millis(number)),
        "s" => Some(Duration::from_secs(number)),
        "m" => number.checked_mul(60).map(Duration::from_secs),
        "h" => number.checked_mul(3600).map(Duration::from_secs),
        _ => None,
    }
}

fn parse_duration_arg(value: &str) -> Result<Duration, String> {
    parse_duration(value).ok_or_else(|| {
        format!(
            "invalid duration '{}': expected a positive number followed by ms, s, m or h",
            value
        )
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "config_test.rs"]
mod tests;
