//! Sidecar lifecycle helper
//!
//! Runs next to a proxy sidecar in a pod. Waits for the sidecar to report
//! ready and signals it through a sentinel file, then watches the pod's
//! application containers and tells the sidecar to quit once they have all
//! exited.

pub mod config;
pub mod lifecycle;
pub mod server;
pub mod sidecar;
pub mod status;
