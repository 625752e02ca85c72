use super::{next_attempt, Coordinator};
use crate::sidecar;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

/// Content of the sentinel file
pub const SENTINEL_CONTENT: &[u8] = b"ok";

/// How the readiness phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Readiness checking is turned off; nothing was probed or written
    Disabled,
    Ready { probes: u32, sentinel_written: bool },
    Cancelled,
}

impl Readiness {
    pub fn sentinel_written(&self) -> bool {
        matches!(
            self,
            Readiness::Ready {
                sentinel_written: true,
                ..
            }
        )
    }
}

impl Coordinator {
    /// Block until the sidecar's ready endpoint answers 200
    ///
    /// There is no retry limit; only cancellation ends the loop early. The
    /// sentinel write afterwards is best effort.
    pub async fn await_ready(&self) -> Readiness {
        let config = &self.config;
        if !config.readiness.enabled {
            info!("Sidecar ready check disabled");
            return Readiness::Disabled;
        }

        info!(
            host = %config.sidecar.host,
            port = config.sidecar.ready_port,
            path = %config.sidecar.ready_path,
            "Waiting for sidecar to be ready"
        );

        let mut probes = 0u32;
        loop {
            if !self.pace().await {
                return Readiness::Cancelled;
            }

            probes = next_attempt(probes);
            match sidecar::probe_ready(self.sidecar.as_ref(), &config.sidecar).await {
                Ok(()) => break,
                Err(e) => debug!(error = %e, attempt = probes, "Sidecar not ready yet"),
            }
        }

        info!(probes = probes, "Sidecar is ready");

        let sentinel_written = match write_sentinel(&config.readiness.sentinel_path).await {
            Ok(()) => {
                info!(path = %config.readiness.sentinel_path.display(), "Wrote ready file");
                true
            }
            Err(e) => {
                error!(
                    error = %e,
                    path = %config.readiness.sentinel_path.display(),
                    "Failed to write ready file"
                );
                false
            }
        };

        Readiness::Ready {
            probes,
            sentinel_written,
        }
    }
}

/// Write the sentinel marker (mode 0644 on unix)
pub async fn write_sentinel(path: &Path) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o644);

    let mut file = options.open(path).await?;
    file.write_all(SENTINEL_CONTENT).await?;
    file.flush().await?;
    Ok(())
}
