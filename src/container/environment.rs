//! Runtime environment detection and endpoint host resolution.
//!
//! A test binary running inside a container cannot reach a sibling
//! container through the host's published ports; it has to use the sibling's
//! address on the engine network instead.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::container::engine::ContainerEngine;
use crate::error::EngineError;

/// Marker files whose presence means the current process runs in a container.
pub const CONTAINER_MARKERS: &[&str] = &["/.dockerenv", "/bin/running-in-container"];

/// Where the calling process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Directly on the machine running the engine.
    Host,
    /// Inside a container managed by the same engine.
    Container,
}

impl RuntimeEnvironment {
    /// Detects the environment from the well-known marker files.
    pub fn detect() -> Self {
        Self::detect_with_markers(CONTAINER_MARKERS)
    }

    /// Detects the environment from an explicit list of marker paths.
    pub fn detect_with_markers<P: AsRef<Path>>(markers: &[P]) -> Self {
        if markers.iter().any(|marker| marker.as_ref().exists()) {
            RuntimeEnvironment::Container
        } else {
            RuntimeEnvironment::Host
        }
    }

    pub fn is_inside_container(self) -> bool {
        self == RuntimeEnvironment::Container
    }
}

impl std::fmt::Display for RuntimeEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeEnvironment::Host => write!(f, "host"),
            RuntimeEnvironment::Container => write!(f, "container"),
        }
    }
}

/// Returns the host a caller in `environment` should use to reach container `id`.
///
/// Inside a container the configured host is ignored and the engine is
/// asked for the container's internal address. On the host the configured
/// host is returned untouched and the engine is not consulted.
pub async fn resolve_host(
    environment: RuntimeEnvironment,
    engine: &dyn ContainerEngine,
    id: &str,
    configured_host: &str,
) -> Result<String, EngineError> {
    match environment {
        RuntimeEnvironment::Host => Ok(configured_host.to_string()),
        RuntimeEnvironment::Container => {
            let ip = engine.internal_ip(id).await?;
            tracing::debug!(id, ip = %ip, "Resolved internal container address");
            Ok(ip)
        }
    }
}
