//! The container engine seam.
//!
//! The lifecycle manager never talks to Docker directly; it goes through
//! `ContainerEngine` so handles can be driven by the bollard-backed
//! [`DockerEngine`](crate::container::DockerEngine) in real runs and by an
//! in-memory engine in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Publishes a container port on a host port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    /// Container port with protocol, e.g. `6379/tcp`.
    pub container_port: String,
    /// Host port the container port is published on.
    pub host_port: String,
}

impl PortBinding {
    /// Creates a binding, appending `/tcp` when the container port has no protocol.
    pub fn new(container_port: impl Into<String>, host_port: impl Into<String>) -> Self {
        Self {
            container_port: with_protocol(container_port.into()),
            host_port: host_port.into(),
        }
    }
}

/// Normalizes a port spec to `port/proto`.
pub(crate) fn with_protocol(port: String) -> String {
    if port.contains('/') {
        port
    } else {
        format!("{port}/tcp")
    }
}

/// Everything the engine needs to create one process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateSpec {
    /// Optional container name; the engine assigns one when absent.
    pub name: Option<String>,
    /// Full image reference (`repository:tag`).
    pub image: String,
    /// Environment in `KEY=VALUE` form.
    pub env: Vec<String>,
    /// Override command.
    pub cmd: Option<Vec<String>>,
    /// Exposed container ports (`port/proto`).
    pub exposed_ports: Vec<String>,
    /// Host port publications.
    pub port_bindings: Vec<PortBinding>,
}

/// Operations the lifecycle manager needs from a container runtime.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Checks if an image exists locally.
    async fn image_exists(&self, image: &str) -> bool;

    /// Pulls an image from its registry.
    async fn pull_image(&self, image: &str) -> Result<(), EngineError>;

    /// Creates a container and returns its engine-assigned identifier.
    async fn create_container(&self, spec: &CreateSpec) -> Result<String, EngineError>;

    async fn start_container(&self, id: &str) -> Result<(), EngineError>;

    async fn pause_container(&self, id: &str) -> Result<(), EngineError>;

    async fn unpause_container(&self, id: &str) -> Result<(), EngineError>;

    async fn stop_container(&self, id: &str) -> Result<(), EngineError>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError>;

    /// Blocks until the container exits and returns its exit code.
    async fn wait_container(&self, id: &str) -> Result<i64, EngineError>;

    /// Returns the container's address on the engine's internal network.
    async fn internal_ip(&self, id: &str) -> Result<String, EngineError>;
}
