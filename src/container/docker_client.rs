//! Docker API wrapper using the bollard crate.
//!
//! `DockerEngine` implements [`ContainerEngine`] against the local Docker
//! daemon.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding as DockerPortBinding};
use bollard::Docker;
use futures::StreamExt;

use crate::container::engine::{ContainerEngine, CreateSpec, PortBinding};
use crate::error::EngineError;

/// Seconds Docker waits after SIGTERM before sending SIGKILL.
const STOP_TIMEOUT_SECS: i64 = 10;

/// Docker-backed container engine.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connects to the local Docker daemon.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::DaemonUnavailable` if the Docker daemon is not accessible.
    pub fn new() -> Result<Self, EngineError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| EngineError::DaemonUnavailable(format!("Failed to connect: {e}")))?;

        Ok(Self { docker })
    }

    /// Wraps an existing bollard Docker instance.
    pub fn from_docker(docker: Docker) -> Self {
        Self { docker }
    }
}

fn exposed_ports(ports: &[String]) -> Option<HashMap<String, HashMap<(), ()>>> {
    if ports.is_empty() {
        return None;
    }
    Some(
        ports
            .iter()
            .map(|port| (port.clone(), HashMap::new()))
            .collect(),
    )
}

fn port_bindings(bindings: &[PortBinding]) -> Option<HashMap<String, Option<Vec<DockerPortBinding>>>> {
    if bindings.is_empty() {
        return None;
    }

    let mut map: HashMap<String, Option<Vec<DockerPortBinding>>> = HashMap::new();
    for binding in bindings {
        map.entry(binding.container_port.clone())
            .or_insert_with(|| Some(Vec::new()))
            .get_or_insert_with(Vec::new)
            .push(DockerPortBinding {
                host_ip: None,
                host_port: Some(binding.host_port.clone()),
            });
    }
    Some(map)
}

/// Translates a create spec into the bollard request body.
fn container_config(spec: &CreateSpec) -> Config<String> {
    let host_config = HostConfig {
        port_bindings: port_bindings(&spec.port_bindings),
        ..Default::default()
    };

    Config {
        image: Some(spec.image.clone()),
        cmd: spec.cmd.clone(),
        env: if spec.env.is_empty() {
            None
        } else {
            Some(spec.env.clone())
        },
        exposed_ports: exposed_ports(&spec.exposed_ports),
        host_config: Some(host_config),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn image_exists(&self, image: &str) -> bool {
        self.docker.inspect_image(image).await.is_ok()
    }

    async fn pull_image(&self, image: &str) -> Result<(), EngineError> {
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            result.map_err(|e| EngineError::PullFailed {
                image: image.to_string(),
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }

    async fn create_container(&self, spec: &CreateSpec) -> Result<String, EngineError> {
        let options = spec.name.clone().map(|name| CreateContainerOptions {
            name,
            platform: None,
        });

        let response = self
            .docker
            .create_container(options, container_config(spec))
            .await
            .map_err(|e| EngineError::CreateFailed(e.to_string()))?;

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| EngineError::StartFailed {
                id: id.to_string(),
                reason: e.to_string(),
            })
    }

    async fn pause_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .pause_container(id)
            .await
            .map_err(|e| EngineError::PauseFailed {
                id: id.to_string(),
                reason: e.to_string(),
            })
    }

    async fn unpause_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .unpause_container(id)
            .await
            .map_err(|e| EngineError::UnpauseFailed {
                id: id.to_string(),
                reason: e.to_string(),
            })
    }

    /// Sends SIGTERM and waits up to ten seconds before SIGKILL.
    async fn stop_container(&self, id: &str) -> Result<(), EngineError> {
        let options = StopContainerOptions {
            t: STOP_TIMEOUT_SECS,
        };

        self.docker
            .stop_container(id, Some(options))
            .await
            .map_err(|e| EngineError::StopFailed {
                id: id.to_string(),
                reason: e.to_string(),
            })
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError> {
        let options = RemoveContainerOptions {
            force,
            v: true, // Remove anonymous volumes
            ..Default::default()
        };

        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| EngineError::RemoveFailed {
                id: id.to_string(),
                reason: e.to_string(),
            })
    }

    async fn wait_container(&self, id: &str) -> Result<i64, EngineError> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.docker.wait_container(id, Some(options));

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit as an error carrying the code
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(EngineError::WaitFailed {
                id: id.to_string(),
                reason: e.to_string(),
            }),
            None => Err(EngineError::WaitFailed {
                id: id.to_string(),
                reason: "wait stream ended without a status".to_string(),
            }),
        }
    }

    async fn internal_ip(&self, id: &str) -> Result<String, EngineError> {
        let info = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| {
                if e.to_string().contains("No such container") {
                    EngineError::ContainerNotFound { id: id.to_string() }
                } else {
                    EngineError::InspectFailed {
                        id: id.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let settings = info.network_settings.unwrap_or_default();

        // The default bridge fills the top-level address; user-defined
        // networks only report per-network addresses.
        let ip = settings
            .ip_address
            .filter(|ip| !ip.is_empty())
            .or_else(|| {
                settings.networks.and_then(|networks| {
                    networks
                        .into_values()
                        .filter_map(|endpoint| endpoint.ip_address)
                        .find(|ip| !ip.is_empty())
                })
            });

        ip.ok_or_else(|| EngineError::NoInternalAddress { id: id.to_string() })
    }
}
