//! Backend adapters for the dependency services tests commonly need.
//!
//! Each backend supplies an image, the environment that configures it, a
//! health probe that performs a real operation against the service, and a
//! formatter turning a resolved host and port into a connection string.
//! [`ServiceContainer`] wires a backend to a [`Container`] handle.
//!
//! Setting `TEST_<BACKEND>_HOST` skips provisioning entirely: the returned
//! service points at the externally supplied endpoint.

pub mod config;
pub mod dynamodb;
pub mod etcd;
pub mod migration;
pub mod mysql;
pub mod postgres;
pub mod redis;
pub mod vault;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::container::options::{self, ContainerOption};
use crate::container::{
    Container, ContainerContext, ContainerEngine, DockerEngine, HealthProbe, PortBinding,
    RuntimeEnvironment,
};
use crate::error::ContainerError;

pub use self::dynamodb::DynamoDbOptions;
pub use self::etcd::EtcdOptions;
pub use self::migration::{run_migration, MigrationInitializer, MigrationOptions, MigrationTarget};
pub use self::mysql::MySqlOptions;
pub use self::postgres::PostgresOptions;
pub use self::redis::RedisOptions;
pub use self::vault::VaultOptions;

/// Timeout for a single HTTP health request.
const HTTP_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// What a dependency kind supplies to the lifecycle manager.
pub trait Backend: Clone + Send + Sync + 'static {
    /// Lowercase name; also the `TEST_<KIND>_*` prefix.
    fn kind(&self) -> &'static str;

    /// Port the service listens on inside its container.
    fn container_port(&self) -> u16;

    /// Configured host used when the caller is not containerized.
    fn host(&self) -> &str;

    /// Configured port used when the caller is not containerized.
    fn port(&self) -> u16;

    /// True when the endpoint was supplied externally.
    fn is_external(&self) -> bool;

    /// Image, tag, environment, command and health check.
    fn container_options(&self) -> Vec<ContainerOption>;

    /// Connection string for the service at `host:port`.
    fn endpoint(&self, host: &str, port: u16) -> String;
}

/// Port a caller in `environment` connects to.
///
/// On the host the container port is published on the configured port;
/// inside a container the service is reached directly on its own port.
pub fn service_port<B: Backend>(backend: &B, environment: RuntimeEnvironment) -> u16 {
    match environment {
        RuntimeEnvironment::Host => backend.port(),
        RuntimeEnvironment::Container => backend.container_port(),
    }
}

/// Exposes the container port and, on the host only, publishes it.
pub fn port_options<B: Backend>(backend: &B, environment: RuntimeEnvironment) -> Vec<ContainerOption> {
    let container_port = format!("{}/tcp", backend.container_port());
    let mut opts = vec![options::expose_ports([container_port.clone()])];
    if environment == RuntimeEnvironment::Host {
        opts.push(options::host_port_bindings([PortBinding::new(
            container_port,
            backend.port().to_string(),
        )]));
    }
    opts
}

/// Endpoint of `backend` for a probe running against a started container.
pub fn endpoint_for<B: Backend>(backend: &B, ctx: &ContainerContext) -> String {
    backend.endpoint(&ctx.host, service_port(backend, ctx.environment))
}

/// Joins host and port, bracketing IPv6 literals.
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// A resolved `(host, port)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&join_host_port(&self.host, self.port))
    }
}

/// Probe issuing `GET <endpoint><path>` and requiring a success status.
#[derive(Clone)]
pub struct HttpProbe<B> {
    backend: B,
    path: &'static str,
}

impl<B: Backend> HttpProbe<B> {
    pub fn new(backend: B, path: &'static str) -> Self {
        Self { backend, path }
    }
}

#[async_trait]
impl<B: Backend> HealthProbe for HttpProbe<B> {
    async fn probe(&self, ctx: &ContainerContext) -> anyhow::Result<()> {
        let url = format!("{}{}", endpoint_for(&self.backend, ctx), self.path);
        tracing::debug!(kind = self.backend.kind(), url = %url, "Checking service status");

        let client = reqwest::Client::builder()
            .timeout(HTTP_PROBE_TIMEOUT)
            .build()?;
        client.get(&url).send().await?.error_for_status()?;
        Ok(())
    }
}

/// A backend together with its container handle and current endpoint.
pub struct ServiceContainer<B: Backend> {
    backend: B,
    container: Option<Container>,
    address: Endpoint,
    url: String,
}

impl<B: Backend> ServiceContainer<B> {
    /// Creates an unstarted service container.
    ///
    /// `extra` options are applied last and override the backend's own.
    pub fn new(
        backend: B,
        engine: Arc<dyn ContainerEngine>,
        environment: RuntimeEnvironment,
        extra: impl IntoIterator<Item = ContainerOption>,
    ) -> Self {
        let kind = backend.kind();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let mut opts = vec![
            options::name(format!("depdock-{}-{}", kind, &suffix[..8])),
            options::host(backend.host()),
            options::span(tracing::info_span!("dependency", kind)),
        ];
        opts.extend(port_options(&backend, environment));
        opts.extend(backend.container_options());
        opts.extend(extra);

        let container = Container::with_options(engine, environment, opts);
        let address = Endpoint {
            host: backend.host().to_string(),
            port: backend.port(),
        };
        let url = backend.endpoint(&address.host, address.port);

        Self {
            backend,
            container: Some(container),
            address,
            url,
        }
    }

    /// Points at an already running service; nothing is provisioned.
    pub fn external(backend: B) -> Self {
        let address = Endpoint {
            host: backend.host().to_string(),
            port: backend.port(),
        };
        let url = backend.endpoint(&address.host, address.port);
        tracing::info!(kind = backend.kind(), url = %url, "Using external dependency");

        Self {
            backend,
            container: None,
            address,
            url,
        }
    }

    /// Starts or resumes the container and refreshes the endpoint.
    ///
    /// No-op for external services.
    pub async fn start(&mut self) -> Result<(), ContainerError> {
        let Some(container) = self.container.as_mut() else {
            return Ok(());
        };

        container.start().await?;

        if let Some(host) = container.host() {
            self.address = Endpoint {
                host: host.to_string(),
                port: service_port(&self.backend, container.environment()),
            };
            self.url = self.backend.endpoint(&self.address.host, self.address.port);
        }
        Ok(())
    }

    pub async fn suspend(&mut self) -> Result<(), ContainerError> {
        match self.container.as_mut() {
            Some(container) => container.suspend().await,
            None => Err(ContainerError::NotStarted),
        }
    }

    pub async fn stop(&mut self) -> Result<(), ContainerError> {
        match self.container.as_mut() {
            Some(container) => container.stop().await,
            None => Err(ContainerError::NotStarted),
        }
    }

    /// Releases the container. External services have nothing to release.
    pub async fn teardown(&mut self) -> Result<(), ContainerError> {
        match self.container.as_mut() {
            Some(container) => container.teardown().await,
            None => Ok(()),
        }
    }

    /// Connection string for the service.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn address(&self) -> &Endpoint {
        &self.address
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn container(&self) -> Option<&Container> {
        self.container.as_ref()
    }

    pub fn is_external(&self) -> bool {
        self.container.is_none()
    }
}

/// Provisions `backend` on the local Docker daemon, or returns the external
/// endpoint when one was configured.
pub async fn setup<B: Backend>(backend: B) -> Result<ServiceContainer<B>, ContainerError> {
    if backend.is_external() {
        return Ok(ServiceContainer::external(backend));
    }

    let engine = Arc::new(DockerEngine::new()?);
    setup_with(backend, engine, RuntimeEnvironment::detect()).await
}

/// Provisions `backend` with an explicit engine and environment.
pub async fn setup_with<B: Backend>(
    backend: B,
    engine: Arc<dyn ContainerEngine>,
    environment: RuntimeEnvironment,
) -> Result<ServiceContainer<B>, ContainerError> {
    setup_with_options(backend, engine, environment, []).await
}

/// Like [`setup_with`], applying `extra` container options last.
///
/// If the start fails the container is torn down best-effort before the
/// error is returned.
pub async fn setup_with_options<B: Backend>(
    backend: B,
    engine: Arc<dyn ContainerEngine>,
    environment: RuntimeEnvironment,
    extra: impl IntoIterator<Item = ContainerOption>,
) -> Result<ServiceContainer<B>, ContainerError> {
    if backend.is_external() {
        return Ok(ServiceContainer::external(backend));
    }

    let mut service = ServiceContainer::new(backend, engine, environment, extra);
    if let Err(e) = service.start().await {
        if let Err(cleanup) = service.teardown().await {
            tracing::debug!(error = %cleanup, "Nothing to clean up after failed setup");
        }
        return Err(e);
    }
    Ok(service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::config::lookup_from;
    use crate::container::fake::FakeEngine;
    use crate::container::ContainerState;

    #[test]
    fn test_join_host_port() {
        assert_eq!(join_host_port("127.0.0.1", 6379), "127.0.0.1:6379");
        assert_eq!(join_host_port("::1", 6379), "[::1]:6379");
        assert_eq!(join_host_port("[::1]", 6379), "[::1]:6379");
    }

    #[test]
    fn test_endpoint_display() {
        let endpoint = Endpoint {
            host: "localhost".to_string(),
            port: 8200,
        };
        assert_eq!(endpoint.to_string(), "localhost:8200");
    }

    #[test]
    fn test_port_options_publish_only_on_host() {
        let backend = DynamoDbOptions::from_lookup(lookup_from(&[("TEST_DYNAMODB_PORT", "18000")]))
            .unwrap();

        let on_host = crate::container::Options::build(port_options(&backend, RuntimeEnvironment::Host));
        assert_eq!(on_host.exposed_ports, vec!["8000/tcp".to_string()]);
        assert_eq!(on_host.port_bindings, vec![PortBinding::new("8000/tcp", "18000")]);

        let nested = crate::container::Options::build(port_options(&backend, RuntimeEnvironment::Container));
        assert_eq!(nested.exposed_ports, vec!["8000/tcp".to_string()]);
        assert!(nested.port_bindings.is_empty());
    }

    #[tokio::test]
    async fn test_service_endpoint_follows_environment() {
        let backend = DynamoDbOptions::from_lookup(lookup_from(&[("TEST_DYNAMODB_PORT", "18000")]))
            .unwrap();

        let engine = Arc::new(FakeEngine::new());
        let mut on_host = ServiceContainer::new(backend.clone(), engine, RuntimeEnvironment::Host, []);
        on_host.start().await.unwrap();
        assert_eq!(on_host.url(), "http://localhost:18000");

        let engine = Arc::new(FakeEngine::new().with_ip("172.17.0.3"));
        let mut nested = ServiceContainer::new(backend, engine, RuntimeEnvironment::Container, []);
        nested.start().await.unwrap();
        assert_eq!(nested.url(), "http://172.17.0.3:8000");
        assert_eq!(nested.address().port, 8000);
    }

    #[tokio::test]
    async fn test_external_service_is_not_provisioned() {
        let backend = DynamoDbOptions::from_lookup(lookup_from(&[("TEST_DYNAMODB_HOST", "dynamo.internal")]))
            .unwrap();
        let engine = Arc::new(FakeEngine::new());

        let mut service = setup_with(backend, engine.clone(), RuntimeEnvironment::Host)
            .await
            .unwrap();

        assert!(service.is_external());
        assert_eq!(service.url(), "http://dynamo.internal:8000");
        assert!(matches!(service.suspend().await, Err(ContainerError::NotStarted)));
        service.teardown().await.unwrap();
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_setup_with_starts_container() {
        let backend = DynamoDbOptions::from_lookup(lookup_from(&[])).unwrap();
        let engine = Arc::new(FakeEngine::new());

        let mut service = setup_with(backend, engine.clone(), RuntimeEnvironment::Host)
            .await
            .unwrap();

        let container = service.container().unwrap();
        assert_eq!(container.state(), ContainerState::Running);
        assert!(container
            .options()
            .name
            .as_deref()
            .unwrap()
            .starts_with("depdock-dynamodb-"));

        service.teardown().await.unwrap();
        assert!(matches!(service.teardown().await, Err(ContainerError::NotStarted)));
    }
}
