//! Readiness probes and post-start initializers.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::container::engine::ContainerEngine;
use crate::container::environment::RuntimeEnvironment;

/// What a probe or initializer knows about a started container.
#[derive(Clone)]
pub struct ContainerContext {
    /// Engine identifier of the container.
    pub id: String,
    /// Host the container is reachable on from the caller.
    pub host: String,
    /// Where the caller is running.
    pub environment: RuntimeEnvironment,
    /// Engine that owns the container.
    pub engine: Arc<dyn ContainerEngine>,
}

impl std::fmt::Debug for ContainerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerContext")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

/// Asserts that a dependency is usable, not merely running.
///
/// Probes are invoked repeatedly by the retry loop, so they must be
/// idempotent: open a client, issue one trivial operation, close it.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, ctx: &ContainerContext) -> anyhow::Result<()>;
}

/// One-time setup run after the first successful health check.
#[async_trait]
pub trait Initializer: Send + Sync {
    async fn initialize(&self, ctx: &ContainerContext) -> anyhow::Result<()>;
}

/// A probe built from a zero-argument async predicate.
pub struct PredicateProbe<F> {
    predicate: F,
}

#[async_trait]
impl<F, Fut> HealthProbe for PredicateProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn probe(&self, _ctx: &ContainerContext) -> anyhow::Result<()> {
        (self.predicate)().await
    }
}

/// Wraps a zero-argument async predicate as a [`HealthProbe`].
pub fn predicate<F, Fut>(predicate: F) -> Arc<dyn HealthProbe>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(PredicateProbe { predicate })
}
