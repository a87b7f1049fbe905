//! Generic lifecycle management for dependency containers.
//!
//! This module is the core of depdock: an options model, a fixed-delay
//! retry loop, environment-aware host resolution and the container handle
//! that ties them together on top of a [`ContainerEngine`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use depdock::container::{options, Container, DockerEngine, RuntimeEnvironment};
//!
//! let engine = Arc::new(DockerEngine::new()?);
//! let mut redis = Container::with_options(
//!     engine,
//!     RuntimeEnvironment::detect(),
//!     [
//!         options::image_repository("redis"),
//!         options::image_tag("6-alpine"),
//!         options::ports([6379]),
//!     ],
//! );
//! redis.start().await?;
//! // ... run assertions against redis.host() ...
//! redis.teardown().await?;
//! ```

pub mod docker_client;
pub mod engine;
pub mod environment;
pub mod handle;
pub mod options;
pub mod probe;
pub mod retry;

#[cfg(test)]
pub(crate) mod fake;

pub use docker_client::DockerEngine;
pub use engine::{ContainerEngine, CreateSpec, PortBinding};
pub use environment::{resolve_host, RuntimeEnvironment};
pub use handle::{Container, ContainerState};
pub use options::{ContainerOption, HealthCheck, Options};
pub use probe::{predicate, ContainerContext, HealthProbe, Initializer};
pub use retry::{retry, RetryPolicy};
