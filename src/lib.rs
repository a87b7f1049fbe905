//! depdock: disposable dependency containers for integration tests.
//!
//! This library starts throwaway service containers (Redis, MySQL,
//! PostgreSQL, Vault, DynamoDB Local, etcd), waits until each one is
//! actually usable, hands back an endpoint that works from wherever the
//! tests run, and tears everything down afterwards.
//!
//! ```ignore
//! use depdock::backends::{self, RedisOptions};
//!
//! let mut redis = backends::setup(RedisOptions::from_env()?).await?;
//! let client = redis::Client::open(redis.url())?;
//! // ...
//! redis.teardown().await?;
//! ```

// Core modules
pub mod backends;
pub mod cli;
pub mod container;
pub mod error;
pub mod health;

// Re-export commonly used types
pub use backends::{setup, Backend, ServiceContainer};
pub use container::{Container, ContainerState, RuntimeEnvironment};
pub use error::{ContainerError, EngineError, HealthError};
