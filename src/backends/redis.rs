//! Redis backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backends::config::{process_env, EnvReader};
use crate::backends::{endpoint_for, join_host_port, Backend};
use crate::container::options::{self, ContainerOption};
use crate::container::{ContainerContext, HealthProbe};
use crate::error::ContainerError;

pub const REDIS_PORT: u16 = 6379;

const PROBE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisOptions {
    pub host: String,
    pub port: u16,
    #[serde(skip)]
    external: bool,
}

impl Default for RedisOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: REDIS_PORT,
            external: false,
        }
    }
}

impl RedisOptions {
    /// Loads `TEST_REDIS_HOST` and `TEST_REDIS_PORT`.
    pub fn from_env() -> Result<Self, ContainerError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ContainerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let reader = EnvReader::new("redis", lookup);
        let defaults = Self::default();

        Ok(Self {
            host: reader.string("HOST", &defaults.host),
            port: reader.port("PORT", defaults.port)?,
            external: reader.has_explicit_host(),
        })
    }
}

impl Backend for RedisOptions {
    fn kind(&self) -> &'static str {
        "redis"
    }

    fn container_port(&self) -> u16 {
        REDIS_PORT
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn is_external(&self) -> bool {
        self.external
    }

    fn container_options(&self) -> Vec<ContainerOption> {
        vec![
            options::image_repository("redis"),
            options::image_tag("6-alpine"),
            options::env(Vec::<String>::new()),
            options::health_check(Arc::new(RedisProbe(self.clone())), PROBE_DELAY),
        ]
    }

    fn endpoint(&self, host: &str, port: u16) -> String {
        format!("redis://{}", join_host_port(host, port))
    }
}

/// Opens a connection and issues `PING`.
struct RedisProbe(RedisOptions);

#[async_trait]
impl HealthProbe for RedisProbe {
    async fn probe(&self, ctx: &ContainerContext) -> anyhow::Result<()> {
        let url = endpoint_for(&self.0, ctx);
        tracing::debug!(url = %url, "Checking redis status");

        let client = redis::Client::open(url.as_str())?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::config::lookup_from;
    use crate::container::Options;

    #[test]
    fn test_defaults() {
        let opts = RedisOptions::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(opts.host, "localhost");
        assert_eq!(opts.port, 6379);
        assert!(!opts.is_external());
        assert_eq!(opts.endpoint(&opts.host, opts.port), "redis://localhost:6379");
    }

    #[test]
    fn test_explicit_host_is_external() {
        let opts = RedisOptions::from_lookup(lookup_from(&[
            ("TEST_REDIS_HOST", "cache.internal"),
            ("TEST_REDIS_PORT", "16379"),
        ]))
        .unwrap();

        assert!(opts.is_external());
        assert_eq!(opts.endpoint(&opts.host, opts.port), "redis://cache.internal:16379");
    }

    #[test]
    fn test_container_options() {
        let opts = Options::build(RedisOptions::default().container_options());

        assert_eq!(opts.image(), "redis:6-alpine");
        assert!(opts.env.is_empty());
        let check = opts.health_check.unwrap();
        assert_eq!(check.policy.attempts, 10);
        assert_eq!(check.policy.delay, Duration::from_secs(1));
    }
}
