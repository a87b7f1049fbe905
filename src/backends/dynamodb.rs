//! DynamoDB Local backend. No health probe; the endpoint is usable as soon
//! as the process is up.

use serde::{Deserialize, Serialize};

use crate::backends::config::{process_env, EnvReader};
use crate::backends::{join_host_port, Backend};
use crate::container::options::{self, ContainerOption};
use crate::error::ContainerError;

pub const DYNAMODB_PORT: u16 = 8000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamoDbOptions {
    pub host: String,
    pub port: u16,
    /// Region clients should be configured with.
    pub region: String,
    #[serde(skip)]
    external: bool,
}

impl Default for DynamoDbOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DYNAMODB_PORT,
            region: "us-east-1".to_string(),
            external: false,
        }
    }
}

impl DynamoDbOptions {
    pub fn from_env() -> Result<Self, ContainerError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ContainerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let reader = EnvReader::new("dynamodb", lookup);
        let defaults = Self::default();

        Ok(Self {
            host: reader.string("HOST", &defaults.host),
            port: reader.port("PORT", defaults.port)?,
            region: reader.string("REGION", &defaults.region),
            external: reader.has_explicit_host(),
        })
    }
}

impl Backend for DynamoDbOptions {
    fn kind(&self) -> &'static str {
        "dynamodb"
    }

    fn container_port(&self) -> u16 {
        DYNAMODB_PORT
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
            options::image_repository("amazon/dynamodb-local"),
            options::image_tag("latest"),
            options::env(Vec::<String>::new()),
        ]
    }

    fn endpoint(&self, host: &str, port: u16) -> String {
        format!("http://{}", join_host_port(host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::config::lookup_from;
    use crate::container::Options;

    #[test]
    fn test_region_override() {
        let opts = DynamoDbOptions::from_lookup(lookup_from(&[("TEST_DYNAMODB_REGION", "ap-northeast-1")]))
            .unwrap();
        assert_eq!(opts.region, "ap-northeast-1");
        assert_eq!(opts.port, 8000);
    }

    #[test]
    fn test_no_health_check() {
        let opts = Options::build(DynamoDbOptions::default().container_options());
        assert_eq!(opts.image(), "amazon/dynamodb-local:latest");
        assert!(opts.health_check.is_none());
    }
}
