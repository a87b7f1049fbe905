//! etcd backend.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backends::config::{process_env, EnvReader};
use crate::backends::{join_host_port, Backend, HttpProbe};
use crate::container::options::{self, ContainerOption};
use crate::error::ContainerError;

pub const ETCD_PORT: u16 = 2379;

const PROBE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EtcdOptions {
    pub host: String,
    pub port: u16,
    #[serde(skip)]
    external: bool,
}

impl Default for EtcdOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: ETCD_PORT,
            external: false,
        }
    }
}

impl EtcdOptions {
    pub fn from_env() -> Result<Self, ContainerError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ContainerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let reader = EnvReader::new("etcd", lookup);
        let defaults = Self::default();

        Ok(Self {
            host: reader.string("HOST", &defaults.host),
            port: reader.port("PORT", defaults.port)?,
            external: reader.has_explicit_host(),
        })
    }
}

impl Backend for EtcdOptions {
    fn kind(&self) -> &'static str {
        "etcd"
    }

    fn container_port(&self) -> u16 {
        ETCD_PORT
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
        let client_url = format!("http://0.0.0.0:{ETCD_PORT}");
        vec![
            options::image_repository("quay.io/coreos/etcd"),
            options::image_tag("v3.5.0"),
            options::run_command([
                "etcd".to_string(),
                "--listen-client-urls".to_string(),
                client_url.clone(),
                "--advertise-client-urls".to_string(),
                client_url,
            ]),
            options::health_check(Arc::new(HttpProbe::new(self.clone(), "/health")), PROBE_DELAY),
        ]
    }

    fn endpoint(&self, host: &str, port: u16) -> String {
        format!("http://{}", join_host_port(host, port))
    }
}
