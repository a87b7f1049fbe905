//! Vault backend, running the server in dev mode.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backends::config::{process_env, EnvReader};
use crate::backends::{join_host_port, Backend, HttpProbe};
use crate::container::options::{self, ContainerOption};
use crate::error::ContainerError;

pub const VAULT_PORT: u16 = 8200;
pub const DEFAULT_TOKEN: &str = "TEST-DEFAULT-TOKEN";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0";

const PROBE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultOptions {
    pub host: String,
    pub port: u16,
    /// Dev-mode root token.
    pub token: String,
    /// Address the server binds to inside the container.
    pub listen_addr: String,
    #[serde(skip)]
    external: bool,
}

impl Default for VaultOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: VAULT_PORT,
            token: DEFAULT_TOKEN.to_string(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            external: false,
        }
    }
}

impl VaultOptions {
    /// Loads `TEST_VAULT_{HOST,PORT,TOKEN}` and `TEST_LISTEN_ADDR`.
    pub fn from_env() -> Result<Self, ContainerError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ContainerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let reader = EnvReader::new("vault", lookup);
        let defaults = Self::default();

        Ok(Self {
            host: reader.string("HOST", &defaults.host),
            port: reader.port("PORT", defaults.port)?,
            token: reader.string("TOKEN", &defaults.token),
            listen_addr: reader
                .raw("TEST_LISTEN_ADDR")
                .unwrap_or(defaults.listen_addr),
            external: reader.has_explicit_host(),
        })
    }
}

impl Backend for VaultOptions {
    fn kind(&self) -> &'static str {
        "vault"
    }

    fn container_port(&self) -> u16 {
        VAULT_PORT
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
            options::image_repository("vault"),
            options::image_tag("1.0.3"),
            options::env([
                format!("VAULT_DEV_ROOT_TOKEN_ID={}", self.token),
                // the listener binds inside the container, where the port never changes
                format!(
                    "VAULT_DEV_LISTEN_ADDRESS={}",
                    join_host_port(&self.listen_addr, VAULT_PORT)
                ),
            ]),
            options::health_check(
                Arc::new(HttpProbe::new(self.clone(), "/v1/sys/health")),
                PROBE_DELAY,
            ),
        ]
    }

    fn endpoint(&self, host: &str, port: u16) -> String {
        format!("http://{}", join_host_port(host, port))
    }
}
