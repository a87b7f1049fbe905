//! MySQL backend.
//!
//! The health probe also creates the configured database, so a passing
//! check means the schema the tests expect is there.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{Connection, MySqlConnection};

use crate::backends::config::{process_env, EnvReader};
use crate::backends::{join_host_port, service_port, Backend};
use crate::container::options::{self, ContainerOption};
use crate::container::{ContainerContext, HealthProbe};
use crate::error::ContainerError;

pub const MYSQL_PORT: u16 = 3306;

const PROBE_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MySqlOptions {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub database: String,
    /// Host clients connect to when not containerized.
    pub host: String,
    #[serde(skip)]
    external: bool,
}

impl Default for MySqlOptions {
    fn default() -> Self {
        Self {
            username: "root".to_string(),
            password: "my-secret-pw".to_string(),
            port: MYSQL_PORT,
            database: "db0".to_string(),
            host: "127.0.0.1".to_string(),
            external: false,
        }
    }
}

impl MySqlOptions {
    /// Loads `TEST_MYSQL_{HOST,PORT,DATABASE,USERNAME,PASSWORD}`.
    pub fn from_env() -> Result<Self, ContainerError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ContainerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let reader = EnvReader::new("mysql", lookup);
        let defaults = Self::default();

        Ok(Self {
            username: reader.string("USERNAME", &defaults.username),
            password: reader.string("PASSWORD", &defaults.password),
            port: reader.port("PORT", defaults.port)?,
            database: reader.string("DATABASE", &defaults.database),
            host: reader.string("HOST", &defaults.host),
            external: reader.has_explicit_host(),
        })
    }

    /// URL without a database path, used to create the database itself.
    fn server_url(&self, host: &str, port: u16) -> String {
        format!(
            "mysql://{}:{}@{}",
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password),
            join_host_port(host, port)
        )
    }
}

impl Backend for MySqlOptions {
    fn kind(&self) -> &'static str {
        "mysql"
    }

    fn container_port(&self) -> u16 {
        MYSQL_PORT
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
            options::image_repository("mysql"),
            options::image_tag("5.7"),
            options::env([
                format!("MYSQL_ROOT_PASSWORD={}", self.password),
                format!("MYSQL_DATABASE={}", self.database),
            ]),
            options::health_check(Arc::new(MySqlProbe(self.clone())), PROBE_DELAY),
        ]
    }

    fn endpoint(&self, host: &str, port: u16) -> String {
        format!("{}/{}", self.server_url(host, port), self.database)
    }
}

/// Connects and runs `CREATE DATABASE IF NOT EXISTS`.
struct MySqlProbe(MySqlOptions);

#[async_trait]
impl HealthProbe for MySqlProbe {
    async fn probe(&self, ctx: &ContainerContext) -> anyhow::Result<()> {
        let opts = &self.0;
        let server_url = opts.server_url(&ctx.host, service_port(opts, ctx.environment));
        tracing::debug!(host = %ctx.host, database = %opts.database, "Checking mysql status");

        let mut conn = MySqlConnection::connect(&server_url).await?;
        let statement = format!(
            "CREATE DATABASE IF NOT EXISTS `{}`",
            opts.database.replace('`', "``")
        );
        sqlx::query(&statement).execute(&mut conn).await?;
        conn.close().await?;
        Ok(())
    }
}
