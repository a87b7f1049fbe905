//! Schema migrations run from a short-lived container.
//!
//! The migration image receives the database location through
//! `HOST`/`PORT`/`DATABASE`/`USERNAME`/`PASSWORD` and is expected to exit
//! once the schema is applied.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backends::mysql::{MySqlOptions, MYSQL_PORT};
use crate::backends::postgres::{PostgresOptions, POSTGRES_PORT};
use crate::backends::{Backend, ServiceContainer};
use crate::container::options::{self, DEFAULT_TAG};
use crate::container::{Container, ContainerContext, ContainerEngine, Initializer, RuntimeEnvironment};
use crate::error::ContainerError;

/// Host a container uses to reach services published on the Docker host.
pub const DOCKER_HOST_GATEWAY: &str = "host.docker.internal";

/// Rails environment the migration image is run with.
const RAILS_ENV: &str = "customized";

/// Which image to run and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationOptions {
    pub repository: String,
    /// Empty means `latest`.
    #[serde(default)]
    pub tag: String,
    /// Replaces the default `bundle exec rake db:migrate`.
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

impl MigrationOptions {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: String::new(),
            command: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = Some(command.into_iter().map(Into::into).collect());
        self
    }

    fn tag(&self) -> &str {
        if self.tag.is_empty() {
            DEFAULT_TAG
        } else {
            &self.tag
        }
    }

    fn command(&self) -> Vec<String> {
        match &self.command {
            Some(command) if !command.is_empty() => command.clone(),
            _ => ["bundle", "exec", "rake", "db:migrate"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Where the migration container finds the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationTarget {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl MigrationTarget {
    /// Target for a MySQL service, as seen from another container.
    pub async fn from_mysql(service: &ServiceContainer<MySqlOptions>) -> Result<Self, ContainerError> {
        let opts = service.backend();
        let credentials = Self {
            host: service.address().host.clone(),
            port: service.address().port,
            database: opts.database.clone(),
            username: opts.username.clone(),
            password: opts.password.clone(),
        };
        credentials.seen_from_container(service.container(), MYSQL_PORT).await
    }

    /// Target for a PostgreSQL service, as seen from another container.
    pub async fn from_postgres(
        service: &ServiceContainer<PostgresOptions>,
    ) -> Result<Self, ContainerError> {
        let opts = service.backend();
        let credentials = Self {
            host: service.address().host.clone(),
            port: service.address().port,
            database: opts.database.clone(),
            username: opts.username.clone(),
            password: opts.password.clone(),
        };
        credentials.seen_from_container(service.container(), POSTGRES_PORT).await
    }

    /// Rewrites the host so a sibling container can reach the database.
    ///
    /// A provisioned database is reached over the bridge network on its
    /// internal address and container port. An external database on the
    /// loopback interface is reached through the Docker host gateway.
    async fn seen_from_container(
        mut self,
        container: Option<&Container>,
        container_port: u16,
    ) -> Result<Self, ContainerError> {
        match container.and_then(|c| c.id().map(|id| (c, id))) {
            Some((container, id)) => {
                self.host = container.engine().internal_ip(id).await?;
                self.port = container_port;
            }
            None if is_loopback(&self.host) => {
                self.host = DOCKER_HOST_GATEWAY.to_string();
            }
            None => {}
        }
        Ok(self)
    }

    fn env(&self) -> Vec<String> {
        vec![
            format!("RAILS_ENV={RAILS_ENV}"),
            format!("HOST={}", self.host),
            format!("PORT={}", self.port),
            format!("DATABASE={}", self.database),
            format!("USERNAME={}", self.username),
            format!("PASSWORD={}", self.password),
        ]
    }
}

fn is_loopback(host: &str) -> bool {
    matches!(host, "127.0.0.1" | "localhost" | "::1")
}

/// Runs the migration image to completion against `target`.
///
/// # Errors
///
/// Returns the start, wait or stop error of the migration container;
/// `ContainerError::NonZeroExit` when the migration itself fails.
pub async fn run_migration(
    engine: Arc<dyn ContainerEngine>,
    environment: RuntimeEnvironment,
    target: &MigrationTarget,
    migration: &MigrationOptions,
) -> Result<(), ContainerError> {
    let span = tracing::info_span!("migration", image = %migration.repository, database = %target.database);

    let mut container = Container::with_options(
        engine,
        environment,
        [
            options::image_repository(migration.repository.clone()),
            options::image_tag(migration.tag()),
            options::env(target.env()),
            options::run_command(migration.command()),
            options::span(span.clone()),
        ],
    );

    if let Err(e) = container.start().await {
        tracing::error!(parent: &span, error = %e, "Failed to start migration container");
        if container.is_started() {
            if let Err(stop_err) = container.stop().await {
                tracing::warn!(parent: &span, error = %stop_err, "Failed to remove migration container");
            }
        }
        return Err(e);
    }

    if let Err(e) = container.wait().await {
        tracing::error!(parent: &span, error = %e, "Failed to wait for migration container");
        if let Err(stop_err) = container.stop().await {
            tracing::warn!(parent: &span, error = %stop_err, "Failed to remove migration container");
        }
        return Err(e);
    }

    container.stop().await
}

/// Runs a migration once, right after the database first becomes healthy.
pub struct MigrationInitializer {
    credentials: MigrationTarget,
    container_port: u16,
    migration: MigrationOptions,
}

impl MigrationInitializer {
    pub fn mysql(database: &MySqlOptions, migration: MigrationOptions) -> Self {
        Self {
            credentials: MigrationTarget {
                host: database.host().to_string(),
                port: database.port(),
                database: database.database.clone(),
                username: database.username.clone(),
                password: database.password.clone(),
            },
            container_port: MYSQL_PORT,
            migration,
        }
    }

    pub fn postgres(database: &PostgresOptions, migration: MigrationOptions) -> Self {
        Self {
            credentials: MigrationTarget {
                host: database.host().to_string(),
                port: database.port(),
                database: database.database.clone(),
                username: database.username.clone(),
                password: database.password.clone(),
            },
            container_port: POSTGRES_PORT,
            migration,
        }
    }
}

#[async_trait]
impl Initializer for MigrationInitializer {
    async fn initialize(&self, ctx: &ContainerContext) -> anyhow::Result<()> {
        let target = MigrationTarget {
            host: ctx.engine.internal_ip(&ctx.id).await?,
            port: self.container_port,
            ..self.credentials.clone()
        };

        run_migration(ctx.engine.clone(), ctx.environment, &target, &self.migration).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::config::lookup_from;
    use crate::container::fake::FakeEngine;

    fn target() -> MigrationTarget {
        MigrationTarget {
            host: "172.17.0.2".to_string(),
            port: 3306,
            database: "db0".to_string(),
            username: "root".to_string(),
            password: "my-secret-pw".to_string(),
        }
    }

    #[test]
    fn test_default_command_and_tag() {
        let migration = MigrationOptions::new("app/migrate");
        assert_eq!(migration.tag(), "latest");
        assert_eq!(migration.command(), vec!["bundle", "exec", "rake", "db:migrate"]);

        let custom = MigrationOptions::new("app/migrate")
            .with_tag("v2")
            .with_command(["rake", "db:setup"]);
        assert_eq!(custom.tag(), "v2");
        assert_eq!(custom.command(), vec!["rake", "db:setup"]);
    }

    #[test]
    fn test_target_env() {
        let env = target().env();
        assert_eq!(env[0], "RAILS_ENV=customized");
        assert!(env.contains(&"HOST=172.17.0.2".to_string()));
        assert!(env.contains(&"PORT=3306".to_string()));
        assert!(env.contains(&"PASSWORD=my-secret-pw".to_string()));
    }

    #[tokio::test]
    async fn test_run_migration_runs_to_completion() {
        let engine = Arc::new(FakeEngine::new());

        run_migration(
            engine.clone(),
            RuntimeEnvironment::Host,
            &target(),
            &MigrationOptions::new("app/migrate"),
        )
        .await
        .unwrap();

        assert_eq!(
            engine.calls(),
            vec![
                "create app/migrate:latest",
                "start fake-1",
                "wait fake-1",
                "stop fake-1",
                "remove fake-1",
            ]
        );
        let spec = &engine.created()[0];
        assert!(spec.env.contains(&"DATABASE=db0".to_string()));
        assert_eq!(spec.cmd.as_ref().unwrap()[0], "bundle");
    }

    #[tokio::test]
    async fn test_failed_migration_still_removes_container() {
        let engine = Arc::new(FakeEngine::new().with_exit_code(1));

        let err = run_migration(
            engine.clone(),
            RuntimeEnvironment::Host,
            &target(),
            &MigrationOptions::new("app/migrate"),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ContainerError::NonZeroExit { code: 1 }));
        assert!(engine.calls().contains(&"remove fake-1".to_string()));
    }

    #[tokio::test]
    async fn test_migration_inside_container_skips_inspection() {
        let engine = Arc::new(FakeEngine::new().failing_inspect());

        run_migration(
            engine.clone(),
            RuntimeEnvironment::Container,
            &target(),
            &MigrationOptions::new("app/migrate"),
        )
        .await
        .unwrap();

        assert_eq!(
            engine.calls(),
            vec![
                "create app/migrate:latest",
                "start fake-1",
                "wait fake-1",
                "stop fake-1",
                "remove fake-1",
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_migration_start_leaves_no_container() {
        let engine = Arc::new(FakeEngine::new().failing_start());

        let err = run_migration(
            engine.clone(),
            RuntimeEnvironment::Container,
            &target(),
            &MigrationOptions::new("app/migrate"),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ContainerError::Engine(_)));
        assert_eq!(
            engine.calls(),
            vec!["create app/migrate:latest", "start fake-1", "remove fake-1"]
        );
    }

    #[tokio::test]
    async fn test_external_loopback_uses_host_gateway() {
        let mysql = MySqlOptions::from_lookup(lookup_from(&[("TEST_MYSQL_HOST", "127.0.0.1")])).unwrap();
        let service = ServiceContainer::external(mysql);

        let target = MigrationTarget::from_mysql(&service).await.unwrap();
        assert_eq!(target.host, "host.docker.internal");
        assert_eq!(target.port, 3306);
    }

    #[tokio::test]
    async fn test_provisioned_database_uses_internal_address() {
        let mysql = MySqlOptions::from_lookup(lookup_from(&[("TEST_MYSQL_PORT", "13306")])).unwrap();
        let engine = Arc::new(FakeEngine::new().with_ip("172.17.0.5"));
        let mut service = ServiceContainer::new(
            mysql,
            engine,
            RuntimeEnvironment::Host,
            [options::health_check_with_policy(
                crate::container::predicate(|| async { Ok(()) }),
                crate::container::RetryPolicy::default(),
            )],
        );
        service.start().await.unwrap();

        let target = MigrationTarget::from_mysql(&service).await.unwrap();
        assert_eq!(target.host, "172.17.0.5");
        assert_eq!(target.port, 3306);
        assert_eq!(target.database, "db0");
    }

    #[tokio::test]
    async fn test_initializer_targets_database_container() {
        let engine = Arc::new(FakeEngine::new().with_ip("172.17.0.7"));
        let postgres = PostgresOptions::default();
        let init = MigrationInitializer::postgres(&postgres, MigrationOptions::new("app/migrate"));

        let ctx = ContainerContext {
            id: "db-1".to_string(),
            host: "127.0.0.1".to_string(),
            environment: RuntimeEnvironment::Host,
            engine: engine.clone(),
        };
        init.initialize(&ctx).await.unwrap();

        let spec = &engine.created()[0];
        assert!(spec.env.contains(&"HOST=172.17.0.7".to_string()));
        assert!(spec.env.contains(&"PORT=5432".to_string()));
        assert!(spec.env.contains(&"USERNAME=postgres".to_string()));
    }
}
