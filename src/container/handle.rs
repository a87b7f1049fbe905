//! Lifecycle management for one dependency container.
//!
//! ```text
//! UNSTARTED → RUNNING ⇄ SUSPENDED → STOPPED
//! ```
//!
//! `start` creates the process (or unpauses it), resolves the host the
//! caller should connect to when the container has an endpoint, then polls the health probe until it passes or
//! the retry budget runs out.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{Instrument, Span};

use crate::container::engine::ContainerEngine;
use crate::container::environment::{resolve_host, RuntimeEnvironment};
use crate::container::options::{ContainerOption, Options};
use crate::container::probe::ContainerContext;
use crate::error::ContainerError;

/// State of a managed container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    /// Handle exists, no engine process yet.
    Unstarted,
    /// Process created and running.
    Running,
    /// Process paused; identity kept, not reachable.
    Suspended,
    /// Process removed. Terminal.
    Stopped,
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerState::Unstarted => write!(f, "unstarted"),
            ContainerState::Running => write!(f, "running"),
            ContainerState::Suspended => write!(f, "suspended"),
            ContainerState::Stopped => write!(f, "stopped"),
        }
    }
}

/// A dependency container with lifecycle tracking.
pub struct Container {
    engine: Arc<dyn ContainerEngine>,
    environment: RuntimeEnvironment,
    options: Options,
    /// Engine identifier, present between creation and removal.
    id: Option<String>,
    state: ContainerState,
    /// Host the caller reaches the container on, set after start/resume.
    host: Option<String>,
    initialized: bool,
    started_at: Option<DateTime<Utc>>,
    span: Span,
}

impl Container {
    /// Creates an unstarted handle. No engine call is made.
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        environment: RuntimeEnvironment,
        options: Options,
    ) -> Self {
        let span = options
            .span
            .clone()
            .unwrap_or_else(|| tracing::info_span!("container", image = %options.image()));

        Self {
            engine,
            environment,
            options,
            id: None,
            state: ContainerState::Unstarted,
            host: None,
            initialized: false,
            started_at: None,
            span,
        }
    }

    /// Builds the options from `options` and creates an unstarted handle.
    pub fn with_options(
        engine: Arc<dyn ContainerEngine>,
        environment: RuntimeEnvironment,
        options: impl IntoIterator<Item = ContainerOption>,
    ) -> Self {
        Self::new(engine, environment, Options::build(options))
    }

    /// Starts or resumes the container and waits until it is healthy.
    ///
    /// # Errors
    ///
    /// - `ContainerError::Stopped` if the handle was already stopped
    /// - `ContainerError::Engine` if the engine fails to create, start,
    ///   unpause or inspect the process; a process created by this call is
    ///   removed again and the handle stays `Unstarted`
    /// - `ContainerError::HealthCheckTimeout` if the probe never passes; the
    ///   process keeps running
    /// - `ContainerError::Initializer` if the post-start initializer fails
    pub async fn start(&mut self) -> Result<(), ContainerError> {
        let created = match self.state {
            ContainerState::Stopped => return Err(ContainerError::Stopped),
            ContainerState::Running if self.host.is_some() || !self.has_endpoint() => {
                tracing::debug!(parent: &self.span, "Already running, re-validating health");
                return self.check_health().await;
            }
            ContainerState::Running => false,
            ContainerState::Suspended => {
                self.resume().await?;
                false
            }
            ContainerState::Unstarted => {
                self.create_and_start().await?;
                true
            }
        };

        if self.has_endpoint() {
            if let Err(e) = self.resolve_endpoint().await {
                tracing::error!(parent: &self.span, error = %e, "Failed to resolve container host");
                self.host = None;
                if created {
                    self.discard().await;
                }
                return Err(e);
            }
        }

        self.check_health().await?;

        if !self.initialized {
            if let Some(init) = self.options.initializer.clone() {
                let ctx = self.context()?;
                init.initialize(&ctx)
                    .instrument(self.span.clone())
                    .await
                    .map_err(ContainerError::Initializer)?;
                tracing::info!(parent: &self.span, id = %ctx.id, "Initializer completed");
            }
            self.initialized = true;
        }

        Ok(())
    }

    /// False for run-to-completion jobs: nothing exposed, probed or initialized.
    fn has_endpoint(&self) -> bool {
        !self.options.exposed_ports.is_empty()
            || !self.options.port_bindings.is_empty()
            || self.options.health_check.is_some()
            || self.options.initializer.is_some()
    }

    async fn resolve_endpoint(&mut self) -> Result<(), ContainerError> {
        let id = self.id.as_deref().ok_or(ContainerError::NotStarted)?;
        let host = resolve_host(self.environment, self.engine.as_ref(), id, &self.options.host).await?;
        tracing::info!(parent: &self.span, id, host = %host, environment = %self.environment, "Container reachable");
        self.host = Some(host);
        Ok(())
    }

    /// Force-removes a process created by this start and returns the handle
    /// to `Unstarted`.
    async fn discard(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        if let Err(e) = self.engine.remove_container(&id, true).await {
            tracing::warn!(parent: &self.span, id = %id, error = %e, "Failed to remove container after failed start");
        }
        self.host = None;
        self.started_at = None;
        self.state = ContainerState::Unstarted;
    }

    async fn create_and_start(&mut self) -> Result<(), ContainerError> {
        let image = self.options.image();
        if !self.engine.image_exists(&image).await {
            tracing::info!(parent: &self.span, image = %image, "Pulling image");
            self.engine.pull_image(&image).await?;
        }

        let id = self.engine.create_container(&self.options.create_spec()).await?;
        tracing::info!(parent: &self.span, id = %id, image = %image, "Container created");

        if let Err(e) = self.engine.start_container(&id).await {
            tracing::error!(parent: &self.span, id = %id, error = %e, "Failed to start container");
            if let Err(remove_err) = self.engine.remove_container(&id, true).await {
                tracing::warn!(parent: &self.span, id = %id, error = %remove_err, "Failed to remove container after failed start");
            }
            return Err(e.into());
        }

        tracing::info!(parent: &self.span, id = %id, "Container started");
        self.id = Some(id);
        self.state = ContainerState::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    async fn resume(&mut self) -> Result<(), ContainerError> {
        let id = self.id.clone().ok_or(ContainerError::NotStarted)?;
        self.engine.unpause_container(&id).await?;
        self.state = ContainerState::Running;
        tracing::info!(parent: &self.span, id = %id, "Container resumed");
        Ok(())
    }

    async fn check_health(&self) -> Result<(), ContainerError> {
        let Some(check) = self.options.health_check.clone() else {
            return Ok(());
        };

        let ctx = self.context()?;
        let probe = &check.probe;
        let ctx_ref = &ctx;

        let result = check
            .policy
            .run(move || probe.probe(ctx_ref))
            .instrument(self.span.clone())
            .await;

        match result {
            Ok(()) => {
                tracing::info!(parent: &self.span, id = %ctx.id, "Health check passed");
                Ok(())
            }
            Err(source) => {
                tracing::error!(parent: &self.span, id = %ctx.id, attempts = check.policy.attempts, error = %source, "Health check timed out");
                Err(ContainerError::HealthCheckTimeout {
                    attempts: check.policy.attempts,
                    source,
                })
            }
        }
    }

    /// Pauses the running process without removing it.
    pub async fn suspend(&mut self) -> Result<(), ContainerError> {
        match self.state {
            ContainerState::Unstarted | ContainerState::Stopped => Err(ContainerError::NotStarted),
            ContainerState::Suspended => Ok(()),
            ContainerState::Running => {
                let id = self.id.clone().ok_or(ContainerError::NotStarted)?;
                if let Err(e) = self.engine.pause_container(&id).await {
                    tracing::error!(parent: &self.span, id = %id, error = %e, "Failed to suspend container");
                    return Err(e.into());
                }
                self.state = ContainerState::Suspended;
                tracing::info!(parent: &self.span, id = %id, "Container suspended");
                Ok(())
            }
        }
    }

    /// Stops and removes the process. The handle cannot be started again.
    ///
    /// A graceful stop is attempted first; its failure is logged and the
    /// removal is forced.
    pub async fn stop(&mut self) -> Result<(), ContainerError> {
        let id = match (self.state, self.id.clone()) {
            (ContainerState::Running | ContainerState::Suspended, Some(id)) => id,
            _ => return Err(ContainerError::NotStarted),
        };

        if let Err(e) = self.engine.stop_container(&id).await {
            tracing::warn!(parent: &self.span, id = %id, error = %e, "Failed to stop container gracefully");
        }

        if let Err(e) = self.engine.remove_container(&id, true).await {
            tracing::error!(parent: &self.span, id = %id, error = %e, "Failed to remove container");
            return Err(e.into());
        }

        self.id = None;
        self.host = None;
        self.state = ContainerState::Stopped;
        tracing::info!(parent: &self.span, id = %id, "Container stopped");
        Ok(())
    }

    /// Stops the container if it was started.
    ///
    /// Returns `ContainerError::NotStarted` without touching the engine when
    /// the handle was never started or has already been torn down.
    pub async fn teardown(&mut self) -> Result<(), ContainerError> {
        if !self.is_started() {
            tracing::debug!(parent: &self.span, state = %self.state, "Teardown skipped");
            return Err(ContainerError::NotStarted);
        }
        self.stop().await
    }

    /// Waits for a run-to-completion container to exit.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::NonZeroExit` when the process exits with a
    /// non-zero code.
    pub async fn wait(&mut self) -> Result<(), ContainerError> {
        let id = match (self.state, self.id.clone()) {
            (ContainerState::Running | ContainerState::Suspended, Some(id)) => id,
            _ => return Err(ContainerError::NotStarted),
        };

        let code = self.engine.wait_container(&id).await?;
        if code != 0 {
            tracing::error!(parent: &self.span, id = %id, exit_code = code, "Container exited with failure");
            return Err(ContainerError::NonZeroExit { code });
        }

        tracing::info!(parent: &self.span, id = %id, "Container exited");
        Ok(())
    }

    /// Context handed to probes and initializers.
    pub fn context(&self) -> Result<ContainerContext, ContainerError> {
        match (&self.id, &self.host) {
            (Some(id), Some(host)) => Ok(ContainerContext {
                id: id.clone(),
                host: host.clone(),
                environment: self.environment,
                engine: self.engine.clone(),
            }),
            _ => Err(ContainerError::NotStarted),
        }
    }

    /// Returns the engine identifier, if the process exists.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    /// Returns the host resolved at the last start or resume.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn environment(&self) -> RuntimeEnvironment {
        self.environment
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn engine(&self) -> &Arc<dyn ContainerEngine> {
        &self.engine
    }

    /// Returns when the process was last created.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// True while the process exists (running or suspended).
    pub fn is_started(&self) -> bool {
        matches!(self.state, ContainerState::Running | ContainerState::Suspended)
    }

    pub fn is_running(&self) -> bool {
        self.state == ContainerState::Running
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("host", &self.host)
            .field("environment", &self.environment)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
