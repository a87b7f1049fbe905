//! Container options.
//!
//! Options are built by applying an ordered list of [`ContainerOption`]
//! values to [`Options::default`]. Each option owns a fixed set of fields;
//! when two options touch the same field the later one wins, otherwise their
//! order does not matter.
//!
//! ```ignore
//! use depdock::container::options::{self, Options};
//!
//! let opts = Options::build([
//!     options::image_repository("redis"),
//!     options::image_tag("6-alpine"),
//!     options::ports([6379]),
//! ]);
//! assert_eq!(opts.image(), "redis:6-alpine");
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::container::engine::{with_protocol, CreateSpec, PortBinding};
use crate::container::probe::{HealthProbe, Initializer};
use crate::container::retry::RetryPolicy;

/// Tag used when none (or an empty one) is given.
pub const DEFAULT_TAG: &str = "latest";

/// Host used to reach published ports when the caller is not containerized.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// A readiness probe together with the budget it is polled with.
#[derive(Clone)]
pub struct HealthCheck {
    pub probe: Arc<dyn HealthProbe>,
    pub policy: RetryPolicy,
}

/// Resolved configuration of one dependency container.
#[derive(Clone)]
pub struct Options {
    pub repository: String,
    pub tag: String,
    pub env: Vec<String>,
    pub exposed_ports: Vec<String>,
    pub port_bindings: Vec<PortBinding>,
    pub command: Option<Vec<String>>,
    pub health_check: Option<HealthCheck>,
    pub initializer: Option<Arc<dyn Initializer>>,
    pub name: Option<String>,
    /// Host used to build the endpoint when running on the host.
    pub host: String,
    /// Span every lifecycle event of the container is logged under.
    pub span: Option<tracing::Span>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            repository: String::new(),
            tag: DEFAULT_TAG.to_string(),
            env: Vec::new(),
            exposed_ports: Vec::new(),
            port_bindings: Vec::new(),
            command: None,
            health_check: None,
            initializer: None,
            name: None,
            host: DEFAULT_HOST.to_string(),
            span: None,
        }
    }
}

impl Options {
    /// Applies `options` in order to a default value.
    pub fn build(options: impl IntoIterator<Item = ContainerOption>) -> Self {
        let mut built = Self::default();
        built.apply_all(options);
        built
    }

    /// Applies further options on top of the current values.
    pub fn apply_all(&mut self, options: impl IntoIterator<Item = ContainerOption>) {
        for option in options {
            option.apply(self);
        }
    }

    /// Full image reference, `repository:tag`.
    pub fn image(&self) -> String {
        let tag = if self.tag.is_empty() {
            DEFAULT_TAG
        } else {
            &self.tag
        };
        format!("{}:{}", self.repository, tag)
    }

    /// Parameters handed to the engine when the container is created.
    pub fn create_spec(&self) -> CreateSpec {
        CreateSpec {
            name: self.name.clone(),
            image: self.image(),
            env: self.env.clone(),
            cmd: self.command.clone(),
            exposed_ports: self.exposed_ports.clone(),
            port_bindings: self.port_bindings.clone(),
        }
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("repository", &self.repository)
            .field("tag", &self.tag)
            .field("env", &self.env)
            .field("exposed_ports", &self.exposed_ports)
            .field("port_bindings", &self.port_bindings)
            .field("command", &self.command)
            .field(
                "health_check",
                &self.health_check.as_ref().map(|check| check.policy),
            )
            .field("initializer", &self.initializer.is_some())
            .field("name", &self.name)
            .field("host", &self.host)
            .finish()
    }
}

/// One configuration step. The set is closed; each variant sets only the
/// fields named in its documentation.
#[derive(Clone)]
pub enum ContainerOption {
    /// Sets `repository`.
    ImageRepository(String),
    /// Sets `tag`; empty means `latest`.
    ImageTag(String),
    /// Replaces `env`.
    Env(Vec<String>),
    /// Replaces `exposed_ports`.
    ExposePorts(Vec<String>),
    /// Replaces `port_bindings`.
    HostPortBindings(Vec<PortBinding>),
    /// Replaces both `exposed_ports` and `port_bindings`, publishing each
    /// port on the same host port.
    Ports(Vec<u16>),
    /// Sets `command`.
    RunCommand(Vec<String>),
    /// Sets `health_check`.
    HealthCheck(HealthCheck),
    /// Sets `initializer`.
    Initializer(Arc<dyn Initializer>),
    /// Sets `name`.
    Name(String),
    /// Sets `host`.
    Host(String),
    /// Sets `span`.
    Span(tracing::Span),
}

impl ContainerOption {
    pub fn apply(self, options: &mut Options) {
        match self {
            ContainerOption::ImageRepository(repository) => options.repository = repository,
            ContainerOption::ImageTag(tag) => {
                options.tag = if tag.is_empty() {
                    DEFAULT_TAG.to_string()
                } else {
                    tag
                };
            }
            ContainerOption::Env(env) => options.env = env,
            ContainerOption::ExposePorts(ports) => {
                options.exposed_ports = ports.into_iter().map(with_protocol).collect();
            }
            ContainerOption::HostPortBindings(bindings) => options.port_bindings = bindings,
            ContainerOption::Ports(ports) => {
                options.exposed_ports = ports.iter().map(|p| format!("{p}/tcp")).collect();
                options.port_bindings = ports
                    .iter()
                    .map(|p| PortBinding::new(p.to_string(), p.to_string()))
                    .collect();
            }
            ContainerOption::RunCommand(command) => options.command = Some(command),
            ContainerOption::HealthCheck(check) => options.health_check = Some(check),
            ContainerOption::Initializer(init) => options.initializer = Some(init),
            ContainerOption::Name(name) => options.name = Some(name),
            ContainerOption::Host(host) => options.host = host,
            ContainerOption::Span(span) => options.span = Some(span),
        }
    }
}

pub fn image_repository(repository: impl Into<String>) -> ContainerOption {
    ContainerOption::ImageRepository(repository.into())
}

pub fn image_tag(tag: impl Into<String>) -> ContainerOption {
    ContainerOption::ImageTag(tag.into())
}

pub fn env<I, S>(vars: I) -> ContainerOption
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ContainerOption::Env(vars.into_iter().map(Into::into).collect())
}

pub fn expose_ports<I, S>(ports: I) -> ContainerOption
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ContainerOption::ExposePorts(ports.into_iter().map(Into::into).collect())
}

pub fn host_port_bindings(bindings: impl IntoIterator<Item = PortBinding>) -> ContainerOption {
    ContainerOption::HostPortBindings(bindings.into_iter().collect())
}

pub fn ports(ports: impl IntoIterator<Item = u16>) -> ContainerOption {
    ContainerOption::Ports(ports.into_iter().collect())
}

pub fn run_command<I, S>(command: I) -> ContainerOption
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ContainerOption::RunCommand(command.into_iter().map(Into::into).collect())
}

/// Polls `probe` ten times with `delay` between attempts.
pub fn health_check(probe: Arc<dyn HealthProbe>, delay: Duration) -> ContainerOption {
    health_check_with_policy(probe, RetryPolicy::with_delay(delay))
}

pub fn health_check_with_policy(probe: Arc<dyn HealthProbe>, policy: RetryPolicy) -> ContainerOption {
    ContainerOption::HealthCheck(HealthCheck { probe, policy })
}

pub fn initializer(init: Arc<dyn Initializer>) -> ContainerOption {
    ContainerOption::Initializer(init)
}

pub fn name(name: impl Into<String>) -> ContainerOption {
    ContainerOption::Name(name.into())
}

pub fn host(host: impl Into<String>) -> ContainerOption {
    ContainerOption::Host(host.into())
}

pub fn span(span: tracing::Span) -> ContainerOption {
    ContainerOption::Span(span)
}
