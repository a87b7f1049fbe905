//! Error types for depdock operations.
//!
//! Errors are split by the boundary they cross:
//! - `EngineError` for the container engine (Docker daemon) calls
//! - `ContainerError` for the lifecycle of a single dependency handle
//! - `HealthError` for the operator-facing readiness service

use thiserror::Error;

/// Errors raised by the container engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Docker daemon not available: {0}")]
    DaemonUnavailable(String),

    #[error("Failed to pull image '{image}': {reason}")]
    PullFailed { image: String, reason: String },

    #[error("Failed to create container: {0}")]
    CreateFailed(String),

    #[error("Failed to start container '{id}': {reason}")]
    StartFailed { id: String, reason: String },

    #[error("Failed to pause container '{id}': {reason}")]
    PauseFailed { id: String, reason: String },

    #[error("Failed to unpause container '{id}': {reason}")]
    UnpauseFailed { id: String, reason: String },

    #[error("Failed to stop container '{id}': {reason}")]
    StopFailed { id: String, reason: String },

    #[error("Failed to remove container '{id}': {reason}")]
    RemoveFailed { id: String, reason: String },

    #[error("Failed to inspect container '{id}': {reason}")]
    InspectFailed { id: String, reason: String },

    #[error("Error waiting for container '{id}': {reason}")]
    WaitFailed { id: String, reason: String },

    #[error("Container '{id}' not found")]
    ContainerNotFound { id: String },

    #[error("Container '{id}' has no internal IP address")]
    NoInternalAddress { id: String },
}

/// Errors raised by a dependency container handle.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("Invalid container configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Health check did not pass after {attempts} attempts: {source}")]
    HealthCheckTimeout {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("Container is not started")]
    NotStarted,

    #[error("Container has been stopped and cannot be reused")]
    Stopped,

    #[error("Container exited with non-zero code {code}")]
    NonZeroExit { code: i64 },

    #[error("Post-start initializer failed: {0}")]
    Initializer(#[source] anyhow::Error),
}

impl ContainerError {
    /// Returns true when the error is the readiness budget running out.
    pub fn is_health_check_timeout(&self) -> bool {
        matches!(self, ContainerError::HealthCheckTimeout { .. })
    }
}

/// Errors raised by the readiness service and its client.
#[derive(Debug, Error)]
pub enum HealthError {
    #[error("Readiness check failed: {0}")]
    CheckFailed(String),

    #[error("Dial to '{addr}' failed: {reason}")]
    DialFailed { addr: String, reason: String },

    #[error("Dial to '{addr}' timed out after {seconds} seconds")]
    DialTimeout { addr: String, seconds: u64 },

    #[error("Endpoint '{url}' answered with status {status}")]
    BadStatus { url: String, status: u16 },

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Failed to bind health server to {addr}: {reason}")]
    BindFailed { addr: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
