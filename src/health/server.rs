//! HTTP liveness and readiness endpoints.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Router};

use crate::error::HealthError;
use crate::health::checks::{check_health, ReadinessCheck};

struct HealthState {
    checks: Vec<Arc<dyn ReadinessCheck>>,
}

/// Serves `GET /liveness` and `GET /readiness`.
#[derive(Clone)]
pub struct HealthServer {
    state: Arc<HealthState>,
}

impl HealthServer {
    pub fn new(checks: Vec<Arc<dyn ReadinessCheck>>) -> Self {
        Self {
            state: Arc::new(HealthState { checks }),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/liveness", get(liveness_handler))
            .route("/readiness", get(readiness_handler))
            .with_state(self.state.clone())
    }

    /// Binds `addr` and serves until `shutdown` resolves.
    pub async fn serve<S>(&self, addr: SocketAddr, shutdown: S) -> Result<(), HealthError>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| HealthError::BindFailed {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(addr = %addr, checks = self.state.checks.len(), "Health server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("Health server shutting down");
            })
            .await?;
        Ok(())
    }
}

async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

async fn readiness_handler(State(state): State<Arc<HealthState>>) -> StatusCode {
    match check_health(&state.checks).await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
