//! Liveness and readiness reporting for long-running services.
//!
//! A [`HealthServer`] answers `/liveness` unconditionally and `/readiness`
//! by running every registered [`ReadinessCheck`] concurrently.

pub mod checks;
pub mod client;
pub mod server;

pub use checks::{check_fn, check_health, HttpGetCheck, ReadinessCheck, TcpDialCheck};
pub use client::HealthClient;
pub use server::HealthServer;
