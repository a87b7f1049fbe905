//! Command-line interface for depdock.
//!
//! Provides commands for provisioning dependencies by hand and for serving
//! or querying health endpoints.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
