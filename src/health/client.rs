//! Client for a remote service's health endpoints.

use std::time::Duration;

use crate::backends::join_host_port;
use crate::error::HealthError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HealthClient {
    base_url: String,
    client: reqwest::Client,
}

impl HealthClient {
    pub fn new(host: &str, port: u16) -> Result<Self, HealthError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base_url: format!("http://{}", join_host_port(host, port)),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn liveness(&self) -> Result<(), HealthError> {
        self.get("/liveness").await
    }

    pub async fn readiness(&self) -> Result<(), HealthError> {
        self.get("/readiness").await
    }

    async fn get(&self, path: &str) -> Result<(), HealthError> {
        let url = format!("{}{}", self.base_url, path);
        let status = self.client.get(&url).send().await?.status();
        if !status.is_success() {
            return Err(HealthError::BadStatus {
                url,
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
