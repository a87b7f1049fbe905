//! Readiness checks and their aggregation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::error::HealthError;

/// Timeout for establishing a TCP connection in [`TcpDialCheck`].
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// One dependency the service needs before it can take traffic.
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    async fn check(&self) -> Result<(), HealthError>;
}

struct FnCheck<F> {
    check: F,
}

#[async_trait]
impl<F, Fut> ReadinessCheck for FnCheck<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HealthError>> + Send,
{
    async fn check(&self) -> Result<(), HealthError> {
        (self.check)().await
    }
}

/// Wraps an async closure as a [`ReadinessCheck`].
pub fn check_fn<F, Fut>(check: F) -> Arc<dyn ReadinessCheck>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HealthError>> + Send + 'static,
{
    Arc::new(FnCheck { check })
}

/// Runs every check concurrently and returns the first failure.
///
/// Each check runs on its own task and reports over a channel sized to the
/// number of checks. The first error to arrive is returned immediately;
/// checks still running are left to finish on their own.
pub async fn check_health(checks: &[Arc<dyn ReadinessCheck>]) -> Result<(), HealthError> {
    if checks.is_empty() {
        return Ok(());
    }

    let (tx, mut rx) = mpsc::channel(checks.len());
    for check in checks {
        let check = check.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = check.check().await;
            let _ = tx.send(result).await;
        });
    }
    drop(tx);

    for _ in 0..checks.len() {
        match rx.recv().await {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                tracing::error!(error = %e, "Failed to check readiness");
                return Err(e);
            }
            None => {
                return Err(HealthError::CheckFailed(
                    "readiness check task ended without reporting".to_string(),
                ))
            }
        }
    }
    Ok(())
}

/// Ready when a TCP connection to `addr` can be established.
#[derive(Debug, Clone)]
pub struct TcpDialCheck {
    addr: String,
    timeout: Duration,
}

impl TcpDialCheck {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ReadinessCheck for TcpDialCheck {
    async fn check(&self) -> Result<(), HealthError> {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => {
                tracing::error!(addr = %self.addr, error = %e, "Failed to dial server");
                Err(HealthError::DialFailed {
                    addr: self.addr.clone(),
                    reason: e.to_string(),
                })
            }
            Err(_) => Err(HealthError::DialTimeout {
                addr: self.addr.clone(),
                seconds: self.timeout.as_secs(),
            }),
        }
    }
}

/// Ready when `GET url` answers with a success status.
#[derive(Debug, Clone)]
pub struct HttpGetCheck {
    url: String,
    client: reqwest::Client,
}

impl HttpGetCheck {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl ReadinessCheck for HttpGetCheck {
    async fn check(&self) -> Result<(), HealthError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HealthError::BadStatus {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_no_checks_is_ready() {
        assert!(check_health(&[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_all_checks_pass() {
        let counter = Arc::new(AtomicU32::new(0));
        let checks: Vec<Arc<dyn ReadinessCheck>> = (0..3)
            .map(|_| {
                let counter = counter.clone();
                check_fn(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                })
            })
            .collect();

        check_health(&checks).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_one_failing_check_fails_readiness() {
        let checks = vec![
            check_fn(|| async { Ok(()) }),
            check_fn(|| async { Err(HealthError::CheckFailed("database down".to_string())) }),
            check_fn(|| async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(())
            }),
        ];

        let result = tokio::time::timeout(Duration::from_secs(5), check_health(&checks))
            .await
            .expect("aggregation should not hang");

        match result {
            Err(HealthError::CheckFailed(reason)) => assert_eq!(reason, "database down"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_first_error_returns_before_slow_checks() {
        let checks = vec![
            check_fn(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            }),
            check_fn(|| async { Err(HealthError::CheckFailed("cache down".to_string())) }),
        ];

        let result = tokio::time::timeout(Duration::from_secs(5), check_health(&checks))
            .await
            .expect("first error should be returned without waiting for stragglers");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_tcp_dial_check() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        assert!(TcpDialCheck::new(addr).check().await.is_ok());

        drop(listener);
        let closed = TcpDialCheck::new("127.0.0.1:1").with_timeout(Duration::from_secs(1));
        assert!(closed.check().await.is_err());
    }
}
