//! Lifecycle tests against an in-memory engine.
//!
//! These exercise the public API end to end without a Docker daemon.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use depdock::backends::{self, Backend, RedisOptions};
use depdock::container::options::{self, health_check_with_policy};
use depdock::container::{
    predicate, Container, ContainerEngine, ContainerState, CreateSpec, RetryPolicy,
    RuntimeEnvironment,
};
use depdock::error::{ContainerError, EngineError};

/// Engine that records calls and can be told to fail pausing.
#[derive(Default)]
struct RecordingEngine {
    calls: Mutex<Vec<String>>,
    fail_pause: bool,
}

impl RecordingEngine {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl ContainerEngine for RecordingEngine {
    async fn image_exists(&self, _image: &str) -> bool {
        true
    }

    async fn pull_image(&self, image: &str) -> Result<(), EngineError> {
        self.record(format!("pull {image}"));
        Ok(())
    }

    async fn create_container(&self, spec: &CreateSpec) -> Result<String, EngineError> {
        self.record(format!("create {}", spec.image));
        Ok("c0ffee".to_string())
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.record(format!("start {id}"));
        Ok(())
    }

    async fn pause_container(&self, id: &str) -> Result<(), EngineError> {
        self.record(format!("pause {id}"));
        if self.fail_pause {
            return Err(EngineError::PauseFailed {
                id: id.to_string(),
                reason: "cannot pause".to_string(),
            });
        }
        Ok(())
    }

    async fn unpause_container(&self, id: &str) -> Result<(), EngineError> {
        self.record(format!("unpause {id}"));
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<(), EngineError> {
        self.record(format!("stop {id}"));
        Ok(())
    }

    async fn remove_container(&self, id: &str, _force: bool) -> Result<(), EngineError> {
        self.record(format!("remove {id}"));
        Ok(())
    }

    async fn wait_container(&self, id: &str) -> Result<i64, EngineError> {
        self.record(format!("wait {id}"));
        Ok(0)
    }

    async fn internal_ip(&self, id: &str) -> Result<String, EngineError> {
        self.record(format!("inspect {id}"));
        Ok("10.0.0.4".to_string())
    }
}

#[tokio::test]
async fn test_full_lifecycle_call_order() {
    let engine = Arc::new(RecordingEngine::default());
    let mut container = Container::with_options(
        engine.clone(),
        RuntimeEnvironment::Host,
        [options::image_repository("redis"), options::image_tag("6-alpine")],
    );

    container.start().await.unwrap();
    container.suspend().await.unwrap();
    container.suspend().await.unwrap();
    container.start().await.unwrap();
    container.teardown().await.unwrap();

    assert_eq!(container.state(), ContainerState::Stopped);
    assert_eq!(
        engine.calls(),
        vec![
            "create redis:6-alpine",
            "start c0ffee",
            "pause c0ffee",
            "unpause c0ffee",
            "stop c0ffee",
            "remove c0ffee",
        ]
    );
}

#[tokio::test]
async fn test_failed_suspend_keeps_running_state() {
    let engine = Arc::new(RecordingEngine {
        fail_pause: true,
        ..Default::default()
    });
    let mut container = Container::with_options(
        engine,
        RuntimeEnvironment::Host,
        [options::image_repository("redis")],
    );

    container.start().await.unwrap();
    let err = container.suspend().await.unwrap_err();

    assert!(matches!(err, ContainerError::Engine(EngineError::PauseFailed { .. })));
    assert_eq!(container.state(), ContainerState::Running);
}

#[tokio::test]
async fn test_health_check_budget_and_spacing() {
    let engine = Arc::new(RecordingEngine::default());
    let counter = Arc::new(AtomicU32::new(0));
    let calls = counter.clone();
    let probe = predicate(move || {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("not ready"))
        }
    });

    let mut container = Container::with_options(
        engine,
        RuntimeEnvironment::Host,
        [
            options::image_repository("mysql"),
            health_check_with_policy(probe, RetryPolicy::new(4, Duration::from_millis(20))),
        ],
    );

    let started = Instant::now();
    let err = container.start().await.unwrap_err();

    assert!(err.is_health_check_timeout());
    assert_eq!(counter.load(Ordering::SeqCst), 4);
    // three sleeps between four attempts
    assert!(started.elapsed() >= Duration::from_millis(60));
    assert!(err.to_string().contains("4"));
}

#[tokio::test]
async fn test_redis_service_inside_container() {
    let engine = Arc::new(RecordingEngine::default());
    let redis = RedisOptions::from_lookup(|_| None).unwrap();

    let mut service = backends::ServiceContainer::new(
        redis,
        engine.clone(),
        RuntimeEnvironment::Container,
        [health_check_with_policy(
            predicate(|| async { Ok(()) }),
            RetryPolicy::default(),
        )],
    );
    service.start().await.unwrap();

    assert_eq!(service.url(), "redis://10.0.0.4:6379");
    assert_eq!(service.backend().kind(), "redis");

    let container = service.container().unwrap();
    assert!(container.options().port_bindings.is_empty());
    assert_eq!(container.options().exposed_ports, vec!["6379/tcp".to_string()]);

    service.teardown().await.unwrap();
    assert!(engine.calls().contains(&"remove c0ffee".to_string()));
}
