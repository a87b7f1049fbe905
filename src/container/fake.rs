//! In-memory engine used by unit tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::container::engine::{ContainerEngine, CreateSpec};
use crate::error::EngineError;

#[derive(Default)]
struct FakeState {
    calls: Vec<String>,
    created: Vec<CreateSpec>,
    next_id: u32,
    inspect_failures: u32,
}

/// Records every call and answers with canned results.
pub struct FakeEngine {
    state: Mutex<FakeState>,
    ip: String,
    exit_code: i64,
    image_present: bool,
    fail_start: bool,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            ip: "172.17.0.2".to_string(),
            exit_code: 0,
            image_present: true,
            fail_start: false,
        }
    }

    pub fn with_ip(mut self, ip: &str) -> Self {
        self.ip = ip.to_string();
        self
    }

    pub fn with_exit_code(mut self, code: i64) -> Self {
        self.exit_code = code;
        self
    }

    pub fn without_image(mut self) -> Self {
        self.image_present = false;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Every inspection fails with `NoInternalAddress`.
    pub fn failing_inspect(self) -> Self {
        self.fail_next_inspects(u32::MAX);
        self
    }

    /// The next `count` inspections fail with `NoInternalAddress`.
    pub fn fail_next_inspects(&self, count: u32) {
        self.state.lock().unwrap().inspect_failures = count;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn created(&self) -> Vec<CreateSpec> {
        self.state.lock().unwrap().created.clone()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn image_exists(&self, _image: &str) -> bool {
        self.image_present
    }

    async fn pull_image(&self, image: &str) -> Result<(), EngineError> {
        self.record(format!("pull {image}"));
        Ok(())
    }

    async fn create_container(&self, spec: &CreateSpec) -> Result<String, EngineError> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("fake-{}", state.next_id);
        state.calls.push(format!("create {}", spec.image));
        state.created.push(spec.clone());
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.record(format!("start {id}"));
        if self.fail_start {
            return Err(EngineError::StartFailed {
                id: id.to_string(),
                reason: "port is already allocated".to_string(),
            });
        }
        Ok(())
    }

    async fn pause_container(&self, id: &str) -> Result<(), EngineError> {
        self.record(format!("pause {id}"));
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
        Ok(self.exit_code)
    }

    async fn internal_ip(&self, id: &str) -> Result<String, EngineError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("inspect {id}"));
        if state.inspect_failures > 0 {
            state.inspect_failures -= 1;
            return Err(EngineError::NoInternalAddress { id: id.to_string() });
        }
        Ok(self.ip.clone())
    }
}
