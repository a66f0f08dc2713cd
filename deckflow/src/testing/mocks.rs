//! Mock stages and a scripted content service.

use crate::errors::StageError;
use crate::service::{ContentService, GenerationRequest};
use crate::stage::{Stage, StageInput};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// A stage that returns the same value on every invocation.
#[derive(Debug)]
pub struct StaticStage {
    name: String,
    value: serde_json::Value,
    call_count: Mutex<usize>,
}

impl StaticStage {
    /// Creates a stage that always returns `value`.
    #[must_use]
    pub fn new(name: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            value,
            call_count: Mutex::new(0),
        }
    }

    /// Returns the number of invocations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }
}

#[async_trait]
impl Stage for StaticStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _input: StageInput) -> Result<serde_json::Value, StageError> {
        *self.call_count.lock() += 1;
        Ok(self.value.clone())
    }
}

/// A stage that plays back a script of results and records its inputs.
#[derive(Debug)]
pub struct ScriptedStage {
    name: String,
    script: Mutex<VecDeque<Result<serde_json::Value, StageError>>>,
    inputs: Mutex<Vec<StageInput>>,
    call_count: Mutex<usize>,
}

impl ScriptedStage {
    /// Creates a stage that returns the scripted results in order. Once
    /// the script is spent, further calls fail.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        script: Vec<Result<serde_json::Value, StageError>>,
    ) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(script.into_iter().collect()),
            inputs: Mutex::new(Vec::new()),
            call_count: Mutex::new(0),
        }
    }

    /// Returns the number of invocations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }

    /// Returns the inputs from each invocation, in order.
    #[must_use]
    pub fn recorded_inputs(&self) -> Vec<StageInput> {
        self.inputs.lock().clone()
    }
}

#[async_trait]
impl Stage for ScriptedStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: StageInput) -> Result<serde_json::Value, StageError> {
        *self.call_count.lock() += 1;
        self.inputs.lock().push(input);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(StageError::invalid("script exhausted")))
    }
}

/// A stage that always fails with the given error.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    error: StageError,
    call_count: Mutex<usize>,
}

impl FailingStage {
    /// Creates a stage that always returns `error`.
    #[must_use]
    pub fn new(name: impl Into<String>, error: StageError) -> Self {
        Self {
            name: name.into(),
            error,
            call_count: Mutex::new(0),
        }
    }

    /// Returns the number of invocations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _input: StageInput) -> Result<serde_json::Value, StageError> {
        *self.call_count.lock() += 1;
        Err(self.error.clone())
    }
}

/// A content service that plays back scripted responses per role.
///
/// Responses for a role are consumed in order; the last response is
/// repeated once the script is spent, so a gate can retry against a
/// stable critic.
#[derive(Debug, Default)]
pub struct ScriptedService {
    responses: Mutex<std::collections::HashMap<String, VecDeque<Result<String, StageError>>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedService {
    /// Creates an empty scripted service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a raw response for a role.
    #[must_use]
    pub fn with_response(self, role: impl Into<String>, response: impl Into<String>) -> Self {
        self.push(role, Ok(response.into()));
        self
    }

    /// Queues a JSON response for a role.
    #[must_use]
    pub fn with_json(self, role: impl Into<String>, value: &serde_json::Value) -> Self {
        self.push(role, Ok(value.to_string()));
        self
    }

    /// Queues an error for a role.
    #[must_use]
    pub fn with_error(self, role: impl Into<String>, error: StageError) -> Self {
        self.push(role, Err(error));
        self
    }

    fn push(&self, role: impl Into<String>, response: Result<String, StageError>) {
        self.responses
            .lock()
            .entry(role.into())
            .or_default()
            .push_back(response);
    }

    /// Returns every request the service received.
    #[must_use]
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    /// Returns the number of requests for a role.
    #[must_use]
    pub fn request_count(&self, role: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.role == role).count()
    }
}

#[async_trait]
impl ContentService for ScriptedService {
    async fn generate(&self, request: GenerationRequest) -> Result<String, StageError> {
        let role = request.role.clone();
        self.requests.lock().push(request);

        let mut responses = self.responses.lock();
        let Some(queue) = responses.get_mut(&role) else {
            return Err(StageError::invalid(format!("no script for role '{role}'")));
        };

        if queue.len() > 1 {
            queue
                .pop_front()
                .unwrap_or_else(|| Err(StageError::invalid("script exhausted")))
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(StageError::invalid(format!("script exhausted for role '{role}'"))))
        }
    }
}
