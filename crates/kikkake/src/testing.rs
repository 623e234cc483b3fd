//! An in-process transport for tests and demos.

use async_trait::async_trait;
use kikkake_core::{
    FunctionHandler, Invocation, OutboundCall, StepError, Transport, TriggerRegistration,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

/// Records everything the engine registers and calls, and lets the test
/// play the transport's part by invoking registered functions.
///
/// Calls to an op without a scripted response return `null`.
///
/// # Examples
///
/// ```
/// use kikkake::testing::RecordingTransport;
/// use kikkake::{FunctionHandler, Transport};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let transport = RecordingTransport::new();
/// transport
///     .register_function("echo", FunctionHandler::new(|inv| async move { Ok(inv.payload) }))
///     .unwrap();
/// let out = transport.invoke("echo", json!({"hi": 1})).await.unwrap();
/// assert_eq!(out, json!({"hi": 1}));
/// # });
/// ```
#[derive(Debug, Default)]
pub struct RecordingTransport {
    functions: Mutex<Vec<(String, FunctionHandler)>>,
    triggers: Mutex<Vec<TriggerRegistration>>,
    calls: Mutex<Vec<OutboundCall>>,
    responses: Mutex<HashMap<String, Value>>,
    failures: Mutex<HashMap<String, String>>,
    rejected: Mutex<HashMap<String, String>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every later call to `op` returns `value`.
    pub fn respond_with(&self, op: impl Into<String>, value: Value) {
        self.responses.lock().insert(op.into(), value);
    }

    /// Every later call to `op` fails with a transport error.
    pub fn fail_with(&self, op: impl Into<String>, details: impl Into<String>) {
        self.failures.lock().insert(op.into(), details.into());
    }

    /// Registering a function or trigger under `function_id` fails.
    pub fn reject_registration(&self, function_id: impl Into<String>, details: impl Into<String>) {
        self.rejected.lock().insert(function_id.into(), details.into());
    }

    fn check_rejected(&self, op: &str, function_id: &str) -> Result<(), StepError> {
        match self.rejected.lock().get(function_id) {
            Some(details) => Err(StepError::transport(op, details.clone())),
            None => Ok(()),
        }
    }

    /// Delivers `payload` to a registered function.
    pub async fn invoke(&self, function_id: &str, payload: Value) -> Result<Value, StepError> {
        self.invoke_with(function_id, Invocation::new(payload)).await
    }

    /// Delivers a full invocation, headers included, to a registered function.
    pub async fn invoke_with(&self, function_id: &str, invocation: Invocation) -> Result<Value, StepError> {
        let handler = self
            .functions
            .lock()
            .iter()
            .find(|(id, _)| id == function_id)
            .map(|(_, handler)| handler.clone())
            .ok_or_else(|| StepError::Configuration(format!("Function '{function_id}' is not registered")))?;
        handler.call(invocation).await
    }

    /// Registered function ids, in registration order.
    pub fn function_ids(&self) -> Vec<String> {
        self.functions.lock().iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn triggers(&self) -> Vec<TriggerRegistration> {
        self.triggers.lock().clone()
    }

    pub fn trigger_for(&self, function_id: &str) -> Option<TriggerRegistration> {
        self.triggers
            .lock()
            .iter()
            .find(|t| t.function_id == function_id)
            .cloned()
    }

    pub fn calls(&self) -> Vec<OutboundCall> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, op: &str) -> Vec<OutboundCall> {
        self.calls.lock().iter().filter(|c| c.op == op).cloned().collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    /// Re-registering an id replaces the earlier function.
    fn register_function(&self, function_id: &str, handler: FunctionHandler) -> Result<(), StepError> {
        self.check_rejected("register_function", function_id)?;
        let mut functions = self.functions.lock();
        match functions.iter_mut().find(|(id, _)| id == function_id) {
            Some(entry) => entry.1 = handler,
            None => functions.push((function_id.to_string(), handler)),
        }
        Ok(())
    }

    fn register_trigger(&self, registration: TriggerRegistration) -> Result<(), StepError> {
        self.check_rejected("register_trigger", &registration.function_id)?;
        self.triggers.lock().push(registration);
        Ok(())
    }

    async fn call(&self, call: OutboundCall) -> Result<Value, StepError> {
        let op = call.op.clone();
        self.calls.lock().push(call);
        if let Some(details) = self.failures.lock().get(&op) {
            return Err(StepError::transport(op, details.clone()));
        }
        Ok(self.responses.lock().get(&op).cloned().unwrap_or(Value::Null))
    }
}
