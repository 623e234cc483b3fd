//! Scoped state backed by transport calls.

use crate::bridge::Bridge;
use crate::telemetry::OperationAttrs;
use async_trait::async_trait;
use kikkake_core::{StateAccessor, StepError, TraceContext, UpdateOp};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

/// [`StateAccessor`] that issues `state::*` calls through the bridge.
#[derive(Debug, Clone)]
pub struct StateManager {
    bridge: Bridge,
    trace: Option<TraceContext>,
}

impl StateManager {
    pub fn new(bridge: Bridge, trace: Option<TraceContext>) -> Self {
        Self { bridge, trace }
    }

    async fn call(
        &self,
        op: &str,
        payload: Value,
        scope: Option<&str>,
        key: Option<&str>,
    ) -> Result<Value, StepError> {
        self.bridge
            .traced_call(op, payload, self.trace.as_ref(), &OperationAttrs::state(scope, key))
            .await
    }
}

/// `null` means "nothing there".
pub(crate) fn optional(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        value => Some(value),
    }
}

/// Decodes a list result; `null` is an empty list.
pub(crate) fn list_of<T: DeserializeOwned>(value: Value) -> Result<Vec<T>, StepError> {
    match value {
        Value::Null => Ok(Vec::new()),
        value => Ok(serde_json::from_value(value)?),
    }
}

#[async_trait]
impl StateAccessor for StateManager {
    async fn get(&self, scope: &str, key: &str) -> Result<Option<Value>, StepError> {
        let result = self
            .call("state::get", json!({"scope": scope, "key": key}), Some(scope), Some(key))
            .await?;
        Ok(optional(result))
    }

    async fn set(&self, scope: &str, key: &str, data: Value) -> Result<Value, StepError> {
        self.call(
            "state::set",
            json!({"scope": scope, "key": key, "data": data}),
            Some(scope),
            Some(key),
        )
        .await
    }

    async fn update(&self, scope: &str, key: &str, ops: Vec<UpdateOp>) -> Result<Value, StepError> {
        self.call(
            "state::update",
            json!({"scope": scope, "key": key, "ops": ops}),
            Some(scope),
            Some(key),
        )
        .await
    }

    async fn delete(&self, scope: &str, key: &str) -> Result<Option<Value>, StepError> {
        let result = self
            .call("state::delete", json!({"scope": scope, "key": key}), Some(scope), Some(key))
            .await?;
        Ok(optional(result))
    }

    async fn list(&self, scope: &str) -> Result<Vec<Value>, StepError> {
        let result = self
            .call("state::list", json!({"scope": scope}), Some(scope), None)
            .await?;
        list_of(result)
    }

    async fn list_groups(&self) -> Result<Vec<String>, StepError> {
        let result = self.call("state::list_groups", json!({}), None, None).await?;
        list_of(result)
    }
}
