//! Named streams backed by transport calls.

use crate::bridge::Bridge;
use crate::state::{list_of, optional};
use crate::telemetry::OperationAttrs;
use async_trait::async_trait;
use kikkake_core::{Schema, StepError, StreamAccessor, TraceContext, UpdateOp};
use serde_json::{json, Value};

/// Declares a stream handlers can reach through `ctx.stream(name)`.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub name: String,
    /// Item schema, reported to tooling. Items are not validated.
    pub schema: Option<Schema>,
}

impl StreamConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// [`StreamAccessor`] that issues `stream::*` calls through the bridge.
#[derive(Debug, Clone)]
pub struct Stream {
    name: String,
    bridge: Bridge,
    trace: Option<TraceContext>,
}

impl Stream {
    pub fn new(name: impl Into<String>, bridge: Bridge, trace: Option<TraceContext>) -> Self {
        Self {
            name: name.into(),
            bridge,
            trace,
        }
    }

    async fn call(
        &self,
        op: &str,
        payload: Value,
        group_id: Option<&str>,
        item_id: Option<&str>,
    ) -> Result<Value, StepError> {
        let attrs = OperationAttrs::stream(&self.name, group_id, item_id);
        self.bridge
            .traced_call(op, payload, self.trace.as_ref(), &attrs)
            .await
    }
}

#[async_trait]
impl StreamAccessor for Stream {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, group_id: &str, item_id: &str) -> Result<Option<Value>, StepError> {
        let payload = json!({"stream_name": self.name, "group_id": group_id, "item_id": item_id});
        let result = self
            .call("stream::get", payload, Some(group_id), Some(item_id))
            .await?;
        Ok(optional(result))
    }

    async fn set(&self, group_id: &str, item_id: &str, data: Value) -> Result<Value, StepError> {
        let payload = json!({
            "stream_name": self.name,
            "group_id": group_id,
            "item_id": item_id,
            "data": data,
        });
        self.call("stream::set", payload, Some(group_id), Some(item_id))
            .await
    }

    async fn update(
        &self,
        group_id: &str,
        item_id: &str,
        ops: Vec<UpdateOp>,
    ) -> Result<Value, StepError> {
        let payload = json!({
            "stream_name": self.name,
            "group_id": group_id,
            "item_id": item_id,
            "ops": ops,
        });
        self.call("stream::update", payload, Some(group_id), Some(item_id))
            .await
    }

    async fn delete(&self, group_id: &str, item_id: &str) -> Result<(), StepError> {
        let payload = json!({"stream_name": self.name, "group_id": group_id, "item_id": item_id});
        self.call("stream::delete", payload, Some(group_id), Some(item_id))
            .await?;
        Ok(())
    }

    async fn get_group(&self, group_id: &str) -> Result<Vec<Value>, StepError> {
        let payload = json!({"stream_name": self.name, "group_id": group_id});
        let result = self.call("stream::list", payload, Some(group_id), None).await?;
        list_of(result)
    }

    async fn list_groups(&self) -> Result<Vec<String>, StepError> {
        let payload = json!({"stream_name": self.name});
        let result = self.call("stream::list_groups", payload, None, None).await?;
        list_of(result)
    }
}
