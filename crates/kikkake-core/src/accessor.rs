//! Capabilities a handler reaches through its [`FlowContext`](crate::FlowContext).
//!
//! The engine binds these to the transport for every invocation. Tests
//! and alternative hosts can supply their own implementations.

use crate::error::StepError;
use crate::request::EnqueueEvent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A path operation applied to a stored value by `update`.
///
/// Paths are dot-separated field names; an empty path targets the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UpdateOp {
    Set { path: String, value: Value },
    Increment { path: String, by: f64 },
    Decrement { path: String, by: f64 },
    Remove { path: String },
    Merge {
        #[serde(default)]
        path: String,
        value: Value,
    },
}

impl UpdateOp {
    pub fn set(path: impl Into<String>, value: Value) -> Self {
        Self::Set {
            path: path.into(),
            value,
        }
    }

    pub fn increment(path: impl Into<String>, by: f64) -> Self {
        Self::Increment {
            path: path.into(),
            by,
        }
    }

    pub fn decrement(path: impl Into<String>, by: f64) -> Self {
        Self::Decrement {
            path: path.into(),
            by,
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self::Remove { path: path.into() }
    }

    pub fn merge(value: Value) -> Self {
        Self::Merge {
            path: String::new(),
            value,
        }
    }
}

/// Publishes messages to queue topics.
#[async_trait]
pub trait Enqueuer: Send + Sync {
    async fn enqueue(&self, event: EnqueueEvent) -> Result<(), StepError>;
}

/// Scoped key/value state.
#[async_trait]
pub trait StateAccessor: Send + Sync {
    async fn get(&self, scope: &str, key: &str) -> Result<Option<Value>, StepError>;

    async fn set(&self, scope: &str, key: &str, data: Value) -> Result<Value, StepError>;

    async fn update(&self, scope: &str, key: &str, ops: Vec<UpdateOp>) -> Result<Value, StepError>;

    async fn delete(&self, scope: &str, key: &str) -> Result<Option<Value>, StepError>;

    async fn list(&self, scope: &str) -> Result<Vec<Value>, StepError>;

    async fn list_groups(&self) -> Result<Vec<String>, StepError>;

    /// Deletes every item in `scope` that carries an `id` field.
    async fn clear(&self, scope: &str) -> Result<(), StepError> {
        for item in self.list(scope).await? {
            if let Some(id) = item.get("id").and_then(Value::as_str) {
                self.delete(scope, id).await?;
            }
        }
        Ok(())
    }
}

/// Grouped items of one named stream.
#[async_trait]
pub trait StreamAccessor: Send + Sync {
    fn name(&self) -> &str;

    async fn get(&self, group_id: &str, item_id: &str) -> Result<Option<Value>, StepError>;

    async fn set(&self, group_id: &str, item_id: &str, data: Value) -> Result<Value, StepError>;

    async fn update(
        &self,
        group_id: &str,
        item_id: &str,
        ops: Vec<UpdateOp>,
    ) -> Result<Value, StepError>;

    async fn delete(&self, group_id: &str, item_id: &str) -> Result<(), StepError>;

    async fn get_group(&self, group_id: &str) -> Result<Vec<Value>, StepError>;

    async fn list_groups(&self) -> Result<Vec<String>, StepError>;

    /// Alias of [`get_group`](StreamAccessor::get_group).
    async fn list(&self, group_id: &str) -> Result<Vec<Value>, StepError> {
        self.get_group(group_id).await
    }
}

/// Stand-in used by contexts that are not attached to a transport.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Unattached;

fn unattached(op: &str) -> StepError {
    StepError::Configuration(format!("'{op}' is not available: context is not attached to a transport"))
}

#[async_trait]
impl Enqueuer for Unattached {
    async fn enqueue(&self, _event: EnqueueEvent) -> Result<(), StepError> {
        Err(unattached("enqueue"))
    }
}

#[async_trait]
impl StateAccessor for Unattached {
    async fn get(&self, _scope: &str, _key: &str) -> Result<Option<Value>, StepError> {
        Err(unattached("state::get"))
    }

    async fn set(&self, _scope: &str, _key: &str, _data: Value) -> Result<Value, StepError> {
        Err(unattached("state::set"))
    }

    async fn update(&self, _scope: &str, _key: &str, _ops: Vec<UpdateOp>) -> Result<Value, StepError> {
        Err(unattached("state::update"))
    }

    async fn delete(&self, _scope: &str, _key: &str) -> Result<Option<Value>, StepError> {
        Err(unattached("state::delete"))
    }

    async fn list(&self, _scope: &str) -> Result<Vec<Value>, StepError> {
        Err(unattached("state::list"))
    }

    async fn list_groups(&self) -> Result<Vec<String>, StepError> {
        Err(unattached("state::list_groups"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_op_wire_format() {
        let ops = vec![
            UpdateOp::increment("count", 1.0),
            UpdateOp::remove("draft"),
            UpdateOp::merge(json!({"done": true})),
        ];
        assert_eq!(
            serde_json::to_value(&ops).unwrap(),
            json!([
                {"type": "increment", "path": "count", "by": 1.0},
                {"type": "remove", "path": "draft"},
                {"type": "merge", "path": "", "value": {"done": true}}
            ])
        );
    }

    #[test]
    fn test_unattached_state_reports_configuration_error() {
        let error = tokio_test::block_on(StateAccessor::get(&Unattached, "orders", "1")).unwrap_err();
        assert!(matches!(error, StepError::Configuration(_)));

        let error = tokio_test::block_on(Unattached.enqueue(EnqueueEvent::new("t", Value::Null))).unwrap_err();
        assert!(error.to_string().contains("enqueue"));
    }
}
