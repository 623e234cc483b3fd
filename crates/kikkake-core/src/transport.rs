//! The contract between the engine and the external transport.
//!
//! The transport owns delivery: it decides when a registered function runs,
//! hosts HTTP termination, and answers RPC calls for enqueue, state and
//! streams. The engine only registers functions and triggers with it and
//! issues calls through it.

use crate::error::StepError;
use crate::handler::HandlerFuture;
use crate::trace_context::TraceContext;
use crate::trigger::{Trigger, TriggerKind};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Header carrying the W3C trace parent.
pub const TRACEPARENT_HEADER: &str = "traceparent";
/// Header carrying W3C baggage.
pub const BAGGAGE_HEADER: &str = "baggage";
/// Trigger config key referencing a registered condition function.
pub const CONDITION_FUNCTION_KEY: &str = "condition_function_id";

/// One delivery of a payload to a registered function.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub payload: Value,
    /// Transport-level headers, e.g. `traceparent`.
    pub headers: BTreeMap<String, String>,
    /// Parent trace context, filled in by inbound interceptors.
    pub parent: Option<TraceContext>,
    /// Set when the transport already evaluated the trigger's condition.
    pub conditions_checked: bool,
}

impl Invocation {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_parent(mut self, parent: TraceContext) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_conditions_checked(mut self, checked: bool) -> Self {
        self.conditions_checked = checked;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// An RPC issued through the transport.
#[derive(Debug, Clone)]
pub struct OutboundCall {
    pub op: String,
    pub payload: Value,
    pub headers: BTreeMap<String, String>,
    /// The trace context the call is made under, if any.
    pub trace: Option<TraceContext>,
}

impl OutboundCall {
    pub fn new(op: impl Into<String>, payload: Value) -> Self {
        Self {
            op: op.into(),
            payload,
            headers: BTreeMap::new(),
            trace: None,
        }
    }

    pub fn with_trace(mut self, trace: Option<TraceContext>) -> Self {
        self.trace = trace;
        self
    }
}

type FunctionFn = dyn Fn(Invocation) -> HandlerFuture<Value> + Send + Sync;

/// A function registered with the transport under a function id.
#[derive(Clone)]
pub struct FunctionHandler(Arc<FunctionFn>);

impl FunctionHandler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, StepError>> + Send + 'static,
    {
        Self(Arc::new(move |invocation| Box::pin(f(invocation))))
    }

    pub async fn call(&self, invocation: Invocation) -> Result<Value, StepError> {
        (self.0)(invocation).await
    }
}

impl fmt::Debug for FunctionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FunctionHandler")
    }
}

/// Tells the transport *when* to invoke a function.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerRegistration {
    /// Trigger kind as the transport names it, e.g. `http` or `queue`.
    pub kind: String,
    pub function_id: String,
    pub config: Map<String, Value>,
}

/// The external messaging, RPC and HTTP substrate.
#[async_trait]
pub trait Transport: Send + Sync {
    fn register_function(&self, function_id: &str, handler: FunctionHandler) -> Result<(), StepError>;

    fn register_trigger(&self, registration: TriggerRegistration) -> Result<(), StepError>;

    async fn call(&self, call: OutboundCall) -> Result<Value, StepError>;
}

/// Hook point around transport traffic.
///
/// Interceptors see every outbound call before it is sent and every
/// inbound invocation before it reaches a registered function.
pub trait CallInterceptor: Send + Sync {
    fn outbound(&self, _call: &mut OutboundCall) {}

    fn inbound(&self, _invocation: &mut Invocation) {}
}

/// The kind-specific part of a trigger registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindConfig {
    Http {
        /// Route without its leading `/`.
        api_path: String,
        http_method: String,
    },
    Queue {
        topic: String,
    },
    Cron {
        expression: String,
    },
    State,
    Stream {
        stream_name: String,
        group_id: Option<String>,
        item_id: Option<String>,
    },
}

impl KindConfig {
    pub fn from_trigger(trigger: &Trigger) -> Self {
        match trigger {
            Trigger::Http(t) => KindConfig::Http {
                api_path: t.path.trim_start_matches('/').to_string(),
                http_method: t.method.as_str().to_string(),
            },
            Trigger::Queue(t) => KindConfig::Queue {
                topic: t.topic.clone(),
            },
            Trigger::Cron(t) => KindConfig::Cron {
                expression: t.expression.clone(),
            },
            Trigger::State(_) => KindConfig::State,
            Trigger::Stream(t) => KindConfig::Stream {
                stream_name: t.stream_name.clone(),
                group_id: t.group_id.clone(),
                item_id: t.item_id.clone(),
            },
        }
    }

    fn write_into(&self, map: &mut Map<String, Value>) {
        match self {
            KindConfig::Http {
                api_path,
                http_method,
            } => {
                map.insert("api_path".into(), Value::from(api_path.as_str()));
                map.insert("http_method".into(), Value::from(http_method.as_str()));
            }
            KindConfig::Queue { topic } => {
                map.insert("topic".into(), Value::from(topic.as_str()));
            }
            KindConfig::Cron { expression } => {
                map.insert("expression".into(), Value::from(expression.as_str()));
            }
            KindConfig::State => {}
            KindConfig::Stream {
                stream_name,
                group_id,
                item_id,
            } => {
                map.insert("stream_name".into(), Value::from(stream_name.as_str()));
                if let Some(group_id) = group_id {
                    map.insert("group_id".into(), Value::from(group_id.as_str()));
                }
                if let Some(item_id) = item_id {
                    map.insert("item_id".into(), Value::from(item_id.as_str()));
                }
            }
        }
    }
}

/// Everything the engine derives from one trigger of one step.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationRecord {
    /// `steps::<name>::trigger::<descriptor>[::<index>]`.
    pub function_id: String,
    pub trigger_kind: TriggerKind,
    pub kind_config: KindConfig,
    /// Sanitized step config for introspection tooling.
    pub metadata: Value,
    pub condition_function_id: Option<String>,
}

impl RegistrationRecord {
    /// Builds the call made to [`Transport::register_trigger`].
    pub fn to_trigger_registration(&self) -> TriggerRegistration {
        let mut config = Map::new();
        self.kind_config.write_into(&mut config);
        config.insert("metadata".into(), self.metadata.clone());
        if let Some(condition) = &self.condition_function_id {
            config.insert(CONDITION_FUNCTION_KEY.into(), Value::from(condition.as_str()));
        }
        TriggerRegistration {
            kind: self.trigger_kind.as_str().to_string(),
            function_id: self.function_id.clone(),
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::{self, HttpMethod};
    use serde_json::json;

    #[test]
    fn test_http_kind_config_strips_leading_slash() {
        let config = KindConfig::from_trigger(&trigger::http(HttpMethod::Get, "/items/:id").into());
        assert_eq!(
            config,
            KindConfig::Http {
                api_path: "items/:id".to_string(),
                http_method: "GET".to_string(),
            }
        );
    }

    #[test]
    fn test_trigger_registration_config() {
        let record = RegistrationRecord {
            function_id: "steps::Watch::trigger::stream(todos)".to_string(),
            trigger_kind: TriggerKind::Stream,
            kind_config: KindConfig::from_trigger(&trigger::stream("todos").with_item_id("t-1").into()),
            metadata: json!({"name": "Watch"}),
            condition_function_id: Some("steps::Watch::trigger::stream(todos)::conditions::0".to_string()),
        };
        let registration = record.to_trigger_registration();
        assert_eq!(registration.kind, "stream");
        assert_eq!(
            Value::Object(registration.config),
            json!({
                "stream_name": "todos",
                "item_id": "t-1",
                "metadata": {"name": "Watch"},
                "condition_function_id": "steps::Watch::trigger::stream(todos)::conditions::0"
            })
        );
    }

    #[test]
    fn test_state_kind_config_has_only_metadata() {
        let record = RegistrationRecord {
            function_id: "steps::S::trigger::state".to_string(),
            trigger_kind: TriggerKind::State,
            kind_config: KindConfig::State,
            metadata: json!({}),
            condition_function_id: None,
        };
        let registration = record.to_trigger_registration();
        assert_eq!(Value::Object(registration.config), json!({"metadata": {}}));
    }
}
