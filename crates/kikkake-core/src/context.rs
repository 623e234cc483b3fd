//! Execution context passed to every handler invocation.

use crate::accessor::{Enqueuer, StateAccessor, StreamAccessor, Unattached};
use crate::error::StepError;
use crate::logger::StepLogger;
use crate::request::{EnqueueEvent, TriggerInput};
use crate::trigger::{Trigger, TriggerKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Describes which trigger fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerInfo {
    #[serde(rename = "type")]
    pub kind: TriggerKind,
    /// Position of the trigger in the step's trigger list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
}

impl TriggerInfo {
    pub fn new(kind: TriggerKind) -> Self {
        Self {
            kind,
            index: None,
            path: None,
            method: None,
            topic: None,
            expression: None,
            stream_name: None,
            group_id: None,
            item_id: None,
        }
    }

    /// Info for the trigger at `index` of a step.
    pub fn for_trigger(trigger: &Trigger, index: usize) -> Self {
        let mut info = Self::new(trigger.kind());
        info.index = Some(index);
        match trigger {
            Trigger::Http(t) => {
                info.method = Some(t.method.as_str().to_string());
                info.path = Some(t.path.clone());
            }
            Trigger::Queue(t) => info.topic = Some(t.topic.clone()),
            Trigger::Cron(t) => info.expression = Some(t.expression.clone()),
            Trigger::State(_) => {}
            Trigger::Stream(t) => {
                info.stream_name = Some(t.stream_name.clone());
                info.group_id = t.group_id.clone();
                info.item_id = t.item_id.clone();
            }
        }
        info
    }
}

type StreamMap = HashMap<String, Arc<dyn StreamAccessor>>;

/// The per-invocation bundle handed to handlers, conditions and middleware.
///
/// Built fresh for every invocation. Cloning is cheap; clones share the
/// same accessors.
#[derive(Clone)]
pub struct FlowContext {
    trace_id: String,
    enqueuer: Arc<dyn Enqueuer>,
    state: Arc<dyn StateAccessor>,
    streams: Arc<StreamMap>,
    logger: StepLogger,
    trigger: TriggerInfo,
    input: Option<TriggerInput>,
}

impl FlowContext {
    pub fn builder(trigger: TriggerInfo) -> FlowContextBuilder {
        FlowContextBuilder::new(trigger)
    }

    /// A context not attached to any transport. Enqueue and state calls
    /// fail with [`StepError::Configuration`].
    pub fn detached(kind: TriggerKind) -> Self {
        FlowContextBuilder::new(TriggerInfo::new(kind)).build()
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Publishes a message through the transport.
    pub async fn enqueue(&self, event: EnqueueEvent) -> Result<(), StepError> {
        self.enqueuer.enqueue(event).await
    }

    pub fn state(&self) -> &dyn StateAccessor {
        self.state.as_ref()
    }

    /// Looks up a registered stream by name.
    pub fn stream(&self, name: &str) -> Result<&dyn StreamAccessor, StepError> {
        self.streams
            .get(name)
            .map(|stream| stream.as_ref())
            .ok_or_else(|| StepError::Configuration(format!("Stream '{name}' is not registered")))
    }

    pub fn stream_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.streams.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn logger(&self) -> &StepLogger {
        &self.logger
    }

    pub fn trigger(&self) -> &TriggerInfo {
        &self.trigger
    }

    /// The decoded input of this invocation, if one was attached.
    pub fn input(&self) -> Option<&TriggerInput> {
        self.input.as_ref()
    }

    pub fn is_http(&self) -> bool {
        self.trigger.kind == TriggerKind::Http
    }

    pub fn is_queue(&self) -> bool {
        self.trigger.kind == TriggerKind::Queue
    }

    pub fn is_cron(&self) -> bool {
        self.trigger.kind == TriggerKind::Cron
    }

    pub fn is_state(&self) -> bool {
        self.trigger.kind == TriggerKind::State
    }

    pub fn is_stream(&self) -> bool {
        self.trigger.kind == TriggerKind::Stream
    }

    /// The HTTP body for HTTP inputs, the payload for everything else.
    pub fn get_data(&self, input: &TriggerInput) -> Value {
        input.data()
    }
}

impl fmt::Debug for FlowContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowContext")
            .field("trace_id", &self.trace_id)
            .field("trigger", &self.trigger)
            .field("streams", &self.stream_names())
            .finish()
    }
}

/// Builder for [`FlowContext`].
pub struct FlowContextBuilder {
    trace_id: String,
    enqueuer: Arc<dyn Enqueuer>,
    state: Arc<dyn StateAccessor>,
    streams: Arc<StreamMap>,
    logger: Option<StepLogger>,
    trigger: TriggerInfo,
    input: Option<TriggerInput>,
}

impl FlowContextBuilder {
    pub fn new(trigger: TriggerInfo) -> Self {
        Self {
            trace_id: String::new(),
            enqueuer: Arc::new(Unattached),
            state: Arc::new(Unattached),
            streams: Arc::new(HashMap::new()),
            logger: None,
            trigger,
            input: None,
        }
    }

    pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    pub fn enqueuer(mut self, enqueuer: Arc<dyn Enqueuer>) -> Self {
        self.enqueuer = enqueuer;
        self
    }

    pub fn state(mut self, state: Arc<dyn StateAccessor>) -> Self {
        self.state = state;
        self
    }

    pub fn streams(mut self, streams: HashMap<String, Arc<dyn StreamAccessor>>) -> Self {
        self.streams = Arc::new(streams);
        self
    }

    pub fn logger(mut self, logger: StepLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn input(mut self, input: TriggerInput) -> Self {
        self.input = Some(input);
        self
    }

    pub fn build(self) -> FlowContext {
        let logger = self
            .logger
            .unwrap_or_else(|| StepLogger::new("detached", self.trace_id.as_str()).with_trigger(self.trigger.kind));
        FlowContext {
            trace_id: self.trace_id,
            enqueuer: self.enqueuer,
            state: self.state,
            streams: self.streams,
            logger,
            trigger: self.trigger,
            input: self.input,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ApiRequest;
    use crate::trigger::{self, HttpMethod};
    use serde_json::json;

    #[test]
    fn test_trigger_info_for_http() {
        let info = TriggerInfo::for_trigger(&trigger::http(HttpMethod::Post, "/orders").into(), 2);
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            json!({"type": "http", "index": 2, "path": "/orders", "method": "POST"})
        );
    }

    #[test]
    fn test_kind_checks_and_data() {
        let ctx = FlowContext::builder(TriggerInfo::new(TriggerKind::Http))
            .trace_id("t-1")
            .build();
        assert!(ctx.is_http());
        assert!(!ctx.is_queue());
        assert_eq!(ctx.trace_id(), "t-1");

        let input = TriggerInput::Http(ApiRequest::new("POST", "/x").with_body(json!({"a": 1})));
        assert_eq!(ctx.get_data(&input), json!({"a": 1}));
        assert_eq!(ctx.get_data(&TriggerInput::Queue(json!(7))), json!(7));
    }

    #[tokio::test]
    async fn test_detached_context_rejects_enqueue() {
        let ctx = FlowContext::detached(TriggerKind::Queue);
        let error = ctx
            .enqueue(EnqueueEvent::new("x", Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(error, StepError::Configuration(_)));
        assert!(ctx.stream("missing").is_err());
    }
}
