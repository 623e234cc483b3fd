//! Inbound payload shapes, one per trigger kind.

use crate::error::StepError;
use crate::trigger::TriggerKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A query parameter or header value. Repeated keys arrive as a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    One(String),
    Many(Vec<String>),
}

impl ParamValue {
    /// Returns the first value, if any.
    pub fn first(&self) -> Option<&str> {
        match self {
            ParamValue::One(v) => Some(v.as_str()),
            ParamValue::Many(vs) => vs.first().map(String::as_str),
        }
    }

    /// Returns every value in arrival order.
    pub fn values(&self) -> Vec<&str> {
        match self {
            ParamValue::One(v) => vec![v.as_str()],
            ParamValue::Many(vs) => vs.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::One(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::One(s)
    }
}

/// The canonical HTTP request handed to HTTP handlers.
///
/// Transports convert their wire format into this shape once, at the
/// boundary. Fields missing from the payload default to empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiRequest {
    pub method: String,
    pub path: String,
    #[serde(alias = "pathParams")]
    pub path_params: BTreeMap<String, String>,
    #[serde(alias = "queryParams")]
    pub query_params: BTreeMap<String, ParamValue>,
    pub body: Value,
    pub headers: BTreeMap<String, ParamValue>,
}

impl ApiRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    /// Parses a raw transport payload.
    pub fn from_payload(payload: Value) -> Result<Self, StepError> {
        Ok(serde_json::from_value(payload)?)
    }

    pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    pub fn with_query_param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    /// First value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).and_then(ParamValue::first)
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, value)| value.first())
    }
}

/// The envelope HTTP handlers resolve to.
///
/// Serializes as `{status_code, headers?, body?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    #[serde(rename = "status_code", alias = "status")]
    pub status: u16,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl ApiResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// A 200 response with a JSON body.
    pub fn ok(body: Value) -> Self {
        Self::json(200, body)
    }

    pub fn json(status: u16, body: Value) -> Self {
        Self::new(status).with_body(body)
    }

    pub fn no_content() -> Self {
        Self::new(204)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Payload of a state-change trigger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateTriggerInput {
    #[serde(alias = "groupId")]
    pub group_id: String,
    #[serde(alias = "itemId")]
    pub item_id: String,
    #[serde(default, alias = "oldValue")]
    pub old_value: Option<Value>,
    #[serde(default, alias = "newValue")]
    pub new_value: Option<Value>,
}

/// What happened to a stream item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamEventType {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub kind: StreamEventType,
    #[serde(default)]
    pub data: Value,
}

/// Payload of a stream trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamTriggerInput {
    #[serde(alias = "streamName")]
    pub stream_name: String,
    #[serde(alias = "groupId")]
    pub group_id: String,
    #[serde(alias = "itemId", alias = "id")]
    pub item_id: String,
    pub event: StreamEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// A message published through `FlowContext::enqueue`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnqueueEvent {
    pub topic: String,
    #[serde(default)]
    pub data: Value,
    #[serde(
        default,
        alias = "messageGroupId",
        skip_serializing_if = "Option::is_none"
    )]
    pub message_group_id: Option<String>,
}

impl EnqueueEvent {
    pub fn new(topic: impl Into<String>, data: Value) -> Self {
        Self {
            topic: topic.into(),
            data,
            message_group_id: None,
        }
    }

    /// Sets the FIFO group this message is ordered within.
    pub fn with_message_group_id(mut self, group: impl Into<String>) -> Self {
        self.message_group_id = Some(group.into());
        self
    }
}

/// The decoded input of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerInput {
    Http(ApiRequest),
    Queue(Value),
    /// Cron ticks carry no payload.
    Cron,
    State(StateTriggerInput),
    Stream(StreamTriggerInput),
}

impl TriggerInput {
    /// Decodes a raw transport payload for the given kind.
    pub fn decode(kind: TriggerKind, payload: Value) -> Result<Self, StepError> {
        Ok(match kind {
            TriggerKind::Http => TriggerInput::Http(ApiRequest::from_payload(payload)?),
            TriggerKind::Queue => TriggerInput::Queue(payload),
            TriggerKind::Cron => TriggerInput::Cron,
            TriggerKind::State => TriggerInput::State(serde_json::from_value(payload)?),
            TriggerKind::Stream => TriggerInput::Stream(serde_json::from_value(payload)?),
        })
    }

    pub fn kind(&self) -> TriggerKind {
        match self {
            TriggerInput::Http(_) => TriggerKind::Http,
            TriggerInput::Queue(_) => TriggerKind::Queue,
            TriggerInput::Cron => TriggerKind::Cron,
            TriggerInput::State(_) => TriggerKind::State,
            TriggerInput::Stream(_) => TriggerKind::Stream,
        }
    }

    /// The data portion of the input: the HTTP body, or the payload
    /// itself for every other kind. Cron yields `null`.
    pub fn data(&self) -> Value {
        match self {
            TriggerInput::Http(req) => req.body.clone(),
            TriggerInput::Queue(value) => value.clone(),
            TriggerInput::Cron => Value::Null,
            TriggerInput::State(input) => serde_json::to_value(input).unwrap_or(Value::Null),
            TriggerInput::Stream(input) => serde_json::to_value(input).unwrap_or(Value::Null),
        }
    }

    pub fn as_request(&self) -> Option<&ApiRequest> {
        match self {
            TriggerInput::Http(req) => Some(req),
            _ => None,
        }
    }

    pub fn into_request(self) -> Option<ApiRequest> {
        match self {
            TriggerInput::Http(req) => Some(req),
            _ => None,
        }
    }

    pub fn as_queue(&self) -> Option<&Value> {
        match self {
            TriggerInput::Queue(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_state(&self) -> Option<&StateTriggerInput> {
        match self {
            TriggerInput::State(input) => Some(input),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&StreamTriggerInput> {
        match self {
            TriggerInput::Stream(input) => Some(input),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_from_payload_defaults_missing_fields() {
        let req = ApiRequest::from_payload(json!({"path_params": {"id": "abc"}})).unwrap();
        assert_eq!(req.path_param("id"), Some("abc"));
        assert_eq!(req.body, Value::Null);
        assert!(req.headers.is_empty());
    }

    #[test]
    fn test_request_multi_valued_params() {
        let req = ApiRequest::from_payload(json!({
            "query_params": {"tag": ["a", "b"], "page": "2"},
            "headers": {"X-Request-Id": "r-1"}
        }))
        .unwrap();
        assert_eq!(req.query_param("tag"), Some("a"));
        assert_eq!(req.query_params["tag"].values(), vec!["a", "b"]);
        assert_eq!(req.query_param("page"), Some("2"));
        assert_eq!(req.header("x-request-id"), Some("r-1"));
    }

    #[test]
    fn test_response_envelope() {
        let value = serde_json::to_value(ApiResponse::ok(json!({"id": "abc"}))).unwrap();
        assert_eq!(value, json!({"status_code": 200, "body": {"id": "abc"}}));

        let parsed: ApiResponse = serde_json::from_value(json!({"status": 404})).unwrap();
        assert_eq!(parsed, ApiResponse::new(404));
        assert!(!parsed.is_success());
    }

    #[test]
    fn test_decode_stream_input() {
        let input = TriggerInput::decode(
            TriggerKind::Stream,
            json!({
                "streamName": "todos",
                "groupId": "inbox",
                "id": "t-1",
                "timestamp": 1,
                "event": {"type": "update", "data": {"done": true}}
            }),
        )
        .unwrap();
        let stream = input.as_stream().unwrap();
        assert_eq!(stream.item_id, "t-1");
        assert_eq!(stream.event.kind, StreamEventType::Update);
    }

    #[test]
    fn test_decode_cron_ignores_payload() {
        let input = TriggerInput::decode(TriggerKind::Cron, json!({"anything": 1})).unwrap();
        assert_eq!(input, TriggerInput::Cron);
        assert_eq!(input.data(), Value::Null);
    }

    #[test]
    fn test_enqueue_event_serialization() {
        let event = EnqueueEvent::new("orders.processed", json!({"id": "1"}));
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"topic": "orders.processed", "data": {"id": "1"}})
        );
    }
}
