//! Trigger model: the five ways a step can be woken up.
//!
//! A [`Trigger`] is a tagged union. Each variant carries the fields that
//! define *when* it fires plus an optional [`Condition`] gate. Conditions
//! and middleware are code, so they never serialize; everything else does,
//! which is what registration metadata is built from.

use crate::handler::{Condition, Middleware};
use crate::schema::Schema;
use crate::step::InfrastructureConfig;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The kind tag of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// An HTTP request.
    #[serde(alias = "api")]
    Http,
    /// A message published on a queue topic.
    #[serde(alias = "event")]
    Queue,
    /// A cron schedule tick.
    Cron,
    /// A change to any tracked state key.
    State,
    /// A create/update/delete on a stream item.
    Stream,
}

impl TriggerKind {
    /// All kinds, in dispatch order.
    pub const ALL: [TriggerKind; 5] = [
        TriggerKind::Queue,
        TriggerKind::Http,
        TriggerKind::Cron,
        TriggerKind::State,
        TriggerKind::Stream,
    ];

    /// Returns the wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Http => "http",
            TriggerKind::Queue => "queue",
            TriggerKind::Cron => "cron",
            TriggerKind::State => "state",
            TriggerKind::Stream => "stream",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP methods an [`HttpTrigger`] can route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
}

impl HttpMethod {
    /// Returns the upper-case method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "PATCH" => Ok(HttpMethod::Patch),
            "OPTIONS" => Ok(HttpMethod::Options),
            "HEAD" => Ok(HttpMethod::Head),
            other => Err(format!("unsupported HTTP method: {other}")),
        }
    }
}

/// A documented query parameter of an HTTP route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParam {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Fires on an HTTP request matching `method` and `path`.
///
/// Path parameters use the `:name` form, e.g. `/items/:id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpTrigger {
    pub method: HttpMethod,
    pub path: String,
    #[serde(default, alias = "body_schema", skip_serializing_if = "Option::is_none")]
    pub body_schema: Option<Schema>,
    #[serde(
        default,
        alias = "response_schema",
        deserialize_with = "deserialize_status_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub response_schema: BTreeMap<u16, Schema>,
    #[serde(default, alias = "query_params", skip_serializing_if = "Vec::is_empty")]
    pub query_params: Vec<QueryParam>,
    /// Applied outermost first around the handler.
    #[serde(skip)]
    pub middleware: Vec<Middleware>,
    #[serde(skip)]
    pub condition: Option<Condition>,
}

impl HttpTrigger {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body_schema: None,
            response_schema: BTreeMap::new(),
            query_params: Vec::new(),
            middleware: Vec::new(),
            condition: None,
        }
    }

    pub fn with_body_schema(mut self, schema: Schema) -> Self {
        self.body_schema = Some(schema);
        self
    }

    pub fn with_response_schema(mut self, status: u16, schema: Schema) -> Self {
        self.response_schema.insert(status, schema);
        self
    }

    pub fn with_query_param(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.query_params.push(QueryParam {
            name: name.into(),
            description: Some(description.into()),
        });
        self
    }

    pub fn with_middleware(mut self, middleware: Middleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

// Status codes arrive as string keys, and tagged enums buffer content in a
// way that will not parse them as integers directly.
fn deserialize_status_map<'de, D>(deserializer: D) -> Result<BTreeMap<u16, Schema>, D::Error>
where
    D: Deserializer<'de>,
{
    BTreeMap::<String, Schema>::deserialize(deserializer)?
        .into_iter()
        .map(|(status, schema)| {
            status
                .parse::<u16>()
                .map(|status| (status, schema))
                .map_err(serde::de::Error::custom)
        })
        .collect()
}

/// Fires on every message published to `topic`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueTrigger {
    pub topic: String,
    /// Schema the message payload must satisfy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Schema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure: Option<InfrastructureConfig>,
    #[serde(skip)]
    pub condition: Option<Condition>,
}

impl QueueTrigger {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            input: None,
            infrastructure: None,
            condition: None,
        }
    }

    pub fn with_input_schema(mut self, schema: Schema) -> Self {
        self.input = Some(schema);
        self
    }

    pub fn with_infrastructure(mut self, infrastructure: InfrastructureConfig) -> Self {
        self.infrastructure = Some(infrastructure);
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Fires on a cron schedule. Accepts 5, 6 or 7 field expressions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronTrigger {
    pub expression: String,
    #[serde(skip)]
    pub condition: Option<Condition>,
}

impl CronTrigger {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Fires whenever any tracked state key changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateTrigger {
    #[serde(skip)]
    pub condition: Option<Condition>,
}

impl StateTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Fires on stream item events, optionally narrowed to a group or item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamTrigger {
    #[serde(alias = "stream_name")]
    pub stream_name: String,
    #[serde(default, alias = "group_id", skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, alias = "item_id", skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(skip)]
    pub condition: Option<Condition>,
}

impl StreamTrigger {
    pub fn new(stream_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            group_id: None,
            item_id: None,
            condition: None,
        }
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_item_id(mut self, item_id: impl Into<String>) -> Self {
        self.item_id = Some(item_id.into());
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Declarative description of when a step runs.
///
/// # Examples
///
/// ```
/// use kikkake_core::{trigger, HttpMethod, Trigger, TriggerKind};
///
/// let t: Trigger = trigger::http(HttpMethod::Get, "/items/:id").into();
/// assert!(t.is_http());
/// assert_eq!(t.kind(), TriggerKind::Http);
/// assert_eq!(t.descriptor(), "http(GET /items/:id)");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Trigger {
    #[serde(alias = "api")]
    Http(HttpTrigger),
    #[serde(alias = "event")]
    Queue(QueueTrigger),
    Cron(CronTrigger),
    State(StateTrigger),
    Stream(StreamTrigger),
}

impl Trigger {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::Http(_) => TriggerKind::Http,
            Trigger::Queue(_) => TriggerKind::Queue,
            Trigger::Cron(_) => TriggerKind::Cron,
            Trigger::State(_) => TriggerKind::State,
            Trigger::Stream(_) => TriggerKind::Stream,
        }
    }

    pub fn is_http(&self) -> bool {
        matches!(self, Trigger::Http(_))
    }

    pub fn is_queue(&self) -> bool {
        matches!(self, Trigger::Queue(_))
    }

    pub fn is_cron(&self) -> bool {
        matches!(self, Trigger::Cron(_))
    }

    pub fn is_state(&self) -> bool {
        matches!(self, Trigger::State(_))
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Trigger::Stream(_))
    }

    pub fn condition(&self) -> Option<&Condition> {
        match self {
            Trigger::Http(t) => t.condition.as_ref(),
            Trigger::Queue(t) => t.condition.as_ref(),
            Trigger::Cron(t) => t.condition.as_ref(),
            Trigger::State(t) => t.condition.as_ref(),
            Trigger::Stream(t) => t.condition.as_ref(),
        }
    }

    /// The schema inbound payloads are validated against, if any.
    pub fn input_schema(&self) -> Option<&Schema> {
        match self {
            Trigger::Http(t) => t.body_schema.as_ref(),
            Trigger::Queue(t) => t.input.as_ref(),
            _ => None,
        }
    }

    /// Human-readable descriptor used to build function ids.
    pub fn descriptor(&self) -> String {
        match self {
            Trigger::Http(t) => format!("http({} {})", t.method, t.path),
            Trigger::Queue(t) => format!("queue({})", t.topic),
            Trigger::Cron(t) => format!("cron({})", t.expression),
            Trigger::State(_) => "state".to_string(),
            Trigger::Stream(t) => format!("stream({})", t.stream_name),
        }
    }
}

impl From<HttpTrigger> for Trigger {
    fn from(t: HttpTrigger) -> Self {
        Trigger::Http(t)
    }
}

impl From<QueueTrigger> for Trigger {
    fn from(t: QueueTrigger) -> Self {
        Trigger::Queue(t)
    }
}

impl From<CronTrigger> for Trigger {
    fn from(t: CronTrigger) -> Self {
        Trigger::Cron(t)
    }
}

impl From<StateTrigger> for Trigger {
    fn from(t: StateTrigger) -> Self {
        Trigger::State(t)
    }
}

impl From<StreamTrigger> for Trigger {
    fn from(t: StreamTrigger) -> Self {
        Trigger::Stream(t)
    }
}

/// Creates an HTTP trigger.
pub fn http(method: HttpMethod, path: impl Into<String>) -> HttpTrigger {
    HttpTrigger::new(method, path)
}

/// Creates a queue trigger.
pub fn queue(topic: impl Into<String>) -> QueueTrigger {
    QueueTrigger::new(topic)
}

/// Alias of [`queue`] kept for configs written against the event API.
pub fn event(topic: impl Into<String>) -> QueueTrigger {
    QueueTrigger::new(topic)
}

/// Creates a cron trigger.
pub fn cron(expression: impl Into<String>) -> CronTrigger {
    CronTrigger::new(expression)
}

/// Creates a state-change trigger.
pub fn state() -> StateTrigger {
    StateTrigger::new()
}

/// Creates a stream trigger.
pub fn stream(stream_name: impl Into<String>) -> StreamTrigger {
    StreamTrigger::new(stream_name)
}

/// Turns a 5 or 6 field cron expression into the seconds-first form the
/// `cron` crate parses.
pub(crate) fn normalize_cron_expression(expr: &str) -> String {
    let fields = expr.split_whitespace().count();
    match fields {
        5 => format!("0 {expr}"),
        _ => expr.to_string(),
    }
}
