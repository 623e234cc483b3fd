//! Step identity and configuration.

use crate::error::StepError;
use crate::schema::{validate_schema, Schema};
use crate::trigger::{normalize_cron_expression, Trigger};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Type-safe step name wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepName(String);

impl StepName {
    /// Creates a new StepName.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the step name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StepName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for StepName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for StepName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A topic a step declares it publishes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnqueueTopic {
    Topic(String),
    Detailed {
        topic: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        /// Published only on some code paths.
        #[serde(default)]
        conditional: bool,
    },
}

impl EnqueueTopic {
    pub fn topic(&self) -> &str {
        match self {
            EnqueueTopic::Topic(topic) => topic,
            EnqueueTopic::Detailed { topic, .. } => topic,
        }
    }
}

impl From<&str> for EnqueueTopic {
    fn from(topic: &str) -> Self {
        EnqueueTopic::Topic(topic.to_string())
    }
}

impl From<String> for EnqueueTopic {
    fn from(topic: String) -> Self {
        EnqueueTopic::Topic(topic)
    }
}

/// Resources requested for the handler process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Memory in MB.
    #[serde(default = "default_ram")]
    pub ram: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u32>,
    /// Seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u32,
}

fn default_ram() -> u32 {
    128
}

fn default_timeout() -> u32 {
    30
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            ram: default_ram(),
            cpu: None,
            timeout: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueType {
    Fifo,
    #[default]
    Standard,
}

/// Delivery settings for the queue feeding a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    #[serde(rename = "type", default)]
    pub kind: QueueType,
    #[serde(default = "default_max_retries", alias = "max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout", alias = "visibility_timeout")]
    pub visibility_timeout: u32,
    #[serde(default, alias = "delay_seconds")]
    pub delay_seconds: u32,
}

fn default_max_retries() -> u32 {
    3
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            kind: QueueType::Standard,
            max_retries: default_max_retries(),
            visibility_timeout: default_timeout(),
            delay_seconds: 0,
        }
    }
}

/// Infrastructure hints passed through to the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfrastructureConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<HandlerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueConfig>,
}

/// Configuration of a step: its name, triggers and declared outputs.
///
/// Trigger order is significant: it determines each trigger's index and
/// therefore its registration id.
///
/// # Examples
///
/// ```
/// use kikkake_core::{trigger, HttpMethod, StepConfig};
///
/// let config = StepConfig::new("CreateOrder")
///     .trigger(trigger::http(HttpMethod::Post, "/orders"))
///     .enqueues("orders.created")
///     .description("Accepts new orders");
///
/// assert!(config.validate().is_empty());
/// assert_eq!(config.triggers.len(), 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepConfig {
    pub name: StepName,
    pub triggers: Vec<Trigger>,
    #[serde(default, alias = "emits", skip_serializing_if = "Vec::is_empty")]
    pub enqueues: Vec<EnqueueTopic>,
    #[serde(
        default,
        alias = "virtual_enqueues",
        alias = "virtualEmits",
        alias = "virtual_emits",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub virtual_enqueues: Vec<EnqueueTopic>,
    #[serde(default, alias = "virtual_subscribes", skip_serializing_if = "Vec::is_empty")]
    pub virtual_subscribes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flows: Vec<String>,
    #[serde(default, alias = "include_files", skip_serializing_if = "Vec::is_empty")]
    pub include_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure: Option<InfrastructureConfig>,
}

impl StepConfig {
    /// Creates a config with no triggers.
    pub fn new(name: impl Into<StepName>) -> Self {
        Self {
            name: name.into(),
            triggers: Vec::new(),
            enqueues: Vec::new(),
            virtual_enqueues: Vec::new(),
            virtual_subscribes: Vec::new(),
            description: None,
            flows: Vec::new(),
            include_files: Vec::new(),
            infrastructure: None,
        }
    }

    /// Parses a loosely-typed config.
    ///
    /// Legacy trigger tags `api` and `event` are accepted as `http` and
    /// `queue`, and `emits` as `enqueues`.
    pub fn from_value(value: Value) -> Result<Self, StepError> {
        serde_json::from_value(value)
            .map_err(|e| StepError::Configuration(format!("Invalid step config: {e}")))
    }

    pub fn trigger(mut self, trigger: impl Into<Trigger>) -> Self {
        self.triggers.push(trigger.into());
        self
    }

    pub fn enqueues(mut self, topic: impl Into<EnqueueTopic>) -> Self {
        self.enqueues.push(topic.into());
        self
    }

    pub fn virtual_enqueues(mut self, topic: impl Into<EnqueueTopic>) -> Self {
        self.virtual_enqueues.push(topic.into());
        self
    }

    pub fn virtual_subscribes(mut self, topic: impl Into<String>) -> Self {
        self.virtual_subscribes.push(topic.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn flow(mut self, flow: impl Into<String>) -> Self {
        self.flows.push(flow.into());
        self
    }

    pub fn include_file(mut self, path: impl Into<String>) -> Self {
        self.include_files.push(path.into());
        self
    }

    pub fn infrastructure(mut self, infrastructure: InfrastructureConfig) -> Self {
        self.infrastructure = Some(infrastructure);
        self
    }

    /// Returns every problem with this config. Empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.name.as_str().trim().is_empty() {
            errors.push("Step name cannot be empty".to_string());
        }

        for (index, trigger) in self.triggers.iter().enumerate() {
            let at = format!("triggers[{index}]");
            match trigger {
                Trigger::Http(t) => {
                    if !t.path.starts_with('/') {
                        errors.push(format!("{at}: HTTP path '{}' must start with '/'", t.path));
                    }
                    if let Some(schema) = &t.body_schema {
                        schema_errors(schema, &format!("{at}.bodySchema"), &mut errors);
                    }
                    for (status, schema) in &t.response_schema {
                        schema_errors(schema, &format!("{at}.responseSchema.{status}"), &mut errors);
                    }
                }
                Trigger::Queue(t) => {
                    if t.topic.trim().is_empty() {
                        errors.push(format!("{at}: queue topic cannot be empty"));
                    }
                    if let Some(schema) = &t.input {
                        schema_errors(schema, &format!("{at}.input"), &mut errors);
                    }
                }
                Trigger::Cron(t) => {
                    let normalized = normalize_cron_expression(&t.expression);
                    if let Err(e) = cron::Schedule::from_str(&normalized) {
                        errors.push(format!(
                            "{at}: invalid cron expression '{}': {e}",
                            t.expression
                        ));
                    }
                }
                Trigger::State(_) => {}
                Trigger::Stream(t) => {
                    if t.stream_name.trim().is_empty() {
                        errors.push(format!("{at}: stream name cannot be empty"));
                    }
                }
            }
        }

        for topic in self.enqueues.iter().chain(&self.virtual_enqueues) {
            if topic.topic().trim().is_empty() {
                errors.push("Enqueued topics cannot be empty".to_string());
            }
        }

        errors
    }

    /// Validates, turning any problems into [`StepError::InvalidStep`].
    pub fn validated(self) -> Result<Self, StepError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(StepError::InvalidStep {
                step_name: self.name,
                errors,
            })
        }
    }

    /// Sanitized config for introspection tooling.
    ///
    /// Conditions and middleware are dropped, typed schemas are rendered
    /// as JSON Schema, and the step's source path is added as `filePath`.
    pub fn metadata(&self, file_path: &str) -> Result<Value, StepError> {
        let mut metadata = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut metadata {
            map.insert("filePath".to_string(), Value::from(file_path));
        }
        Ok(metadata)
    }
}

fn schema_errors(schema: &Schema, at: &str, errors: &mut Vec<String>) {
    if let Schema::Json(value) = schema {
        errors.extend(validate_schema(value).into_iter().map(|e| format!("{at}: {e}")));
    }
}

/// Anything that can be turned into a [`StepConfig`].
pub trait IntoStepConfig {
    fn into_step_config(self) -> Result<StepConfig, StepError>;
}

impl IntoStepConfig for StepConfig {
    fn into_step_config(self) -> Result<StepConfig, StepError> {
        Ok(self)
    }
}

impl IntoStepConfig for Value {
    fn into_step_config(self) -> Result<StepConfig, StepError> {
        StepConfig::from_value(self)
    }
}
