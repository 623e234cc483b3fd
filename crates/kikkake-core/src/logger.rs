//! Per-invocation logger.

use crate::trigger::TriggerKind;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Emits `tracing` events tagged with the step, trace id and trigger kind
/// of the invocation it belongs to.
#[derive(Debug, Clone)]
pub struct StepLogger {
    step: Arc<str>,
    trace_id: Arc<str>,
    trigger: Option<TriggerKind>,
}

impl StepLogger {
    pub fn new(step: impl Into<Arc<str>>, trace_id: impl Into<Arc<str>>) -> Self {
        Self {
            step: step.into(),
            trace_id: trace_id.into(),
            trigger: None,
        }
    }

    pub fn with_trigger(mut self, kind: TriggerKind) -> Self {
        self.trigger = Some(kind);
        self
    }

    pub fn step(&self) -> &str {
        &self.step
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    fn trigger_str(&self) -> &'static str {
        self.trigger.as_ref().map_or("none", TriggerKind::as_str)
    }

    pub fn debug(&self, message: &str) {
        debug!(step = %self.step, trace_id = %self.trace_id, trigger = self.trigger_str(), "{message}");
    }

    pub fn info(&self, message: &str) {
        info!(step = %self.step, trace_id = %self.trace_id, trigger = self.trigger_str(), "{message}");
    }

    pub fn warn(&self, message: &str) {
        warn!(step = %self.step, trace_id = %self.trace_id, trigger = self.trigger_str(), "{message}");
    }

    pub fn error(&self, message: &str) {
        error!(step = %self.step, trace_id = %self.trace_id, trigger = self.trigger_str(), "{message}");
    }

    /// Logs at info level with an attached structured value.
    pub fn info_with(&self, message: &str, data: &Value) {
        info!(
            step = %self.step,
            trace_id = %self.trace_id,
            trigger = self.trigger_str(),
            data = %data,
            "{message}"
        );
    }
}

impl Default for StepLogger {
    fn default() -> Self {
        Self::new("detached", "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_carries_invocation_tags() {
        let logger = StepLogger::new("ProcessOrder", "abc123").with_trigger(TriggerKind::Queue);
        assert_eq!(logger.step(), "ProcessOrder");
        assert_eq!(logger.trace_id(), "abc123");
        assert_eq!(logger.trigger_str(), "queue");
        logger.info("processing");
    }
}
