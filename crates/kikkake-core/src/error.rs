//! Error types for step registration and dispatch.

use crate::step::StepName;
use crate::trigger::TriggerKind;
use thiserror::Error;

/// Errors raised while registering steps or dispatching trigger events.
///
/// Configuration problems surface synchronously when a step is built or
/// registered. Everything else surfaces from a single invocation and is
/// handed back to the transport unchanged, which owns retry and
/// redelivery.
///
/// # Non-Exhaustive
///
/// Always include a wildcard arm when matching:
///
/// ```
/// use kikkake_core::{StepError, TriggerKind};
///
/// fn describe(error: &StepError) -> String {
///     match error {
///         StepError::Validation { label, .. } => format!("bad input for {label}"),
///         StepError::NoHandler { kind, .. } => format!("nothing handles {kind}"),
///         _ => error.to_string(),
///     }
/// }
///
/// let error = StepError::NoHandler { kind: TriggerKind::Http, available: vec![] };
/// assert_eq!(describe(&error), "nothing handles http");
/// ```
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StepError {
    /// A configuration value could not be turned into a valid step.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A step config was parsed but failed validation.
    #[error("Invalid step config for {}: {}", .step_name, .errors.join(", "))]
    InvalidStep {
        /// The step that failed validation.
        step_name: StepName,
        /// Every problem found, in trigger order.
        errors: Vec<String>,
    },

    /// An inbound payload violated the declared input or body schema.
    #[error("Validation failed for {label}: {details}")]
    Validation {
        /// Where the payload came from, e.g. `http:CreateOrder`.
        label: String,
        /// The violations that were found.
        details: String,
    },

    /// A multi-trigger step has no sub-handler for the trigger that fired.
    #[error(
        "No handler defined for trigger type: {}. Available handlers: {}",
        .kind,
        join_kinds(.available)
    )]
    NoHandler {
        /// The kind that fired.
        kind: TriggerKind,
        /// The kinds that do have a handler.
        available: Vec<TriggerKind>,
    },

    /// A user handler failed.
    #[error("Step failed: {step_name}, details: {details}")]
    Handler {
        /// The step whose handler failed.
        step_name: StepName,
        /// Details about the failure.
        details: String,
    },

    /// A call through the transport failed.
    #[error("Transport call '{op}' failed: {details}")]
    Transport {
        /// The operation or function id that was called.
        op: String,
        /// Details reported by the transport.
        details: String,
    },

    /// A payload could not be converted to or from JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StepError {
    /// Shorthand for a [`StepError::Handler`] raised from user code.
    pub fn handler(step_name: impl Into<StepName>, details: impl Into<String>) -> Self {
        Self::Handler {
            step_name: step_name.into(),
            details: details.into(),
        }
    }

    /// Shorthand for a [`StepError::Transport`] failure.
    pub fn transport(op: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Transport {
            op: op.into(),
            details: details.into(),
        }
    }

    /// Returns `true` for errors caused by a bad inbound payload.
    ///
    /// The HTTP edge maps these to a 4xx response.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

fn join_kinds(kinds: &[TriggerKind]) -> String {
    kinds
        .iter()
        .map(TriggerKind::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = StepError::handler("send_email", "smtp down");
        assert_eq!(error.to_string(), "Step failed: send_email, details: smtp down");

        let error = StepError::Validation {
            label: "queue:process_order".to_string(),
            details: "$.amount: expected number".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Validation failed for queue:process_order: $.amount: expected number"
        );
        assert!(error.is_validation());
    }

    #[test]
    fn test_invalid_step_display() {
        let error = StepError::InvalidStep {
            step_name: StepName::new("broken"),
            errors: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(error.to_string(), "Invalid step config for broken: a, b");
    }

    #[test]
    fn test_no_handler_lists_available_kinds() {
        let error = StepError::NoHandler {
            kind: TriggerKind::Http,
            available: vec![TriggerKind::Queue, TriggerKind::Cron],
        };
        assert_eq!(
            error.to_string(),
            "No handler defined for trigger type: http. Available handlers: queue, cron"
        );
    }
}
