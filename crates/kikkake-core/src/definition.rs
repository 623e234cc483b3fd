//! Step definitions and the single-handler builder.

use crate::context::FlowContext;
use crate::error::StepError;
use crate::handler::{StepHandler, StepOutput};
use crate::request::TriggerInput;
use crate::step::{IntoStepConfig, StepConfig, StepName};
use std::future::Future;

/// A validated [`StepConfig`] paired with its handler.
///
/// Immutable once built; hand it to the runtime to register it.
#[derive(Debug, Clone)]
pub struct StepDefinition {
    config: StepConfig,
    handler: StepHandler,
}

impl StepDefinition {
    /// Builds a definition directly from a config and a handler.
    pub fn new(config: impl IntoStepConfig, handler: StepHandler) -> Result<Self, StepError> {
        let config = config.into_step_config()?.validated()?;
        Ok(Self { config, handler })
    }

    pub fn name(&self) -> &StepName {
        &self.config.name
    }

    pub fn config(&self) -> &StepConfig {
        &self.config
    }

    pub fn handler(&self) -> &StepHandler {
        &self.handler
    }

    pub fn into_parts(self) -> (StepConfig, StepHandler) {
        (self.config, self.handler)
    }

    pub(crate) fn from_validated(config: StepConfig, handler: StepHandler) -> Self {
        Self { config, handler }
    }
}

/// Deferred form of [`StepDefinition::new`]: validate now, attach the
/// handler later.
#[derive(Debug, Clone)]
pub struct StepBuilder {
    config: StepConfig,
}

impl StepBuilder {
    pub fn config(&self) -> &StepConfig {
        &self.config
    }

    /// Attaches a handler closure.
    pub fn handle<F, Fut, O>(self, f: F) -> StepDefinition
    where
        F: Fn(TriggerInput, FlowContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, StepError>> + Send + 'static,
        O: Into<StepOutput>,
    {
        self.handler(StepHandler::new(f))
    }

    /// Attaches an existing [`StepHandler`].
    pub fn handler(self, handler: StepHandler) -> StepDefinition {
        StepDefinition::from_validated(self.config, handler)
    }
}

/// Starts a step definition. The config is normalized and validated here,
/// so a malformed config never reaches registration.
///
/// # Examples
///
/// ```
/// use kikkake_core::{step, StepError};
/// use serde_json::json;
///
/// let definition = step(json!({
///     "name": "Audit",
///     "triggers": [{"type": "queue", "topic": "orders.created"}]
/// }))?
/// .handle(|input, ctx| async move {
///     ctx.logger().info_with("audited", &input.data());
///     Ok::<_, StepError>(())
/// });
///
/// assert_eq!(definition.name().as_str(), "Audit");
/// # Ok::<(), StepError>(())
/// ```
pub fn step(config: impl IntoStepConfig) -> Result<StepBuilder, StepError> {
    let config = config.into_step_config()?.validated()?;
    Ok(StepBuilder { config })
}
