//! The function registered for each trigger of a step.

use crate::context_builder::ContextFactory;
use crate::middleware::compose;
use crate::telemetry::StepSpan;
use kikkake_core::schema::validate_input;
use kikkake_core::{
    FunctionHandler, Invocation, Schema, StepError, StepHandler, TraceContext, Trigger,
    TriggerInfo, TriggerInput,
};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, Instrument};

/// Runs one step handler for one of its triggers.
///
/// Per invocation, in order: open the step span, decode the payload,
/// validate it against the trigger's schema, build the context, check the
/// condition when the transport has not, then call the handler (through
/// the middleware chain for HTTP). Errors are recorded on the span and
/// returned unchanged.
#[derive(Clone)]
pub struct WrappedHandler {
    step: Arc<str>,
    trigger: Arc<Trigger>,
    index: usize,
    handler: StepHandler,
    factory: ContextFactory,
}

impl WrappedHandler {
    pub fn new(
        step: &str,
        trigger: Trigger,
        index: usize,
        handler: StepHandler,
        factory: ContextFactory,
    ) -> Self {
        Self {
            step: Arc::from(step),
            trigger: Arc::new(trigger),
            index,
            handler,
            factory,
        }
    }

    pub fn into_function(self) -> FunctionHandler {
        let this = Arc::new(self);
        FunctionHandler::new(move |invocation| {
            let this = Arc::clone(&this);
            async move { this.invoke(invocation).await }
        })
    }

    pub async fn invoke(&self, invocation: Invocation) -> Result<Value, StepError> {
        let kind = self.trigger.kind();
        let http = match self.trigger.as_ref() {
            Trigger::Http(t) => Some((t.method.as_str(), t.path.as_str())),
            _ => None,
        };
        let span = StepSpan::start(&self.step, kind, invocation.parent.as_ref(), http);
        let result = self
            .run(invocation, span.trace())
            .instrument(span.span().clone())
            .await;
        match &result {
            Ok(_) => span.ok(),
            Err(err) => {
                error!(step = %self.step, trigger = kind.as_str(), error = %err, "Step invocation failed");
                span.error(err);
            }
        }
        result
    }

    async fn run(&self, invocation: Invocation, trace: &TraceContext) -> Result<Value, StepError> {
        let Invocation {
            payload,
            conditions_checked,
            ..
        } = invocation;

        let mut input = TriggerInput::decode(self.trigger.kind(), payload)?;
        if let Some(schema) = self.trigger.input_schema() {
            input = self.validate(schema, input)?;
        }

        let info = TriggerInfo::for_trigger(&self.trigger, self.index);
        let ctx = self.factory.build(&self.step, info, trace, Some(input.clone()));

        if !conditions_checked {
            if let Some(condition) = self.trigger.condition() {
                if !condition.evaluate(input.clone(), ctx.clone()).await? {
                    debug!(step = %self.step, "Condition not met, handler skipped");
                    return Ok(Value::Null);
                }
            }
        }

        match (self.trigger.as_ref(), input) {
            (Trigger::Http(http), TriggerInput::Http(request)) if !http.middleware.is_empty() => {
                let chain = compose(&http.middleware, &ctx, self.handler.clone());
                Ok(serde_json::to_value(chain.run(request).await?)?)
            }
            (Trigger::Http(_), input) => {
                let response = self.handler.call(input, ctx).await?.into_response();
                Ok(serde_json::to_value(response)?)
            }
            (_, input) => self.handler.call(input, ctx).await?.into_value(),
        }
    }

    fn validate(&self, schema: &Schema, input: TriggerInput) -> Result<TriggerInput, StepError> {
        match input {
            TriggerInput::Http(mut request) => {
                let body = std::mem::take(&mut request.body);
                request.body = validate_input(schema, body, &format!("http:{}", self.step))?;
                Ok(TriggerInput::Http(request))
            }
            TriggerInput::Queue(value) => {
                let value = validate_input(schema, value, &format!("queue:{}", self.step))?;
                Ok(TriggerInput::Queue(value))
            }
            other => Ok(other),
        }
    }
}

impl fmt::Debug for WrappedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrappedHandler")
            .field("step", &self.step)
            .field("trigger", &self.trigger.descriptor())
            .field("index", &self.index)
            .finish()
    }
}
