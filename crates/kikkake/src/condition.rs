//! Condition functions the transport calls before dispatching a trigger.

use crate::context_builder::ContextFactory;
use kikkake_core::{
    ApiRequest, Condition, FunctionHandler, Invocation, StepError, TraceContext, TriggerInfo,
    TriggerInput, TriggerKind,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

const REQUEST_VIEW_FIELDS: [&str; 6] = [
    "path_params",
    "pathParams",
    "query_params",
    "queryParams",
    "body",
    "headers",
];

/// The request a condition sees: path and query params, body, headers.
/// A payload that is not an object is taken as the body.
pub(crate) fn request_view(payload: Value) -> Result<ApiRequest, StepError> {
    match payload {
        Value::Object(mut fields) => {
            let view: Map<String, Value> = REQUEST_VIEW_FIELDS
                .iter()
                .filter_map(|name| fields.remove(*name).map(|value| (name.to_string(), value)))
                .collect();
            ApiRequest::from_payload(Value::Object(view))
        }
        body => Ok(ApiRequest::default().with_body(body)),
    }
}

/// Builds the function registered under `<function_id>::conditions::<index>`.
///
/// It decodes the payload the same way the wrapped handler does, evaluates
/// `condition` against a fresh context and answers with a boolean.
pub fn condition_function(
    step: &str,
    trigger: TriggerInfo,
    condition: Condition,
    factory: ContextFactory,
) -> FunctionHandler {
    let step: Arc<str> = Arc::from(step);
    FunctionHandler::new(move |invocation: Invocation| {
        let step = Arc::clone(&step);
        let trigger = trigger.clone();
        let condition = condition.clone();
        let factory = factory.clone();
        async move {
            let input = match trigger.kind {
                TriggerKind::Http => TriggerInput::Http(request_view(invocation.payload)?),
                kind => TriggerInput::decode(kind, invocation.payload)?,
            };
            let trace = invocation
                .parent
                .as_ref()
                .map_or_else(TraceContext::new_root, TraceContext::child);
            let ctx = factory.build(&step, trigger, &trace, Some(input.clone()));
            let passed = condition.evaluate(input, ctx).await?;
            debug!(step = %step, passed, "Condition evaluated");
            Ok::<_, StepError>(Value::Bool(passed))
        }
    })
}
