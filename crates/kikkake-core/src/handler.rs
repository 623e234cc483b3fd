//! Callable pieces of a step: handlers, conditions and HTTP middleware.
//!
//! Each is a cheap-to-clone wrapper around an `Arc`'d closure returning a
//! boxed future, so the engine awaits every one of them the same way.

use crate::context::FlowContext;
use crate::error::StepError;
use crate::request::{ApiRequest, ApiResponse, TriggerInput};
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// The future every handler-like closure resolves through.
pub type HandlerFuture<T> = BoxFuture<'static, Result<T, StepError>>;

type ConditionFn = dyn Fn(TriggerInput, FlowContext) -> HandlerFuture<bool> + Send + Sync;
type HandlerFn = dyn Fn(TriggerInput, FlowContext) -> HandlerFuture<StepOutput> + Send + Sync;
type MiddlewareFn = dyn Fn(ApiRequest, FlowContext, Next) -> HandlerFuture<ApiResponse> + Send + Sync;

/// What a handler produced.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum StepOutput {
    /// Nothing to return. HTTP handlers map this to `204 No Content`.
    #[default]
    Complete,
    /// A plain value, acknowledged to the transport as-is.
    Value(Value),
    /// An HTTP response envelope.
    Response(ApiResponse),
}

impl StepOutput {
    /// Converts into the HTTP envelope returned to the transport.
    pub fn into_response(self) -> ApiResponse {
        match self {
            StepOutput::Complete => ApiResponse::no_content(),
            StepOutput::Value(body) => ApiResponse::ok(body),
            StepOutput::Response(response) => response,
        }
    }

    /// Converts into the value acknowledged for non-HTTP triggers.
    pub fn into_value(self) -> Result<Value, StepError> {
        match self {
            StepOutput::Complete => Ok(Value::Null),
            StepOutput::Value(value) => Ok(value),
            StepOutput::Response(response) => Ok(serde_json::to_value(response)?),
        }
    }
}

impl From<()> for StepOutput {
    fn from(_: ()) -> Self {
        StepOutput::Complete
    }
}

impl From<Value> for StepOutput {
    fn from(value: Value) -> Self {
        StepOutput::Value(value)
    }
}

impl From<ApiResponse> for StepOutput {
    fn from(response: ApiResponse) -> Self {
        StepOutput::Response(response)
    }
}

/// The user function behind a step.
///
/// # Examples
///
/// ```
/// use kikkake_core::{StepError, StepHandler};
/// use serde_json::json;
///
/// let handler = StepHandler::new(|input, _ctx| async move {
///     Ok::<_, StepError>(json!({ "echo": input.data() }))
/// });
/// # let _ = handler;
/// ```
#[derive(Clone)]
pub struct StepHandler(Arc<HandlerFn>);

impl StepHandler {
    pub fn new<F, Fut, O>(f: F) -> Self
    where
        F: Fn(TriggerInput, FlowContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, StepError>> + Send + 'static,
        O: Into<StepOutput>,
    {
        Self(Arc::new(move |input, ctx| {
            let fut = f(input, ctx);
            Box::pin(async move { fut.await.map(Into::into) })
        }))
    }

    pub async fn call(&self, input: TriggerInput, ctx: FlowContext) -> Result<StepOutput, StepError> {
        (self.0)(input, ctx).await
    }
}

impl fmt::Debug for StepHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StepHandler")
    }
}

/// A predicate gating whether a fired trigger reaches the handler.
///
/// Plain and async predicates are both stored as futures, so callers
/// always `await` [`Condition::evaluate`].
#[derive(Clone)]
pub struct Condition(Arc<ConditionFn>);

impl Condition {
    /// Wraps a synchronous predicate.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&TriggerInput, &FlowContext) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(move |input, ctx| {
            let result = f(&input, &ctx);
            Box::pin(async move { Ok(result) })
        }))
    }

    /// Wraps an async predicate.
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(TriggerInput, FlowContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool, StepError>> + Send + 'static,
    {
        Self(Arc::new(move |input, ctx| Box::pin(f(input, ctx))))
    }

    pub async fn evaluate(&self, input: TriggerInput, ctx: FlowContext) -> Result<bool, StepError> {
        (self.0)(input, ctx).await
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Condition")
    }
}

/// The rest of an HTTP middleware chain.
pub struct Next(Box<dyn FnOnce(ApiRequest) -> HandlerFuture<ApiResponse> + Send>);

impl Next {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(ApiRequest) -> HandlerFuture<ApiResponse> + Send + 'static,
    {
        Self(Box::new(f))
    }

    /// Passes the request on to the next middleware, or to the handler.
    pub async fn run(self, request: ApiRequest) -> Result<ApiResponse, StepError> {
        (self.0)(request).await
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Next")
    }
}

/// HTTP middleware. Receives the request, the context and [`Next`], and
/// decides whether and how to continue the chain.
///
/// # Examples
///
/// ```
/// use kikkake_core::{ApiResponse, Middleware, StepError};
///
/// let auth = Middleware::new(|req, _ctx, next| async move {
///     if req.header("authorization").is_none() {
///         return Ok::<_, StepError>(ApiResponse::new(401));
///     }
///     next.run(req).await
/// });
/// # let _ = auth;
/// ```
#[derive(Clone)]
pub struct Middleware(Arc<MiddlewareFn>);

impl Middleware {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(ApiRequest, FlowContext, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiResponse, StepError>> + Send + 'static,
    {
        Self(Arc::new(move |req, ctx, next| Box::pin(f(req, ctx, next))))
    }

    pub async fn call(&self, request: ApiRequest, ctx: FlowContext, next: Next) -> Result<ApiResponse, StepError> {
        (self.0)(request, ctx, next).await
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Middleware")
    }
}
