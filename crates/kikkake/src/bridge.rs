//! The engine's handle on the transport.
//!
//! Every registration and call goes through the bridge, which runs the
//! registered [`CallInterceptor`]s on traffic in both directions.

use crate::telemetry::{OperationAttrs, OperationSpan, TracePropagator};
use kikkake_core::{
    CallInterceptor, FunctionHandler, OutboundCall, StepError, TraceContext, Transport,
    TriggerRegistration,
};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::Instrument;

#[derive(Clone)]
pub struct Bridge {
    transport: Arc<dyn Transport>,
    interceptors: Arc<Vec<Arc<dyn CallInterceptor>>>,
}

impl Bridge {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            interceptors: Arc::new(Vec::new()),
        }
    }

    /// A bridge with W3C trace propagation installed.
    pub fn instrumented(transport: Arc<dyn Transport>) -> Self {
        Self::new(transport).with_interceptor(Arc::new(TracePropagator))
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn CallInterceptor>) -> Self {
        Arc::make_mut(&mut self.interceptors).push(interceptor);
        self
    }

    /// Registers `handler`; inbound interceptors run before it sees the
    /// invocation.
    pub fn register_function(&self, function_id: &str, handler: FunctionHandler) -> Result<(), StepError> {
        let interceptors = Arc::clone(&self.interceptors);
        let intercepted = FunctionHandler::new(move |mut invocation| {
            for interceptor in interceptors.iter() {
                interceptor.inbound(&mut invocation);
            }
            let handler = handler.clone();
            async move { handler.call(invocation).await }
        });
        self.transport.register_function(function_id, intercepted)
    }

    pub fn register_trigger(&self, registration: TriggerRegistration) -> Result<(), StepError> {
        self.transport.register_trigger(registration)
    }

    /// Issues a call, running outbound interceptors first.
    pub async fn call(&self, mut call: OutboundCall) -> Result<Value, StepError> {
        for interceptor in self.interceptors.iter() {
            interceptor.outbound(&mut call);
        }
        self.transport.call(call).await
    }

    /// Issues a call inside a client span parented on `parent`.
    pub async fn traced_call(
        &self,
        op: &str,
        payload: Value,
        parent: Option<&TraceContext>,
        attrs: &OperationAttrs,
    ) -> Result<Value, StepError> {
        let span = OperationSpan::start(op, parent, attrs);
        let call = OutboundCall::new(op, payload).with_trace(Some(span.trace().clone()));
        let result = self.call(call).instrument(span.span().clone()).await;
        match &result {
            Ok(_) => span.ok(),
            Err(error) => span.error(error),
        }
        result
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}
