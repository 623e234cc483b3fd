//! Spans, W3C trace propagation and logging setup.
//!
//! Spans follow the `otel.*` field conventions so an OpenTelemetry bridge
//! layer can export them. With the `otel` feature, each span is also
//! parented on the propagated context inside the OpenTelemetry layer and
//! the ids it exports are the ids written to outbound `traceparent`
//! headers, so a trace continues across process boundaries. Without a
//! subscriber spans are disabled and every operation here is a no-op.

use crate::config::RuntimeConfig;
use kikkake_core::transport::{BAGGAGE_HEADER, TRACEPARENT_HEADER};
use kikkake_core::{CallInterceptor, Invocation, OutboundCall, StepError, TraceContext, TriggerKind};
use std::collections::BTreeMap;
use tracing::field::Empty;
use tracing::Span;
use tracing_subscriber::EnvFilter;

const STATUS_OK: &str = "OK";
const STATUS_ERROR: &str = "ERROR";

fn record_error(span: &Span, message: &str) {
    span.record("otel.status_code", STATUS_ERROR);
    span.record("otel.status_message", message);
}

/// Parents `span` on `parent` in the OpenTelemetry layer and adopts the ids
/// the layer will export for it.
#[cfg(feature = "otel")]
fn bind_otel_context(span: &Span, parent: Option<&TraceContext>, trace: &mut TraceContext) {
    use opentelemetry::trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState};
    use tracing_opentelemetry::OpenTelemetrySpanExt;

    if let Some(parent) = parent {
        if let (Ok(trace_id), Ok(span_id)) = (TraceId::from_hex(&parent.trace_id), SpanId::from_hex(&parent.span_id)) {
            let flags = if parent.sampled {
                TraceFlags::SAMPLED
            } else {
                TraceFlags::default()
            };
            let remote = SpanContext::new(trace_id, span_id, flags, true, TraceState::default());
            span.set_parent(opentelemetry::Context::new().with_remote_span_context(remote));
        }
    }

    let cx = span.context();
    let exported = cx.span().span_context().clone();
    if exported.is_valid() {
        trace.trace_id = exported.trace_id().to_string();
        trace.span_id = exported.span_id().to_string();
        span.record("trace_id", trace.trace_id.as_str());
        span.record("span_id", trace.span_id.as_str());
    }
}

#[cfg(not(feature = "otel"))]
fn bind_otel_context(_span: &Span, _parent: Option<&TraceContext>, _trace: &mut TraceContext) {}

/// The server span around one invocation of a wrapped handler.
///
/// Dropping it unfinished marks the span `ERROR` with message
/// `cancelled`, which covers the transport cancelling the invocation.
#[derive(Debug)]
pub struct StepSpan {
    span: Span,
    trace: TraceContext,
    finished: bool,
}

impl StepSpan {
    /// Opens the span, continuing `parent` when one was propagated.
    pub fn start(
        step: &str,
        kind: TriggerKind,
        parent: Option<&TraceContext>,
        http: Option<(&str, &str)>,
    ) -> Self {
        let mut trace = parent.map_or_else(TraceContext::new_root, TraceContext::child);
        let (method, route) = http.unzip();
        let span = tracing::info_span!(
            "step",
            otel.kind = "server",
            otel.name = %format!("step:{step}"),
            otel.status_code = Empty,
            otel.status_message = Empty,
            kikkake.step.name = %step,
            kikkake.trigger.type = kind.as_str(),
            http.method = method,
            http.route = route,
            trace_id = %trace.trace_id,
            span_id = %trace.span_id,
            parent_span_id = parent.map(|p| p.span_id.as_str()),
        );
        bind_otel_context(&span, parent, &mut trace);
        Self {
            span,
            trace,
            finished: false,
        }
    }

    pub fn trace(&self) -> &TraceContext {
        &self.trace
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn ok(mut self) {
        self.span.record("otel.status_code", STATUS_OK);
        self.finished = true;
    }

    pub fn error(mut self, error: &StepError) {
        record_error(&self.span, &error.to_string());
        self.finished = true;
    }
}

impl Drop for StepSpan {
    fn drop(&mut self) {
        if !self.finished {
            record_error(&self.span, "cancelled");
        }
    }
}

/// Attributes recorded on a client span.
#[derive(Debug, Clone, Default)]
pub struct OperationAttrs {
    pub topic: Option<String>,
    pub scope: Option<String>,
    pub key: Option<String>,
    pub stream_name: Option<String>,
    pub group_id: Option<String>,
    pub item_id: Option<String>,
}

impl OperationAttrs {
    pub fn topic(topic: &str) -> Self {
        Self {
            topic: Some(topic.to_string()),
            ..Default::default()
        }
    }

    pub fn state(scope: Option<&str>, key: Option<&str>) -> Self {
        Self {
            scope: scope.map(str::to_string),
            key: key.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn stream(name: &str, group_id: Option<&str>, item_id: Option<&str>) -> Self {
        Self {
            stream_name: Some(name.to_string()),
            group_id: group_id.map(str::to_string),
            item_id: item_id.map(str::to_string),
            ..Default::default()
        }
    }
}

/// A client span around one transport call (`enqueue`, `state::*`,
/// `stream::*`). Nested under the step span that is current when it opens.
#[derive(Debug)]
pub struct OperationSpan {
    span: Span,
    trace: TraceContext,
    finished: bool,
}

impl OperationSpan {
    pub fn start(op: &str, parent: Option<&TraceContext>, attrs: &OperationAttrs) -> Self {
        let mut trace = parent.map_or_else(TraceContext::new_root, TraceContext::child);
        let span = tracing::info_span!(
            "operation",
            otel.kind = "client",
            otel.name = %op,
            otel.status_code = Empty,
            otel.status_message = Empty,
            kikkake.queue.topic = attrs.topic.as_deref(),
            kikkake.state.scope = attrs.scope.as_deref(),
            kikkake.state.key = attrs.key.as_deref(),
            kikkake.stream.name = attrs.stream_name.as_deref(),
            kikkake.stream.group_id = attrs.group_id.as_deref(),
            kikkake.stream.item_id = attrs.item_id.as_deref(),
            trace_id = %trace.trace_id,
            span_id = %trace.span_id,
        );
        bind_otel_context(&span, parent, &mut trace);
        Self {
            span,
            trace,
            finished: false,
        }
    }

    pub fn trace(&self) -> &TraceContext {
        &self.trace
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn ok(mut self) {
        self.span.record("otel.status_code", STATUS_OK);
        self.finished = true;
    }

    pub fn error(mut self, error: &StepError) {
        record_error(&self.span, &error.to_string());
        self.finished = true;
    }
}

impl Drop for OperationSpan {
    fn drop(&mut self) {
        if !self.finished {
            record_error(&self.span, "cancelled");
        }
    }
}

/// Injects and extracts W3C `traceparent` / `baggage` headers on
/// transport traffic.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracePropagator;

impl TracePropagator {
    pub fn inject(trace: &TraceContext, headers: &mut BTreeMap<String, String>) {
        headers.insert(TRACEPARENT_HEADER.to_string(), trace.traceparent());
        if let Some(baggage) = trace.baggage_header() {
            headers.insert(BAGGAGE_HEADER.to_string(), baggage);
        }
    }

    pub fn extract(headers: &BTreeMap<String, String>) -> Option<TraceContext> {
        TraceContext::extract(
            headers.get(TRACEPARENT_HEADER).map(String::as_str),
            headers.get(BAGGAGE_HEADER).map(String::as_str),
        )
    }
}

impl CallInterceptor for TracePropagator {
    fn outbound(&self, call: &mut OutboundCall) {
        if let Some(trace) = &call.trace {
            Self::inject(trace, &mut call.headers);
        }
    }

    fn inbound(&self, invocation: &mut Invocation) {
        if invocation.parent.is_none() {
            invocation.parent = Self::extract(&invocation.headers);
        }
    }
}

/// Installs a fmt subscriber filtered by `config.log_filter`.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_logging(config: &RuntimeConfig) -> bool {
    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_then_extract_round_trips() {
        let trace = TraceContext::new_root().with_baggage("tenant", "acme");
        let mut call = OutboundCall::new("enqueue", serde_json::Value::Null).with_trace(Some(trace.clone()));
        TracePropagator.outbound(&mut call);

        let mut invocation = Invocation::new(serde_json::Value::Null);
        invocation.headers = call.headers;
        TracePropagator.inbound(&mut invocation);

        let parent = invocation.parent.unwrap();
        assert_eq!(parent.trace_id, trace.trace_id);
        assert_eq!(parent.span_id, trace.span_id);
        assert_eq!(parent.baggage.get("tenant").map(String::as_str), Some("acme"));
    }

    #[test]
    fn test_inbound_keeps_explicit_parent() {
        let explicit = TraceContext::new_root();
        let mut invocation = Invocation::new(serde_json::Value::Null)
            .with_parent(explicit.clone())
            .with_header(TRACEPARENT_HEADER, TraceContext::new_root().traceparent());
        TracePropagator.inbound(&mut invocation);
        assert_eq!(invocation.parent, Some(explicit));
    }

    #[test]
    fn test_step_span_continues_parent_trace() {
        let parent = TraceContext::new_root();
        let span = StepSpan::start("Echo", TriggerKind::Http, Some(&parent), Some(("GET", "/items/:id")));
        assert_eq!(span.trace().trace_id, parent.trace_id);
        assert_ne!(span.trace().span_id, parent.span_id);
        span.ok();
    }

    #[test]
    fn test_spans_without_subscriber_are_noops() {
        let span = StepSpan::start("Quiet", TriggerKind::Cron, None, None);
        assert_eq!(span.trace().trace_id.len(), 32);
        drop(span);
        let op = OperationSpan::start("state::get", None, &OperationAttrs::state(Some("s"), Some("k")));
        op.error(&StepError::transport("state::get", "down"));
    }
}
