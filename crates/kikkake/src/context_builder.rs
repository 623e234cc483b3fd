//! Builds the [`FlowContext`] for each invocation, bound to the transport.

use crate::bridge::Bridge;
use crate::state::StateManager;
use crate::streams::{Stream, StreamConfig};
use crate::telemetry::OperationAttrs;
use async_trait::async_trait;
use kikkake_core::{
    EnqueueEvent, Enqueuer, FlowContext, StepError, StepLogger, StreamAccessor, TraceContext,
    TriggerInfo, TriggerInput,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Publishes through the transport's `enqueue` call.
#[derive(Debug, Clone)]
pub struct BridgeEnqueuer {
    bridge: Bridge,
    trace: Option<TraceContext>,
}

impl BridgeEnqueuer {
    pub fn new(bridge: Bridge, trace: Option<TraceContext>) -> Self {
        Self { bridge, trace }
    }
}

#[async_trait]
impl Enqueuer for BridgeEnqueuer {
    async fn enqueue(&self, event: EnqueueEvent) -> Result<(), StepError> {
        let attrs = OperationAttrs::topic(&event.topic);
        let payload = serde_json::to_value(&event)?;
        self.bridge
            .traced_call("enqueue", payload, self.trace.as_ref(), &attrs)
            .await?;
        Ok(())
    }
}

/// Shared by every wrapped handler of a runtime. Streams added after a
/// step was registered are still visible to its later invocations.
#[derive(Debug, Clone)]
pub struct ContextFactory {
    bridge: Bridge,
    streams: Arc<RwLock<BTreeMap<String, StreamConfig>>>,
}

impl ContextFactory {
    pub fn new(bridge: Bridge) -> Self {
        Self {
            bridge,
            streams: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn add_stream(&self, config: StreamConfig) {
        self.streams.write().insert(config.name.clone(), config);
    }

    pub fn stream_names(&self) -> Vec<String> {
        self.streams.read().keys().cloned().collect()
    }

    /// A fresh context for one invocation of `step`, with every accessor
    /// parented on `trace`.
    pub fn build(
        &self,
        step: &str,
        trigger: TriggerInfo,
        trace: &TraceContext,
        input: Option<TriggerInput>,
    ) -> FlowContext {
        let streams: HashMap<String, Arc<dyn StreamAccessor>> = self
            .streams
            .read()
            .keys()
            .map(|name| {
                let stream: Arc<dyn StreamAccessor> =
                    Arc::new(Stream::new(name.clone(), self.bridge.clone(), Some(trace.clone())));
                (name.clone(), stream)
            })
            .collect();

        let logger = StepLogger::new(step, trace.trace_id.as_str()).with_trigger(trigger.kind);
        let mut builder = FlowContext::builder(trigger)
            .trace_id(trace.trace_id.clone())
            .enqueuer(Arc::new(BridgeEnqueuer::new(self.bridge.clone(), Some(trace.clone()))))
            .state(Arc::new(StateManager::new(self.bridge.clone(), Some(trace.clone()))))
            .streams(streams)
            .logger(logger);
        if let Some(input) = input {
            builder = builder.input(input);
        }
        builder.build()
    }
}
