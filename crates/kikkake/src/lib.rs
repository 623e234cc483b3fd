//! A step runtime that registers trigger-driven handlers with an external
//! transport and dispatches the events it delivers.
//!
//! Steps are declared with [`StepConfig`] and one or more [`Trigger`]s,
//! turned into a [`StepDefinition`] with [`step`] or
//! [`multi_trigger_step`], and handed to a [`Runtime`]. The runtime
//! registers one function per trigger with the [`Transport`]; when the
//! transport fires it, the function validates the input, builds a
//! [`FlowContext`] and runs the handler inside a tracing span.
//!
//! # Example
//!
//! ```rust
//! use kikkake::prelude::*;
//! use kikkake::testing::RecordingTransport;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let transport = Arc::new(RecordingTransport::new());
//! let runtime = Runtime::builder().transport(transport.clone()).build()?;
//!
//! let config = StepConfig::new("ProcessOrder")
//!     .trigger(trigger::queue("orders.created"))
//!     .enqueues("orders.processed");
//!
//! let definition = step(config)?.handle(|input, ctx| async move {
//!     ctx.enqueue(EnqueueEvent::new("orders.processed", input.data())).await?;
//!     Ok::<_, StepError>(())
//! });
//! runtime.add_step(definition, "src/steps/process_order.rs")?;
//!
//! transport
//!     .invoke("steps::ProcessOrder::trigger::queue(orders.created)", json!({"id": "1"}))
//!     .await?;
//! assert_eq!(transport.calls_to("enqueue").len(), 1);
//! # Ok::<(), StepError>(())
//! # }).unwrap();
//! ```

mod bridge;
mod condition;
mod config;
mod context_builder;
mod middleware;
mod runtime;
mod state;
pub mod step_endpoint;
mod streams;
pub mod telemetry;
pub mod testing;
mod wrapper;

pub use kikkake_core::*;

pub use bridge::Bridge;
pub use condition::condition_function;
pub use config::{RuntimeConfig, DEFAULT_ENGINE_URL};
pub use context_builder::{BridgeEnqueuer, ContextFactory};
pub use middleware::compose;
pub use runtime::{Runtime, RuntimeBuilder};
pub use state::StateManager;
pub use streams::{Stream, StreamConfig};
pub use telemetry::{init_logging, TracePropagator};
pub use wrapper::WrappedHandler;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::trigger;
    pub use crate::{
        multi_trigger_step, step, ApiRequest, ApiResponse, Condition, EnqueueEvent, FlowContext,
        HttpMethod, Middleware, Runtime, RuntimeBuilder, RuntimeConfig, Schema, StateAccessor,
        StepConfig, StepDefinition, StepError, StepOutput, StreamAccessor, StreamConfig,
        Transport, Trigger, TriggerHandlers, TriggerInput, TriggerKind, UpdateOp,
    };
}
