//! Core types for the kikkake step runtime.
//!
//! This crate describes steps and what wakes them up, without depending on
//! an async runtime or a concrete transport. The `kikkake` crate builds the
//! registrar and dispatcher on top of it.
//!
//! # Core Types
//!
//! - [`Trigger`] - When a step runs: HTTP, queue, cron, state or stream
//! - [`StepConfig`] / [`StepDefinition`] - A step's identity, triggers and handler
//! - [`FlowContext`] - The per-invocation context handed to handlers
//! - [`Transport`] - The external substrate functions are registered with
//! - [`StepError`] - Error types for registration and dispatch
//!
//! # Builders
//!
//! - [`step`] - Single-handler steps
//! - [`multi_trigger_step`] - One sub-handler per trigger kind

mod accessor;
mod context;
mod definition;
mod error;
pub mod guards;
mod handler;
mod logger;
mod multi_trigger;
mod request;
pub mod schema;
mod step;
mod step_id;
mod trace_context;
pub mod transport;
pub mod trigger;

pub use accessor::{Enqueuer, StateAccessor, StreamAccessor, UpdateOp};
pub use context::{FlowContext, FlowContextBuilder, TriggerInfo};
pub use definition::{step, StepBuilder, StepDefinition};
pub use error::StepError;
pub use handler::{Condition, HandlerFuture, Middleware, Next, StepHandler, StepOutput};
pub use logger::StepLogger;
pub use multi_trigger::{multi_trigger_step, CronHandler, MultiTriggerStepBuilder, TriggerHandlers};
pub use request::{
    ApiRequest, ApiResponse, EnqueueEvent, ParamValue, StateTriggerInput, StreamEvent,
    StreamEventType, StreamTriggerInput, TriggerInput,
};
pub use schema::Schema;
pub use step::{
    EnqueueTopic, HandlerConfig, InfrastructureConfig, IntoStepConfig, QueueConfig, QueueType,
    StepConfig, StepName,
};
pub use step_id::{generate_step_id, STEP_NAMESPACE};
pub use trace_context::TraceContext;
pub use transport::{
    CallInterceptor, FunctionHandler, Invocation, KindConfig, OutboundCall, RegistrationRecord,
    Transport, TriggerRegistration,
};
pub use trigger::{
    CronTrigger, HttpMethod, HttpTrigger, QueryParam, QueueTrigger, StateTrigger, StreamTrigger,
    Trigger, TriggerKind,
};
