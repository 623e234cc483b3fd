//! Steps that share one registration across several trigger kinds, with a
//! separate sub-handler per kind.

use crate::context::FlowContext;
use crate::definition::StepDefinition;
use crate::error::StepError;
use crate::handler::{HandlerFuture, StepHandler, StepOutput};
use crate::request::TriggerInput;
use crate::step::{IntoStepConfig, StepConfig};
use crate::trigger::TriggerKind;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

type CronFn = dyn Fn(FlowContext) -> HandlerFuture<StepOutput> + Send + Sync;

/// A cron sub-handler. Cron ticks carry no payload, so it only receives
/// the context.
#[derive(Clone)]
pub struct CronHandler(Arc<CronFn>);

impl CronHandler {
    pub fn new<F, Fut, O>(f: F) -> Self
    where
        F: Fn(FlowContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, StepError>> + Send + 'static,
        O: Into<StepOutput>,
    {
        Self(Arc::new(move |ctx| {
            let fut = f(ctx);
            Box::pin(async move { fut.await.map(Into::into) })
        }))
    }

    pub async fn call(&self, ctx: FlowContext) -> Result<StepOutput, StepError> {
        (self.0)(ctx).await
    }
}

impl fmt::Debug for CronHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CronHandler")
    }
}

/// Sub-handlers keyed by trigger kind.
#[derive(Debug, Clone, Default)]
pub struct TriggerHandlers {
    pub queue: Option<StepHandler>,
    pub http: Option<StepHandler>,
    pub cron: Option<CronHandler>,
    pub state: Option<StepHandler>,
    pub stream: Option<StepHandler>,
}

impl TriggerHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(mut self, handler: StepHandler) -> Self {
        self.queue = Some(handler);
        self
    }

    pub fn http(mut self, handler: StepHandler) -> Self {
        self.http = Some(handler);
        self
    }

    pub fn cron(mut self, handler: CronHandler) -> Self {
        self.cron = Some(handler);
        self
    }

    pub fn state(mut self, handler: StepHandler) -> Self {
        self.state = Some(handler);
        self
    }

    pub fn stream(mut self, handler: StepHandler) -> Self {
        self.stream = Some(handler);
        self
    }

    /// Kinds that have a sub-handler, in dispatch order.
    pub fn available(&self) -> Vec<TriggerKind> {
        TriggerKind::ALL
            .into_iter()
            .filter(|kind| self.has(*kind))
            .collect()
    }

    fn has(&self, kind: TriggerKind) -> bool {
        match kind {
            TriggerKind::Queue => self.queue.is_some(),
            TriggerKind::Http => self.http.is_some(),
            TriggerKind::Cron => self.cron.is_some(),
            TriggerKind::State => self.state.is_some(),
            TriggerKind::Stream => self.stream.is_some(),
        }
    }

    /// Later registrations win.
    fn merge(&mut self, other: TriggerHandlers) {
        self.queue = other.queue.or(self.queue.take());
        self.http = other.http.or(self.http.take());
        self.cron = other.cron.or(self.cron.take());
        self.state = other.state.or(self.state.take());
        self.stream = other.stream.or(self.stream.take());
    }

    /// Routes one invocation to the sub-handler for the kind that fired.
    pub async fn dispatch(&self, input: TriggerInput, ctx: FlowContext) -> Result<StepOutput, StepError> {
        let kind = ctx.trigger().kind;
        match kind {
            TriggerKind::Queue => {
                if let Some(handler) = &self.queue {
                    return handler.call(input, ctx).await;
                }
            }
            TriggerKind::Http => {
                if let Some(handler) = &self.http {
                    return handler.call(input, ctx).await;
                }
            }
            TriggerKind::Cron => {
                if let Some(handler) = &self.cron {
                    return handler.call(ctx).await;
                }
            }
            TriggerKind::State => {
                if let Some(handler) = &self.state {
                    return handler.call(input, ctx).await;
                }
            }
            TriggerKind::Stream => {
                if let Some(handler) = &self.stream {
                    return handler.call(input, ctx).await;
                }
            }
        }
        Err(StepError::NoHandler {
            kind,
            available: self.available(),
        })
    }
}

/// Collects per-kind handlers for a multi-trigger step.
///
/// # Examples
///
/// ```
/// use kikkake_core::{multi_trigger_step, trigger, StepConfig, StepError};
///
/// let config = StepConfig::new("Sync")
///     .trigger(trigger::queue("records.changed"))
///     .trigger(trigger::cron("0 * * * *"));
///
/// let definition = multi_trigger_step(config)?
///     .on_queue(|_input, _ctx| async move { Ok::<_, StepError>(()) })
///     .on_cron(|ctx| async move {
///         ctx.logger().info("hourly sync");
///         Ok::<_, StepError>(())
///     })
///     .build();
/// # let _ = definition;
/// # Ok::<(), StepError>(())
/// ```
#[derive(Debug, Clone)]
pub struct MultiTriggerStepBuilder {
    config: StepConfig,
    handlers: TriggerHandlers,
}

impl MultiTriggerStepBuilder {
    pub fn on_queue<F, Fut, O>(mut self, f: F) -> Self
    where
        F: Fn(TriggerInput, FlowContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, StepError>> + Send + 'static,
        O: Into<StepOutput>,
    {
        self.handlers.queue = Some(StepHandler::new(f));
        self
    }

    pub fn on_http<F, Fut, O>(mut self, f: F) -> Self
    where
        F: Fn(TriggerInput, FlowContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, StepError>> + Send + 'static,
        O: Into<StepOutput>,
    {
        self.handlers.http = Some(StepHandler::new(f));
        self
    }

    pub fn on_cron<F, Fut, O>(mut self, f: F) -> Self
    where
        F: Fn(FlowContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, StepError>> + Send + 'static,
        O: Into<StepOutput>,
    {
        self.handlers.cron = Some(CronHandler::new(f));
        self
    }

    pub fn on_state<F, Fut, O>(mut self, f: F) -> Self
    where
        F: Fn(TriggerInput, FlowContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, StepError>> + Send + 'static,
        O: Into<StepOutput>,
    {
        self.handlers.state = Some(StepHandler::new(f));
        self
    }

    pub fn on_stream<F, Fut, O>(mut self, f: F) -> Self
    where
        F: Fn(TriggerInput, FlowContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, StepError>> + Send + 'static,
        O: Into<StepOutput>,
    {
        self.handlers.stream = Some(StepHandler::new(f));
        self
    }

    /// Merges `handlers` over any registered with `on_*` and finishes.
    pub fn handlers(mut self, handlers: TriggerHandlers) -> StepDefinition {
        self.handlers.merge(handlers);
        self.build()
    }

    /// Finishes with the handlers registered through `on_*`.
    pub fn build(self) -> StepDefinition {
        let handlers = Arc::new(self.handlers);
        let unified = StepHandler::new(move |input, ctx| {
            let handlers = Arc::clone(&handlers);
            async move { handlers.dispatch(input, ctx).await }
        });
        StepDefinition::from_validated(self.config, unified)
    }
}

/// Starts a multi-trigger step. The config is validated here.
pub fn multi_trigger_step(config: impl IntoStepConfig) -> Result<MultiTriggerStepBuilder, StepError> {
    let config = config.into_step_config()?.validated()?;
    Ok(MultiTriggerStepBuilder {
        config,
        handlers: TriggerHandlers::default(),
    })
}
