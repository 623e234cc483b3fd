//! The trigger registrar.

use crate::bridge::Bridge;
use crate::condition::condition_function;
use crate::config::RuntimeConfig;
use crate::context_builder::ContextFactory;
use crate::step_endpoint::{self, StepSource, StepSources};
use crate::streams::StreamConfig;
use crate::wrapper::WrappedHandler;
use kikkake_core::{
    generate_step_id, CallInterceptor, KindConfig, RegistrationRecord, StepConfig,
    StepDefinition, StepError, Transport, TriggerInfo,
};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Registers steps with a transport.
///
/// Each trigger of a step becomes one function registration plus one
/// trigger registration; a trigger with a condition adds a second
/// function that evaluates it.
///
/// # Examples
///
/// ```
/// use kikkake::prelude::*;
/// use kikkake::testing::RecordingTransport;
/// use std::sync::Arc;
///
/// let transport = Arc::new(RecordingTransport::new());
/// let runtime = Runtime::builder().transport(transport.clone()).build()?;
///
/// let definition = step(StepConfig::new("Tick").trigger(trigger::cron("0 * * * *")))?
///     .handle(|_input, ctx| async move {
///         ctx.logger().info("tick");
///         Ok::<_, StepError>(())
///     });
/// runtime.add_step(definition, "src/steps/tick.rs")?;
///
/// assert_eq!(transport.function_ids(), vec!["steps::Tick::trigger::cron(0 * * * *)"]);
/// # Ok::<(), StepError>(())
/// ```
pub struct Runtime {
    bridge: Bridge,
    factory: ContextFactory,
    config: RuntimeConfig,
    sources: StepSources,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("service_name", &self.config.service_name)
            .field("steps", &self.step_names())
            .field("streams", &self.factory.stream_names())
            .finish()
    }
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Derives the registration records for `config` without touching the
    /// transport. The same config always derives the same records.
    pub fn registrations(config: &StepConfig, file_path: &str) -> Result<Vec<RegistrationRecord>, StepError> {
        if config.triggers.is_empty() {
            return Ok(Vec::new());
        }
        let metadata = config.metadata(file_path)?;
        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(config.triggers.len());

        for (index, trigger) in config.triggers.iter().enumerate() {
            let descriptor = trigger.descriptor();
            let mut function_id = format!("steps::{}::trigger::{}", config.name, descriptor);
            if !seen.insert(descriptor.clone()) {
                warn!(
                    step = %config.name,
                    descriptor = %descriptor,
                    index,
                    "Duplicate trigger, disambiguating function id with its index"
                );
                function_id = format!("{function_id}::{index}");
            }
            let condition_function_id = trigger
                .condition()
                .map(|_| format!("{function_id}::conditions::{index}"));
            records.push(RegistrationRecord {
                function_id,
                trigger_kind: trigger.kind(),
                kind_config: KindConfig::from_trigger(trigger),
                metadata: metadata.clone(),
                condition_function_id,
            });
        }
        Ok(records)
    }

    /// Registers every trigger of `definition` with the transport.
    ///
    /// `file_path` is the step's source path. It feeds the stable step id
    /// and the `filePath` metadata. A step without triggers registers
    /// nothing.
    ///
    /// All functions are registered before any trigger, so a failed
    /// function registration leaves no trigger pointing at the step. A
    /// failure while registering triggers leaves the earlier triggers of
    /// the step registered; the step itself is only recorded on success.
    pub fn add_step(&self, definition: StepDefinition, file_path: &str) -> Result<Vec<RegistrationRecord>, StepError> {
        let (config, handler) = definition.into_parts();
        let records = Self::registrations(&config, file_path)?;
        let step_name = config.name.as_str();

        for ((index, trigger), record) in config.triggers.iter().enumerate().zip(&records) {
            debug!(
                step = %step_name,
                function_id = %record.function_id,
                trigger = record.trigger_kind.as_str(),
                "Registering trigger"
            );
            let wrapped = WrappedHandler::new(step_name, trigger.clone(), index, handler.clone(), self.factory.clone());
            self.bridge.register_function(&record.function_id, wrapped.into_function())?;

            if let (Some(condition), Some(condition_id)) = (trigger.condition(), &record.condition_function_id) {
                let info = TriggerInfo::for_trigger(trigger, index);
                let function = condition_function(step_name, info, condition.clone(), self.factory.clone());
                self.bridge.register_function(condition_id, function)?;
            }
        }
        for record in &records {
            self.bridge.register_trigger(record.to_trigger_registration())?;
        }

        self.sources.write().insert(
            generate_step_id(file_path),
            StepSource {
                name: step_name.to_string(),
                file_path: file_path.to_string(),
            },
        );
        info!(step = %step_name, triggers = records.len(), file_path, "Step registered");
        Ok(records)
    }

    /// Makes a stream available to every context built from now on.
    pub fn add_stream(&self, config: StreamConfig) {
        info!(stream = %config.name, "Stream registered");
        self.factory.add_stream(config);
    }

    /// Names of the registered steps, sorted.
    pub fn step_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.read().values().map(|s| s.name.clone()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    pub fn stream_names(&self) -> Vec<String> {
        self.factory.stream_names()
    }

    /// Registers the step content endpoints.
    pub fn setup_step_endpoint(&self) -> Result<(), StepError> {
        step_endpoint::register(&self.bridge, Arc::clone(&self.sources))
    }
}

/// Builder for [`Runtime`].
#[derive(Default)]
pub struct RuntimeBuilder {
    transport: Option<Arc<dyn Transport>>,
    interceptors: Vec<Arc<dyn CallInterceptor>>,
    streams: Vec<StreamConfig>,
    config: Option<RuntimeConfig>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Adds an interceptor after the built-in trace propagator.
    pub fn interceptor(mut self, interceptor: Arc<dyn CallInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn stream(mut self, stream: StreamConfig) -> Self {
        self.streams.push(stream);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<Runtime, StepError> {
        let transport = self
            .transport
            .ok_or_else(|| StepError::Configuration("Transport must be specified".to_string()))?;
        let config = self.config.unwrap_or_default();

        let bridge = self
            .interceptors
            .into_iter()
            .fold(Bridge::instrumented(transport), Bridge::with_interceptor);
        let factory = ContextFactory::new(bridge.clone());
        for stream in self.streams {
            factory.add_stream(stream);
        }

        let runtime = Runtime {
            bridge,
            factory,
            config,
            sources: StepSources::default(),
        };
        if runtime.config.step_endpoint {
            runtime.setup_step_endpoint()?;
        }
        info!(service = %runtime.config.service_name, "Runtime initialized");
        Ok(runtime)
    }
}
