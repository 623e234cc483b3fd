//! Runtime configuration loaded from the environment.

use std::env;

/// Default address of the engine the transport connects to.
pub const DEFAULT_ENGINE_URL: &str = "ws://localhost:49134";

const SERVICE_NAME_VAR: &str = "KIKKAKE_SERVICE_NAME";
const ENGINE_URL_VAR: &str = "KIKKAKE_ENGINE_URL";
const LOG_VAR: &str = "KIKKAKE_LOG";
const STEP_ENDPOINT_VAR: &str = "KIKKAKE_STEP_ENDPOINT";

/// Settings for a [`Runtime`](crate::Runtime).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Reported on spans and logs.
    pub service_name: String,
    /// Handed to transports that connect to a remote engine.
    pub engine_url: String,
    /// An `EnvFilter` directive string, e.g. `info,kikkake=debug`.
    pub log_filter: String,
    /// Registers the step content endpoint when the runtime is initialized.
    pub step_endpoint: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            service_name: "kikkake".to_string(),
            engine_url: DEFAULT_ENGINE_URL.to_string(),
            log_filter: "info".to_string(),
            step_endpoint: false,
        }
    }
}

impl RuntimeConfig {
    /// Reads `.env` if present, then the `KIKKAKE_*` variables.
    /// Unset variables keep their defaults.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            service_name: lookup(SERVICE_NAME_VAR).unwrap_or(defaults.service_name),
            engine_url: lookup(ENGINE_URL_VAR).unwrap_or(defaults.engine_url),
            log_filter: lookup(LOG_VAR).unwrap_or(defaults.log_filter),
            step_endpoint: lookup(STEP_ENDPOINT_VAR)
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(defaults.step_endpoint),
        }
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    pub fn with_step_endpoint(mut self, enabled: bool) -> Self {
        self.step_endpoint = enabled;
        self
    }
}
