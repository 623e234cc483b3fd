//! HTTP endpoints that serve step sources to developer tooling.
//!
//! - `GET __kikkake/step/:stepId` returns `{id, content, features}`
//! - `GET __kikkake/steps` returns `{steps: [{id, name, path}]}`

use crate::bridge::Bridge;
use kikkake_core::{ApiRequest, ApiResponse, FunctionHandler, StepError, TriggerRegistration};
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

pub const STEP_GET_FUNCTION: &str = "kikkake::step::get";
pub const STEP_LIST_FUNCTION: &str = "kikkake::steps::list";
const STEP_GET_PATH: &str = "__kikkake/step/:stepId";
const STEP_LIST_PATH: &str = "__kikkake/steps";

/// Where a registered step was defined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSource {
    pub name: String,
    pub file_path: String,
}

/// Step sources keyed by [`generate_step_id`](kikkake_core::generate_step_id).
pub type StepSources = Arc<RwLock<BTreeMap<Uuid, StepSource>>>;

/// The tutorial features file that accompanies a step source.
fn features_path(file_path: &str) -> String {
    format!("{}-features.json", file_path.replace("/src/", "/tutorial/"))
}

async fn read_features(file_path: &str) -> Value {
    let path = features_path(file_path);
    match tokio::fs::read_to_string(&path).await {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            debug!(path = %path, error = %e, "Ignoring unreadable features file");
            json!([])
        }),
        Err(_) => json!([]),
    }
}

fn error_response(status: u16, message: impl Into<String>) -> ApiResponse {
    ApiResponse::new(status).with_body(json!({"error": message.into()}))
}

/// Answers one `GET __kikkake/step/:stepId` request.
pub async fn get_step(sources: &StepSources, request: &ApiRequest) -> ApiResponse {
    let Some(step_id) = request.path_param("stepId").filter(|id| !id.is_empty()) else {
        return error_response(400, "stepId is required");
    };
    let source = Uuid::parse_str(step_id)
        .ok()
        .and_then(|id| sources.read().get(&id).cloned());
    let Some(source) = source else {
        return error_response(404, "Step not found");
    };

    match tokio::fs::read_to_string(&source.file_path).await {
        Ok(content) => {
            let features = read_features(&source.file_path).await;
            ApiResponse::ok(json!({"id": step_id, "content": content, "features": features}))
        }
        Err(e) => {
            error!(path = %source.file_path, error = %e, "Error reading step file");
            error_response(500, format!("Failed to read step: {e}"))
        }
    }
}

/// Answers `GET __kikkake/steps`.
pub fn list_steps(sources: &StepSources) -> ApiResponse {
    let steps: Vec<Value> = sources
        .read()
        .iter()
        .map(|(id, source)| json!({"id": id.to_string(), "name": source.name, "path": source.file_path}))
        .collect();
    ApiResponse::ok(json!({"steps": steps}))
}

fn http_trigger(function_id: &str, api_path: &str) -> TriggerRegistration {
    let mut config = Map::new();
    config.insert("api_path".into(), Value::from(api_path));
    config.insert("http_method".into(), Value::from("GET"));
    TriggerRegistration {
        kind: "http".to_string(),
        function_id: function_id.to_string(),
        config,
    }
}

/// Registers both endpoints with the transport.
pub fn register(bridge: &Bridge, sources: StepSources) -> Result<(), StepError> {
    let get_sources = Arc::clone(&sources);
    bridge.register_function(
        STEP_GET_FUNCTION,
        FunctionHandler::new(move |invocation| {
            let sources = Arc::clone(&get_sources);
            async move {
                let request = ApiRequest::from_payload(invocation.payload)?;
                Ok::<_, StepError>(serde_json::to_value(get_step(&sources, &request).await)?)
            }
        }),
    )?;
    bridge.register_trigger(http_trigger(STEP_GET_FUNCTION, STEP_GET_PATH))?;
    info!("Registered step endpoint: GET {STEP_GET_PATH}");

    bridge.register_function(
        STEP_LIST_FUNCTION,
        FunctionHandler::new(move |_invocation| {
            let sources = Arc::clone(&sources);
            async move { Ok::<_, StepError>(serde_json::to_value(list_steps(&sources))?) }
        }),
    )?;
    bridge.register_trigger(http_trigger(STEP_LIST_FUNCTION, STEP_LIST_PATH))?;
    info!("Registered steps list endpoint: GET {STEP_LIST_PATH}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_features_path_points_into_tutorial() {
        assert_eq!(
            features_path("/app/src/steps/create_order.rs"),
            "/app/tutorial/steps/create_order.rs-features.json"
        );
        assert_eq!(features_path("steps/a.rs"), "steps/a.rs-features.json");
    }

    #[tokio::test]
    async fn test_missing_and_unknown_ids() {
        let sources: StepSources = Arc::default();
        let missing = get_step(&sources, &ApiRequest::new("GET", "/")).await;
        assert_eq!(missing.status, 400);

        let unknown = get_step(&sources, &ApiRequest::new("GET", "/").with_path_param("stepId", "nope")).await;
        assert_eq!(unknown.status, 404);
        assert_eq!(unknown.body, Some(json!({"error": "Step not found"})));
    }
}
