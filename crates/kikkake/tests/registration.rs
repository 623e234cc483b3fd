use kikkake::prelude::*;
use kikkake::testing::RecordingTransport;
use kikkake::{InfrastructureConfig, KindConfig, QueueConfig, QueueType};
use serde_json::{json, Value};
use std::sync::Arc;

fn runtime() -> (Arc<RecordingTransport>, Runtime) {
    let transport = Arc::new(RecordingTransport::new());
    let runtime = Runtime::builder().transport(transport.clone()).build().unwrap();
    (transport, runtime)
}

fn noop(config: StepConfig) -> StepDefinition {
    step(config)
        .unwrap()
        .handle(|_input, _ctx| async move { Ok::<_, StepError>(()) })
}

#[test]
fn test_step_without_triggers_registers_nothing() {
    let (transport, runtime) = runtime();
    let records = runtime
        .add_step(noop(StepConfig::new("Placeholder").virtual_subscribes("orders.created")), "steps/noop.rs")
        .unwrap();

    assert!(records.is_empty());
    assert!(transport.function_ids().is_empty());
    assert!(transport.triggers().is_empty());
    assert_eq!(runtime.step_names(), vec!["Placeholder"]);
}

#[test]
fn test_duplicate_triggers_get_index_suffix() {
    let (transport, runtime) = runtime();
    let config = StepConfig::new("Twice")
        .trigger(trigger::http(HttpMethod::Get, "/items"))
        .trigger(trigger::queue("items.changed"))
        .trigger(trigger::http(HttpMethod::Get, "/items"));
    runtime.add_step(noop(config), "steps/twice.rs").unwrap();

    assert_eq!(
        transport.function_ids(),
        vec![
            "steps::Twice::trigger::http(GET /items)",
            "steps::Twice::trigger::queue(items.changed)",
            "steps::Twice::trigger::http(GET /items)::2",
        ]
    );
}

#[test]
fn test_registrations_are_deterministic() {
    let config = StepConfig::new("Sync")
        .trigger(trigger::queue("records.changed"))
        .trigger(trigger::cron("*/5 * * * *"))
        .trigger(trigger::stream("todos").with_group_id("inbox"));

    let first = Runtime::registrations(&config, "steps/sync.rs").unwrap();
    let second = Runtime::registrations(&config, "steps/sync.rs").unwrap();
    assert_eq!(first, second);

    let first: Vec<_> = first.iter().map(|r| r.to_trigger_registration()).collect();
    let second: Vec<_> = second.iter().map(|r| r.to_trigger_registration()).collect();
    assert_eq!(first, second);
}

#[test]
fn test_trigger_registrations_carry_kind_config_and_metadata() {
    let (transport, runtime) = runtime();
    let config = StepConfig::new("GetItem")
        .trigger(trigger::http(HttpMethod::Get, "/items/:id"))
        .description("Fetches one item");
    runtime.add_step(noop(config), "src/steps/get_item.rs").unwrap();

    let registration = transport
        .trigger_for("steps::GetItem::trigger::http(GET /items/:id)")
        .unwrap();
    assert_eq!(registration.kind, "http");
    assert_eq!(registration.config["api_path"], json!("items/:id"));
    assert_eq!(registration.config["http_method"], json!("GET"));

    let metadata = &registration.config["metadata"];
    assert_eq!(metadata["name"], json!("GetItem"));
    assert_eq!(metadata["description"], json!("Fetches one item"));
    assert_eq!(metadata["filePath"], json!("src/steps/get_item.rs"));
    assert_eq!(metadata["triggers"][0]["type"], json!("http"));
}

#[test]
fn test_condition_registers_a_second_function() {
    let (transport, runtime) = runtime();
    let config = StepConfig::new("BigOrders").trigger(
        trigger::queue("orders.created")
            .with_condition(Condition::new(|input, _| input.data()["amount"].as_f64().unwrap_or(0.0) > 1000.0)),
    );
    let records = runtime.add_step(noop(config), "steps/big_orders.rs").unwrap();

    let condition_id = "steps::BigOrders::trigger::queue(orders.created)::conditions::0";
    assert_eq!(records[0].condition_function_id.as_deref(), Some(condition_id));
    assert_eq!(
        transport.function_ids(),
        vec!["steps::BigOrders::trigger::queue(orders.created)", condition_id]
    );

    let registration = transport.triggers().remove(0);
    assert_eq!(registration.config["condition_function_id"], json!(condition_id));
    assert!(registration.config["metadata"]["triggers"][0].get("condition").is_none());
}

#[test]
fn test_stream_and_state_kind_configs() {
    let config = StepConfig::new("Watch")
        .trigger(trigger::state())
        .trigger(trigger::stream("todos").with_group_id("inbox").with_item_id("t-1"));
    let records = Runtime::registrations(&config, "steps/watch.rs").unwrap();

    assert_eq!(records[0].kind_config, KindConfig::State);
    assert_eq!(records[0].function_id, "steps::Watch::trigger::state");
    assert_eq!(
        records[1].kind_config,
        KindConfig::Stream {
            stream_name: "todos".to_string(),
            group_id: Some("inbox".to_string()),
            item_id: Some("t-1".to_string()),
        }
    );
    let config = Value::Object(records[1].to_trigger_registration().config);
    assert_eq!(config["stream_name"], json!("todos"));
    assert_eq!(config["group_id"], json!("inbox"));
}

#[test]
fn test_infrastructure_reaches_metadata() {
    let infrastructure = InfrastructureConfig {
        handler: None,
        queue: Some(QueueConfig {
            kind: QueueType::Fifo,
            ..QueueConfig::default()
        }),
    };
    let config = StepConfig::new("Billing")
        .trigger(trigger::queue("invoices.due").with_infrastructure(infrastructure));
    let records = Runtime::registrations(&config, "steps/billing.rs").unwrap();

    let queue = &records[0].metadata["triggers"][0]["infrastructure"]["queue"];
    assert_eq!(queue["type"], json!("fifo"));
    assert_eq!(queue["maxRetries"], json!(3));
}

#[test]
fn test_loose_config_is_normalized_before_registration() {
    let (transport, runtime) = runtime();
    let definition = step(json!({
        "name": "Legacy",
        "triggers": [{"type": "event", "topic": "legacy.topic"}],
        "emits": ["legacy.done"]
    }))
    .unwrap()
    .handle(|_input, _ctx| async move { Ok::<_, StepError>(()) });
    runtime.add_step(definition, "steps/legacy.rs").unwrap();

    assert_eq!(transport.function_ids(), vec!["steps::Legacy::trigger::queue(legacy.topic)"]);
    assert_eq!(transport.triggers()[0].kind, "queue");
}

#[test]
fn test_invalid_config_fails_before_registration() {
    let error = step(json!({"triggers": []})).unwrap_err();
    assert!(matches!(error, StepError::Configuration(_)));

    let error = step(StepConfig::new("Bad").trigger(trigger::http(HttpMethod::Get, "no-slash"))).unwrap_err();
    assert!(matches!(error, StepError::InvalidStep { .. }));
}
