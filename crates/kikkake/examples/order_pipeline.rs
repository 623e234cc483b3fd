//! An HTTP step that accepts orders and a queue step that processes them.
//!
//! Demonstrates:
//! - Typed body schemas
//! - HTTP middleware
//! - Enqueueing from one step to trigger another
//! - Scoped state

use kikkake::prelude::*;
use kikkake::testing::RecordingTransport;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct NewOrder {
    item: String,
    quantity: u32,
}

fn create_order() -> Result<StepDefinition, StepError> {
    let require_key = Middleware::new(|req: ApiRequest, _ctx, next: kikkake::Next| async move {
        if req.header("x-api-key").is_none() {
            return Ok(ApiResponse::new(401).with_body(json!({"error": "missing api key"})));
        }
        next.run(req).await
    });

    let config = StepConfig::new("CreateOrder")
        .trigger(
            trigger::http(HttpMethod::Post, "/orders")
                .with_body_schema(Schema::typed::<NewOrder>())
                .with_middleware(require_key),
        )
        .enqueues("orders.created")
        .flow("orders");

    Ok(step(config)?.handle(|input, ctx| async move {
        let order: NewOrder = serde_json::from_value(input.data())?;
        let id = format!("order-{}", order.item);
        ctx.enqueue(EnqueueEvent::new("orders.created", json!({"id": id, "order": order})))
            .await?;
        Ok::<_, StepError>(ApiResponse::new(201).with_body(json!({"id": id})))
    }))
}

fn process_order() -> Result<StepDefinition, StepError> {
    let config = StepConfig::new("ProcessOrder")
        .trigger(trigger::queue("orders.created"))
        .flow("orders");

    Ok(step(config)?.handle(|input, ctx| async move {
        let data = input.data();
        let id = data["id"].as_str().unwrap_or_default().to_string();
        ctx.state().set("orders", &id, data.clone()).await?;
        ctx.logger().info_with("Order stored", &data);
        Ok::<_, StepError>(())
    }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    kikkake::init_logging(&RuntimeConfig::from_env());

    let transport = Arc::new(RecordingTransport::new());
    let runtime = Runtime::builder().transport(transport.clone()).build()?;
    runtime.add_step(create_order()?, "src/steps/create_order.rs")?;
    runtime.add_step(process_order()?, "src/steps/process_order.rs")?;

    println!("Registered functions:");
    for id in transport.function_ids() {
        println!("  {id}");
    }

    let create = "steps::CreateOrder::trigger::http(POST /orders)";
    let denied = transport
        .invoke(create, json!({"body": {"item": "pen", "quantity": 2}}))
        .await?;
    println!("Without key: {denied}");

    let invalid = transport
        .invoke(create, json!({"headers": {"x-api-key": "k"}, "body": {"item": "pen"}}))
        .await;
    println!("Invalid body: {:?}", invalid.err().map(|e| e.to_string()));

    let created = transport
        .invoke(create, json!({"headers": {"x-api-key": "k"}, "body": {"item": "pen", "quantity": 2}}))
        .await?;
    println!("Created: {created}");

    // Play the transport: deliver the enqueued message to its subscriber.
    for call in transport.calls_to("enqueue") {
        let event: EnqueueEvent = serde_json::from_value(call.payload)?;
        let function_id = format!("steps::ProcessOrder::trigger::queue({})", event.topic);
        transport.invoke(&function_id, event.data).await?;
    }

    for call in transport.calls_to("state::set") {
        println!("State write: {}", call.payload);
    }
    Ok(())
}
