//! One step woken by a queue, a cron schedule and stream events.

use kikkake::prelude::*;
use kikkake::testing::RecordingTransport;
use serde_json::{json, Value};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    kikkake::init_logging(&RuntimeConfig::default().with_log_filter("info,kikkake=debug"));

    let transport = Arc::new(RecordingTransport::new());
    let runtime = Runtime::builder()
        .transport(transport.clone())
        .stream(StreamConfig::new("todos"))
        .build()?;

    let config = StepConfig::new("SyncTodos")
        .trigger(trigger::queue("todos.imported"))
        .trigger(trigger::cron("*/15 * * * *"))
        .trigger(trigger::stream("todos").with_group_id("inbox"))
        .description("Keeps the todo index in sync");

    let definition = multi_trigger_step(config)?
        .on_queue(|input, ctx| async move {
            let todo = input.data();
            let id = todo["id"].as_str().unwrap_or("unknown").to_string();
            ctx.stream("todos")?.set("inbox", &id, todo).await?;
            Ok::<_, StepError>(json!({"imported": id}))
        })
        .on_cron(|ctx| async move {
            let groups = ctx.stream("todos")?.list_groups().await?;
            ctx.logger().info(&format!("re-indexing {} groups", groups.len()));
            Ok::<_, StepError>(())
        })
        .on_stream(|input, _ctx| async move {
            let event = input.as_stream().map(|e| e.event.kind);
            Ok::<_, StepError>(json!({"event": event}))
        })
        .build();

    for record in runtime.add_step(definition, "src/steps/sync_todos.rs")? {
        println!("{} -> {:?}", record.function_id, record.kind_config);
    }

    let imported = transport
        .invoke(
            "steps::SyncTodos::trigger::queue(todos.imported)",
            json!({"id": "t-1", "title": "write docs"}),
        )
        .await?;
    println!("Queue: {imported}");

    transport
        .invoke("steps::SyncTodos::trigger::cron(*/15 * * * *)", Value::Null)
        .await?;

    let streamed = transport
        .invoke(
            "steps::SyncTodos::trigger::stream(todos)",
            json!({
                "stream_name": "todos",
                "group_id": "inbox",
                "item_id": "t-1",
                "event": {"type": "create", "data": {"title": "write docs"}}
            }),
        )
        .await?;
    println!("Stream: {streamed}");

    for call in transport.calls() {
        println!("call {} {}", call.op, call.payload);
    }
    Ok(())
}
