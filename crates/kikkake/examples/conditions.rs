//! Conditions gate a trigger before its handler runs.
//!
//! The transport calls the `::conditions::<index>` function first and only
//! dispatches to the step when it answers `true`.

use kikkake::prelude::*;
use kikkake::testing::RecordingTransport;
use kikkake::Invocation;
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let transport = Arc::new(RecordingTransport::new());
    let runtime = Runtime::builder().transport(transport.clone()).build()?;

    let high_value = Condition::new(|input, _ctx| input.data()["amount"].as_f64().unwrap_or(0.0) > 1000.0);
    let config = StepConfig::new("ReviewPayment")
        .trigger(trigger::queue("payments.received").with_condition(high_value));

    let definition = step(config)?.handle(|input, ctx| async move {
        ctx.logger().warn("payment needs manual review");
        Ok::<_, StepError>(json!({"review": input.data()["amount"]}))
    });
    let records = runtime.add_step(definition, "src/steps/review_payment.rs")?;
    let record = &records[0];
    let condition_id = record
        .condition_function_id
        .clone()
        .ok_or("condition was not registered")?;

    for amount in [250, 5000] {
        let payload = json!({"amount": amount});
        let passed = transport.invoke(&condition_id, payload.clone()).await?;
        println!("amount {amount}: condition -> {passed}");
        if passed == json!(true) {
            let invocation = Invocation::new(payload).with_conditions_checked(true);
            let result = transport.invoke_with(&record.function_id, invocation).await?;
            println!("  handler -> {result}");
        }
    }
    Ok(())
}
