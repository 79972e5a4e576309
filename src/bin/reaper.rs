//! Scheduled expiry sweep. One EventBridge tick runs one pass.

use aws_lambda_events::event::eventbridge::EventBridgeEvent;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use privalink::handler::Ctx;
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Error> {
    privalink::init_tracing();

    let ctx = Ctx::from_env().await?;
    let ctx = &ctx;
    lambda_runtime::run(service_fn(move |event: LambdaEvent<EventBridgeEvent>| async move {
        handler(event, ctx).await
    }))
    .await
}

async fn handler(event: LambdaEvent<EventBridgeEvent>, ctx: &Ctx) -> Result<serde_json::Value, Error> {
    tracing::debug!(request_id = %event.context.request_id, "sweep tick");
    let report = ctx.service.reaper().sweep(ctx.config.sweep_batch).await?;
    Ok(json!({
        "scanned": report.scanned,
        "expired": report.expired,
        "blobFailures": report.blob_failures,
    }))
}
