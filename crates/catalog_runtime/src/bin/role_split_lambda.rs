use std::time::{Duration, SystemTime, UNIX_EPOCH};

use catalog_runtime::adapters::callback::HttpResponseSink;
use catalog_runtime::handlers::role_split::{
    handle_lifecycle_event, InvocationOutcome, RoleSplitConfig,
};
use catalog_runtime::telemetry::init_lambda_logging;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;

// Left for the runtime to flush logs and return after the callback.
const DEADLINE_MARGIN: Duration = Duration::from_millis(500);

fn remaining_until(deadline_ms: u64) -> Duration {
    let deadline = UNIX_EPOCH + Duration::from_millis(deadline_ms);
    deadline
        .duration_since(SystemTime::now())
        .unwrap_or(Duration::ZERO)
        .saturating_sub(DEADLINE_MARGIN)
}

async fn handle_request(event: LambdaEvent<Value>) -> Result<InvocationOutcome, Error> {
    let config = RoleSplitConfig::from_env().bounded_by(remaining_until(event.context.deadline));
    let sink = HttpResponseSink::default();

    // Delivery failures are already logged; failing the invocation would
    // only make Lambda replay an event whose callback URL may have expired.
    Ok(handle_lifecycle_event(&event.payload, &config, &sink))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_lambda_logging();
    lambda_runtime::run(service_fn(handle_request)).await
}
