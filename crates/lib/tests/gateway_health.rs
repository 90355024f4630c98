//! Integration test: start the gateway on a free port, GET /, assert health JSON.
//! Does not require the inference endpoint or the bot connector.

mod common;

use common::{EchoResponder, RecordingChannel, ERROR_REPLY};
use relay::channels::NoVerification;
use relay::gateway::GatewayState;
use std::sync::Arc;

#[tokio::test]
async fn gateway_health_http_responds_with_running() {
    let state = GatewayState::new(
        Arc::new(EchoResponder::default()),
        Arc::new(RecordingChannel::default()),
        Arc::new(NoVerification),
        3978,
        ERROR_REPLY,
    );
    let base = common::spawn_gateway(state).await;

    let resp = reqwest::get(format!("{}/", base)).await.expect("GET /");
    assert!(resp.status().is_success());
    let json: serde_json::Value = resp.json().await.expect("parse JSON");
    assert_eq!(json.get("runtime").and_then(|v| v.as_str()), Some("running"));
    assert_eq!(json.get("port").and_then(|v| v.as_u64()), Some(3978));
}

#[tokio::test]
async fn messages_route_rejects_get() {
    let state = GatewayState::new(
        Arc::new(EchoResponder::default()),
        Arc::new(RecordingChannel::default()),
        Arc::new(NoVerification),
        3978,
        ERROR_REPLY,
    );
    let base = common::spawn_gateway(state).await;
    let resp = reqwest::get(format!("{}/api/messages", base)).await.expect("GET");
    assert_eq!(resp.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);
}
