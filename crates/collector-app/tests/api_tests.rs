use std::collections::HashMap;
use std::sync::Arc;

use tokio::net::TcpListener;

use collector_app::api::{router, ApiState};
use collector_app::board::{status_from_sample, DeviceHandle, StatusBoard};
use evse_client::ClientConfig;
use poller_actor::PollSample;
use telemetry::TelemetrySnapshot;
use types::{ApiGeneration, ApiProfile, DeviceEndpoint};

const PARAMETERS_BODY: &str =
    r#"{"list":[{"vehicleState":3,"evseState":"true","actualCurrent":1500,"actualPower":10.3}]}"#;

/// Dead endpoint: bound once, dropped, nothing listens afterwards.
async fn dead_endpoint() -> DeviceEndpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    DeviceEndpoint {
        host: addr.ip().to_string(),
        port: addr.port(),
    }
}

async fn spawn_api(state: ApiState) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind api");
    let addr = listener.local_addr().expect("api addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router(state)).await;
    });
    format!("http://{addr}")
}

async fn state_with_garage() -> ApiState {
    let profile = ApiProfile::for_generation(ApiGeneration::V2);
    let handle = DeviceHandle::new(
        "garage",
        dead_endpoint().await,
        profile,
        ClientConfig { timeout_ms: 500 },
    )
    .expect("device handle");

    let mut devices = HashMap::new();
    devices.insert("garage".to_string(), Arc::new(handle));

    let board = StatusBoard::new();
    let sample = PollSample {
        device: "garage".to_string(),
        endpoint: DeviceEndpoint {
            host: "192.168.1.40".to_string(),
            port: 80,
        },
        snapshot: TelemetrySnapshot::parse(PARAMETERS_BODY).expect("snapshot"),
        collected_at_ms: 1_700_000_000_000,
    };
    board.apply(status_from_sample(&sample, &profile)).await;

    ApiState {
        board,
        devices: Arc::new(devices),
        metrics: None,
    }
}

async fn get_json(url: &str) -> (u16, serde_json::Value) {
    let response = reqwest::get(url).await.expect("get");
    let status = response.status().as_u16();
    let body = response.text().await.expect("body");
    let json = serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn post_json(url: &str, body: &serde_json::Value) -> (u16, serde_json::Value) {
    let response = reqwest::Client::new()
        .post(url)
        .header("content-type", "application/json")
        .body(body.to_string())
        .send()
        .await
        .expect("post");
    let status = response.status().as_u16();
    let body = response.text().await.expect("body");
    let json = serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn healthz_answers() {
    let base = spawn_api(state_with_garage().await).await;
    let response = reqwest::get(format!("{base}/healthz")).await.expect("get");
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.expect("body"), "ok");
}

#[tokio::test]
async fn device_status_is_served_from_the_board() {
    let base = spawn_api(state_with_garage().await).await;

    let (status, list) = get_json(&format!("{base}/devices")).await;
    assert_eq!(status, 200);
    assert_eq!(list.as_array().map(|entries| entries.len()), Some(1));

    let (status, garage) = get_json(&format!("{base}/devices/garage")).await;
    assert_eq!(status, 200);
    assert_eq!(garage["vehicle_state"], "charging");
    assert_eq!(garage["evse_active"], true);
    assert_eq!(garage["actual_current_a"], 15.0);
    assert_eq!(garage["raw"]["actualPower"], 10.3);
}

#[tokio::test]
async fn unknown_devices_are_404() {
    let base = spawn_api(state_with_garage().await).await;

    let (status, _) = get_json(&format!("{base}/devices/carport")).await;
    assert_eq!(status, 404);

    let (status, _) = post_json(
        &format!("{base}/devices/carport/active"),
        &serde_json::json!({"active": true}),
    )
    .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn out_of_bounds_current_is_rejected_locally() {
    let base = spawn_api(state_with_garage().await).await;

    // The handle points at a dead port; a 422 proves validation fired before
    // any network attempt.
    let (status, body) = post_json(
        &format!("{base}/devices/garage/current"),
        &serde_json::json!({"amps": 99.0}),
    )
    .await;
    assert_eq!(status, 422);
    assert!(body["error"].as_str().expect("error text").contains("99"));
}

#[tokio::test]
async fn unreachable_device_maps_to_bad_gateway() {
    let base = spawn_api(state_with_garage().await).await;

    let (status, body) = post_json(
        &format!("{base}/devices/garage/active"),
        &serde_json::json!({"active": true}),
    )
    .await;
    assert_eq!(status, 502);
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn metrics_route_is_absent_without_a_recorder() {
    let base = spawn_api(state_with_garage().await).await;
    let (status, _) = get_json(&format!("{base}/metrics")).await;
    assert_eq!(status, 404);
}
