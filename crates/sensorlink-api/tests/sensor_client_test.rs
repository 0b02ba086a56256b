// Integration tests for `SensorApiClient` using wiremock.
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sensorlink_api::sensor::DEFAULT_SENSOR_PATH;
use sensorlink_api::{Error, SensorApiClient, SensorReading};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, SensorApiClient) {
    let server = MockServer::start().await;
    let client = SensorApiClient::new(reqwest::Client::new(), None, DEFAULT_SENSOR_PATH);
    client.enable(Some(&server.uri()));
    (server, client)
}

fn reading() -> SensorReading {
    SensorReading {
        device_id: "dev-42".into(),
        device_name: "Greenhouse".into(),
        recorded_at: Utc.with_ymd_and_hms(2024, 6, 15, 10, 30, 0).unwrap(),
        payload: json!({ "temperature": 23.4, "humidity": 61 }),
    }
}

// ── Uploads ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_send_reading_posts_with_bearer() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/sensors/data"))
        .and(header("authorization", "Bearer id-token-1"))
        .and(body_partial_json(json!({
            "deviceId": "dev-42",
            "deviceName": "Greenhouse",
            "recordedAt": "2024-06-15T10:30:00.000Z",
            "payload": { "temperature": 23.4 }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "r-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let body = client.send_reading("id-token-1", &reading()).await.unwrap();
    assert_eq!(body["id"], "r-1");
}

#[tokio::test]
async fn test_send_reading_non_json_success_is_empty_object() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/sensors/data"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let body = client.send_reading("t", &reading()).await.unwrap();
    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn test_send_reading_error_carries_details() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/sensors/data"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "error": "token expired" })),
        )
        .mount(&server)
        .await;

    let err = client.send_reading("stale", &reading()).await.unwrap_err();
    match err {
        Error::Api {
            status, details, ..
        } => {
            assert_eq!(status, 401);
            assert_eq!(details.unwrap()["error"], "token expired");
        }
        other => panic!("expected Api error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_disabled_client_sends_nothing() {
    let (server, client) = setup().await;
    client.disable();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = client.send_reading("t", &reading()).await;
    assert!(matches!(result, Err(Error::Disabled)));
}

// ── Health probe ────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_ok() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    client
        .check_health(&server.uri(), Duration::from_secs(2), &CancellationToken::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_health_non_2xx() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client
        .check_health(&server.uri(), Duration::from_secs(2), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(503));
}

#[tokio::test]
async fn test_health_timeout() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let err = client
        .check_health(
            &server.uri(),
            Duration::from_millis(100),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "got: {err:?}");
}

#[tokio::test]
async fn test_health_cancelled() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = client
        .check_health(&server.uri(), Duration::from_secs(10), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled), "got: {err:?}");
}
