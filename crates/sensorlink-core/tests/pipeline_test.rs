// Forwarding pipeline against a wiremock backend.
#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sensorlink_api::sensor::DEFAULT_SENSOR_PATH;
use sensorlink_api::SensorApiClient;
use sensorlink_core::{
    CredentialCache, Device, ForwardingPipeline, Identity, IdentitySignal, IntegrationCoordinator,
    MemorySettingsStore, PipelineOutcome, StaticTokenSource, TemperatureSeries,
};

struct Fixture {
    server: MockServer,
    identity: IdentitySignal,
    coordinator: IntegrationCoordinator,
    chart: TemperatureSeries,
    pipeline: ForwardingPipeline,
}

async fn fixture() -> Fixture {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let identity = IdentitySignal::new();
    identity.publish(Some(Identity::new(
        "u1",
        Some("ops@example.com".into()),
        Arc::new(StaticTokenSource::new("id-token-1".into())),
    )));

    let api = SensorApiClient::new(
        reqwest::Client::new(),
        Some("http://localhost:4000"),
        DEFAULT_SENSOR_PATH,
    );
    let coordinator = IntegrationCoordinator::new(
        Arc::new(MemorySettingsStore::new()),
        api.clone(),
        "http://localhost:4000",
        Duration::from_secs(2),
    );
    let credentials = CredentialCache::new(identity.clone(), 5);
    let chart = TemperatureSeries::new(20);
    let pipeline = ForwardingPipeline::new(
        coordinator.clone(),
        credentials,
        api,
        Arc::new(chart.clone()),
    );

    Fixture {
        server,
        identity,
        coordinator,
        chart,
        pipeline,
    }
}

fn device() -> Device {
    Device::new("dev-1", "Kitchen probe", "kitchen")
}

#[tokio::test]
async fn test_disabled_integration_sends_nothing() {
    let f = fixture().await;
    Mock::given(method("POST"))
        .and(path(DEFAULT_SENSOR_PATH))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&f.server)
        .await;

    let outcome = f
        .pipeline
        .handle_message(&device(), "sensors/kitchen", r#"{"temperature": 21.5}"#)
        .await;

    assert_eq!(outcome, PipelineOutcome::Skipped);
    // Charting is independent of forwarding.
    assert_eq!(f.chart.len(), 1);
    assert!((f.chart.latest().unwrap().celsius - 21.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_enabled_integration_forwards_with_bearer() {
    let f = fixture().await;
    f.coordinator
        .verify_and_enable("u1", &f.server.uri())
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path(DEFAULT_SENSOR_PATH))
        .and(header("authorization", "Bearer id-token-1"))
        .and(body_partial_json(json!({
            "deviceId": "dev-1",
            "deviceName": "Kitchen probe",
            "recordedAt": "2024-06-15T10:30:00.000Z",
            "payload": { "temperature": 19.0, "ts": 1_718_447_400_000_i64 }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "r1" })))
        .expect(1)
        .mount(&f.server)
        .await;

    let outcome = f
        .pipeline
        .handle_message(
            &device(),
            "sensors/kitchen",
            r#"{"temperature": 19.0, "ts": 1718447400000}"#,
        )
        .await;

    assert_eq!(outcome, PipelineOutcome::Forwarded);
}

#[tokio::test]
async fn test_non_json_is_not_forwarded() {
    let f = fixture().await;
    f.coordinator
        .verify_and_enable("u1", &f.server.uri())
        .await
        .unwrap();
    Mock::given(method("POST"))
        .and(path(DEFAULT_SENSOR_PATH))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&f.server)
        .await;

    let outcome = f
        .pipeline
        .handle_message(&device(), "sensors/kitchen", "hello world")
        .await;

    assert_eq!(outcome, PipelineOutcome::NonTelemetry);
    assert!(f.chart.is_empty());
}

#[tokio::test]
async fn test_backend_error_drops_reading() {
    let f = fixture().await;
    f.coordinator
        .verify_and_enable("u1", &f.server.uri())
        .await
        .unwrap();
    Mock::given(method("POST"))
        .and(path(DEFAULT_SENSOR_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "db down" })))
        .expect(1)
        .mount(&f.server)
        .await;

    let outcome = f
        .pipeline
        .handle_message(&device(), "sensors/kitchen", r#"{"humidity": 40}"#)
        .await;

    assert_eq!(outcome, PipelineOutcome::Dropped);
}

#[tokio::test]
async fn test_signed_out_drops_reading() {
    let f = fixture().await;
    f.coordinator
        .verify_and_enable("u1", &f.server.uri())
        .await
        .unwrap();
    f.identity.publish(None);
    Mock::given(method("POST"))
        .and(path(DEFAULT_SENSOR_PATH))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&f.server)
        .await;

    let outcome = f
        .pipeline
        .handle_message(&device(), "sensors/kitchen", r#"{"temperature": 20}"#)
        .await;

    assert_eq!(outcome, PipelineOutcome::Dropped);
}
