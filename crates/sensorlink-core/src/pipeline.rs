// ── Telemetry forwarding pipeline ──
//
// Per-message path from the realtime link to the chart and the backend:
// parse, chart any temperature, and, while the integration is active,
// upload the reading with a bearer token. Nothing here returns an error
// to the caller; every failure is logged and reported as an outcome.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sensorlink_api::{SensorApiClient, SensorReading};
use serde_json::Value;
use tracing::{debug, warn};

use crate::credentials::CredentialCache;
use crate::devices::Device;
use crate::integration::IntegrationCoordinator;
use crate::telemetry::{TelemetrySink, TemperaturePoint};

/// What happened to one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Not JSON; shown to the operator but otherwise ignored.
    NonTelemetry,
    /// Parsed, but the integration is off.
    Skipped,
    /// Uploaded to the backend.
    Forwarded,
    /// Upload attempted and failed (token, transport, or HTTP status).
    Dropped,
}

/// Field names checked, in order, for the reading's own timestamp.
const TIMESTAMP_FIELDS: [&str; 3] = ["recordedAt", "timestamp", "ts"];

#[derive(Clone)]
pub struct ForwardingPipeline {
    integration: IntegrationCoordinator,
    credentials: CredentialCache,
    sensor_api: SensorApiClient,
    chart: Arc<dyn TelemetrySink>,
}

impl ForwardingPipeline {
    pub fn new(
        integration: IntegrationCoordinator,
        credentials: CredentialCache,
        sensor_api: SensorApiClient,
        chart: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            integration,
            credentials,
            sensor_api,
            chart,
        }
    }

    pub async fn handle_message(&self, device: &Device, topic: &str, raw: &str) -> PipelineOutcome {
        let parsed: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(_) => {
                debug!(%topic, "non-JSON message; not forwarded");
                return PipelineOutcome::NonTelemetry;
            }
        };

        match parsed.get("temperature").and_then(Value::as_f64) {
            Some(celsius) => self.chart.record_temperature(TemperaturePoint {
                received_at: Utc::now(),
                celsius,
            }),
            None => debug!(%topic, "message has no numeric temperature"),
        }

        self.forward(device, parsed).await
    }

    async fn forward(&self, device: &Device, payload: Value) -> PipelineOutcome {
        if !self.integration.snapshot().is_active() {
            return PipelineOutcome::Skipped;
        }

        let token = match self.credentials.get_token(false).await {
            Ok(token) => token,
            Err(e) => {
                warn!(device = %device.id, error = %e, "no credential for forwarding; reading dropped");
                return PipelineOutcome::Dropped;
            }
        };

        let reading = SensorReading {
            device_id: device.id.clone(),
            device_name: device.name.clone(),
            recorded_at: resolve_recorded_at(&payload, Utc::now()),
            payload,
        };

        match self.sensor_api.send_reading(token.expose(), &reading).await {
            Ok(_) => {
                debug!(device = %device.id, "reading forwarded to backend");
                PipelineOutcome::Forwarded
            }
            Err(e) => {
                warn!(device = %device.id, status = ?e.status(), error = %e, "backend rejected reading");
                PipelineOutcome::Dropped
            }
        }
    }
}

/// Pick the reading's timestamp from its payload, falling back to `now`.
///
/// Numbers are epoch milliseconds. Strings may be RFC 3339, a bare
/// `YYYY-MM-DDTHH:MM:SS` (taken as UTC), or a date. Zero, empty strings,
/// and unparseable values are skipped.
pub fn resolve_recorded_at(payload: &Value, now: DateTime<Utc>) -> DateTime<Utc> {
    TIMESTAMP_FIELDS
        .iter()
        .filter_map(|field| payload.get(*field))
        .find_map(parse_timestamp)
        .unwrap_or(now)
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let millis = match n.as_i64() {
                Some(ms) => ms,
                #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
                None => n.as_f64().filter(|f| f.is_finite())?.trunc() as i64,
            };
            if millis == 0 {
                return None;
            }
            DateTime::from_timestamp_millis(millis)
        }
        Value::String(s) => parse_timestamp_str(s.trim()),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
