// Telemetry sinks fed by the forwarding pipeline.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

/// One charted temperature reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperaturePoint {
    pub received_at: DateTime<Utc>,
    pub celsius: f64,
}

/// Receives readings extracted from realtime messages.
pub trait TelemetrySink: Send + Sync {
    fn record_temperature(&self, point: TemperaturePoint);
}

/// Rolling window of the most recent temperature readings.
#[derive(Debug, Clone)]
pub struct TemperatureSeries {
    max_points: usize,
    points: Arc<Mutex<VecDeque<TemperaturePoint>>>,
}

impl TemperatureSeries {
    pub fn new(max_points: usize) -> Self {
        let max_points = max_points.max(1);
        Self {
            max_points,
            points: Arc::new(Mutex::new(VecDeque::with_capacity(max_points))),
        }
    }

    pub fn max_points(&self) -> usize {
        self.max_points
    }

    /// Oldest first.
    pub fn points(&self) -> Vec<TemperaturePoint> {
        self.lock().iter().copied().collect()
    }

    pub fn latest(&self) -> Option<TemperaturePoint> {
        self.lock().back().copied()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<TemperaturePoint>> {
        self.points.lock().expect("temperature series lock poisoned")
    }
}

impl TelemetrySink for TemperatureSeries {
    fn record_temperature(&self, point: TemperaturePoint) {
        let mut points = self.lock();
        while points.len() >= self.max_points {
            points.pop_front();
        }
        points.push_back(point);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(celsius: f64) -> TemperaturePoint {
        TemperaturePoint {
            received_at: Utc::now(),
            celsius,
        }
    }

    #[test]
    fn keeps_only_most_recent_points() {
        let series = TemperatureSeries::new(3);
        for t in [20.0, 21.0, 22.0, 23.0] {
            series.record_temperature(point(t));
        }
        let values: Vec<f64> = series.points().iter().map(|p| p.celsius).collect();
        assert_eq!(values, vec![21.0, 22.0, 23.0]);
        assert_eq!(series.latest().map(|p| p.celsius), Some(23.0));
    }

    #[test]
    fn clones_share_storage() {
        let series = TemperatureSeries::new(20);
        let view = series.clone();
        series.record_temperature(point(19.5));
        assert_eq!(view.len(), 1);
        view.clear();
        assert!(series.is_empty());
    }
}
