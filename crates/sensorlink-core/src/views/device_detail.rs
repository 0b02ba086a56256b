// Device detail screen: live telemetry for one device.
//
// Entering opens a broker connection and subscribes to the device topic.
// Each inbound message is handed to the forwarding pipeline on its own
// task so a slow upload never holds up the next message. Leaving tears
// the connection down before the navigator enters the next view.

use std::any::Any;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::BrokerSettings;
use crate::devices::Device;
use crate::pipeline::ForwardingPipeline;
use crate::realtime::{BrokerConnector, ConnectionManager, ConnectionState};
use crate::telemetry::TemperatureSeries;
use crate::view::{DisplayRegion, View, ViewBase, ViewData};

use super::{DEVICE_DETAIL_VIEW, DEVICE_LIST_VIEW};

/// The most recent raw message shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastMessage {
    pub topic: String,
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

/// `<prefix>/<location>`, without doubling a trailing `/` on the prefix.
pub fn topic_for(prefix: &str, location: &str) -> String {
    if prefix.ends_with('/') {
        format!("{prefix}{location}")
    } else {
        format!("{prefix}/{location}")
    }
}

pub struct DeviceDetailView {
    base: ViewBase,
    connector: Arc<dyn BrokerConnector>,
    broker: BrokerSettings,
    pipeline: ForwardingPipeline,
    chart: TemperatureSeries,
    device: Option<Device>,
    topic: Option<String>,
    connection: Option<ConnectionManager>,
    last_message: Arc<Mutex<Option<LastMessage>>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl DeviceDetailView {
    pub fn new(
        connector: Arc<dyn BrokerConnector>,
        broker: BrokerSettings,
        pipeline: ForwardingPipeline,
        chart: TemperatureSeries,
    ) -> Self {
        Self {
            base: ViewBase::new(DEVICE_DETAIL_VIEW, DisplayRegion::new("device-detail-screen")),
            connector,
            broker,
            pipeline,
            chart,
            device: None,
            topic: None,
            connection: None,
            last_message: Arc::new(Mutex::new(None)),
            dispatcher: None,
        }
    }

    pub fn device(&self) -> Option<&Device> {
        self.device.as_ref()
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
            .as_ref()
            .map_or(ConnectionState::Disconnected, ConnectionManager::state)
    }

    pub fn watch_connection(&self) -> Option<watch::Receiver<ConnectionState>> {
        self.connection.as_ref().map(ConnectionManager::watch_state)
    }

    pub fn subscribed_topic(&self) -> Option<String> {
        self.connection
            .as_ref()
            .and_then(ConnectionManager::current_topic)
    }

    pub fn last_message(&self) -> Option<LastMessage> {
        self.last_message
            .lock()
            .expect("last message lock poisoned")
            .clone()
    }

    pub fn chart(&self) -> &TemperatureSeries {
        &self.chart
    }

    /// Return to the device list.
    pub fn back_to_list(&self) -> bool {
        self.base.navigate_to(DEVICE_LIST_VIEW, ViewData::Empty)
    }
}

#[async_trait]
impl View for DeviceDetailView {
    fn base(&self) -> &ViewBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ViewBase {
        &mut self.base
    }

    async fn initialize(&mut self, data: ViewData) {
        let ViewData::Device(device) = data else {
            error!("device detail entered without a device");
            return;
        };

        let topic = topic_for(&self.broker.topic_prefix, &device.location);
        info!(
            device = %device.id,
            broker = %self.broker.url,
            %topic,
            "opening realtime session"
        );

        let (mut connection, mut messages) = ConnectionManager::new(Arc::clone(&self.connector));
        connection.connect(&self.broker.url, &self.broker.options);
        connection.subscribe(&topic);

        let pipeline = self.pipeline.clone();
        let last_message = Arc::clone(&self.last_message);
        let target = device.clone();
        self.dispatcher = Some(tokio::spawn(async move {
            while let Some(message) = messages.recv().await {
                debug!(topic = %message.topic, "realtime message received");
                *last_message.lock().expect("last message lock poisoned") = Some(LastMessage {
                    topic: message.topic.clone(),
                    payload: message.payload.clone(),
                    received_at: Utc::now(),
                });

                let pipeline = pipeline.clone();
                let device = target.clone();
                tokio::spawn(async move {
                    pipeline
                        .handle_message(&device, &message.topic, &message.payload)
                        .await;
                });
            }
        }));

        self.device = Some(device);
        self.topic = Some(topic);
        self.connection = Some(connection);
    }

    async fn cleanup(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.cleanup().await;
        }
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.abort();
        }
        self.chart.clear();
        *self.last_message.lock().expect("last message lock poisoned") = None;
        self.device = None;
        self.topic = None;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_prefix_slash_is_not_doubled() {
        assert_eq!(topic_for("sensors", "lab-1"), "sensors/lab-1");
        assert_eq!(topic_for("sensors/", "lab-1"), "sensors/lab-1");
        assert_eq!(topic_for("home/floor2/", "kitchen"), "home/floor2/kitchen");
    }
}
