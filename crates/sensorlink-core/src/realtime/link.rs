// Broker seam: the connection manager talks to these traits so tests can
// drive it without a live broker.

use std::sync::Arc;

use async_trait::async_trait;
use sensorlink_api::{BrokerEvent, BrokerOptions, BrokerSession};
use tokio::sync::mpsc;

use crate::error::CoreError;

/// A live broker session.
#[async_trait]
pub trait BrokerLink: Send + Sync {
    /// Queue a subscribe request. Acknowledgement arrives as an event.
    fn subscribe(&self, topic: &str) -> Result<(), CoreError>;

    /// Queue an unsubscribe request.
    fn unsubscribe(&self, topic: &str) -> Result<(), CoreError>;

    /// Close the session.
    async fn disconnect(&self);
}

/// Opens broker sessions.
pub trait BrokerConnector: Send + Sync {
    fn connect(
        &self,
        address: &str,
        options: &BrokerOptions,
    ) -> Result<(Arc<dyn BrokerLink>, mpsc::UnboundedReceiver<BrokerEvent>), CoreError>;
}

/// MQTT over WebSocket via `rumqttc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MqttConnector;

#[async_trait]
impl BrokerLink for BrokerSession {
    fn subscribe(&self, topic: &str) -> Result<(), CoreError> {
        Ok(BrokerSession::subscribe(self, topic)?)
    }

    fn unsubscribe(&self, topic: &str) -> Result<(), CoreError> {
        Ok(BrokerSession::unsubscribe(self, topic)?)
    }

    async fn disconnect(&self) {
        BrokerSession::disconnect(self).await;
    }
}

impl BrokerConnector for MqttConnector {
    fn connect(
        &self,
        address: &str,
        options: &BrokerOptions,
    ) -> Result<(Arc<dyn BrokerLink>, mpsc::UnboundedReceiver<BrokerEvent>), CoreError> {
        let (session, events) = BrokerSession::connect(address, options)?;
        Ok((Arc::new(session), events))
    }
}
