//! MQTT-over-WebSocket broker session.
//!
//! Wraps a `rumqttc` client and drives its event loop on a background
//! task, translating raw packets into [`BrokerEvent`]s delivered through an
//! unbounded channel. Subscribe/unsubscribe acknowledgements are matched
//! back to their topics by packet id so consumers see topic-level results.
//!
//! The session does **not** reconnect: the first connection error is
//! reported as [`BrokerEvent::Error`] and the event loop stops.
//!
//! # Example
//!
//! ```rust,ignore
//! use sensorlink_api::broker::{BrokerEvent, BrokerOptions, BrokerSession};
//!
//! let (session, mut events) =
//!     BrokerSession::connect("wss://test.mosquitto.org:8081/mqtt", &BrokerOptions::default())?;
//!
//! while let Some(event) = events.recv().await {
//!     if matches!(event, BrokerEvent::Connected) {
//!         session.subscribe("sensors/lab-1")?;
//!     }
//! }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    SubscribeReasonCode, Transport,
};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;

// ── Tuning ───────────────────────────────────────────────────────────

const REQUEST_CHANNEL_CAPACITY: usize = 10;
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);
const DEFAULT_CLIENT_ID_PREFIX: &str = "web_client_";

// ── BrokerOptions ────────────────────────────────────────────────────

/// Connection options for a broker session.
#[derive(Debug, Clone)]
pub struct BrokerOptions {
    /// Explicit client id. When `None`, one is generated from
    /// `client_id_prefix` plus a random suffix.
    pub client_id: Option<String>,
    /// Prefix for generated client ids. Default: `web_client_`.
    pub client_id_prefix: String,
    /// Start with a clean session. Default: `true`.
    pub clean_session: bool,
    /// MQTT keep-alive interval. Clamped to at least 5s.
    pub keep_alive: Duration,
    /// Optional username/password.
    pub credentials: Option<(String, SecretString)>,
}

impl Default for BrokerOptions {
    fn default() -> Self {
        Self {
            client_id: None,
            client_id_prefix: DEFAULT_CLIENT_ID_PREFIX.into(),
            clean_session: true,
            keep_alive: Duration::from_secs(30),
            credentials: None,
        }
    }
}

impl BrokerOptions {
    /// The configured client id, or a fresh `<prefix><8 hex chars>` id.
    pub fn resolve_client_id(&self) -> String {
        self.client_id.clone().unwrap_or_else(|| {
            let suffix = uuid::Uuid::new_v4().simple().to_string();
            format!("{}{}", self.client_id_prefix, &suffix[..8])
        })
    }
}

// ── BrokerEvent ──────────────────────────────────────────────────────

/// Session-level events surfaced to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// Broker accepted the connection.
    Connected,
    /// A subscription was acknowledged.
    Subscribed { topic: String },
    /// The broker refused a subscription.
    SubscribeFailed { topic: String },
    /// An unsubscribe was acknowledged.
    Unsubscribed { topic: String },
    /// An application message arrived.
    Message { topic: String, payload: Bytes },
    /// The connection failed; the session has stopped.
    Error(String),
    /// The session closed cleanly.
    Closed,
}

// ── Request bookkeeping ──────────────────────────────────────────────

/// Topics of requests handed to the client but not yet assigned a packet id.
/// The event loop pops from the front when it sees the matching outgoing packet.
#[derive(Debug, Default)]
struct PendingRequests {
    subscribes: VecDeque<String>,
    unsubscribes: VecDeque<String>,
}

// ── BrokerSession ────────────────────────────────────────────────────

/// Handle to a running broker session.
pub struct BrokerSession {
    client: AsyncClient,
    pending: Arc<Mutex<PendingRequests>>,
    cancel: CancellationToken,
}

impl BrokerSession {
    /// Configure the client and spawn the event loop.
    ///
    /// Returns immediately; the handshake happens in the background and is
    /// reported as [`BrokerEvent::Connected`] or [`BrokerEvent::Error`].
    pub fn connect(
        address: &str,
        options: &BrokerOptions,
    ) -> Result<(Self, mpsc::UnboundedReceiver<BrokerEvent>), Error> {
        let mqtt_options = build_mqtt_options(address, options)?;
        let (client, eventloop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let pending = Arc::new(Mutex::new(PendingRequests::default()));
        let cancel = CancellationToken::new();

        tracing::info!(broker = %address, "connecting to broker");

        let task_pending = Arc::clone(&pending);
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            event_loop(eventloop, event_tx, task_pending, task_cancel).await;
        });

        Ok((
            Self {
                client,
                pending,
                cancel,
            },
            event_rx,
        ))
    }

    /// Request a QoS 0 (at most once) subscription.
    pub fn subscribe(&self, topic: &str) -> Result<(), Error> {
        let mut pending = self.lock_pending();
        self.client
            .try_subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| Error::Broker(e.to_string()))?;
        pending.subscribes.push_back(topic.to_owned());
        Ok(())
    }

    /// Request removal of a subscription.
    pub fn unsubscribe(&self, topic: &str) -> Result<(), Error> {
        let mut pending = self.lock_pending();
        self.client
            .try_unsubscribe(topic)
            .map_err(|e| Error::Broker(e.to_string()))?;
        pending.unsubscribes.push_back(topic.to_owned());
        Ok(())
    }

    /// Send DISCONNECT and stop the event loop.
    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            tracing::debug!(error = %e, "disconnect request not delivered (session already down)");
        }
        self.cancel.cancel();
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, PendingRequests> {
        self.pending.lock().expect("broker request lock poisoned")
    }
}

impl Drop for BrokerSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Option translation ───────────────────────────────────────────────

fn build_mqtt_options(address: &str, options: &BrokerOptions) -> Result<MqttOptions, Error> {
    let url = Url::parse(address).map_err(|e| Error::InvalidBrokerUrl {
        url: address.into(),
        reason: e.to_string(),
    })?;

    let transport = match url.scheme() {
        "ws" => Transport::Ws,
        "wss" => Transport::wss_with_default_config(),
        other => {
            return Err(Error::InvalidBrokerUrl {
                url: address.into(),
                reason: format!("expected ws:// or wss://, got {other}://"),
            });
        }
    };
    let port = url.port_or_known_default().ok_or_else(|| Error::InvalidBrokerUrl {
        url: address.into(),
        reason: "no port".into(),
    })?;

    // WebSocket transports take the full URL as the broker address.
    let mut mqtt = MqttOptions::new(options.resolve_client_id(), address, port);
    mqtt.set_transport(transport);
    mqtt.set_clean_session(options.clean_session);
    mqtt.set_keep_alive(options.keep_alive.max(MIN_KEEP_ALIVE));
    if let Some((username, password)) = &options.credentials {
        mqtt.set_credentials(username.clone(), password.expose_secret().to_owned());
    }
    Ok(mqtt)
}

// ── Event loop ───────────────────────────────────────────────────────

async fn event_loop(
    mut eventloop: EventLoop,
    event_tx: mpsc::UnboundedSender<BrokerEvent>,
    pending: Arc<Mutex<PendingRequests>>,
    cancel: CancellationToken,
) {
    let mut subscribe_ids: HashMap<u16, String> = HashMap::new();
    let mut unsubscribe_ids: HashMap<u16, String> = HashMap::new();

    loop {
        let polled = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            polled = eventloop.poll() => polled,
        };

        let event = match polled {
            Ok(Event::Incoming(packet)) => {
                match translate_incoming(packet, &mut subscribe_ids, &mut unsubscribe_ids) {
                    Some(event) => event,
                    None => continue,
                }
            }
            Ok(Event::Outgoing(Outgoing::Subscribe(pkid))) => {
                if let Some(topic) = pop_front(&pending, |p| &mut p.subscribes) {
                    subscribe_ids.insert(pkid, topic);
                }
                continue;
            }
            Ok(Event::Outgoing(Outgoing::Unsubscribe(pkid))) => {
                if let Some(topic) = pop_front(&pending, |p| &mut p.unsubscribes) {
                    unsubscribe_ids.insert(pkid, topic);
                }
                continue;
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => BrokerEvent::Closed,
            Ok(Event::Outgoing(_)) => continue,
            Err(e) => BrokerEvent::Error(e.to_string()),
        };

        let terminal = matches!(event, BrokerEvent::Error(_) | BrokerEvent::Closed);
        // A dropped receiver just means nobody is listening any more.
        let _ = event_tx.send(event);
        if terminal {
            break;
        }
    }

    tracing::debug!("broker event loop exiting");
}

fn translate_incoming(
    packet: Packet,
    subscribe_ids: &mut HashMap<u16, String>,
    unsubscribe_ids: &mut HashMap<u16, String>,
) -> Option<BrokerEvent> {
    match packet {
        Packet::ConnAck(ack) if ack.code == ConnectReturnCode::Success => {
            Some(BrokerEvent::Connected)
        }
        Packet::ConnAck(ack) => Some(BrokerEvent::Error(format!(
            "connection refused: {:?}",
            ack.code
        ))),
        Packet::Publish(publish) => Some(BrokerEvent::Message {
            topic: publish.topic,
            payload: publish.payload,
        }),
        Packet::SubAck(ack) => {
            let topic = subscribe_ids.remove(&ack.pkid)?;
            let accepted = ack
                .return_codes
                .iter()
                .all(|code| matches!(code, SubscribeReasonCode::Success(_)));
            Some(if accepted {
                BrokerEvent::Subscribed { topic }
            } else {
                BrokerEvent::SubscribeFailed { topic }
            })
        }
        Packet::UnsubAck(ack) => unsubscribe_ids
            .remove(&ack.pkid)
            .map(|topic| BrokerEvent::Unsubscribed { topic }),
        Packet::Disconnect => Some(BrokerEvent::Closed),
        _ => None,
    }
}

fn pop_front(
    pending: &Mutex<PendingRequests>,
    queue: impl FnOnce(&mut PendingRequests) -> &mut VecDeque<String>,
) -> Option<String> {
    let mut guard = pending.lock().expect("broker request lock poisoned");
    queue(&mut guard).pop_front()
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rumqttc::{ConnAck, Publish, SubAck, UnsubAck};

    use super::*;

    #[test]
    fn generated_client_id_uses_prefix() {
        let options = BrokerOptions::default();
        let id = options.resolve_client_id();
        assert!(id.starts_with("web_client_"));
        assert_eq!(id.len(), "web_client_".len() + 8);
    }

    #[test]
    fn explicit_client_id_wins() {
        let options = BrokerOptions {
            client_id: Some("dashboard-1".into()),
            ..BrokerOptions::default()
        };
        assert_eq!(options.resolve_client_id(), "dashboard-1");
    }

    #[test]
    fn rejects_non_websocket_scheme() {
        let result = build_mqtt_options("mqtt://broker.local:1883", &BrokerOptions::default());
        assert!(matches!(result, Err(Error::InvalidBrokerUrl { .. })));
    }

    #[test]
    fn rejects_unparseable_address() {
        let result = build_mqtt_options("not a url", &BrokerOptions::default());
        assert!(matches!(result, Err(Error::InvalidBrokerUrl { .. })));
    }

    #[test]
    fn accepts_ws_address() {
        let mqtt = build_mqtt_options("ws://localhost:9001/mqtt", &BrokerOptions::default())
            .unwrap();
        assert!(mqtt.clean_session());
        assert!(mqtt.keep_alive() >= MIN_KEEP_ALIVE);
    }

    #[test]
    fn suback_maps_back_to_topic() {
        let mut subs = HashMap::from([(7, "sensors/lab".to_string())]);
        let mut unsubs = HashMap::new();
        let ack = SubAck::new(7, vec![SubscribeReasonCode::Success(QoS::AtMostOnce)]);

        let event = translate_incoming(Packet::SubAck(ack), &mut subs, &mut unsubs);
        assert_eq!(
            event,
            Some(BrokerEvent::Subscribed {
                topic: "sensors/lab".into()
            })
        );
        assert!(subs.is_empty());
    }

    #[test]
    fn suback_failure_is_reported() {
        let mut subs = HashMap::from([(3, "sensors/denied".to_string())]);
        let mut unsubs = HashMap::new();
        let ack = SubAck::new(3, vec![SubscribeReasonCode::Failure]);

        let event = translate_incoming(Packet::SubAck(ack), &mut subs, &mut unsubs);
        assert_eq!(
            event,
            Some(BrokerEvent::SubscribeFailed {
                topic: "sensors/denied".into()
            })
        );
    }

    #[test]
    fn unknown_suback_is_ignored() {
        let mut subs = HashMap::new();
        let mut unsubs = HashMap::new();
        let ack = SubAck::new(9, vec![SubscribeReasonCode::Success(QoS::AtMostOnce)]);
        assert!(translate_incoming(Packet::SubAck(ack), &mut subs, &mut unsubs).is_none());
    }

    #[test]
    fn unsuback_maps_back_to_topic() {
        let mut subs = HashMap::new();
        let mut unsubs = HashMap::from([(4, "sensors/old".to_string())]);
        let event =
            translate_incoming(Packet::UnsubAck(UnsubAck::new(4)), &mut subs, &mut unsubs);
        assert_eq!(
            event,
            Some(BrokerEvent::Unsubscribed {
                topic: "sensors/old".into()
            })
        );
    }

    #[test]
    fn connack_codes() {
        let mut subs = HashMap::new();
        let mut unsubs = HashMap::new();
        let ok = Packet::ConnAck(ConnAck::new(ConnectReturnCode::Success, false));
        assert_eq!(
            translate_incoming(ok, &mut subs, &mut unsubs),
            Some(BrokerEvent::Connected)
        );

        let refused = Packet::ConnAck(ConnAck::new(ConnectReturnCode::NotAuthorized, false));
        assert!(matches!(
            translate_incoming(refused, &mut subs, &mut unsubs),
            Some(BrokerEvent::Error(_))
        ));
    }

    #[test]
    fn publish_becomes_message() {
        let mut subs = HashMap::new();
        let mut unsubs = HashMap::new();
        let publish = Publish::new("sensors/lab", QoS::AtMostOnce, r#"{"temperature":21}"#);
        let event = translate_incoming(Packet::Publish(publish), &mut subs, &mut unsubs);
        assert_eq!(
            event,
            Some(BrokerEvent::Message {
                topic: "sensors/lab".into(),
                payload: Bytes::from_static(br#"{"temperature":21}"#),
            })
        );
    }
}
