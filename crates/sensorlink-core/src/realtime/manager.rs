// ── Realtime connection manager ──
//
// One broker session, one topic. Connection state is published through a
// `watch` channel; inbound messages go out on a single mpsc channel as
// raw text. Failures are logged and reflected in the state, never
// returned to the caller.

use std::sync::{Arc, Mutex};

use sensorlink_api::{BrokerEvent, BrokerOptions};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::link::{BrokerConnector, BrokerLink};
use super::state::{ConnectionState, SubscribeAction, SubscriptionState};

/// An inbound broker message, undecoded beyond UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeMessage {
    pub topic: String,
    pub payload: String,
}

struct Shared {
    state_tx: watch::Sender<ConnectionState>,
    /// Guards the subscription bookkeeping together with every state
    /// transition into or out of `Connected`.
    subs: Mutex<SubscriptionState>,
    link: Mutex<Option<Arc<dyn BrokerLink>>>,
}

impl Shared {
    fn lock_subs(&self) -> std::sync::MutexGuard<'_, SubscriptionState> {
        self.subs.lock().expect("subscription lock poisoned")
    }

    fn link(&self) -> Option<Arc<dyn BrokerLink>> {
        self.link.lock().expect("broker link lock poisoned").clone()
    }

    fn take_link(&self) -> Option<Arc<dyn BrokerLink>> {
        self.link.lock().expect("broker link lock poisoned").take()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "connection state changed");
        }
    }
}

/// Owns the broker session for a single consumer.
pub struct ConnectionManager {
    connector: Arc<dyn BrokerConnector>,
    shared: Arc<Shared>,
    message_tx: mpsc::UnboundedSender<RealtimeMessage>,
    cancel: CancellationToken,
    session_cancel: Option<CancellationToken>,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn BrokerConnector>,
    ) -> (Self, mpsc::UnboundedReceiver<RealtimeMessage>) {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let manager = Self {
            connector,
            shared: Arc::new(Shared {
                state_tx,
                subs: Mutex::new(SubscriptionState::default()),
                link: Mutex::new(None),
            }),
            message_tx,
            cancel: CancellationToken::new(),
            session_cancel: None,
        };
        (manager, message_rx)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn pending_topic(&self) -> Option<String> {
        self.shared.lock_subs().pending().map(str::to_owned)
    }

    pub fn current_topic(&self) -> Option<String> {
        self.shared.lock_subs().current().map(str::to_owned)
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Start connecting. The state is `Connecting` when this returns;
    /// the outcome arrives through [`watch_state`](Self::watch_state).
    ///
    /// An existing session is torn down first.
    pub fn connect(&mut self, address: &str, options: &BrokerOptions) {
        self.stop_session();
        self.shared.set_state(ConnectionState::Connecting);
        info!(broker = %address, "connecting to realtime broker");

        let (link, events) = match self.connector.connect(address, options) {
            Ok(pair) => pair,
            Err(e) => {
                error!(broker = %address, error = %e, "broker connection failed");
                self.shared.set_state(ConnectionState::Error);
                return;
            }
        };

        *self.shared.link.lock().expect("broker link lock poisoned") = Some(Arc::clone(&link));

        let session_cancel = self.cancel.child_token();
        self.session_cancel = Some(session_cancel.clone());
        tokio::spawn(event_pump(
            Arc::clone(&self.shared),
            link,
            events,
            self.message_tx.clone(),
            session_cancel,
        ));
    }

    /// Subscribe now if connected, otherwise park the topic until the
    /// connection comes up. Parking replaces any earlier parked topic.
    pub fn subscribe(&self, topic: &str) {
        let mut subs = self.shared.lock_subs();
        let connected = self.state() == ConnectionState::Connected;
        match subs.request(topic, connected) {
            SubscribeAction::Issue(topic) => {
                if let Some(link) = self.shared.link() {
                    issue_subscribe(link.as_ref(), &topic);
                }
            }
            SubscribeAction::Deferred { replaced } => {
                if let Some(replaced) = replaced {
                    debug!(%replaced, %topic, "pending subscription replaced");
                } else {
                    debug!(%topic, "subscription deferred until connected");
                }
            }
        }
    }

    /// Request removal of a subscription. A topic still parked is simply
    /// forgotten.
    pub fn unsubscribe(&self, topic: &str) {
        if self.shared.lock_subs().forget_pending(topic) {
            debug!(%topic, "dropped pending subscription");
            return;
        }
        let Some(link) = self.shared.link() else {
            return;
        };
        if let Err(e) = link.unsubscribe(topic) {
            warn!(%topic, error = %e, "unsubscribe request failed");
        }
    }

    /// Close the session and clear both topics. Safe to call repeatedly.
    pub async fn disconnect(&mut self) {
        let link = self.stop_session();
        if let Some(link) = link {
            link.disconnect().await;
            info!("disconnected from realtime broker");
        }
        self.shared.lock_subs().reset();
        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// Alias for [`disconnect`](Self::disconnect), used at teardown.
    pub async fn cleanup(&mut self) {
        self.disconnect().await;
    }

    /// Stop the event pump and detach the session without awaiting it.
    fn stop_session(&mut self) -> Option<Arc<dyn BrokerLink>> {
        if let Some(cancel) = self.session_cancel.take() {
            cancel.cancel();
        }
        self.shared.take_link()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn issue_subscribe(link: &dyn BrokerLink, topic: &str) {
    match link.subscribe(topic) {
        Ok(()) => debug!(%topic, "subscribe requested"),
        Err(e) => warn!(%topic, error = %e, "subscribe request failed"),
    }
}

// ── Event pump ───────────────────────────────────────────────────────

async fn event_pump(
    shared: Arc<Shared>,
    link: Arc<dyn BrokerLink>,
    mut events: mpsc::UnboundedReceiver<BrokerEvent>,
    message_tx: mpsc::UnboundedSender<RealtimeMessage>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            event = events.recv() => event,
        };

        let Some(event) = event else {
            debug!("broker event stream ended");
            if matches!(
                *shared.state_tx.borrow(),
                ConnectionState::Connecting | ConnectionState::Connected
            ) {
                shared.set_state(ConnectionState::Disconnected);
            }
            return;
        };

        match event {
            BrokerEvent::Connected => {
                let pending = {
                    let mut subs = shared.lock_subs();
                    shared.set_state(ConnectionState::Connected);
                    subs.connected()
                };
                info!("connected to realtime broker");
                if let Some(topic) = pending {
                    issue_subscribe(link.as_ref(), &topic);
                }
            }
            BrokerEvent::Subscribed { topic } => {
                info!(%topic, "subscribed");
                shared.lock_subs().subscribed(&topic);
            }
            BrokerEvent::SubscribeFailed { topic } => {
                error!(%topic, "broker rejected subscription");
            }
            BrokerEvent::Unsubscribed { topic } => {
                debug!(%topic, "unsubscribed");
                shared.lock_subs().unsubscribed(&topic);
            }
            BrokerEvent::Message { topic, payload } => {
                let payload = String::from_utf8_lossy(&payload).into_owned();
                // Receiver gone means the consumer is tearing down.
                let _ = message_tx.send(RealtimeMessage { topic, payload });
            }
            BrokerEvent::Error(reason) => {
                error!(%reason, "realtime broker error");
                let _subs = shared.lock_subs();
                shared.set_state(ConnectionState::Error);
            }
            BrokerEvent::Closed => {
                info!("realtime broker connection closed");
                let _subs = shared.lock_subs();
                shared.set_state(ConnectionState::Disconnected);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::error::CoreError;

    #[derive(Default)]
    struct FakeLink {
        calls: Mutex<Vec<String>>,
    }

    impl FakeLink {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BrokerLink for FakeLink {
        fn subscribe(&self, topic: &str) -> Result<(), CoreError> {
            self.calls.lock().unwrap().push(format!("sub:{topic}"));
            Ok(())
        }

        fn unsubscribe(&self, topic: &str) -> Result<(), CoreError> {
            self.calls.lock().unwrap().push(format!("unsub:{topic}"));
            Ok(())
        }

        async fn disconnect(&self) {
            self.calls.lock().unwrap().push("disconnect".into());
        }
    }

    #[derive(Default)]
    struct FakeConnector {
        link: Arc<FakeLink>,
        events: Mutex<Option<mpsc::UnboundedSender<BrokerEvent>>>,
        fail: bool,
    }

    impl FakeConnector {
        fn emit(&self, event: BrokerEvent) {
            self.events
                .lock()
                .unwrap()
                .as_ref()
                .unwrap()
                .send(event)
                .unwrap();
        }
    }

    impl BrokerConnector for FakeConnector {
        fn connect(
            &self,
            _address: &str,
            _options: &BrokerOptions,
        ) -> Result<(Arc<dyn BrokerLink>, mpsc::UnboundedReceiver<BrokerEvent>), CoreError>
        {
            if self.fail {
                return Err(CoreError::Connection {
                    reason: "unreachable".into(),
                });
            }
            let (tx, rx) = mpsc::unbounded_channel();
            *self.events.lock().unwrap() = Some(tx);
            let link: Arc<dyn BrokerLink> = self.link.clone();
            Ok((link, rx))
        }
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    fn manager() -> (
        Arc<FakeConnector>,
        ConnectionManager,
        mpsc::UnboundedReceiver<RealtimeMessage>,
    ) {
        let connector = Arc::new(FakeConnector::default());
        let (manager, rx) = ConnectionManager::new(connector.clone());
        (connector, manager, rx)
    }

    #[tokio::test]
    async fn connect_sets_connecting_synchronously() {
        let (_connector, mut manager, _rx) = manager();
        manager.connect("ws://broker", &BrokerOptions::default());
        assert_eq!(manager.state(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn only_last_pending_topic_is_subscribed() {
        let (connector, mut manager, _rx) = manager();
        manager.connect("ws://broker", &BrokerOptions::default());
        manager.subscribe("sensors/a");
        manager.subscribe("sensors/b");
        assert_eq!(manager.pending_topic().as_deref(), Some("sensors/b"));

        connector.emit(BrokerEvent::Connected);
        settle().await;

        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.pending_topic(), None);
        assert_eq!(connector.link.calls(), vec!["sub:sensors/b".to_string()]);

        connector.emit(BrokerEvent::Subscribed {
            topic: "sensors/b".into(),
        });
        settle().await;
        assert_eq!(manager.current_topic().as_deref(), Some("sensors/b"));
    }

    #[tokio::test]
    async fn subscribe_when_connected_issues_immediately() {
        let (connector, mut manager, _rx) = manager();
        manager.connect("ws://broker", &BrokerOptions::default());
        connector.emit(BrokerEvent::Connected);
        settle().await;

        manager.subscribe("sensors/x");
        assert_eq!(connector.link.calls(), vec!["sub:sensors/x".to_string()]);
    }

    #[tokio::test]
    async fn messages_are_delivered_raw() {
        let (connector, mut manager, mut rx) = manager();
        manager.connect("ws://broker", &BrokerOptions::default());
        connector.emit(BrokerEvent::Message {
            topic: "sensors/a".into(),
            payload: Bytes::from_static(b"not json"),
        });

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.topic, "sensors/a");
        assert_eq!(msg.payload, "not json");
    }

    #[tokio::test]
    async fn broker_error_moves_to_error_state() {
        let (connector, mut manager, _rx) = manager();
        let mut state = manager.watch_state();
        manager.connect("ws://broker", &BrokerOptions::default());
        connector.emit(BrokerEvent::Error("connection refused".into()));

        state
            .wait_for(|s| *s == ConnectionState::Error)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn connector_failure_is_not_thrown() {
        let connector = Arc::new(FakeConnector {
            fail: true,
            ..FakeConnector::default()
        });
        let (mut manager, _rx) = ConnectionManager::new(connector);
        manager.connect("ws://broker", &BrokerOptions::default());
        assert_eq!(manager.state(), ConnectionState::Error);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_clears_topics() {
        let (connector, mut manager, _rx) = manager();
        manager.connect("ws://broker", &BrokerOptions::default());
        manager.subscribe("sensors/a");

        manager.disconnect().await;
        manager.disconnect().await;

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.pending_topic(), None);
        assert_eq!(manager.current_topic(), None);
        assert_eq!(connector.link.calls(), vec!["disconnect".to_string()]);
    }

    #[tokio::test]
    async fn unsubscribe_pending_never_reaches_broker() {
        let (connector, mut manager, _rx) = manager();
        manager.connect("ws://broker", &BrokerOptions::default());
        manager.subscribe("sensors/a");
        manager.unsubscribe("sensors/a");

        connector.emit(BrokerEvent::Connected);
        settle().await;
        assert!(connector.link.calls().is_empty());
    }
}
