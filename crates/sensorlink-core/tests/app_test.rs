// End-to-end dashboard flow with an in-memory broker and directory.
#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use sensorlink_api::{BrokerEvent, BrokerOptions};
use sensorlink_core::views::{AUTH_VIEW, DEVICE_DETAIL_VIEW, DEVICE_LIST_VIEW};
use sensorlink_core::{
    App, AppServices, BrokerConnector, BrokerLink, ConnectionState, CoreError, DashboardConfig,
    Device, DeviceDetailView, DeviceFilter, DeviceListView, DeviceStatus, Identity,
    IdentitySignal, MemorySettingsStore, NewDevice, StaticDeviceDirectory, StaticTokenSource,
};

// ── In-memory broker ────────────────────────────────────────────────

#[derive(Default)]
struct RecordingLink {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl BrokerLink for RecordingLink {
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
struct InMemoryBroker {
    link: Arc<RecordingLink>,
    events: Mutex<Option<mpsc::UnboundedSender<BrokerEvent>>>,
    addresses: Mutex<Vec<String>>,
}

impl InMemoryBroker {
    fn emit(&self, event: BrokerEvent) {
        self.events
            .lock()
            .unwrap()
            .as_ref()
            .unwrap()
            .send(event)
            .unwrap();
    }

    fn calls(&self) -> Vec<String> {
        self.link.calls.lock().unwrap().clone()
    }
}

impl BrokerConnector for InMemoryBroker {
    fn connect(
        &self,
        address: &str,
        _options: &BrokerOptions,
    ) -> Result<(Arc<dyn BrokerLink>, mpsc::UnboundedReceiver<BrokerEvent>), CoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.events.lock().unwrap() = Some(tx);
        self.addresses.lock().unwrap().push(address.to_owned());
        let link: Arc<dyn BrokerLink> = self.link.clone();
        Ok((link, rx))
    }
}

// ── Fixture ─────────────────────────────────────────────────────────

fn identity(uid: &str) -> Identity {
    Identity::new(
        uid,
        Some(format!("{uid}@example.com")),
        Arc::new(StaticTokenSource::new("id-token".into())),
    )
}

fn devices() -> StaticDeviceDirectory {
    let directory = StaticDeviceDirectory::new();
    let mut older = Device::new("dev-old", "Garage", "garage");
    older.created_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    let mut newer = Device::new("dev-new", "Kitchen probe", "kitchen");
    newer.status = DeviceStatus::Online;
    newer.created_at = Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
    directory.insert("u1", older);
    directory.insert("u1", newer);
    directory
}

fn app(signal: &IdentitySignal, broker: Arc<InMemoryBroker>) -> App {
    let services = AppServices {
        settings: Arc::new(MemorySettingsStore::new()),
        devices: Arc::new(devices()),
        connector: broker,
    };
    App::new(&DashboardConfig::default(), signal.clone(), services).unwrap()
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_start_signed_out_shows_auth() {
    let signal = IdentitySignal::new();
    let mut app = app(&signal, Arc::new(InMemoryBroker::default()));

    app.start().await.unwrap();

    assert_eq!(app.navigator().current(), Some(AUTH_VIEW));
    assert!(app.navigator().history().is_empty());
}

#[tokio::test]
async fn test_sign_in_lists_devices_newest_first() {
    let signal = IdentitySignal::new();
    let mut app = app(&signal, Arc::new(InMemoryBroker::default()));
    app.start().await.unwrap();

    signal.publish(Some(identity("u1")));
    app.handle_identity_change(signal.current()).await;

    assert_eq!(app.navigator().current(), Some(DEVICE_LIST_VIEW));
    let list = app
        .navigator_mut()
        .view_mut::<DeviceListView>(DEVICE_LIST_VIEW)
        .unwrap();
    let ids: Vec<&str> = list.devices().iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["dev-new", "dev-old"]);
    assert_eq!(list.device_counts(), (2, 1));
    assert_eq!(list.endpoint_suggestion(), "http://localhost:4000");
}

#[tokio::test]
async fn test_device_detail_streams_into_chart_and_tears_down_on_back() {
    let signal = IdentitySignal::new();
    signal.publish(Some(identity("u1")));
    let broker = Arc::new(InMemoryBroker::default());
    let mut app = app(&signal, Arc::clone(&broker));
    app.start().await.unwrap();
    assert_eq!(app.navigator().current(), Some(DEVICE_LIST_VIEW));

    app.navigator_mut()
        .view_mut::<DeviceListView>(DEVICE_LIST_VIEW)
        .unwrap()
        .open_device("dev-new")
        .unwrap();
    app.drain_navigation().await;
    assert_eq!(app.navigator().current(), Some(DEVICE_DETAIL_VIEW));
    assert_eq!(
        broker.addresses.lock().unwrap().as_slice(),
        ["wss://test.mosquitto.org:8081/mqtt"]
    );

    let detail = app
        .navigator_mut()
        .view_mut::<DeviceDetailView>(DEVICE_DETAIL_VIEW)
        .unwrap();
    assert_eq!(detail.topic(), Some("sensors/kitchen"));
    let mut state = detail.watch_connection().unwrap();

    broker.emit(BrokerEvent::Connected);
    state
        .wait_for(|s| *s == ConnectionState::Connected)
        .await
        .unwrap();
    wait_for(|| broker.calls().contains(&"sub:sensors/kitchen".to_owned())).await;

    broker.emit(BrokerEvent::Subscribed {
        topic: "sensors/kitchen".into(),
    });
    broker.emit(BrokerEvent::Message {
        topic: "sensors/kitchen".into(),
        payload: Bytes::from_static(br#"{"temperature": 22.5}"#),
    });

    let chart = app.chart().clone();
    wait_for(|| chart.len() == 1).await;

    let detail = app
        .navigator_mut()
        .view_mut::<DeviceDetailView>(DEVICE_DETAIL_VIEW)
        .unwrap();
    assert_eq!(detail.subscribed_topic().as_deref(), Some("sensors/kitchen"));
    assert_eq!(
        detail.last_message().unwrap().payload,
        r#"{"temperature": 22.5}"#
    );

    app.go_back().await.unwrap();

    assert_eq!(app.navigator().current(), Some(DEVICE_LIST_VIEW));
    assert!(broker.calls().contains(&"disconnect".to_owned()));
    assert!(app.chart().is_empty());
}

#[tokio::test]
async fn test_configure_integration_blank_input_disables() {
    let signal = IdentitySignal::new();
    signal.publish(Some(identity("u1")));
    let mut app = app(&signal, Arc::new(InMemoryBroker::default()));
    app.start().await.unwrap();

    let change = app.configure_integration("   ").await.unwrap();

    assert_eq!(change, sensorlink_core::IntegrationChange::Disabled);
    assert!(!app.integration().is_enabled());
}

#[tokio::test]
async fn test_configure_integration_requires_identity() {
    let signal = IdentitySignal::new();
    let mut app = app(&signal, Arc::new(InMemoryBroker::default()));
    app.start().await.unwrap();

    let err = app
        .configure_integration("https://api.example.com")
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::NoAuthenticatedIdentity), "got: {err:?}");
}

#[tokio::test]
async fn test_run_loop_follows_identity_signal() {
    let signal = IdentitySignal::new();
    let mut app = app(&signal, Arc::new(InMemoryBroker::default()));
    app.start().await.unwrap();

    let cancel = CancellationToken::new();
    let driver = {
        let signal = signal.clone();
        let cancel = cancel.clone();
        async move {
            signal.publish(Some(identity("u1")));
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        }
    };

    let (result, ()) = tokio::join!(app.run(cancel.clone()), driver);
    result.unwrap();
    assert_eq!(app.navigator().current(), Some(DEVICE_LIST_VIEW));
    assert_eq!(app.credentials().ttl(), Duration::from_secs(300));

    signal.publish(None);
    app.handle_identity_change(signal.current()).await;
    assert_eq!(app.navigator().current(), Some(AUTH_VIEW));

    app.shutdown().await;
    assert_eq!(app.navigator().current(), None);
}

#[tokio::test]
async fn test_device_list_management() {
    let signal = IdentitySignal::new();
    signal.publish(Some(identity("u1")));
    let mut app = app(&signal, Arc::new(InMemoryBroker::default()));
    app.start().await.unwrap();

    let list = app
        .navigator_mut()
        .view_mut::<DeviceListView>(DEVICE_LIST_VIEW)
        .unwrap();

    let added = list
        .add_device(NewDevice {
            name: "Freezer".into(),
            device_type: Some("thermometer".into()),
            location: Some("cellar".into()),
        })
        .await
        .unwrap();
    assert_eq!(list.devices().len(), 3);
    assert_eq!(list.devices()[0].id, added.id, "newest device sorts first");

    assert_eq!(
        list.toggle_status(&added.id).await.unwrap(),
        DeviceStatus::Online
    );
    list.set_filter(DeviceFilter::Online);
    let online: Vec<&str> = list.visible_devices().iter().map(|d| d.id.as_str()).collect();
    assert_eq!(online, vec![added.id.as_str(), "dev-new"]);

    // Only "dev-old" is offline.
    assert_eq!(list.clear_offline().await.unwrap(), 1);
    assert_eq!(list.device_counts(), (2, 2));

    list.remove_device(&added.id).await.unwrap();
    assert!(matches!(
        list.remove_device(&added.id).await.unwrap_err(),
        CoreError::DeviceNotFound { .. }
    ));
    assert!(matches!(
        list.add_device(NewDevice::new("  ")).await.unwrap_err(),
        CoreError::InvalidDevice { .. }
    ));

    list.sign_out();
    assert!(signal.current().is_none());
}
