// ── Integration coordinator ──
//
// Owns whether telemetry forwarding is on and where it goes. State moves
// only through `handle_identity_change`, `verify_and_enable`, and
// `disable`; each move updates the sensor client and then notifies
// listeners with the same snapshot, in registration order.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use sensorlink_api::SensorApiClient;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::endpoint::normalize_endpoint;
use crate::error::CoreError;
use crate::identity::Identity;
use crate::settings::{SettingsStore, SettingsUpdate};

/// Immutable view of the integration state handed to listeners.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrationSnapshot {
    pub enabled: bool,
    pub endpoint: Option<String>,
}

impl IntegrationSnapshot {
    /// Forwarding happens only when enabled with an endpoint.
    pub fn is_active(&self) -> bool {
        self.enabled && self.endpoint.is_some()
    }
}

type Listener = Arc<dyn Fn(&IntegrationSnapshot) -> Result<(), CoreError> + Send + Sync>;

#[derive(Debug, Default)]
struct State {
    enabled: bool,
    endpoint: Option<String>,
    current_uid: Option<String>,
    /// Bumped on every identity change; a settings load or endpoint
    /// verification that finishes under an older generation is discarded.
    identity_generation: u64,
}

impl State {
    fn snapshot(&self) -> IntegrationSnapshot {
        IntegrationSnapshot {
            enabled: self.enabled,
            endpoint: self.endpoint.clone(),
        }
    }
}

struct Inner {
    store: Arc<dyn SettingsStore>,
    sensor_api: SensorApiClient,
    default_base_url: String,
    health_timeout: Duration,
    state: Mutex<State>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener_id: AtomicU64,
    snapshot_tx: watch::Sender<IntegrationSnapshot>,
    verification: Mutex<CancellationToken>,
}

impl Inner {
    fn remove_listener(&self, id: u64) {
        self.listeners
            .lock()
            .expect("listener lock poisoned")
            .retain(|(listener_id, _)| *listener_id != id);
    }
}

/// Handle returned by [`IntegrationCoordinator::on_change`].
///
/// The listener stays registered until this handle is dropped or
/// [`unsubscribe`](Self::unsubscribe) is called.
#[must_use = "dropping the subscription unregisters the listener"]
pub struct ChangeSubscription {
    id: u64,
    inner: Weak<Inner>,
}

impl ChangeSubscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.remove_listener(self.id);
        }
    }
}

/// Shared coordinator for backend forwarding.
#[derive(Clone)]
pub struct IntegrationCoordinator {
    inner: Arc<Inner>,
}

impl IntegrationCoordinator {
    pub fn new(
        store: Arc<dyn SettingsStore>,
        sensor_api: SensorApiClient,
        default_base_url: impl Into<String>,
        health_timeout: Duration,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(IntegrationSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                store,
                sensor_api,
                default_base_url: default_base_url.into(),
                health_timeout,
                state: Mutex::new(State::default()),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
                snapshot_tx,
                verification: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn snapshot(&self) -> IntegrationSnapshot {
        self.lock_state().snapshot()
    }

    pub fn is_enabled(&self) -> bool {
        self.lock_state().enabled
    }

    pub fn endpoint(&self) -> Option<String> {
        self.lock_state().endpoint.clone()
    }

    pub fn current_uid(&self) -> Option<String> {
        self.lock_state().current_uid.clone()
    }

    /// Watch-based alternative to [`on_change`](Self::on_change).
    pub fn subscribe_state(&self) -> watch::Receiver<IntegrationSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Register a listener for state changes.
    pub fn on_change<F>(&self, listener: F) -> ChangeSubscription
    where
        F: Fn(&IntegrationSnapshot) -> Result<(), CoreError> + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .expect("listener lock poisoned")
            .push((id, Arc::new(listener)));
        ChangeSubscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// React to sign-in / sign-out.
    ///
    /// Signing out clears local state. Signing in loads the stored
    /// settings for that identity and activates the stored endpoint if
    /// forwarding was on. Listeners are notified either way.
    pub async fn handle_identity_change(
        &self,
        identity: Option<&Identity>,
    ) -> Result<IntegrationSnapshot, CoreError> {
        self.cancel_verification();

        let Some(identity) = identity else {
            {
                let mut state = self.lock_state();
                state.current_uid = None;
                state.identity_generation = state.identity_generation.wrapping_add(1);
                self.deactivate(&mut state);
            }
            return Ok(self.notify());
        };

        let generation = {
            let mut state = self.lock_state();
            state.current_uid = Some(identity.uid.clone());
            state.identity_generation = state.identity_generation.wrapping_add(1);
            state.identity_generation
        };

        let loaded = self.inner.store.load(&identity.uid).await;

        {
            let mut state = self.lock_state();
            if state.identity_generation != generation {
                debug!(uid = %identity.uid, "identity changed during settings load; discarding");
                return Ok(state.snapshot());
            }
            match &loaded {
                Ok(Some(settings)) => match settings.active_endpoint() {
                    Some(endpoint) => self.activate(&mut state, endpoint),
                    None => self.deactivate(&mut state),
                },
                Ok(None) => self.deactivate(&mut state),
                Err(e) => {
                    warn!(uid = %identity.uid, error = %e, "failed to load integration settings");
                    self.deactivate(&mut state);
                }
            }
        }

        let snapshot = self.notify();
        loaded.map(|_| snapshot)
    }

    /// Normalize, health-check, persist, and activate an endpoint.
    ///
    /// Any failure leaves the current state untouched. Starting a new
    /// verification cancels one still in progress, and so does an
    /// identity change; a verification that outlives the identity it
    /// started under ends with [`CoreError::HealthCheckCancelled`].
    pub async fn verify_and_enable(&self, uid: &str, raw_endpoint: &str) -> Result<String, CoreError> {
        let endpoint = normalize_endpoint(raw_endpoint)?;
        let cancel = self.begin_verification();
        let generation = self.lock_state().identity_generation;

        info!(endpoint = %endpoint, "verifying backend endpoint");
        self.inner
            .sensor_api
            .check_health(&endpoint, self.inner.health_timeout, &cancel)
            .await
            .map_err(|e| match e {
                sensorlink_api::Error::Timeout { timeout } => CoreError::HealthCheckTimeout {
                    endpoint: endpoint.clone(),
                    timeout,
                },
                sensorlink_api::Error::Cancelled => CoreError::HealthCheckCancelled {
                    endpoint: endpoint.clone(),
                },
                other if other.is_timeout() => CoreError::HealthCheckTimeout {
                    endpoint: endpoint.clone(),
                    timeout: self.inner.health_timeout,
                },
                other => CoreError::HealthCheckFailed {
                    endpoint: endpoint.clone(),
                    reason: other.to_string(),
                },
            })?;

        if self.lock_state().identity_generation != generation {
            debug!(endpoint = %endpoint, "identity changed during health check; discarding");
            return Err(CoreError::HealthCheckCancelled { endpoint });
        }

        self.inner
            .store
            .apply(
                uid,
                SettingsUpdate::Enable {
                    endpoint: endpoint.clone(),
                },
            )
            .await?;

        {
            let mut state = self.lock_state();
            if state.identity_generation != generation {
                debug!(endpoint = %endpoint, "identity changed while saving settings; not activating");
                return Err(CoreError::HealthCheckCancelled { endpoint });
            }
            self.activate(&mut state, &endpoint);
        }
        self.notify();
        info!(endpoint = %endpoint, "backend integration enabled");
        Ok(endpoint)
    }

    /// Turn forwarding off.
    ///
    /// Uses `uid`, or the signed-in identity when `None`. Local state is
    /// always deactivated and listeners notified, even if persisting the
    /// change fails; the persistence error is returned afterwards.
    pub async fn disable(&self, uid: Option<&str>) -> Result<(), CoreError> {
        let target = uid
            .map(str::to_owned)
            .or_else(|| self.lock_state().current_uid.clone());

        let persisted = match &target {
            Some(uid) => self.inner.store.apply(uid, SettingsUpdate::Disable).await,
            None => {
                debug!("no identity; disabling integration locally only");
                Ok(())
            }
        };

        {
            let mut state = self.lock_state();
            self.deactivate(&mut state);
        }
        self.notify();
        info!("backend integration disabled");
        persisted
    }

    /// Abort a health check in progress, if any.
    pub fn cancel_verification(&self) {
        self.inner
            .verification
            .lock()
            .expect("verification lock poisoned")
            .cancel();
    }

    // ── Internals ────────────────────────────────────────────────────

    fn begin_verification(&self) -> CancellationToken {
        let mut current = self
            .inner
            .verification
            .lock()
            .expect("verification lock poisoned");
        current.cancel();
        *current = CancellationToken::new();
        current.clone()
    }

    fn activate(&self, state: &mut State, endpoint: &str) {
        state.enabled = true;
        state.endpoint = Some(endpoint.to_owned());
        self.inner.sensor_api.enable(Some(endpoint));
    }

    fn deactivate(&self, state: &mut State) {
        state.enabled = false;
        state.endpoint = None;
        self.inner.sensor_api.disable();
        self.inner
            .sensor_api
            .set_base_url(Some(&self.inner.default_base_url));
    }

    /// Publish the current snapshot to the watch channel and every
    /// listener. A listener that errors or panics is logged; the rest
    /// still run.
    fn notify(&self) -> IntegrationSnapshot {
        let snapshot = self.snapshot();
        self.inner.snapshot_tx.send_replace(snapshot.clone());

        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .expect("listener lock poisoned")
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(&snapshot))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "integration listener failed"),
                Err(_) => warn!("integration listener panicked"),
            }
        }
        snapshot
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner.state.lock().expect("integration state lock poisoned")
    }
}
