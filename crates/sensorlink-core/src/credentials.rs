// ── Credential cache ──
//
// Caches the bearer token for the signed-in identity and collapses
// concurrent refreshes into one provider call. The refresh future is
// shared; whoever arrives while it is pending awaits the same result.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use secrecy::{ExposeSecret, SecretString};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::identity::{Identity, IdentitySignal};

const MIN_TTL_MINUTES: u64 = 2;
const MAX_TTL_MINUTES: u64 = 10;

/// A bearer token ready for an `Authorization` header.
#[derive(Clone)]
pub struct BearerToken(Arc<SecretString>);

impl BearerToken {
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

type RefreshFuture = Shared<BoxFuture<'static, Result<BearerToken, String>>>;

struct InFlight {
    generation: u64,
    future: RefreshFuture,
}

struct CacheEntry {
    token: Option<BearerToken>,
    fetched_at: Option<Instant>,
    ttl: Duration,
    /// Bumped on every invalidation so a refresh started for an older
    /// entry never repopulates a newer one.
    generation: u64,
    in_flight: Option<InFlight>,
}

impl CacheEntry {
    fn fresh_token(&self, now: Instant) -> Option<BearerToken> {
        let fetched_at = self.fetched_at?;
        if now.saturating_duration_since(fetched_at) < self.ttl {
            self.token.clone()
        } else {
            None
        }
    }

    fn invalidate(&mut self) {
        self.token = None;
        self.fetched_at = None;
        self.generation = self.generation.wrapping_add(1);
    }
}

struct Inner {
    identity: IdentitySignal,
    entry: Mutex<CacheEntry>,
}

/// Shared, single-flight token cache.
#[derive(Clone)]
pub struct CredentialCache {
    inner: Arc<Inner>,
}

fn clamp_ttl(minutes: u64) -> Duration {
    Duration::from_secs(minutes.clamp(MIN_TTL_MINUTES, MAX_TTL_MINUTES) * 60)
}

impl CredentialCache {
    pub fn new(identity: IdentitySignal, ttl_minutes: u64) -> Self {
        Self {
            inner: Arc::new(Inner {
                identity,
                entry: Mutex::new(CacheEntry {
                    token: None,
                    fetched_at: None,
                    ttl: clamp_ttl(ttl_minutes),
                    generation: 0,
                    in_flight: None,
                }),
            }),
        }
    }

    /// Current cache lifetime.
    pub fn ttl(&self) -> Duration {
        self.lock().ttl
    }

    /// Return a valid token for the signed-in identity.
    ///
    /// Serves the cached token while it is younger than the TTL unless
    /// `force_refresh` is set. Otherwise joins the pending refresh, or
    /// starts one if none is running.
    pub async fn get_token(&self, force_refresh: bool) -> Result<BearerToken, CoreError> {
        let identity = self
            .inner
            .identity
            .current()
            .ok_or(CoreError::NoAuthenticatedIdentity)?;

        let refresh = {
            let mut entry = self.lock();
            if !force_refresh {
                if let Some(token) = entry.fresh_token(Instant::now()) {
                    return Ok(token);
                }
            }
            match &entry.in_flight {
                Some(pending) if pending.generation == entry.generation => pending.future.clone(),
                _ => {
                    let future = self.start_refresh(&identity, entry.generation);
                    entry.in_flight = Some(InFlight {
                        generation: entry.generation,
                        future: future.clone(),
                    });
                    future
                }
            }
        };

        refresh
            .await
            .map_err(|message| CoreError::TokenRefresh { message })
    }

    /// Drop the cached token. A refresh already running keeps going but
    /// will not repopulate the cache.
    pub fn clear(&self) {
        self.lock().invalidate();
        debug!("credential cache cleared");
    }

    /// Change the TTL (clamped to 2..=10 minutes) and invalidate.
    pub fn set_cache_duration_minutes(&self, minutes: u64) {
        let mut entry = self.lock();
        entry.ttl = clamp_ttl(minutes);
        entry.invalidate();
        debug!(ttl = ?entry.ttl, "credential cache duration updated");
    }

    /// Fetch a new token from the provider. Only reached when the local
    /// entry is missing, expired or bypassed, so the provider is always
    /// asked to skip its own cache.
    fn start_refresh(&self, identity: &Identity, generation: u64) -> RefreshFuture {
        let inner = Arc::clone(&self.inner);
        let source = identity.token_source();
        let uid = identity.uid.clone();

        async move {
            debug!(uid = %uid, "refreshing identity token");
            let result = source.id_token(true).await;

            let mut entry = inner.entry.lock().expect("credential cache lock poisoned");
            if entry
                .in_flight
                .as_ref()
                .is_some_and(|pending| pending.generation == generation)
            {
                entry.in_flight = None;
            }

            match result {
                Ok(secret) => {
                    let token = BearerToken(Arc::new(secret));
                    if entry.generation == generation {
                        entry.token = Some(token.clone());
                        entry.fetched_at = Some(Instant::now());
                    }
                    Ok(token)
                }
                Err(e) => {
                    warn!(uid = %uid, error = %e, "identity token refresh failed");
                    Err(e.to_string())
                }
            }
        }
        .boxed()
        .shared()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheEntry> {
        self.inner.entry.lock().expect("credential cache lock poisoned")
    }
}
