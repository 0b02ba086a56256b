//! Signed-in identity and its token source.
//!
//! Sign-in mechanics live outside this crate. What the dashboard consumes
//! is the identity *state*: who is signed in (if anyone) and a way to mint
//! a fresh ID token for them. [`IdentitySignal`] broadcasts that state to
//! every interested component through a `watch` channel.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::watch;

use crate::error::CoreError;

/// Mints ID tokens for a signed-in identity.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Return an ID token. `force_refresh` asks the provider to bypass
    /// its own cache.
    async fn id_token(&self, force_refresh: bool) -> Result<SecretString, CoreError>;
}

/// A fixed token, e.g. one supplied through configuration.
pub struct StaticTokenSource {
    token: SecretString,
}

impl StaticTokenSource {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn id_token(&self, _force_refresh: bool) -> Result<SecretString, CoreError> {
        Ok(self.token.clone())
    }
}

/// The currently signed-in user.
#[derive(Clone)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    tokens: Arc<dyn TokenSource>,
}

impl Identity {
    pub fn new(uid: impl Into<String>, email: Option<String>, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            uid: uid.into(),
            email,
            tokens,
        }
    }

    pub fn token_source(&self) -> Arc<dyn TokenSource> {
        Arc::clone(&self.tokens)
    }

    /// Label shown by the auth view.
    pub fn display_name(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.uid)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("uid", &self.uid)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Broadcast of the current identity (`None` when signed out).
#[derive(Clone)]
pub struct IdentitySignal {
    tx: Arc<watch::Sender<Option<Identity>>>,
}

impl Default for IdentitySignal {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentitySignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Replace the current identity and wake every subscriber.
    pub fn publish(&self, identity: Option<Identity>) {
        tracing::debug!(
            uid = identity.as_ref().map_or("<signed out>", |i| i.uid.as_str()),
            "identity changed"
        );
        self.tx.send_replace(identity);
    }

    pub fn current(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[tokio::test]
    async fn subscribers_see_published_identity() {
        let signal = IdentitySignal::new();
        let mut rx = signal.subscribe();
        assert!(rx.borrow().is_none());

        let source = Arc::new(StaticTokenSource::new(SecretString::from("tok")));
        signal.publish(Some(Identity::new("u1", None, source)));

        rx.changed().await.unwrap();
        let current = rx.borrow().clone().unwrap();
        assert_eq!(current.uid, "u1");
        assert_eq!(current.display_name(), "u1");

        let token = current.token_source().id_token(false).await.unwrap();
        assert_eq!(token.expose_secret(), "tok");
    }
}
