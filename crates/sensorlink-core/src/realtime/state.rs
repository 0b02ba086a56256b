// Connection and subscription state for the realtime link.

use strum::Display;

/// Lifecycle of the broker connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// What the caller should do with a subscribe request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeAction {
    /// Connected: send the request now.
    Issue(String),
    /// Not connected yet: parked until the connection comes up.
    /// `replaced` is the previously parked topic, if any.
    Deferred { replaced: Option<String> },
}

/// Pending and acknowledged topic for the single subscription.
///
/// A topic requested before the connection is up is parked as pending.
/// A later request replaces it (last write wins). The pending topic is
/// handed out exactly once, when the connection comes up.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubscriptionState {
    pending: Option<String>,
    current: Option<String>,
}

impl SubscriptionState {
    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn request(&mut self, topic: &str, connected: bool) -> SubscribeAction {
        if connected {
            SubscribeAction::Issue(topic.to_owned())
        } else {
            SubscribeAction::Deferred {
                replaced: self.pending.replace(topic.to_owned()),
            }
        }
    }

    /// The connection came up; take the parked topic.
    pub fn connected(&mut self) -> Option<String> {
        self.pending.take()
    }

    /// The broker acknowledged a subscription.
    pub fn subscribed(&mut self, topic: &str) {
        self.current = Some(topic.to_owned());
    }

    /// The broker acknowledged an unsubscribe.
    pub fn unsubscribed(&mut self, topic: &str) {
        if self.current.as_deref() == Some(topic) {
            self.current = None;
        }
    }

    /// Drop a parked topic that is being unsubscribed before it was sent.
    pub fn forget_pending(&mut self, topic: &str) -> bool {
        if self.pending.as_deref() == Some(topic) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.pending = None;
        self.current = None;
    }
}
