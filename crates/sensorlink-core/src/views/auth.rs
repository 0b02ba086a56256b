// Sign-in screen. Sign-in itself happens elsewhere; this view shows who
// (if anyone) is signed in and offers sign-out.

use std::any::Any;

use async_trait::async_trait;

use crate::identity::IdentitySignal;
use crate::view::{DisplayRegion, View, ViewBase, ViewData};

use super::AUTH_VIEW;

pub struct AuthView {
    base: ViewBase,
    identity: IdentitySignal,
    signed_in_as: Option<String>,
}

impl AuthView {
    pub fn new(identity: IdentitySignal) -> Self {
        Self {
            base: ViewBase::new(AUTH_VIEW, DisplayRegion::new("auth-section")),
            identity,
            signed_in_as: None,
        }
    }

    /// Label for the signed-in identity, if any.
    pub fn signed_in_as(&self) -> Option<&str> {
        self.signed_in_as.as_deref()
    }

    /// Publish a sign-out. The app reacts by returning to this view.
    pub fn sign_out(&self) {
        self.identity.publish(None);
    }
}

#[async_trait]
impl View for AuthView {
    fn base(&self) -> &ViewBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ViewBase {
        &mut self.base
    }

    async fn initialize(&mut self, data: ViewData) {
        let identity = match data {
            ViewData::SignedIn(identity) => Some(identity),
            _ => self.identity.current(),
        };
        self.signed_in_as = identity.map(|i| i.display_name().to_owned());
    }

    async fn cleanup(&mut self) {
        self.signed_in_as = None;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
