//! The view contract.
//!
//! A view is one screen of the dashboard. It is created once, registered
//! with the [`ViewNavigator`](crate::navigator::ViewNavigator), and then
//! entered and left any number of times until teardown:
//!
//! ```text
//! Created ──enter──▶ Active ──leave──▶ Inactive ──enter──▶ Active ...
//!                                                    └──destroy──▶ Destroyed
//! ```
//!
//! Implementors supply `initialize` (run on every enter, with the payload
//! passed to the navigation) and `cleanup` (run on every leave and on
//! destroy). The provided `on_enter` / `on_leave` / `on_destroy` drive
//! visibility and the lifecycle around those two hooks.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use strum::Display;
use tokio::sync::watch;

use crate::devices::Device;
use crate::identity::Identity;
use crate::navigator::NavigatorHandle;

// ── Display region ───────────────────────────────────────────────────

/// The surface a view renders into. Rendering is external; the core only
/// tracks whether the region is shown, and front ends watch that flag.
#[derive(Debug, Clone)]
pub struct DisplayRegion {
    id: Arc<str>,
    visible: Arc<watch::Sender<bool>>,
}

impl DisplayRegion {
    pub fn new(id: &str) -> Self {
        let (visible, _) = watch::channel(false);
        Self {
            id: Arc::from(id),
            visible: Arc::new(visible),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn show(&self) {
        self.visible.send_replace(true);
    }

    pub fn hide(&self) {
        self.visible.send_replace(false);
    }

    pub fn is_visible(&self) -> bool {
        *self.visible.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<bool> {
        self.visible.subscribe()
    }
}

// ── Lifecycle ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ViewLifecycle {
    Created,
    Active,
    Inactive,
    Destroyed,
}

/// Payload handed to a view on enter.
#[derive(Debug, Clone, Default)]
pub enum ViewData {
    #[default]
    Empty,
    SignedIn(Identity),
    Device(Device),
}

/// State every view carries.
#[derive(Debug)]
pub struct ViewBase {
    name: String,
    region: DisplayRegion,
    lifecycle: ViewLifecycle,
    navigator: Option<NavigatorHandle>,
}

impl ViewBase {
    pub fn new(name: &str, region: DisplayRegion) -> Self {
        Self {
            name: name.to_owned(),
            region,
            lifecycle: ViewLifecycle::Created,
            navigator: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn region(&self) -> &DisplayRegion {
        &self.region
    }

    pub fn lifecycle(&self) -> ViewLifecycle {
        self.lifecycle
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle == ViewLifecycle::Active
    }

    pub fn is_destroyed(&self) -> bool {
        self.lifecycle == ViewLifecycle::Destroyed
    }

    pub fn navigator(&self) -> Option<&NavigatorHandle> {
        self.navigator.as_ref()
    }

    /// Ask the navigator to switch views. Returns `false` when the view is
    /// not attached or the navigator has gone away.
    pub fn navigate_to(&self, view: &str, data: ViewData) -> bool {
        self.navigator
            .as_ref()
            .is_some_and(|nav| nav.navigate_to(view, data))
    }

    pub fn go_back(&self) -> bool {
        self.navigator.as_ref().is_some_and(NavigatorHandle::go_back)
    }
}

// ── View trait ───────────────────────────────────────────────────────

#[async_trait]
pub trait View: Send + Sync + 'static {
    fn base(&self) -> &ViewBase;
    fn base_mut(&mut self) -> &mut ViewBase;

    /// Runs on every enter, after the view is shown.
    async fn initialize(&mut self, data: ViewData);

    /// Runs on every leave, after the view is hidden, and on destroy.
    async fn cleanup(&mut self);

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn name(&self) -> &str {
        self.base().name()
    }

    fn show(&mut self) {
        self.base().region().show();
    }

    fn hide(&mut self) {
        self.base().region().hide();
    }

    /// Bind the view to its navigator.
    fn attach(&mut self, navigator: NavigatorHandle) {
        self.base_mut().navigator = Some(navigator);
    }

    async fn on_enter(&mut self, data: ViewData) {
        if self.base().is_destroyed() {
            return;
        }
        self.show();
        self.base_mut().lifecycle = ViewLifecycle::Active;
        self.initialize(data).await;
    }

    async fn on_leave(&mut self) {
        if self.base().is_destroyed() {
            return;
        }
        self.hide();
        self.base_mut().lifecycle = ViewLifecycle::Inactive;
        self.cleanup().await;
    }

    async fn on_destroy(&mut self) {
        if self.base().is_destroyed() {
            return;
        }
        self.cleanup().await;
        let base = self.base_mut();
        base.lifecycle = ViewLifecycle::Destroyed;
        base.navigator = None;
    }
}
