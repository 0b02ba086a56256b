// ── View navigator ──
//
// Registry of named views, the active view, and a back-navigation
// history. Transitions are strictly sequential: the outgoing view's
// `on_leave` (including its async cleanup) completes before the incoming
// view's `on_enter` starts. Views ask for navigation through a
// `NavigatorHandle`; the owner drains those requests one at a time.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::error::CoreError;
use crate::view::{View, ViewData};

/// A navigation request sent by a view.
#[derive(Debug)]
pub enum NavRequest {
    Navigate { view: String, data: ViewData },
    Back,
}

/// Cloneable sender side handed to every registered view.
#[derive(Debug, Clone)]
pub struct NavigatorHandle {
    tx: mpsc::UnboundedSender<NavRequest>,
}

impl NavigatorHandle {
    pub fn navigate_to(&self, view: &str, data: ViewData) -> bool {
        self.tx
            .send(NavRequest::Navigate {
                view: view.to_owned(),
                data,
            })
            .is_ok()
    }

    pub fn go_back(&self) -> bool {
        self.tx.send(NavRequest::Back).is_ok()
    }
}

pub struct ViewNavigator {
    views: HashMap<String, Box<dyn View>>,
    /// Registration order, used for teardown.
    order: Vec<String>,
    current: Option<String>,
    history: Vec<String>,
    requests_tx: mpsc::UnboundedSender<NavRequest>,
    requests_rx: Option<mpsc::UnboundedReceiver<NavRequest>>,
}

impl Default for ViewNavigator {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewNavigator {
    pub fn new() -> Self {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        Self {
            views: HashMap::new(),
            order: Vec::new(),
            current: None,
            history: Vec::new(),
            requests_tx,
            requests_rx: Some(requests_rx),
        }
    }

    pub fn handle(&self) -> NavigatorHandle {
        NavigatorHandle {
            tx: self.requests_tx.clone(),
        }
    }

    /// Take the receiver for view-initiated requests. Only the first
    /// caller gets it; the owning loop feeds each one to [`process`](Self::process).
    pub fn take_requests(&mut self) -> Option<mpsc::UnboundedReceiver<NavRequest>> {
        self.requests_rx.take()
    }

    // ── Registry ─────────────────────────────────────────────────────

    /// Add a view and attach it to this navigator.
    pub fn register_view(&mut self, mut view: Box<dyn View>) -> Result<(), CoreError> {
        let name = view.name().to_owned();
        if self.views.contains_key(&name) {
            return Err(CoreError::DuplicateViewName { name });
        }
        view.attach(self.handle());
        debug!(view = %name, "view registered");
        self.order.push(name.clone());
        self.views.insert(name, view);
        Ok(())
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Previously active views, oldest first.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn view(&self, name: &str) -> Option<&dyn View> {
        self.views.get(name).map(|view| &**view)
    }

    /// Borrow a registered view as its concrete type.
    pub fn view_mut<T: View>(&mut self, name: &str) -> Option<&mut T> {
        self.views
            .get_mut(name)
            .and_then(|view| view.as_any_mut().downcast_mut::<T>())
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Leave the current view (if any), record it in history, and enter
    /// `name` with `data`.
    pub async fn navigate_to(&mut self, name: &str, data: ViewData) -> Result<(), CoreError> {
        if !self.views.contains_key(name) {
            error!(view = %name, "navigation to unknown view");
            return Err(CoreError::ViewNotFound {
                name: name.to_owned(),
            });
        }

        if let Some(previous) = self.current.take() {
            if let Some(view) = self.views.get_mut(&previous) {
                view.on_leave().await;
            }
            self.history.push(previous);
        }

        info!(view = %name, "entering view");
        self.current = Some(name.to_owned());
        if let Some(view) = self.views.get_mut(name) {
            view.on_enter(data).await;
        }
        Ok(())
    }

    /// Return to the most recent view in history. No-op when empty.
    pub async fn go_back(&mut self) -> Result<(), CoreError> {
        let Some(previous) = self.history.pop() else {
            debug!("navigation history empty; back ignored");
            return Ok(());
        };
        self.navigate_to(&previous, ViewData::Empty).await
    }

    /// Apply one view-initiated request.
    pub async fn process(&mut self, request: NavRequest) -> Result<(), CoreError> {
        match request {
            NavRequest::Navigate { view, data } => self.navigate_to(&view, data).await,
            NavRequest::Back => self.go_back().await,
        }
    }

    /// Destroy every view and forget all navigation state.
    pub async fn cleanup(&mut self) {
        for name in std::mem::take(&mut self.order) {
            if let Some(view) = self.views.get_mut(&name) {
                view.on_destroy().await;
            }
        }
        self.views.clear();
        self.current = None;
        self.history.clear();
        debug!("navigator cleaned up");
    }
}
