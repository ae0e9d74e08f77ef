//! Badge, slide-over panel and toast state shared by every page.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use pantry_products::LowStockAlert;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PanelState {
    #[default]
    Hidden,
    Visible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelEvent {
    ToggleClicked,
    ClickedOutside,
    CloseClicked,
}

impl PanelState {
    pub fn next(self, event: PanelEvent) -> PanelState {
        match (self, event) {
            (PanelState::Hidden, PanelEvent::ToggleClicked) => PanelState::Visible,
            (PanelState::Visible, _) => PanelState::Hidden,
            (PanelState::Hidden, _) => PanelState::Hidden,
        }
    }
}

/// Unread badge plus the alert list the panel shows.
///
/// The badge grows by the net growth of the alert set and only opening the
/// panel clears it.
#[derive(Debug, Clone, Default)]
pub struct NotificationCenter {
    unread: usize,
    alerts: Vec<LowStockAlert>,
    panel: PanelState,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the alert list; returns how much the badge grew.
    pub fn observe_alerts(&mut self, alerts: Vec<LowStockAlert>) -> usize {
        let added = alerts.len().saturating_sub(self.alerts.len());
        self.alerts = alerts;
        self.unread += added;
        added
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }

    pub fn alerts(&self) -> &[LowStockAlert] {
        &self.alerts
    }

    pub fn panel(&self) -> PanelState {
        self.panel
    }

    pub fn handle(&mut self, event: PanelEvent) -> PanelState {
        let next = self.panel.next(event);
        if self.panel == PanelState::Hidden && next == PanelState::Visible {
            self.unread = 0;
        }
        self.panel = next;
        next
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Error,
    Warning,
    Info,
}

impl ToastKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToastKind::Success => "success",
            ToastKind::Error => "error",
            ToastKind::Warning => "warning",
            ToastKind::Info => "info",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub id: u64,
    pub kind: ToastKind,
    pub message: String,
    pub expires_at: Instant,
}

/// Transient messages, newest last.
#[derive(Debug, Clone)]
pub struct ToastStack {
    toasts: Vec<Toast>,
    next_id: u64,
    ttl: Duration,
}

impl Default for ToastStack {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}

impl ToastStack {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

    pub fn new(ttl: Duration) -> Self {
        Self {
            toasts: Vec::new(),
            next_id: 1,
            ttl,
        }
    }

    pub fn push(&mut self, kind: ToastKind, message: impl Into<String>, now: Instant) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.toasts.push(Toast {
            id,
            kind,
            message: message.into(),
            expires_at: now + self.ttl,
        });
        id
    }

    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.toasts.len();
        self.toasts.retain(|t| t.id != id);
        self.toasts.len() != before
    }

    /// Drop toasts whose time is up; returns how many went.
    pub fn expire(&mut self, now: Instant) -> usize {
        let before = self.toasts.len();
        self.toasts.retain(|t| t.expires_at > now);
        before - self.toasts.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Toast> {
        self.toasts.iter()
    }

    pub fn len(&self) -> usize {
        self.toasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.toasts.is_empty()
    }
}

#[derive(Debug, Default)]
struct Shared {
    center: NotificationCenter,
    toasts: ToastStack,
}

/// Handle shared by every page. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Notifications {
    shared: Arc<Mutex<Shared>>,
}

impl Notifications {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn observe_alerts(&self, alerts: Vec<LowStockAlert>) -> usize {
        let added = self.lock().center.observe_alerts(alerts);
        if added > 0 {
            tracing::info!(added, "new low-stock alerts");
        }
        added
    }

    pub fn unread_count(&self) -> usize {
        self.lock().center.unread_count()
    }

    pub fn alerts(&self) -> Vec<LowStockAlert> {
        self.lock().center.alerts().to_vec()
    }

    pub fn panel(&self) -> PanelState {
        self.lock().center.panel()
    }

    pub fn panel_event(&self, event: PanelEvent) -> PanelState {
        self.lock().center.handle(event)
    }

    pub fn toast(&self, kind: ToastKind, message: impl Into<String>) -> u64 {
        let message = message.into();
        tracing::info!(kind = kind.as_str(), message = %message, "toast");
        self.lock().toasts.push(kind, message, Instant::now())
    }

    pub fn success(&self, message: impl Into<String>) -> u64 {
        self.toast(ToastKind::Success, message)
    }

    pub fn error(&self, message: impl Into<String>) -> u64 {
        self.toast(ToastKind::Error, message)
    }

    pub fn warning(&self, message: impl Into<String>) -> u64 {
        self.toast(ToastKind::Warning, message)
    }

    pub fn info(&self, message: impl Into<String>) -> u64 {
        self.toast(ToastKind::Info, message)
    }

    pub fn dismiss(&self, id: u64) -> bool {
        self.lock().toasts.dismiss(id)
    }

    /// Toasts still showing; expired ones are dropped on the way.
    pub fn toasts(&self) -> Vec<Toast> {
        let mut shared = self.lock();
        shared.toasts.expire(Instant::now());
        shared.toasts.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pantry_products::Product;

    fn alerts(n: usize) -> Vec<LowStockAlert> {
        (0..n)
            .map(|i| LowStockAlert::from_product(&Product::new(format!("p{i}"), "Milk", 1.0, 5.0)))
            .collect()
    }

    #[test]
    fn unread_grows_by_net_delta() {
        let mut center = NotificationCenter::new();
        assert_eq!(center.observe_alerts(alerts(2)), 2);
        assert_eq!(center.observe_alerts(alerts(5)), 3);
        assert_eq!(center.unread_count(), 5);

        // Shrinking never decrements.
        assert_eq!(center.observe_alerts(alerts(1)), 0);
        assert_eq!(center.unread_count(), 5);
        assert_eq!(center.alerts().len(), 1);
    }

    #[test]
    fn opening_the_panel_clears_unread() {
        let mut center = NotificationCenter::new();
        center.observe_alerts(alerts(3));

        assert_eq!(center.handle(PanelEvent::ToggleClicked), PanelState::Visible);
        assert_eq!(center.unread_count(), 0);

        assert_eq!(center.handle(PanelEvent::CloseClicked), PanelState::Hidden);
        center.observe_alerts(alerts(4));
        assert_eq!(center.unread_count(), 1);
    }

    #[test]
    fn panel_transitions() {
        use PanelEvent::*;
        use PanelState::*;

        assert_eq!(PanelState::default(), Hidden);
        assert_eq!(Hidden.next(ToggleClicked), Visible);
        assert_eq!(Visible.next(ToggleClicked), Hidden);
        assert_eq!(Visible.next(ClickedOutside), Hidden);
        assert_eq!(Visible.next(CloseClicked), Hidden);
        assert_eq!(Hidden.next(ClickedOutside), Hidden);
        assert_eq!(Hidden.next(CloseClicked), Hidden);
    }

    #[test]
    fn toasts_expire_and_dismiss() {
        let start = Instant::now();
        let mut stack = ToastStack::default();
        let first = stack.push(ToastKind::Success, "Product saved", start);
        let second = stack.push(ToastKind::Error, "Failed to load", start + Duration::from_secs(2));

        assert!(stack.dismiss(first));
        assert!(!stack.dismiss(first));

        assert_eq!(stack.expire(start + Duration::from_secs(6)), 0);
        assert_eq!(stack.expire(start + Duration::from_secs(7)), 1);
        assert!(stack.is_empty());
        assert_ne!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn shared_toasts_auto_dismiss() {
        let notifications = Notifications::new();
        notifications.warning("Product was deleted");
        assert_eq!(notifications.toasts().len(), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(notifications.toasts().is_empty());
    }
}
