//! Low-stock alert list and its badge feed.

use std::sync::{Arc, Mutex};

use anyhow::Context;

use pantry_products::{LowStockAlert, Severity};

use crate::cache::{Applied, LoadTicket, ViewCache};
use crate::poller::{RefreshWorker, ReloadTrigger};
use crate::scope::PageScope;
use crate::state::AppState;
use crate::wire::{ChangeType, EventKind, Message, ProductChange, StockUpdate};

use super::{lock, reload_on_reconnect};

#[derive(Debug, Clone, Default)]
pub struct AlertsStore {
    cache: ViewCache<LowStockAlert>,
}

impl AlertsStore {
    pub fn begin_load(&mut self) -> LoadTicket {
        self.cache.begin_load()
    }

    pub fn finish_load(&mut self, ticket: LoadTicket, alerts: Vec<LowStockAlert>) -> bool {
        self.cache.finish_load(ticket, alerts)
    }

    /// A product entering low stock gains an alert; one leaving it, or
    /// deleted, loses it.
    pub fn apply_change(&mut self, change: &ProductChange) -> Applied {
        match (change.change, change.record()) {
            (ChangeType::Delete, _) => match change.product_id() {
                Some(id) => self.cache.remove(id),
                None => Applied::Unchanged,
            },
            (_, Some(product)) if product.is_low_stock() => {
                self.cache.upsert(LowStockAlert::from_product(&product))
            }
            (_, Some(product)) => self.cache.remove(&product.id),
            (_, None) => Applied::Miss,
        }
    }

    /// Patch a held alert. Products without an alert are not tracked here,
    /// so a miss is not an error; `low-stock-update` covers new entries.
    pub fn apply_stock(&mut self, update: &StockUpdate) -> Applied {
        let applied = self
            .cache
            .patch(&update.product_id, |alert| alert.set_stock(update.new_stock));
        match self.cache.get(&update.product_id) {
            Some(alert) if !alert.is_active() => self.cache.remove(&update.product_id),
            _ => applied,
        }
    }

    pub fn alerts(&self) -> &[LowStockAlert] {
        self.cache.items()
    }

    /// Most severe first; ties keep cache order.
    pub fn by_severity(&self) -> Vec<LowStockAlert> {
        let mut alerts = self.cache.items().to_vec();
        alerts.sort_by(|a, b| b.severity.cmp(&a.severity));
        alerts
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.cache.items().iter().filter(|a| a.severity == severity).count()
    }
}

pub struct AlertsPage {
    store: Arc<Mutex<AlertsStore>>,
    reload: ReloadTrigger,
    scope: PageScope,
}

impl core::fmt::Debug for AlertsPage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AlertsPage").field("scope", &self.scope).finish()
    }
}

impl AlertsPage {
    pub async fn mount(state: &AppState) -> Self {
        let store = Arc::new(Mutex::new(AlertsStore::default()));
        let reload = ReloadTrigger::new();
        let mut scope = PageScope::new("alerts");

        {
            let store = store.clone();
            let reload = reload.clone();
            let notifications = state.notifications.clone();
            scope.hold(state.bus().subscribe(EventKind::ProductUpdate, move |message| {
                let Message::ProductUpdate(change) = message else {
                    return Ok(());
                };
                let (applied, alerts) = {
                    let mut store = lock(&store);
                    let applied = store.apply_change(change);
                    (applied, store.alerts().to_vec())
                };
                match applied {
                    Applied::Miss => reload.request(),
                    applied if applied.changed() => {
                        notifications.observe_alerts(alerts);
                    }
                    _ => {}
                }
                Ok(())
            }));
        }
        {
            let store = store.clone();
            let notifications = state.notifications.clone();
            scope.hold(state.bus().subscribe(EventKind::StockUpdate, move |message| {
                let Message::StockUpdate(update) = message else {
                    return Ok(());
                };
                let (applied, alerts) = {
                    let mut store = lock(&store);
                    let applied = store.apply_stock(update);
                    (applied, store.alerts().to_vec())
                };
                if applied.changed() {
                    notifications.observe_alerts(alerts);
                }
                Ok(())
            }));
        }
        {
            let reload = reload.clone();
            scope.hold(state.bus().subscribe(EventKind::LowStockUpdate, move |message| {
                if let Message::LowStockUpdate(update) = message {
                    tracing::debug!(product_id = %update.product_id, "low stock reported");
                }
                reload.request();
                Ok(())
            }));
        }
        reload_on_reconnect(state, &mut scope, &[&reload]);
        state.connection.sync_streams();

        let load = {
            let api = state.api.clone();
            let notifications = state.notifications.clone();
            let store = store.clone();
            move || {
                let api = api.clone();
                let notifications = notifications.clone();
                let store = store.clone();
                async move {
                    let ticket = lock(&store).begin_load();
                    let fetched = api
                        .dashboard_alerts()
                        .await
                        .inspect_err(|err| {
                            notifications.error(format!("Failed to load alerts: {err}"));
                        })
                        .context("loading alerts")?;
                    let alerts = {
                        let mut store = lock(&store);
                        store.finish_load(ticket, fetched).then(|| store.alerts().to_vec())
                    };
                    if let Some(alerts) = alerts {
                        notifications.observe_alerts(alerts);
                    }
                    Ok::<(), anyhow::Error>(())
                }
            }
        };
        if let Err(err) = load().await {
            tracing::warn!(error = %format!("{err:#}"), "initial alerts load failed");
        }
        scope.hold_worker(
            RefreshWorker::every("alerts", state.config.alerts_refresh)
                .with_offset(state.config.alerts_refresh_offset)
                .with_trigger(reload.clone())
                .start(load),
        );

        Self { store, reload, scope }
    }

    pub fn alerts(&self) -> Vec<LowStockAlert> {
        lock(&self.store).alerts().to_vec()
    }

    pub fn by_severity(&self) -> Vec<LowStockAlert> {
        lock(&self.store).by_severity()
    }

    pub fn count(&self, severity: Severity) -> usize {
        lock(&self.store).count(severity)
    }

    pub fn request_reload(&self) {
        self.reload.request();
    }

    pub fn teardown(self) {
        self.scope.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pantry_core::ProductId;
    use pantry_products::Product;

    fn store(products: &[Product]) -> AlertsStore {
        let mut store = AlertsStore::default();
        let ticket = store.begin_load();
        store.finish_load(ticket, pantry_products::collect_alerts(products));
        store
    }

    fn ids(store: &AlertsStore) -> Vec<&str> {
        store.alerts().iter().map(|a| a.product_id.as_str()).collect()
    }

    #[test]
    fn product_changes_move_alerts_in_and_out() {
        let mut store = store(&[Product::new("a", "Milk", 1.0, 5.0)]);

        let low = Product::new("b", "Eggs", 2.0, 10.0);
        assert_eq!(store.apply_change(&ProductChange::new(ChangeType::Create, low)), Applied::Inserted);
        assert_eq!(ids(&store), vec!["a", "b"]);

        let restocked = Product::new("a", "Milk", 50.0, 5.0);
        assert_eq!(
            store.apply_change(&ProductChange::new(ChangeType::Update, restocked)),
            Applied::Removed
        );
        assert_eq!(ids(&store), vec!["b"]);

        // A healthy product never had an alert.
        let healthy = Product::new("c", "Flour", 30.0, 5.0);
        assert_eq!(
            store.apply_change(&ProductChange::new(ChangeType::Update, healthy)),
            Applied::Unchanged
        );
    }

    #[test]
    fn stock_updates_patch_and_clear() {
        let mut store = store(&[Product::new("a", "Milk", 1.0, 10.0)]);
        assert_eq!(store.count(Severity::Alert), 1);

        let update = |stock| StockUpdate {
            product_id: ProductId::new("a"),
            new_stock: stock,
        };
        assert_eq!(store.apply_stock(&update(0.0)), Applied::Replaced);
        assert_eq!(store.count(Severity::Critical), 1);

        assert_eq!(store.apply_stock(&update(12.0)), Applied::Removed);
        assert!(store.alerts().is_empty());

        assert_eq!(store.apply_stock(&update(1.0)), Applied::Miss);
    }

    #[test]
    fn severity_order_puts_critical_first() {
        let store = store(&[
            Product::new("w", "Oats", 8.0, 10.0),
            Product::new("c", "Milk", 0.0, 10.0),
            Product::new("a", "Eggs", 4.0, 10.0),
        ]);
        let order: Vec<Severity> = store.by_severity().iter().map(|a| a.severity).collect();
        assert_eq!(order, vec![Severity::Critical, Severity::Alert, Severity::Warning]);
    }
}
