//! Analytics page: aggregates over the full product list.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use pantry_products::{InventoryStats, ProductStatus, ProductValue};

use crate::poller::{RefreshWorker, ReloadTrigger};
use crate::scope::PageScope;
use crate::state::AppState;

use super::products::{follow_products, product_loader};
use super::{ProductCollection, lock, reload_on_reconnect};

fn collection(store: &mut ProductCollection) -> &mut ProductCollection {
    store
}

pub struct AnalyticsPage {
    store: Arc<Mutex<ProductCollection>>,
    scope: PageScope,
}

impl core::fmt::Debug for AnalyticsPage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AnalyticsPage").field("scope", &self.scope).finish()
    }
}

impl AnalyticsPage {
    /// Follows pushes; misses, reconnects and the products period trigger a
    /// full reload.
    pub async fn mount(state: &AppState) -> Self {
        let store = Arc::new(Mutex::new(ProductCollection::default()));
        let reload = ReloadTrigger::new();
        let mut scope = PageScope::new("analytics");

        follow_products(state, &mut scope, &store, &reload, collection);
        reload_on_reconnect(state, &mut scope, &[&reload]);
        state.connection.sync_streams();

        let load = product_loader(state, &store, collection);
        if let Err(err) = load().await {
            tracing::warn!(error = %format!("{err:#}"), "initial analytics load failed");
        }
        scope.hold_worker(
            RefreshWorker::every("analytics", state.config.products_refresh)
                .with_trigger(reload)
                .start(load),
        );

        Self { store, scope }
    }

    pub fn stats(&self) -> InventoryStats {
        lock(&self.store).stats().clone()
    }

    pub fn top_products(&self, n: usize) -> Vec<ProductValue> {
        lock(&self.store).stats().top_products(n).to_vec()
    }

    pub fn status_breakdown(&self) -> BTreeMap<ProductStatus, usize> {
        lock(&self.store).stats().status_counts.clone()
    }

    pub fn category_breakdown(&self) -> BTreeMap<String, usize> {
        lock(&self.store).stats().category_counts.clone()
    }

    pub fn teardown(self) {
        self.scope.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use pantry_events::DispatchBus;
    use pantry_products::Product;

    use crate::connection::ConnectionManager;
    use crate::testing::FakeApi;
    use crate::transport::MemoryConnector;
    use crate::wire::{ChangeType, Message, ProductChange};

    #[tokio::test(start_paused = true)]
    async fn aggregates_track_pushed_changes() {
        let mut cheese = Product::new("p2", "Cheddar", 4.0, 1.0);
        cheese.cost_price = 5.0;
        cheese.category = "Dairy".into();
        let api = FakeApi::with_products(vec![cheese]);
        let connection = ConnectionManager::new(
            Arc::new(MemoryConnector::new()),
            DispatchBus::new(),
            Duration::from_secs(3),
        );
        let state = AppState::new(Arc::new(api), connection, Default::default());

        let page = AnalyticsPage::mount(&state).await;
        assert_eq!(page.stats().total_inventory_value, 20.0);

        let mut rice = Product::new("p9", "Rice", 10.0, 2.0);
        rice.cost_price = 3.0;
        state
            .bus()
            .publish(&Message::ProductUpdate(ProductChange::new(ChangeType::Create, rice)));

        assert_eq!(page.stats().total_inventory_value, 50.0);
        assert_eq!(page.top_products(1)[0].name, "Rice");
        assert_eq!(page.category_breakdown().get("Uncategorized"), Some(&1));
        page.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn changes_missed_while_offline_are_reconciled() {
        let api = FakeApi::with_products(vec![
            Product::new("p1", "Milk", 3.0, 5.0),
            Product::new("p2", "Rice", 8.0, 2.0),
        ]);
        let server = MemoryConnector::new();
        let connection = ConnectionManager::new(Arc::new(server.clone()), DispatchBus::new(), Duration::from_secs(3));
        let state = AppState::new(Arc::new(api.clone()), connection, Default::default());
        state.connection.connect().await.unwrap();

        let page = AnalyticsPage::mount(&state).await;
        assert_eq!(page.stats().total_products, 2);

        // p2 is deleted while the link is down; its push never arrives.
        server.drop_link();
        api.set_products(vec![Product::new("p1", "Milk", 3.0, 5.0)]);
        tokio::time::sleep(Duration::from_secs(4)).await;

        assert!(state.connection.is_connected());
        assert_eq!(api.calls("list_products"), 2);
        assert_eq!(page.stats().total_products, 1);

        // The periodic backstop keeps running as well.
        tokio::time::sleep(Duration::from_secs(27)).await;
        assert_eq!(api.calls("list_products"), 3);
        page.teardown();
    }
}
