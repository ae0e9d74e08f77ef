//! Page stores.
//!
//! Every page follows the same mount sequence: subscribe to the bus, load the
//! initial data, then start its refresh worker. Everything the page registers
//! is owned by its [`PageScope`](crate::scope::PageScope) and released by
//! `teardown()`.

pub mod alerts;
pub mod analytics;
pub mod dashboard;
pub mod detail;
pub mod products;

use std::sync::{Mutex, MutexGuard, PoisonError};

use pantry_products::{InventoryStats, Product};

use crate::cache::{Applied, LoadTicket, ViewCache};
use crate::poller::ReloadTrigger;
use crate::scope::PageScope;
use crate::state::AppState;
use crate::wire::{ChangeType, EventKind, Message, ProductChange, StockUpdate};

pub use alerts::{AlertsPage, AlertsStore};
pub use analytics::AnalyticsPage;
pub use dashboard::{DashboardPage, DashboardStore};
pub use detail::{DetailStore, ProductDetailPage};
pub use products::{ProductFilter, ProductsPage, ProductsStore};

pub(crate) fn lock<S>(store: &Mutex<S>) -> MutexGuard<'_, S> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Request every trigger when the push link comes back up.
///
/// Pushes sent while the link was down are gone; a full reload is the only
/// way to catch up on them.
pub(crate) fn reload_on_reconnect(state: &AppState, scope: &mut PageScope, triggers: &[&ReloadTrigger]) {
    let page = scope.name();
    let triggers: Vec<ReloadTrigger> = triggers.iter().map(|t| (*t).clone()).collect();
    scope.hold(state.bus().subscribe(EventKind::Connection, move |message| {
        if matches!(message, Message::Connection(status) if status.connected) {
            tracing::debug!(page, "link restored; reloading");
            for trigger in &triggers {
                trigger.request();
            }
        }
        Ok(())
    }));
}

/// Cached product list with aggregates kept in step.
#[derive(Debug, Clone, Default)]
pub struct ProductCollection {
    cache: ViewCache<Product>,
    stats: InventoryStats,
}

impl ProductCollection {
    pub fn begin_load(&mut self) -> LoadTicket {
        self.cache.begin_load()
    }

    pub fn finish_load(&mut self, ticket: LoadTicket, products: Vec<Product>) -> bool {
        let applied = self.cache.finish_load(ticket, products);
        if applied {
            self.recompute();
        }
        applied
    }

    /// Apply a `product-update`. A create or update without a usable record
    /// is a miss.
    pub fn apply_change(&mut self, change: &ProductChange) -> Applied {
        let applied = match (change.change, change.record()) {
            (ChangeType::Create, Some(product)) => self.cache.insert(product),
            (ChangeType::Update, Some(product)) => self.cache.update(product),
            (ChangeType::Delete, _) => match change.product_id() {
                Some(id) => self.cache.remove(id),
                None => Applied::Unchanged,
            },
            (_, None) => Applied::Miss,
        };
        if applied.changed() {
            self.recompute();
        }
        applied
    }

    pub fn apply_stock(&mut self, update: &StockUpdate) -> Applied {
        let applied = self
            .cache
            .patch(&update.product_id, |product| product.set_stock(update.new_stock));
        if applied.changed() {
            self.recompute();
        }
        applied
    }

    pub fn products(&self) -> &[Product] {
        self.cache.items()
    }

    pub fn get(&self, id: &pantry_core::ProductId) -> Option<&Product> {
        self.cache.get(id)
    }

    pub fn is_loaded(&self) -> bool {
        self.cache.is_loaded()
    }

    pub fn stats(&self) -> &InventoryStats {
        &self.stats
    }

    fn recompute(&mut self) {
        self.stats = InventoryStats::compute(self.cache.items());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pantry_core::ProductId;
    use pantry_products::ProductStatus;

    fn loaded(products: Vec<Product>) -> ProductCollection {
        let mut collection = ProductCollection::default();
        let ticket = collection.begin_load();
        collection.finish_load(ticket, products);
        collection
    }

    fn priced(id: &str, stock: f64, cost: f64) -> Product {
        let mut product = Product::new(id, id, stock, 2.0);
        product.cost_price = cost;
        product
    }

    #[test]
    fn stats_follow_every_mutation() {
        let mut collection = loaded(vec![priced("a", 10.0, 1.0), priced("b", 5.0, 2.0)]);
        assert_eq!(collection.stats().total_inventory_value, 20.0);

        collection.apply_change(&ProductChange::new(ChangeType::Create, priced("c", 1.0, 4.0)));
        assert_eq!(collection.stats().total_products, 3);
        assert_eq!(collection.stats().total_inventory_value, 24.0);

        collection.apply_stock(&StockUpdate {
            product_id: ProductId::new("a"),
            new_stock: 0.0,
        });
        assert_eq!(collection.stats().total_inventory_value, 14.0);
        assert_eq!(collection.stats().status_count(ProductStatus::OutOfStock), 1);

        collection.apply_change(&ProductChange::deleted(ProductId::new("b")));
        assert_eq!(collection.stats().total_products, 2);
    }

    #[test]
    fn update_without_record_is_a_miss() {
        let mut collection = loaded(vec![priced("a", 10.0, 1.0)]);
        let change = ProductChange {
            change: ChangeType::Update,
            id: Some(ProductId::new("a")),
            data: None,
            timestamp: None,
        };
        assert_eq!(collection.apply_change(&change), Applied::Miss);
    }

    #[test]
    fn delete_of_unknown_id_is_a_no_op() {
        let mut collection = loaded(vec![priced("a", 10.0, 1.0)]);
        let applied = collection.apply_change(&ProductChange::deleted(ProductId::new("zz")));
        assert_eq!(applied, Applied::Unchanged);
        assert_eq!(collection.products().len(), 1);
    }
}
