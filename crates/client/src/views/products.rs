//! Products grid: the cached list, its filters and stats.

use std::sync::{Arc, Mutex};

use anyhow::Context;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use pantry_core::ProductId;
use pantry_products::{InventoryStats, Product, ProductStatus};

use crate::cache::Applied;
use crate::poller::{RefreshWorker, ReloadTrigger};
use crate::scope::PageScope;
use crate::state::AppState;
use crate::wire::{EventKind, Message};

use super::{ProductCollection, lock, reload_on_reconnect};

/// Grid filters, applied on read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    pub query: String,
    pub category: Option<String>,
    pub status: Option<ProductStatus>,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        product.matches_query(&self.query)
            && self
                .category
                .as_deref()
                .is_none_or(|c| product.category.eq_ignore_ascii_case(c))
            && self.status.is_none_or(|s| product.status == s)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProductsStore {
    pub(crate) products: ProductCollection,
    filter: ProductFilter,
}

impl ProductsStore {
    pub fn collection(&self) -> &ProductCollection {
        &self.products
    }

    pub fn filter(&self) -> &ProductFilter {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: ProductFilter) {
        self.filter = filter;
    }

    /// Products passing the current filter, in cache order.
    pub fn visible(&self) -> Vec<Product> {
        self.products
            .products()
            .iter()
            .filter(|p| self.filter.matches(p))
            .cloned()
            .collect()
    }

    /// Distinct non-blank categories, sorted.
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self
            .products
            .products()
            .iter()
            .map(|p| p.category.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        categories.sort();
        categories.dedup();
        categories
    }
}

/// Subscribe `project(store)` to product and stock pushes; misses request a
/// reload.
pub(crate) fn follow_products<S: Send + 'static>(
    state: &AppState,
    scope: &mut PageScope,
    store: &Arc<Mutex<S>>,
    reload: &ReloadTrigger,
    project: fn(&mut S) -> &mut ProductCollection,
) {
    let page = scope.name();
    {
        let store = store.clone();
        let reload = reload.clone();
        scope.hold(state.bus().subscribe(EventKind::ProductUpdate, move |message| {
            let Message::ProductUpdate(change) = message else {
                return Ok(());
            };
            let applied = project(&mut lock(&store)).apply_change(change);
            tracing::debug!(page, change = ?change.change, id = ?change.product_id(), ?applied, "product change");
            if applied == Applied::Miss {
                reload.request();
            }
            Ok(())
        }));
    }
    {
        let store = store.clone();
        let reload = reload.clone();
        scope.hold(state.bus().subscribe(EventKind::StockUpdate, move |message| {
            let Message::StockUpdate(update) = message else {
                return Ok(());
            };
            if project(&mut lock(&store)).apply_stock(update) == Applied::Miss {
                reload.request();
            }
            Ok(())
        }));
    }
}

/// Full reload of `project(store)` from `GET /products`.
pub(crate) fn product_loader<S: Send + 'static>(
    state: &AppState,
    store: &Arc<Mutex<S>>,
    project: fn(&mut S) -> &mut ProductCollection,
) -> impl Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static {
    let api = state.api.clone();
    let notifications = state.notifications.clone();
    let store = store.clone();
    move || {
        let api = api.clone();
        let notifications = notifications.clone();
        let store = store.clone();
        async move {
            let ticket = project(&mut lock(&store)).begin_load();
            let products = api
                .list_products()
                .await
                .inspect_err(|err| {
                    notifications.error(format!("Failed to load products: {err}"));
                })
                .context("loading products")?;
            let count = products.len();
            if project(&mut lock(&store)).finish_load(ticket, products) {
                tracing::debug!(count, "products reloaded");
            }
            Ok(())
        }
        .boxed()
    }
}

fn grid_products(store: &mut ProductsStore) -> &mut ProductCollection {
    &mut store.products
}

/// The products page.
pub struct ProductsPage {
    store: Arc<Mutex<ProductsStore>>,
    reload: ReloadTrigger,
    scope: PageScope,
}

impl core::fmt::Debug for ProductsPage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProductsPage").field("scope", &self.scope).finish()
    }
}

impl ProductsPage {
    pub async fn mount(state: &AppState) -> Self {
        let store = Arc::new(Mutex::new(ProductsStore::default()));
        let reload = ReloadTrigger::new();
        let mut scope = PageScope::new("products");

        follow_products(state, &mut scope, &store, &reload, grid_products);
        reload_on_reconnect(state, &mut scope, &[&reload]);
        state.connection.sync_streams();

        let load = product_loader(state, &store, grid_products);
        if let Err(err) = load().await {
            tracing::warn!(error = %format!("{err:#}"), "initial products load failed");
        }
        scope.hold_worker(
            RefreshWorker::every("products", state.config.products_refresh)
                .with_trigger(reload.clone())
                .start(load),
        );

        Self { store, reload, scope }
    }

    pub fn visible(&self) -> Vec<Product> {
        lock(&self.store).visible()
    }

    pub fn products(&self) -> Vec<Product> {
        lock(&self.store).products.products().to_vec()
    }

    pub fn get(&self, id: &ProductId) -> Option<Product> {
        lock(&self.store).products.get(id).cloned()
    }

    pub fn stats(&self) -> InventoryStats {
        lock(&self.store).products.stats().clone()
    }

    pub fn categories(&self) -> Vec<String> {
        lock(&self.store).categories()
    }

    pub fn filter(&self) -> ProductFilter {
        lock(&self.store).filter().clone()
    }

    pub fn set_filter(&self, filter: ProductFilter) {
        lock(&self.store).set_filter(filter);
    }

    pub fn request_reload(&self) {
        self.reload.request();
    }

    pub fn teardown(self) {
        self.scope.teardown();
    }
}
