//! Product detail: one record, its event history and its push room.

use std::sync::{Arc, Mutex};

use anyhow::Context;

use pantry_core::ProductId;
use pantry_products::{ActivityEvent, Product};

use crate::poller::{RefreshWorker, ReloadTrigger};
use crate::scope::PageScope;
use crate::state::AppState;
use crate::wire::{ChangeType, EventKind, Message};

use super::{lock, reload_on_reconnect};

#[derive(Debug, Clone, Default)]
pub struct DetailStore {
    pub product: Option<Product>,
    /// Set once a delete for this product has been pushed.
    pub removed: bool,
    pub events: Vec<ActivityEvent>,
}

pub struct ProductDetailPage {
    id: ProductId,
    store: Arc<Mutex<DetailStore>>,
    reload_product: ReloadTrigger,
    reload_events: ReloadTrigger,
    scope: PageScope,
}

impl core::fmt::Debug for ProductDetailPage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProductDetailPage")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .finish()
    }
}

async fn load_product(state: &AppState, store: &Mutex<DetailStore>, id: &ProductId) -> anyhow::Result<()> {
    if lock(store).removed {
        return Ok(());
    }
    let product = state
        .api
        .get_product(id)
        .await
        .inspect_err(|err| {
            state.notifications.error(format!("Failed to load product: {err}"));
        })
        .with_context(|| format!("loading product {id}"))?;
    let mut store = lock(store);
    if !store.removed {
        store.product = Some(product);
    }
    Ok(())
}

async fn load_events(state: &AppState, store: &Mutex<DetailStore>, id: &ProductId) -> anyhow::Result<()> {
    let events = state
        .api
        .product_events(id)
        .await
        .with_context(|| format!("loading events of {id}"))?;
    lock(store).events = events;
    Ok(())
}

impl ProductDetailPage {
    pub async fn mount(state: &AppState, id: ProductId) -> Self {
        let store = Arc::new(Mutex::new(DetailStore::default()));
        let reload_product = ReloadTrigger::new();
        let reload_events = ReloadTrigger::new();
        let mut scope = PageScope::new("product-detail");

        {
            let store = store.clone();
            let reload = reload_product.clone();
            let notifications = state.notifications.clone();
            let id = id.clone();
            scope.hold(state.bus().subscribe(EventKind::ProductDetailUpdate, move |message| {
                let Message::ProductDetailUpdate(change) = message else {
                    return Ok(());
                };
                if change.product_id().is_some_and(|other| other != &id) {
                    return Ok(());
                }
                if change.change == ChangeType::Delete {
                    lock(&store).removed = true;
                    notifications.warning("This product has been deleted");
                } else {
                    reload.request();
                }
                Ok(())
            }));
        }
        {
            let store = store.clone();
            let id = id.clone();
            scope.hold(state.bus().subscribe(EventKind::StockUpdate, move |message| {
                let Message::StockUpdate(update) = message else {
                    return Ok(());
                };
                if update.product_id == id {
                    if let Some(product) = lock(&store).product.as_mut() {
                        product.set_stock(update.new_stock);
                    }
                }
                Ok(())
            }));
        }
        {
            let reload = reload_events.clone();
            let id = id.clone();
            scope.hold(state.bus().subscribe(EventKind::ResourceEvent, move |message| {
                let Message::ResourceEvent(notice) = message else {
                    return Ok(());
                };
                if notice.subject_id().is_none_or(|subject| subject == id.as_str()) {
                    reload.request();
                }
                Ok(())
            }));
        }

        reload_on_reconnect(state, &mut scope, &[&reload_product, &reload_events]);

        state.connection.join_product_room(&id);
        {
            let connection = state.connection.clone();
            let id = id.clone();
            scope.on_teardown(move || connection.leave_product_room(&id));
        }

        let (product, events) = tokio::join!(load_product(state, &store, &id), load_events(state, &store, &id));
        for err in [product.err(), events.err()].into_iter().flatten() {
            tracing::warn!(product_id = %id, error = %format!("{err:#}"), "initial detail load failed");
        }

        {
            let state = state.clone();
            let store = store.clone();
            let id = id.clone();
            scope.hold_worker(
                RefreshWorker::every("product-detail", state.config.products_refresh)
                    .with_trigger(reload_product.clone())
                    .start(move || {
                        let state = state.clone();
                        let store = store.clone();
                        let id = id.clone();
                        async move { load_product(&state, &store, &id).await }
                    }),
            );
        }
        {
            let state = state.clone();
            let store = store.clone();
            let id = id.clone();
            scope.hold_worker(
                RefreshWorker::every("product-events", state.config.products_refresh)
                    .with_trigger(reload_events.clone())
                    .start(move || {
                        let state = state.clone();
                        let store = store.clone();
                        let id = id.clone();
                        async move { load_events(&state, &store, &id).await }
                    }),
            );
        }

        Self {
            id,
            store,
            reload_product,
            reload_events,
            scope,
        }
    }

    pub fn id(&self) -> &ProductId {
        &self.id
    }

    pub fn product(&self) -> Option<Product> {
        lock(&self.store).product.clone()
    }

    pub fn is_removed(&self) -> bool {
        lock(&self.store).removed
    }

    /// Event history, newest first.
    pub fn events(&self) -> Vec<ActivityEvent> {
        lock(&self.store).events.clone()
    }

    pub fn request_reload(&self) {
        self.reload_product.request();
        self.reload_events.request();
    }

    /// Leaves the product room and stops following updates.
    pub fn teardown(self) {
        self.scope.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use pantry_events::DispatchBus;
    use serde_json::json;

    use crate::connection::ConnectionManager;
    use crate::notifications::ToastKind;
    use crate::testing::FakeApi;
    use crate::transport::MemoryConnector;
    use crate::wire::{Frame, ProductChange};

    async fn mounted(api: FakeApi) -> (AppState, MemoryConnector, ProductDetailPage) {
        let server = MemoryConnector::new();
        let connection = ConnectionManager::new(Arc::new(server.clone()), DispatchBus::new(), Duration::from_secs(3));
        let state = AppState::new(Arc::new(api), connection, Default::default());
        state.connection.connect().await.unwrap();
        let page = ProductDetailPage::mount(&state, ProductId::new("p1")).await;
        (state, server, page)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn joins_and_leaves_the_room() {
        let api = FakeApi::with_products(vec![Product::new("p1", "Milk", 3.0, 5.0)]);
        let (state, server, page) = mounted(api).await;
        assert_eq!(page.product().map(|p| p.name), Some("Milk".to_string()));
        assert_eq!(state.connection.rooms(), vec!["product-p1"]);

        page.teardown();
        settle().await;
        assert!(state.connection.rooms().is_empty());
        let names: Vec<String> = server.sent().into_iter().map(|f| f.event).collect();
        assert_eq!(names, vec!["join", "leave"]);
    }

    #[tokio::test(start_paused = true)]
    async fn pushed_delete_marks_removed() {
        let api = FakeApi::with_products(vec![Product::new("p1", "Milk", 3.0, 5.0)]);
        let (state, server, page) = mounted(api).await;

        server.push(Frame::new("product-detail-update", json!({ "type": "delete", "id": "p1" })));
        settle().await;

        assert!(page.is_removed());
        let toasts = state.notifications.toasts();
        assert_eq!(toasts[0].kind, ToastKind::Warning);
        page.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn other_changes_reload_the_record() {
        let api = FakeApi::with_products(vec![Product::new("p1", "Milk", 3.0, 5.0)]);
        let (state, _server, page) = mounted(api.clone()).await;
        assert_eq!(api.calls("get_product"), 1);

        api.set_products(vec![Product::new("p1", "Oat Milk", 3.0, 5.0)]);
        state.bus().publish(&Message::ProductDetailUpdate(ProductChange::new(
            ChangeType::Update,
            Product::new("p1", "Oat Milk", 3.0, 5.0),
        )));
        // Changes to other products are ignored.
        state.bus().publish(&Message::ProductDetailUpdate(ProductChange::deleted(ProductId::new("p2"))));
        settle().await;

        assert_eq!(api.calls("get_product"), 2);
        assert_eq!(page.product().map(|p| p.name), Some("Oat Milk".to_string()));
        assert!(!page.is_removed());
        page.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn resource_events_reload_history() {
        let api = FakeApi::with_products(vec![Product::new("p1", "Milk", 3.0, 5.0)]);
        let (_state, server, page) = mounted(api.clone()).await;
        assert!(page.events().is_empty());

        let milk = Product::new("p1", "Milk", 3.0, 5.0);
        record_update(&api, &milk).await;
        server.push(Frame::new("resource-event", json!({ "type": "update", "resourceId": "p1" })));
        settle().await;

        assert_eq!(page.events().len(), 1);
        page.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_reloads_record_and_history() {
        let api = FakeApi::with_products(vec![Product::new("p1", "Milk", 3.0, 5.0)]);
        let (state, server, page) = mounted(api.clone()).await;
        assert_eq!(api.calls("get_product"), 1);

        server.drop_link();
        api.set_products(vec![Product::new("p1", "Oat Milk", 3.0, 5.0)]);
        record_update(&api, &Product::new("p1", "Oat Milk", 3.0, 5.0)).await;
        tokio::time::sleep(Duration::from_secs(4)).await;

        assert!(state.connection.is_connected());
        assert_eq!(api.calls("get_product"), 2);
        assert_eq!(page.product().map(|p| p.name), Some("Oat Milk".to_string()));
        assert_eq!(page.events().len(), 1);
        assert_eq!(state.connection.rooms(), vec!["product-p1"]);
        page.teardown();
    }

    async fn record_update(api: &FakeApi, product: &Product) {
        use crate::api::InventoryApi;
        let event = ActivityEvent::for_product(pantry_products::ActivityAction::Update, product, chrono::Utc::now());
        api.create_event(&event).await.unwrap();
    }
}
