//! In-memory [`InventoryApi`] for tests and offline demos.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use pantry_core::ProductId;
use pantry_products::{ActivityEvent, LowStockAlert, NewProduct, Product, collect_alerts};

use crate::api::{ApiError, DashboardSummary, InventoryApi, ProductStats, SalesTrends};

#[derive(Debug, Default)]
struct Backend {
    products: Vec<Product>,
    events: Vec<ActivityEvent>,
    trends: SalesTrends,
    failing: HashSet<&'static str>,
    calls: BTreeMap<&'static str, usize>,
    next_id: u64,
}

/// Backend double holding products and events in memory.
///
/// Individual operations can be made to fail with [`FakeApi::fail`]; every
/// call is counted by operation name.
#[derive(Debug, Clone, Default)]
pub struct FakeApi {
    backend: Arc<Mutex<Backend>>,
}

impl FakeApi {
    pub fn with_products(products: Vec<Product>) -> Self {
        let api = Self::default();
        api.set_products(products);
        api
    }

    fn lock(&self) -> MutexGuard<'_, Backend> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_products(&self, products: Vec<Product>) {
        self.lock().products = products;
    }

    pub fn products(&self) -> Vec<Product> {
        self.lock().products.clone()
    }

    pub fn events(&self) -> Vec<ActivityEvent> {
        self.lock().events.clone()
    }

    pub fn set_trends(&self, trends: SalesTrends) {
        self.lock().trends = trends;
    }

    pub fn fail(&self, operation: &'static str) {
        self.lock().failing.insert(operation);
    }

    pub fn recover(&self, operation: &'static str) {
        self.lock().failing.remove(operation);
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.lock().calls.get(operation).copied().unwrap_or(0)
    }

    fn enter(&self, operation: &'static str) -> Result<MutexGuard<'_, Backend>, ApiError> {
        let mut backend = self.lock();
        *backend.calls.entry(operation).or_default() += 1;
        if backend.failing.contains(operation) {
            return Err(ApiError::Network(format!("{operation} unavailable")));
        }
        Ok(backend)
    }
}

fn not_found() -> ApiError {
    ApiError::Status {
        status: 404,
        message: "Product not found".to_string(),
    }
}

fn build(id: ProductId, body: &NewProduct) -> Product {
    let mut product = Product::new(id, body.name.clone(), body.current_stock, body.min_stock_level);
    product.category = body.category.clone();
    product.sku = body.sku.clone();
    product.unit = body.unit.clone();
    product.cost_price = body.cost_price;
    product.selling_price = body.selling_price;
    product.status = body.status;
    product.description = body.description.clone();
    product.created_at = body.created_at;
    product
}

#[async_trait]
impl InventoryApi for FakeApi {
    async fn list_products(&self) -> Result<Vec<Product>, ApiError> {
        Ok(self.enter("list_products")?.products.clone())
    }

    async fn get_product(&self, id: &ProductId) -> Result<Product, ApiError> {
        let backend = self.enter("get_product")?;
        backend
            .products
            .iter()
            .find(|p| &p.id == id)
            .cloned()
            .ok_or_else(not_found)
    }

    async fn create_product(&self, product: &NewProduct) -> Result<Product, ApiError> {
        let mut backend = self.enter("create_product")?;
        backend.next_id += 1;
        let created = build(ProductId::new(format!("fake-{}", backend.next_id)), product);
        backend.products.push(created.clone());
        Ok(created)
    }

    async fn update_product(&self, id: &ProductId, product: &NewProduct) -> Result<Product, ApiError> {
        let mut backend = self.enter("update_product")?;
        let slot = backend
            .products
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(not_found)?;
        *slot = build(id.clone(), product);
        Ok(slot.clone())
    }

    async fn delete_product(&self, id: &ProductId) -> Result<(), ApiError> {
        let mut backend = self.enter("delete_product")?;
        let before = backend.products.len();
        backend.products.retain(|p| &p.id != id);
        if backend.products.len() == before {
            return Err(not_found());
        }
        Ok(())
    }

    async fn low_stock_products(&self) -> Result<Vec<Product>, ApiError> {
        let backend = self.enter("low_stock_products")?;
        Ok(backend.products.iter().filter(|p| p.is_low_stock()).cloned().collect())
    }

    async fn product_stats(&self) -> Result<ProductStats, ApiError> {
        let backend = self.enter("product_stats")?;
        let categories: HashSet<&str> = backend.products.iter().map(|p| p.category.as_str()).collect();
        Ok(ProductStats {
            total_products: backend.products.len() as u64,
            total_categories: categories.len() as u64,
            total_stock_value: backend.products.iter().map(Product::retail_value).sum(),
            low_stock_count: backend.products.iter().filter(|p| p.is_low_stock()).count() as u64,
        })
    }

    async fn update_stock(&self, id: &ProductId, quantity: f64) -> Result<Product, ApiError> {
        let mut backend = self.enter("update_stock")?;
        let slot = backend
            .products
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(not_found)?;
        slot.set_stock(quantity);
        Ok(slot.clone())
    }

    async fn product_events(&self, id: &ProductId) -> Result<Vec<ActivityEvent>, ApiError> {
        let backend = self.enter("product_events")?;
        Ok(backend.events.iter().rev().filter(|e| e.is_about(id)).cloned().collect())
    }

    async fn dashboard_summary(&self) -> Result<DashboardSummary, ApiError> {
        let backend = self.enter("dashboard_summary")?;
        let categories: HashSet<&str> = backend.products.iter().map(|p| p.category.as_str()).collect();
        Ok(DashboardSummary {
            total_products: backend.products.len() as u64,
            total_categories: categories.len() as u64,
            total_stock_value: backend.products.iter().map(Product::retail_value).sum(),
            low_stock_items: backend.products.iter().filter(|p| p.is_low_stock()).count() as u64,
        })
    }

    async fn recent_activity(&self) -> Result<Vec<ActivityEvent>, ApiError> {
        let backend = self.enter("recent_activity")?;
        Ok(backend.events.iter().rev().cloned().collect())
    }

    async fn dashboard_alerts(&self) -> Result<Vec<LowStockAlert>, ApiError> {
        let backend = self.enter("dashboard_alerts")?;
        Ok(collect_alerts(&backend.products))
    }

    async fn sales_trends(&self) -> Result<SalesTrends, ApiError> {
        Ok(self.enter("sales_trends")?.trends.clone())
    }

    async fn list_events(&self) -> Result<Vec<ActivityEvent>, ApiError> {
        Ok(self.enter("list_events")?.events.clone())
    }

    async fn create_event(&self, event: &ActivityEvent) -> Result<(), ApiError> {
        self.enter("create_event")?.events.push(event.clone());
        Ok(())
    }
}
