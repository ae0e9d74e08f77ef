//! Server-side inventory snapshot, checked against what the pages derived.
//!
//! Pages compute their aggregates from pushed changes; the backend computes
//! its own. Comparing the two shows whether push delivery has drifted.

use chrono::{DateTime, Utc};

use pantry_products::format::{format_currency, format_time_ago, status_label};
use pantry_products::{ActivityEvent, InventoryStats, Product};

use crate::api::{ApiError, InventoryApi, ProductStats};

/// One counter on which the server and a page disagree.
#[derive(Debug, Clone, PartialEq)]
pub enum Drift {
    ProductCount { server: u64, local: usize },
    LowStockCount { server: u64, local: usize },
    StockValue { server: f64, local: f64 },
}

impl core::fmt::Display for Drift {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Drift::ProductCount { server, local } => write!(f, "products: server {server}, local {local}"),
            Drift::LowStockCount { server, local } => write!(f, "low stock: server {server}, local {local}"),
            Drift::StockValue { server, local } => write!(
                f,
                "stock value: server {}, local {}",
                format_currency(*server),
                format_currency(*local)
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerSnapshot {
    pub stats: ProductStats,
    pub low_stock: Vec<Product>,
    pub events: Vec<ActivityEvent>,
}

impl ServerSnapshot {
    /// `GET /products/stats`, `GET /products/low-stock` and `GET /events`,
    /// fetched together.
    pub async fn fetch(api: &dyn InventoryApi) -> Result<Self, ApiError> {
        let (stats, low_stock, events) = tokio::join!(api.product_stats(), api.low_stock_products(), api.list_events());
        Ok(Self {
            stats: stats?,
            low_stock: low_stock?,
            events: events?,
        })
    }

    pub fn summary(&self) -> String {
        format!(
            "{} products in {} categories, stock value {}, {} low on stock",
            self.stats.total_products,
            self.stats.total_categories,
            format_currency(self.stats.total_stock_value),
            self.stats.low_stock_count
        )
    }

    /// Counters where `local` disagrees with the server.
    pub fn drift(&self, local: &InventoryStats) -> Vec<Drift> {
        let mut drift = Vec::new();
        if self.stats.total_products != local.total_products as u64 {
            drift.push(Drift::ProductCount {
                server: self.stats.total_products,
                local: local.total_products,
            });
        }
        if self.stats.low_stock_count != local.low_stock_count as u64 {
            drift.push(Drift::LowStockCount {
                server: self.stats.low_stock_count,
                local: local.low_stock_count,
            });
        }
        // Compared at cent precision.
        if (self.stats.total_stock_value - local.total_retail_value).abs() >= 0.005 {
            drift.push(Drift::StockValue {
                server: self.stats.total_stock_value,
                local: local.total_retail_value,
            });
        }
        drift
    }

    /// One line per low-stock product, e.g. `Milk: Low Stock (3 of 5 l)`.
    pub fn low_stock_lines(&self) -> Vec<String> {
        self.low_stock
            .iter()
            .map(|p| {
                let unit = if p.unit.is_empty() { String::new() } else { format!(" {}", p.unit) };
                format!(
                    "{}: {} ({} of {}{unit})",
                    p.name,
                    status_label(p.status.as_str()),
                    p.current_stock,
                    p.min_stock_level
                )
            })
            .collect()
    }

    /// The newest logged activity with its age, e.g.
    /// `Product "Milk" was updated (5 minutes ago)`.
    pub fn latest_activity(&self, now: DateTime<Utc>) -> Option<String> {
        let latest = self
            .events
            .iter()
            .filter(|e| e.timestamp.is_some())
            .max_by_key(|e| e.timestamp)
            .or_else(|| self.events.first())?;
        Some(match latest.timestamp {
            Some(at) => format!("{} ({})", latest.description, format_time_ago(at, now)),
            None => latest.description.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use pantry_products::ActivityAction;

    use crate::testing::FakeApi;

    fn inventory() -> Vec<Product> {
        let mut milk = Product::new("p1", "Milk", 3.0, 5.0);
        milk.unit = "l".into();
        milk.selling_price = 2.0;
        let mut rice = Product::new("p2", "Rice", 40.0, 10.0);
        rice.selling_price = 1.5;
        vec![milk, rice]
    }

    #[tokio::test]
    async fn snapshot_matches_pages_built_from_the_same_data() {
        let api = FakeApi::with_products(inventory());
        let snapshot = ServerSnapshot::fetch(&api).await.unwrap();

        assert_eq!(api.calls("product_stats"), 1);
        assert_eq!(api.calls("low_stock_products"), 1);
        assert_eq!(api.calls("list_events"), 1);
        assert_eq!(snapshot.summary(), "2 products in 1 categories, stock value $66.00, 1 low on stock");
        assert_eq!(snapshot.low_stock_lines(), vec!["Milk: Low Stock (3 of 5 l)"]);

        let local = InventoryStats::compute(&inventory());
        assert!(snapshot.drift(&local).is_empty());
    }

    #[tokio::test]
    async fn missed_pushes_show_up_as_drift() {
        let api = FakeApi::with_products(inventory());
        let snapshot = ServerSnapshot::fetch(&api).await.unwrap();

        // The page never saw Milk.
        let local = InventoryStats::compute(&inventory()[1..]);
        let drift = snapshot.drift(&local);
        assert_eq!(
            drift,
            vec![
                Drift::ProductCount { server: 2, local: 1 },
                Drift::LowStockCount { server: 1, local: 0 },
                Drift::StockValue { server: 66.0, local: 60.0 },
            ]
        );
        assert_eq!(drift[2].to_string(), "stock value: server $66.00, local $60.00");
    }

    #[tokio::test]
    async fn latest_activity_reads_relative_time() {
        let api = FakeApi::with_products(inventory());
        let now = Utc::now();
        let products = inventory();
        for (minutes, action) in [(90, ActivityAction::Create), (5, ActivityAction::Update)] {
            let event = ActivityEvent::for_product(action, &products[0], now - Duration::minutes(minutes));
            api.create_event(&event).await.unwrap();
        }

        let snapshot = ServerSnapshot::fetch(&api).await.unwrap();
        assert_eq!(
            snapshot.latest_activity(now).as_deref(),
            Some("Product \"Milk\" was updated (5 minutes ago)")
        );
    }

    #[tokio::test]
    async fn any_failing_endpoint_fails_the_snapshot() {
        let api = FakeApi::with_products(inventory());
        api.fail("low_stock_products");
        assert!(ServerSnapshot::fetch(&api).await.is_err());
    }
}
