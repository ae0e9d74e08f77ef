use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use pantry_core::{Entity, ProductId};

use crate::lenient;
use crate::product::Product;

/// Presentation tier of a low-stock alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Alert,
    Critical,
}

impl Severity {
    /// Classify stock against its minimum level.
    ///
    /// Empty stock and a zero (or missing) minimum are both critical; the
    /// ratio is never computed against a zero divisor.
    pub fn classify(current_stock: f64, min_stock_level: f64) -> Severity {
        let stock = finite_or_zero(current_stock);
        let min = finite_or_zero(min_stock_level);
        if stock <= 0.0 || min <= 0.0 {
            return Severity::Critical;
        }
        if stock / min < 0.5 {
            Severity::Alert
        } else {
            Severity::Warning
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Alert => "alert",
            Severity::Critical => "critical",
        }
    }
}

impl core::fmt::Display for Severity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn finite_or_zero(n: f64) -> f64 {
    if n.is_finite() { n } else { 0.0 }
}

/// A product whose stock has fallen to or below its minimum.
///
/// Not a server entity of its own: rows come either from
/// `GET /dashboard/alerts` or from filtering the product cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LowStockAlert {
    pub product_id: ProductId,
    pub product_name: String,
    pub current_stock: f64,
    pub min_stock_level: f64,
    pub unit: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

// `/dashboard/alerts` rows are product documents with extra keys, so the id
// and name may appear under more than one spelling at once.
#[derive(Deserialize)]
struct AlertRecord {
    #[serde(default, deserialize_with = "lenient::opt_text")]
    product_id: Option<String>,
    #[serde(default, rename = "productId", deserialize_with = "lenient::opt_text")]
    product_id_camel: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    id: Option<String>,
    #[serde(default, rename = "_id", deserialize_with = "lenient::opt_text")]
    mongo_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    product_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    current_stock: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    min_stock_level: f64,
    #[serde(default, deserialize_with = "lenient::text")]
    unit: String,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    last_updated: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    updated_at: Option<DateTime<Utc>>,
}

impl<'de> Deserialize<'de> for LowStockAlert {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let r = AlertRecord::deserialize(deserializer)?;
        let product_id = r
            .product_id
            .or(r.product_id_camel)
            .or(r.id)
            .or(r.mongo_id)
            .map(ProductId::from)
            .ok_or_else(|| <D::Error as serde::de::Error>::missing_field("product_id"))?;
        // Severity is always recomputed locally so every view agrees.
        Ok(LowStockAlert {
            severity: Severity::classify(r.current_stock, r.min_stock_level),
            product_id,
            product_name: r.product_name.or(r.name).unwrap_or_default(),
            current_stock: r.current_stock,
            min_stock_level: r.min_stock_level,
            unit: r.unit,
            last_updated: r.last_updated.or(r.updated_at),
        })
    }
}

impl LowStockAlert {
    pub fn from_product(product: &Product) -> Self {
        Self {
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            current_stock: product.current_stock,
            min_stock_level: product.min_stock_level,
            unit: product.unit.clone(),
            severity: product.severity(),
            last_updated: product.updated_at,
        }
    }

    /// Patch the stock level in place, recomputing severity.
    pub fn set_stock(&mut self, new_stock: f64) {
        self.current_stock = finite_or_zero(new_stock).max(0.0);
        self.severity = Severity::classify(self.current_stock, self.min_stock_level);
    }

    /// Whether the alert still applies after a stock change.
    pub fn is_active(&self) -> bool {
        self.current_stock <= self.min_stock_level
    }
}

impl Entity for LowStockAlert {
    type Id = ProductId;

    fn id(&self) -> &ProductId {
        &self.product_id
    }

    fn revision(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }
}

/// Alert rows for every low-stock product, in collection order.
pub fn collect_alerts<'a, I>(products: I) -> Vec<LowStockAlert>
where
    I: IntoIterator<Item = &'a Product>,
{
    products
        .into_iter()
        .filter(|p| p.is_low_stock())
        .map(LowStockAlert::from_product)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn severity_thresholds() {
        assert_eq!(Severity::classify(0.0, 10.0), Severity::Critical);
        assert_eq!(Severity::classify(0.0, 0.0), Severity::Critical);
        assert_eq!(Severity::classify(4.0, 10.0), Severity::Alert);
        assert_eq!(Severity::classify(8.0, 10.0), Severity::Warning);
        assert_eq!(Severity::classify(5.0, 10.0), Severity::Warning);
    }

    #[test]
    fn zero_minimum_is_critical_not_a_division_error() {
        assert_eq!(Severity::classify(3.0, 0.0), Severity::Critical);
        assert_eq!(Severity::classify(f64::NAN, 10.0), Severity::Critical);
    }

    #[test]
    fn decodes_dashboard_alert_rows() {
        let alert: LowStockAlert = serde_json::from_value(json!({
            "product_id": "p9",
            "product_name": "Flour",
            "current_stock": 2,
            "min_stock_level": 10,
            "unit": "kg",
            "last_updated": "2024-05-01T10:00:00"
        }))
        .unwrap();

        assert_eq!(alert.product_id.as_str(), "p9");
        assert_eq!(alert.severity, Severity::Alert);
        assert!(alert.last_updated.is_some());
    }

    #[test]
    fn accepts_alternate_id_keys() {
        let camel: LowStockAlert =
            serde_json::from_value(json!({ "productId": "a", "current_stock": 1 })).unwrap();
        let plain: LowStockAlert =
            serde_json::from_value(json!({ "id": "b", "name": "Eggs" })).unwrap();

        assert_eq!(camel.product_id.as_str(), "a");
        assert_eq!(plain.product_id.as_str(), "b");
        assert_eq!(plain.product_name, "Eggs");
        assert_eq!(plain.severity, Severity::Critical);
    }

    #[test]
    fn product_documents_with_every_key_decode() {
        let alert: LowStockAlert = serde_json::from_value(json!({
            "_id": "65f0",
            "id": "p3",
            "product_id": "p3",
            "name": "Rice",
            "product_name": "Basmati Rice",
            "current_stock": 2,
            "min_stock_level": 10,
            "updated_at": "2024-03-01T09:00:00"
        }))
        .unwrap();

        assert_eq!(alert.product_id.as_str(), "p3");
        assert_eq!(alert.product_name, "Basmati Rice");
        assert_eq!(alert.severity, Severity::Alert);
        assert!(alert.last_updated.is_some());
    }

    #[test]
    fn collect_alerts_filters_low_stock_products() {
        let products = vec![
            Product::new("p1", "Milk", 0.0, 5.0),
            Product::new("p2", "Bread", 20.0, 5.0),
            Product::new("p3", "Cheese", 4.0, 10.0),
        ];

        let alerts = collect_alerts(&products);
        let ids: Vec<&str> = alerts.iter().map(|a| a.product_id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p3"]);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(alerts[1].severity, Severity::Alert);
    }

    #[test]
    fn set_stock_reclassifies() {
        let mut alert = LowStockAlert::from_product(&Product::new("p1", "Milk", 0.0, 10.0));
        alert.set_stock(9.0);
        assert_eq!(alert.severity, Severity::Warning);
        assert!(alert.is_active());
        alert.set_stock(11.0);
        assert!(!alert.is_active());
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 1000, .. ProptestConfig::default() })]

        #[test]
        fn classify_is_total_and_consistent(stock in -1e6f64..1e6, min in -1e6f64..1e6) {
            let severity = Severity::classify(stock, min);
            if stock <= 0.0 || min <= 0.0 {
                prop_assert_eq!(severity, Severity::Critical);
            } else if stock / min < 0.5 {
                prop_assert_eq!(severity, Severity::Alert);
            } else {
                prop_assert_eq!(severity, Severity::Warning);
            }
        }

        #[test]
        fn more_stock_never_raises_severity(min in 0.1f64..1e4, a in 0.0f64..1e4, b in 0.0f64..1e4) {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(Severity::classify(high, min) <= Severity::classify(low, min));
        }
    }
}
