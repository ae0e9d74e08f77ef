use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use pantry_core::{DomainError, Entity, ProductId};

use crate::alert::Severity;
use crate::lenient;

/// Product stock status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Active,
    LowStock,
    OutOfStock,
    Inactive,
    Discontinued,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::LowStock => "low_stock",
            ProductStatus::OutOfStock => "out_of_stock",
            ProductStatus::Inactive => "inactive",
            ProductStatus::Discontinued => "discontinued",
        }
    }

    /// Human-readable label used by badges and toasts.
    pub fn label(&self) -> &'static str {
        match self {
            ProductStatus::Active => "In Stock",
            ProductStatus::LowStock => "Low Stock",
            ProductStatus::OutOfStock => "Out of Stock",
            ProductStatus::Inactive => "Inactive",
            ProductStatus::Discontinued => "Discontinued",
        }
    }

    /// Whether this status is recomputed from stock levels on every write.
    ///
    /// `inactive` and `discontinued` are set by a person and survive stock
    /// changes.
    pub fn is_stock_driven(&self) -> bool {
        matches!(
            self,
            ProductStatus::Active | ProductStatus::LowStock | ProductStatus::OutOfStock
        )
    }
}

impl core::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for ProductStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" | "in_stock" => Ok(ProductStatus::Active),
            "low_stock" => Ok(ProductStatus::LowStock),
            "out_of_stock" => Ok(ProductStatus::OutOfStock),
            "inactive" => Ok(ProductStatus::Inactive),
            "discontinued" => Ok(ProductStatus::Discontinued),
            other => Err(DomainError::validation(format!("unknown product status: {other}"))),
        }
    }
}

/// Status a product should carry for the given stock levels.
///
/// Empty stock is `out_of_stock`, stock at or below the minimum is
/// `low_stock`, anything else is `active`.
pub fn derive_status(current_stock: f64, min_stock_level: f64) -> ProductStatus {
    if current_stock <= 0.0 {
        ProductStatus::OutOfStock
    } else if current_stock <= min_stock_level {
        ProductStatus::LowStock
    } else {
        ProductStatus::Active
    }
}

/// Product record as served by `GET /products` and carried by push messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub category: String,
    pub sku: String,
    pub unit: String,
    pub current_stock: f64,
    pub min_stock_level: f64,
    pub cost_price: f64,
    pub selling_price: f64,
    pub status: ProductStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sales_count: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Wire shape accepted for a product; tolerant of `_id`, missing numbers and
/// unknown statuses.
#[derive(Deserialize)]
struct ProductRecord {
    #[serde(default, deserialize_with = "lenient::opt_text")]
    id: Option<String>,
    #[serde(default, rename = "_id", deserialize_with = "lenient::opt_text")]
    mongo_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    name: String,
    #[serde(default, deserialize_with = "lenient::text")]
    category: String,
    #[serde(default, deserialize_with = "lenient::text")]
    sku: String,
    #[serde(default, deserialize_with = "lenient::text")]
    unit: String,
    #[serde(default, deserialize_with = "lenient::number")]
    current_stock: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    min_stock_level: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    cost_price: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    selling_price: f64,
    #[serde(default, deserialize_with = "opt_status")]
    status: Option<ProductStatus>,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    sales_count: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    description: Option<String>,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    updated_at: Option<DateTime<Utc>>,
}

fn opt_status<'de, D>(deserializer: D) -> Result<Option<ProductStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

impl ProductRecord {
    fn into_product(self, id: ProductId) -> Product {
        let status = self
            .status
            .unwrap_or_else(|| derive_status(self.current_stock, self.min_stock_level));
        Product {
            id,
            name: self.name,
            category: self.category,
            sku: self.sku,
            unit: self.unit,
            current_stock: self.current_stock,
            min_stock_level: self.min_stock_level,
            cost_price: self.cost_price,
            selling_price: self.selling_price,
            status,
            sales_count: self.sales_count,
            description: self.description,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl<'de> Deserialize<'de> for Product {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut record = ProductRecord::deserialize(deserializer)?;
        // Documents may carry both `id` and `_id`; the former wins.
        let id = record
            .id
            .take()
            .or_else(|| record.mongo_id.take())
            .map(ProductId::from)
            .ok_or_else(|| <D::Error as serde::de::Error>::missing_field("id"))?;
        Ok(record.into_product(id))
    }
}

impl Product {
    /// Minimal product with derived status; remaining fields empty.
    pub fn new(
        id: impl Into<ProductId>,
        name: impl Into<String>,
        current_stock: f64,
        min_stock_level: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: String::new(),
            sku: String::new(),
            unit: String::new(),
            current_stock,
            min_stock_level,
            cost_price: 0.0,
            selling_price: 0.0,
            status: derive_status(current_stock, min_stock_level),
            sales_count: None,
            description: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Whether the product belongs in the low-stock alert list.
    pub fn is_low_stock(&self) -> bool {
        self.current_stock <= self.min_stock_level
            || matches!(self.status, ProductStatus::LowStock | ProductStatus::OutOfStock)
    }

    pub fn severity(&self) -> Severity {
        Severity::classify(self.current_stock, self.min_stock_level)
    }

    /// Stock valued at cost (analytics).
    pub fn inventory_value(&self) -> f64 {
        self.current_stock * self.cost_price
    }

    /// Stock valued at selling price (dashboard summary).
    pub fn retail_value(&self) -> f64 {
        self.current_stock * self.selling_price
    }

    /// Apply a new stock level and re-derive a stock-driven status.
    pub fn set_stock(&mut self, new_stock: f64) {
        self.current_stock = if new_stock.is_finite() { new_stock.max(0.0) } else { 0.0 };
        if self.status.is_stock_driven() {
            self.status = derive_status(self.current_stock, self.min_stock_level);
        }
    }

    /// Case-insensitive match against name, category or SKU.
    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        [&self.name, &self.category, &self.sku]
            .iter()
            .any(|field| field.to_lowercase().contains(&query))
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &ProductId {
        &self.id
    }

    fn revision(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}
