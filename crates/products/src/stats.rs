use std::collections::BTreeMap;

use pantry_core::ProductId;

use crate::product::{Product, ProductStatus};

/// Stock value of a single product, for the top-products chart.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductValue {
    pub id: ProductId,
    pub name: String,
    pub value: f64,
}

/// Aggregates over a product collection.
///
/// Always computed from the whole collection; never patched incrementally.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InventoryStats {
    pub total_products: usize,
    /// Sum of `current_stock * cost_price`.
    pub total_inventory_value: f64,
    /// Sum of `current_stock * selling_price`.
    pub total_retail_value: f64,
    pub low_stock_count: usize,
    pub status_counts: BTreeMap<ProductStatus, usize>,
    pub category_counts: BTreeMap<String, usize>,
    /// Highest-value products first.
    pub value_by_product: Vec<ProductValue>,
}

impl InventoryStats {
    pub fn compute<'a, I>(products: I) -> Self
    where
        I: IntoIterator<Item = &'a Product>,
    {
        let mut stats = InventoryStats::default();
        for product in products {
            stats.total_products += 1;
            stats.total_inventory_value += product.inventory_value();
            stats.total_retail_value += product.retail_value();
            if product.is_low_stock() {
                stats.low_stock_count += 1;
            }
            *stats.status_counts.entry(product.status).or_default() += 1;

            let category = match product.category.trim() {
                "" => "Uncategorized".to_string(),
                c => c.to_string(),
            };
            *stats.category_counts.entry(category).or_default() += 1;

            stats.value_by_product.push(ProductValue {
                id: product.id.clone(),
                name: product.name.clone(),
                value: product.inventory_value(),
            });
        }
        stats
            .value_by_product
            .sort_by(|a, b| b.value.total_cmp(&a.value));
        stats
    }

    pub fn status_count(&self, status: ProductStatus) -> usize {
        self.status_counts.get(&status).copied().unwrap_or(0)
    }

    pub fn category_count(&self) -> usize {
        self.category_counts.len()
    }

    pub fn top_products(&self, n: usize) -> &[ProductValue] {
        &self.value_by_product[..n.min(self.value_by_product.len())]
    }
}
