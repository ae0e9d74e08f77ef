//! `pantry-products`: the inventory domain as seen by the client.
//!
//! Records here mirror what the backend sends (`Product`, `ActivityEvent`,
//! low-stock alert rows) plus the pure derivations every page must agree on:
//! status derivation, severity tiers and inventory aggregates.

pub mod activity;
pub mod alert;
pub mod draft;
pub mod format;
pub mod lenient;
pub mod product;
pub mod stats;

pub use activity::{ActivityAction, ActivityEvent, ActivityFeed};
pub use alert::{LowStockAlert, Severity, collect_alerts};
pub use draft::{FormWarning, NewProduct, ProductForm, ValidatedProduct, generate_sku};
pub use product::{Product, ProductStatus, derive_status};
pub use stats::{InventoryStats, ProductValue};
