//! Add/edit product form handling.
//!
//! The form is collected as raw strings; [`ProductForm::validate`] coerces the
//! numbers, applies the soft price and stock rules and produces the body for
//! `POST /products` or `PUT /products/:id`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use pantry_core::{DomainError, DomainResult};

use crate::product::{Product, ProductStatus, derive_status};

/// Raw add/edit form fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductForm {
    pub name: String,
    pub category: String,
    pub sku: String,
    pub unit: String,
    pub current_stock: String,
    pub min_stock_level: String,
    pub cost_price: String,
    pub selling_price: String,
    pub description: String,
    /// Only `inactive`/`discontinued` are honoured; anything else is derived.
    pub status: String,
}

/// Body sent to the products endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewProduct {
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
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A value the form adjusted rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FormWarning {
    /// Selling price was raised to the cost price.
    SellingBelowCost { cost_price: f64 },
    /// Minimum stock was lowered to the current stock.
    MinAboveStock { current_stock: f64 },
}

impl FormWarning {
    pub fn message(&self) -> &'static str {
        match self {
            FormWarning::SellingBelowCost { .. } => "Selling price should be higher than cost price",
            FormWarning::MinAboveStock { .. } => {
                "Minimum stock level cannot be higher than current stock"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedProduct {
    pub product: NewProduct,
    pub warnings: Vec<FormWarning>,
}

impl ProductForm {
    /// Prefill the edit form from a loaded product.
    pub fn from_product(product: &Product) -> Self {
        Self {
            name: product.name.clone(),
            category: product.category.clone(),
            sku: product.sku.clone(),
            unit: product.unit.clone(),
            current_stock: product.current_stock.to_string(),
            min_stock_level: product.min_stock_level.to_string(),
            cost_price: product.cost_price.to_string(),
            selling_price: product.selling_price.to_string(),
            description: product.description.clone().unwrap_or_default(),
            status: product.status.as_str().to_string(),
        }
    }

    /// Validate the form at `now`.
    ///
    /// Blank numbers count as zero; non-numeric or negative values are
    /// rejected. A blank SKU is generated.
    pub fn validate(&self, now: DateTime<Utc>) -> DomainResult<ValidatedProduct> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("product name is required"));
        }

        let current_stock = parse_amount("current_stock", &self.current_stock)?;
        let mut min_stock_level = parse_amount("min_stock_level", &self.min_stock_level)?;
        let cost_price = parse_amount("cost_price", &self.cost_price)?;
        let mut selling_price = parse_amount("selling_price", &self.selling_price)?;

        let mut warnings = Vec::new();
        if selling_price < cost_price {
            selling_price = cost_price;
            warnings.push(FormWarning::SellingBelowCost { cost_price });
        }
        if min_stock_level > current_stock {
            min_stock_level = current_stock;
            warnings.push(FormWarning::MinAboveStock { current_stock });
        }

        let status = match self.status.parse::<ProductStatus>() {
            Ok(manual) if !manual.is_stock_driven() => manual,
            _ => derive_status(current_stock, min_stock_level),
        };

        let sku = match self.sku.trim() {
            "" => generate_sku(now),
            sku => sku.to_string(),
        };
        let description = Some(self.description.trim())
            .filter(|d| !d.is_empty())
            .map(str::to_string);

        Ok(ValidatedProduct {
            product: NewProduct {
                name: name.to_string(),
                category: self.category.trim().to_string(),
                sku,
                unit: self.unit.trim().to_string(),
                current_stock,
                min_stock_level,
                cost_price,
                selling_price,
                status,
                description,
                created_at: Some(now),
            },
            warnings,
        })
    }
}

fn parse_amount(field: &str, raw: &str) -> DomainResult<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(0.0);
    }
    let value: f64 = raw
        .parse()
        .map_err(|_| DomainError::validation(format!("{field} must be a number")))?;
    if !value.is_finite() || value < 0.0 {
        return Err(DomainError::validation(format!("{field} must be zero or more")));
    }
    Ok(value)
}

/// SKU of the form `PRD-NNNN-TTTT`: four random digits, then the last four
/// digits of the millisecond timestamp.
pub fn generate_sku(now: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().as_u128() % 10_000;
    let stamp = now.timestamp_millis().rem_euclid(10_000);
    format!("PRD-{random:04}-{stamp:04}")
}
