//! REST client for the inventory backend.
//!
//! Every endpoint answers with the envelope `{success, data, message?}`; a
//! `success: false` envelope is an error even on HTTP 200.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use thiserror::Error;

use pantry_core::ProductId;
use pantry_products::lenient;
use pantry_products::{ActivityEvent, LowStockAlert, NewProduct, Product};

#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    pub fn into_result(self) -> Result<T, ApiError> {
        if !self.success {
            return Err(ApiError::Rejected(
                self.message.unwrap_or_else(|| "request failed".to_string()),
            ));
        }
        self.data.ok_or(ApiError::MissingData)
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("API error ({status}): {message}")]
    Status { status: u16, message: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("response carried no data")]
    MissingData,
}

fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(lenient::number(deserializer)?.floor() as u64)
}

/// `GET /dashboard/summary`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DashboardSummary {
    #[serde(default, alias = "totalProducts", deserialize_with = "count")]
    pub total_products: u64,
    #[serde(default, alias = "totalCategories", deserialize_with = "count")]
    pub total_categories: u64,
    #[serde(default, alias = "totalStockValue", deserialize_with = "lenient::number")]
    pub total_stock_value: f64,
    #[serde(default, alias = "lowStockItems", deserialize_with = "count")]
    pub low_stock_items: u64,
}

/// `GET /products/stats`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProductStats {
    #[serde(default, alias = "totalProducts", deserialize_with = "count")]
    pub total_products: u64,
    #[serde(default, alias = "totalCategories", deserialize_with = "count")]
    pub total_categories: u64,
    #[serde(default, alias = "totalStockValue", deserialize_with = "lenient::number")]
    pub total_stock_value: f64,
    #[serde(default, alias = "lowStockCount", deserialize_with = "count")]
    pub low_stock_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendPeriod {
    Week,
    Month,
    Year,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TrendSeries {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub values: Vec<f64>,
}

impl TrendSeries {
    /// Label/value pairs; surplus entries on either side are dropped.
    pub fn points(&self) -> impl Iterator<Item = (&str, f64)> {
        self.labels.iter().map(String::as_str).zip(self.values.iter().copied())
    }

    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }
}

/// `GET /dashboard/trends`: one series per period.
pub type SalesTrends = BTreeMap<TrendPeriod, TrendSeries>;

/// Backend operations the pages depend on.
#[async_trait]
pub trait InventoryApi: Send + Sync {
    async fn list_products(&self) -> Result<Vec<Product>, ApiError>;
    async fn get_product(&self, id: &ProductId) -> Result<Product, ApiError>;
    async fn create_product(&self, product: &NewProduct) -> Result<Product, ApiError>;
    async fn update_product(&self, id: &ProductId, product: &NewProduct) -> Result<Product, ApiError>;
    async fn delete_product(&self, id: &ProductId) -> Result<(), ApiError>;
    async fn low_stock_products(&self) -> Result<Vec<Product>, ApiError>;
    async fn product_stats(&self) -> Result<ProductStats, ApiError>;
    async fn update_stock(&self, id: &ProductId, quantity: f64) -> Result<Product, ApiError>;
    async fn product_events(&self, id: &ProductId) -> Result<Vec<ActivityEvent>, ApiError>;
    async fn dashboard_summary(&self) -> Result<DashboardSummary, ApiError>;
    async fn recent_activity(&self) -> Result<Vec<ActivityEvent>, ApiError>;
    async fn dashboard_alerts(&self) -> Result<Vec<LowStockAlert>, ApiError>;
    async fn sales_trends(&self) -> Result<SalesTrends, ApiError>;
    async fn list_events(&self) -> Result<Vec<ActivityEvent>, ApiError>;
    async fn create_event(&self, event: &ActivityEvent) -> Result<(), ApiError>;
}

/// HTTP implementation over `reqwest`.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::new(base_url)
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn call<T: DeserializeOwned>(&self, mut req: reqwest::RequestBuilder) -> Result<T, ApiError> {
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.map_err(|e| ApiError::Network(e.to_string()))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| ApiError::Network(e.to_string()))?;

        if !status.is_success() {
            // Error bodies usually still carry the envelope's message.
            let message = serde_json::from_str::<Envelope<serde_json::Value>>(&body)
                .ok()
                .and_then(|env| env.message)
                .unwrap_or(body);
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str::<Envelope<T>>(&body)
            .map_err(|e| ApiError::Parse(e.to_string()))?
            .into_result()
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        tracing::debug!(path, "GET");
        self.call(self.http.get(self.url(path))).await
    }
}

#[async_trait]
impl InventoryApi for ApiClient {
    async fn list_products(&self) -> Result<Vec<Product>, ApiError> {
        self.get("/products").await
    }

    async fn get_product(&self, id: &ProductId) -> Result<Product, ApiError> {
        self.get(&format!("/products/{id}")).await
    }

    async fn create_product(&self, product: &NewProduct) -> Result<Product, ApiError> {
        self.call(self.http.post(self.url("/products")).json(product)).await
    }

    async fn update_product(&self, id: &ProductId, product: &NewProduct) -> Result<Product, ApiError> {
        self.call(self.http.put(self.url(&format!("/products/{id}"))).json(product))
            .await
    }

    async fn delete_product(&self, id: &ProductId) -> Result<(), ApiError> {
        let req = self.http.delete(self.url(&format!("/products/{id}")));
        match self.call::<serde_json::Value>(req).await {
            // Deletes often answer without a `data` member.
            Ok(_) | Err(ApiError::MissingData) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn low_stock_products(&self) -> Result<Vec<Product>, ApiError> {
        self.get("/products/low-stock").await
    }

    async fn product_stats(&self) -> Result<ProductStats, ApiError> {
        self.get("/products/stats").await
    }

    async fn update_stock(&self, id: &ProductId, quantity: f64) -> Result<Product, ApiError> {
        let req = self
            .http
            .put(self.url(&format!("/products/{id}/stock")))
            .json(&json!({ "quantity": quantity }));
        self.call(req).await
    }

    async fn product_events(&self, id: &ProductId) -> Result<Vec<ActivityEvent>, ApiError> {
        self.get(&format!("/products/{id}/events")).await
    }

    async fn dashboard_summary(&self) -> Result<DashboardSummary, ApiError> {
        self.get("/dashboard/summary").await
    }

    async fn recent_activity(&self) -> Result<Vec<ActivityEvent>, ApiError> {
        self.get("/dashboard/activity").await
    }

    async fn dashboard_alerts(&self) -> Result<Vec<LowStockAlert>, ApiError> {
        self.get("/dashboard/alerts").await
    }

    async fn sales_trends(&self) -> Result<SalesTrends, ApiError> {
        self.get("/dashboard/trends").await
    }

    async fn list_events(&self) -> Result<Vec<ActivityEvent>, ApiError> {
        self.get("/events").await
    }

    async fn create_event(&self, event: &ActivityEvent) -> Result<(), ApiError> {
        let req = self.http.post(self.url("/events")).json(event);
        match self.call::<serde_json::Value>(req).await {
            Ok(_) | Err(ApiError::MissingData) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
