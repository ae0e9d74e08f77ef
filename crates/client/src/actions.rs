//! User-initiated product mutations.
//!
//! Each action calls the REST API, then applies the result to this client's
//! pages through the bus and relays it on the push channel so other clients
//! see it. Page reducers are idempotent, so the server echoing the same
//! change back is harmless.

use chrono::Utc;
use thiserror::Error;

use pantry_core::{DomainError, ProductId};
use pantry_products::{ActivityEvent, Product, ProductForm};

use crate::api::ApiError;
use crate::state::AppState;
use crate::wire::{ChangeType, Message, Outbound, ProductChange};

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("invalid product: {0}")]
    Invalid(#[from] DomainError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Clone)]
pub struct ProductActions {
    state: AppState,
}

impl ProductActions {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Validate the add form and create the product.
    pub async fn create(&self, form: &ProductForm) -> Result<Product, ActionError> {
        let body = self.validated(form)?;
        let product = self
            .state
            .api
            .create_product(&body)
            .await
            .inspect_err(|err| self.failed("Failed to create product", err))?;

        tracing::info!(product_id = %product.id, "product created");
        self.apply(ProductChange::new(ChangeType::Create, product.clone()));
        self.relay(Outbound::ProductCreate(product.clone()));
        self.state.notifications.success("Product added successfully");
        Ok(product)
    }

    /// Validate the edit form and update `id`.
    pub async fn update(&self, id: &ProductId, form: &ProductForm) -> Result<Product, ActionError> {
        let body = self.validated(form)?;
        let product = self
            .state
            .api
            .update_product(id, &body)
            .await
            .inspect_err(|err| self.failed("Failed to update product", err))?;

        tracing::info!(product_id = %product.id, "product updated");
        self.changed(product.clone());
        self.state.notifications.success("Product updated successfully");
        Ok(product)
    }

    /// Record a `delete` activity, delete the product and tell everyone.
    ///
    /// Failing to record the activity is logged and does not stop the delete.
    pub async fn delete(&self, product: &Product) -> Result<(), ActionError> {
        let event = ActivityEvent::product_deleted(product, Utc::now());
        if let Err(err) = self.state.api.create_event(&event).await {
            tracing::warn!(product_id = %product.id, error = %err, "could not record delete activity");
        }

        self.state
            .api
            .delete_product(&product.id)
            .await
            .inspect_err(|err| self.failed("Failed to delete product", err))?;

        tracing::info!(product_id = %product.id, "product deleted");
        self.apply(ProductChange::deleted(product.id.clone()));
        self.relay(Outbound::ProductDelete {
            id: product.id.clone(),
            product: Some(product.clone()),
        });
        self.state.notifications.success("Product deleted successfully");
        Ok(())
    }

    /// Set the stock level of `id`.
    pub async fn update_stock(&self, id: &ProductId, quantity: f64) -> Result<Product, ActionError> {
        let product = self
            .state
            .api
            .update_stock(id, quantity)
            .await
            .inspect_err(|err| self.failed("Failed to update stock", err))?;

        tracing::info!(product_id = %id, quantity, "stock updated");
        self.changed(product.clone());
        Ok(product)
    }

    fn validated(&self, form: &ProductForm) -> Result<pantry_products::NewProduct, ActionError> {
        let validated = form.validate(Utc::now()).inspect_err(|err| {
            self.state.notifications.error(err.to_string());
        })?;
        for warning in &validated.warnings {
            self.state.notifications.warning(warning.message());
        }
        Ok(validated.product)
    }

    fn changed(&self, product: Product) {
        let change = ProductChange::new(ChangeType::Update, product);
        self.apply(change.clone());
        self.relay(Outbound::ProductUpdate(change));
    }

    fn apply(&self, change: ProductChange) {
        self.state.bus().publish(&Message::ProductUpdate(change));
    }

    fn relay(&self, request: Outbound) {
        // Logged by the connection manager; other clients catch up on their
        // next refresh.
        let _ = self.state.connection.emit(request);
    }

    fn failed(&self, what: &str, err: &ApiError) {
        tracing::error!(error = %err, "{what}");
        self.state.notifications.error(format!("{what}: {err}"));
    }
}
