//! Push-channel message taxonomy and frame translation.
//!
//! Every frame on the push channel is a JSON object `{"event": <name>,
//! "data": <payload>}`. Inbound frames are decoded into [`Message`] values the
//! dispatch bus routes by [`EventKind`]; outbound requests are built from
//! [`Outbound`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use pantry_core::ProductId;
use pantry_events::Routable;
use pantry_products::lenient;
use pantry_products::{ActivityEvent, Product};

/// Every event name subscribers can listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// Synthetic: link up/down, published by the connection manager.
    Connection,
    ProductUpdate,
    ProductDetailUpdate,
    StockUpdate,
    LowStockUpdate,
    Event,
    NewEvent,
    ResourceEvent,
    ActivityUpdate,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::Connection,
        EventKind::ProductUpdate,
        EventKind::ProductDetailUpdate,
        EventKind::StockUpdate,
        EventKind::LowStockUpdate,
        EventKind::Event,
        EventKind::NewEvent,
        EventKind::ResourceEvent,
        EventKind::ActivityUpdate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Connection => "connection",
            EventKind::ProductUpdate => "product-update",
            EventKind::ProductDetailUpdate => "product-detail-update",
            EventKind::StockUpdate => "stock-update",
            EventKind::LowStockUpdate => "low-stock-update",
            EventKind::Event => "event",
            EventKind::NewEvent => "new-event",
            EventKind::ResourceEvent => "resource-event",
            EventKind::ActivityUpdate => "activity-update",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
}

/// Payload of `product-update` and `product-detail-update`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductChange {
    pub change: ChangeType,
    /// Top-level id, when the producer sent one.
    pub id: Option<ProductId>,
    /// Full or partial record; `None` when absent or undecodable.
    pub data: Option<Product>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct ProductChangeRecord {
    #[serde(default, rename = "type")]
    kind: Option<ChangeType>,
    #[serde(default)]
    action: Option<ChangeType>,
    #[serde(default, deserialize_with = "opt_id")]
    id: Option<ProductId>,
    #[serde(default, rename = "_id", deserialize_with = "opt_id")]
    mongo_id: Option<ProductId>,
    #[serde(default, rename = "productId", deserialize_with = "opt_id")]
    product_id: Option<ProductId>,
    #[serde(default)]
    data: Value,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    timestamp: Option<DateTime<Utc>>,
}

impl<'de> Deserialize<'de> for ProductChange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let r = ProductChangeRecord::deserialize(deserializer)?;
        let change = r
            .kind
            .or(r.action)
            .ok_or_else(|| <D::Error as serde::de::Error>::missing_field("type"))?;
        Ok(ProductChange {
            change,
            id: r.id.or(r.mongo_id).or(r.product_id),
            data: decode_product(r.data),
            timestamp: r.timestamp,
        })
    }
}

fn decode_product(value: Value) -> Option<Product> {
    if value.is_null() {
        return None;
    }
    match serde_json::from_value::<Product>(value) {
        Ok(product) => Some(product),
        Err(err) => {
            tracing::debug!(error = %err, "ignoring undecodable product payload");
            None
        }
    }
}

fn opt_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<ProductId>, D::Error> {
    Ok(lenient::opt_text(deserializer)?.map(ProductId::from))
}

impl ProductChange {
    pub fn new(change: ChangeType, product: Product) -> Self {
        Self {
            change,
            id: Some(product.id.clone()),
            data: Some(product),
            timestamp: None,
        }
    }

    pub fn deleted(id: ProductId) -> Self {
        Self {
            change: ChangeType::Delete,
            id: Some(id),
            data: None,
            timestamp: None,
        }
    }

    /// Id of the affected product: the top-level id, else the record's.
    pub fn product_id(&self) -> Option<&ProductId> {
        self.id.as_ref().or(self.data.as_ref().map(|p| &p.id))
    }

    /// The record to store, carrying the top-level id when both are present.
    pub fn record(&self) -> Option<Product> {
        let mut product = self.data.clone()?;
        if let Some(id) = &self.id {
            product.id = id.clone();
        }
        Some(product)
    }

    fn to_value(&self) -> Value {
        json!({
            "type": self.change,
            "id": self.product_id(),
            "data": self.data,
        })
    }
}

/// Payload of `stock-update`.
#[derive(Debug, Clone, PartialEq)]
pub struct StockUpdate {
    pub product_id: ProductId,
    pub new_stock: f64,
}

/// Payload of `low-stock-update`.
#[derive(Debug, Clone, PartialEq)]
pub struct LowStockUpdate {
    pub product_id: ProductId,
}

/// Product reference as the various producers spell it.
#[derive(Deserialize)]
struct ProductRef {
    #[serde(default, deserialize_with = "opt_id")]
    product_id: Option<ProductId>,
    #[serde(default, rename = "productId", deserialize_with = "opt_id")]
    product_id_camel: Option<ProductId>,
    #[serde(default, deserialize_with = "opt_id")]
    id: Option<ProductId>,
    #[serde(default, rename = "newStock", deserialize_with = "lenient::opt_number")]
    new_stock_camel: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    new_stock: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    current_stock: Option<f64>,
}

impl ProductRef {
    fn take_product_id<E: serde::de::Error>(&mut self) -> Result<ProductId, E> {
        self.product_id
            .take()
            .or_else(|| self.product_id_camel.take())
            .or_else(|| self.id.take())
            .ok_or_else(|| E::missing_field("product_id"))
    }
}

impl<'de> Deserialize<'de> for StockUpdate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut r = ProductRef::deserialize(deserializer)?;
        let product_id = r.take_product_id::<D::Error>()?;
        let new_stock = r
            .new_stock_camel
            .or(r.new_stock)
            .or(r.current_stock)
            .ok_or_else(|| <D::Error as serde::de::Error>::missing_field("newStock"))?;
        Ok(StockUpdate { product_id, new_stock })
    }
}

impl<'de> Deserialize<'de> for LowStockUpdate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut r = ProductRef::deserialize(deserializer)?;
        Ok(LowStockUpdate {
            product_id: r.take_product_id::<D::Error>()?,
        })
    }
}

/// Payload of the synthetic `connection` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
}

/// Generic notification from the events feed (`event`, `new-event`,
/// `resource-event`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceNotice {
    #[serde(rename = "type")]
    pub action: Option<String>,
    #[serde(rename = "resourceType")]
    pub resource_type: Option<String>,
    #[serde(rename = "resourceId")]
    pub resource_id: Option<String>,
    pub data: Value,
}

// Activity records relayed as notices carry `resource_id` and `product_id`
// side by side, so each spelling gets its own slot.
#[derive(Deserialize)]
struct NoticeRecord {
    #[serde(default, rename = "type", deserialize_with = "lenient::opt_text")]
    kind: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    action: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    event_type: Option<String>,
    #[serde(default, rename = "resourceType", deserialize_with = "lenient::opt_text")]
    resource_type_camel: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    resource_type: Option<String>,
    #[serde(default, rename = "resourceId", deserialize_with = "lenient::opt_text")]
    resource_id_camel: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    resource_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    product_id: Option<String>,
    #[serde(default, rename = "productId", deserialize_with = "lenient::opt_text")]
    product_id_camel: Option<String>,
    #[serde(default)]
    data: Value,
}

impl<'de> Deserialize<'de> for ResourceNotice {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let r = NoticeRecord::deserialize(deserializer)?;
        Ok(ResourceNotice {
            action: r.kind.or(r.action).or(r.event_type),
            resource_type: r.resource_type_camel.or(r.resource_type),
            resource_id: r
                .resource_id_camel
                .or(r.resource_id)
                .or(r.product_id)
                .or(r.product_id_camel),
            data: r.data,
        })
    }
}

impl ResourceNotice {
    fn product(action: &str, data: Value) -> Self {
        Self {
            action: Some(action.to_string()),
            resource_type: Some("product".to_string()),
            resource_id: None,
            data,
        }
    }

    /// Id of the resource the notice is about, if it names one.
    pub fn subject_id(&self) -> Option<&str> {
        self.resource_id
            .as_deref()
            .or_else(|| self.data.get("id").and_then(Value::as_str))
            .or_else(|| self.data.get("product_id").and_then(Value::as_str))
    }

    /// Short human-readable summary used for activity toasts.
    pub fn summary(&self) -> String {
        let resource = self.resource_type.as_deref().unwrap_or("resource");
        let name = self.data.get("name").and_then(Value::as_str);
        let verb = match self.action.as_deref() {
            Some("create") => "created",
            Some("update") => "updated",
            Some("delete") => "deleted",
            Some(other) => other,
            None => "changed",
        };
        match name {
            Some(name) => format!("{resource} \"{name}\" {verb}"),
            None => format!("{resource} {verb}"),
        }
    }
}

/// A decoded push message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Connection(ConnectionStatus),
    ProductUpdate(ProductChange),
    ProductDetailUpdate(ProductChange),
    StockUpdate(StockUpdate),
    LowStockUpdate(LowStockUpdate),
    Event(ResourceNotice),
    NewEvent(ResourceNotice),
    ResourceEvent(ResourceNotice),
    ActivityUpdate(ActivityEvent),
}

impl Routable for Message {
    type Kind = EventKind;

    fn kind(&self) -> EventKind {
        match self {
            Message::Connection(_) => EventKind::Connection,
            Message::ProductUpdate(_) => EventKind::ProductUpdate,
            Message::ProductDetailUpdate(_) => EventKind::ProductDetailUpdate,
            Message::StockUpdate(_) => EventKind::StockUpdate,
            Message::LowStockUpdate(_) => EventKind::LowStockUpdate,
            Message::Event(_) => EventKind::Event,
            Message::NewEvent(_) => EventKind::NewEvent,
            Message::ResourceEvent(_) => EventKind::ResourceEvent,
            Message::ActivityUpdate(_) => EventKind::ActivityUpdate,
        }
    }
}

/// One push-channel frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed `{event}` payload: {source}")]
    Malformed {
        event: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown event `{0}`")]
    UnknownEvent(String),
}

/// Translate one inbound frame into the messages subscribers see.
///
/// `product-create` and `product-delete` (re-emitted by other clients) fan
/// out into a `product-update` plus a `new-event`.
pub fn decode(frame: Frame) -> Result<Vec<Message>, WireError> {
    let Frame { event, data } = frame;
    let malformed = |source: serde_json::Error| WireError::Malformed {
        event: event.clone(),
        source,
    };

    match event.as_str() {
        "product-create" => {
            let record = match data.get("data") {
                Some(inner) if !inner.is_null() => inner.clone(),
                _ => data,
            };
            let product: Product = serde_json::from_value(record.clone()).map_err(malformed)?;
            Ok(vec![
                Message::ProductUpdate(ProductChange::new(ChangeType::Create, product)),
                Message::NewEvent(ResourceNotice::product("create", record)),
            ])
        }
        "product-delete" => {
            let id = data
                .get("id")
                .cloned()
                .map(serde_json::from_value::<ProductId>)
                .transpose()
                .map_err(malformed)?;
            let record = match data.get("product") {
                Some(inner) if !inner.is_null() => inner.clone(),
                _ => data,
            };
            let product = decode_product(record.clone());
            let id = id.or_else(|| product.as_ref().map(|p| p.id.clone()));
            if id.is_none() {
                return Ok(Vec::new());
            }
            Ok(vec![
                Message::ProductUpdate(ProductChange {
                    change: ChangeType::Delete,
                    id,
                    data: product,
                    timestamp: None,
                }),
                Message::NewEvent(ResourceNotice::product("delete", record)),
            ])
        }
        name => {
            let kind = EventKind::from_name(name).ok_or_else(|| WireError::UnknownEvent(name.to_string()))?;
            let message = match kind {
                EventKind::Connection => Message::Connection(serde_json::from_value(data).map_err(malformed)?),
                EventKind::ProductUpdate => Message::ProductUpdate(serde_json::from_value(data).map_err(malformed)?),
                EventKind::ProductDetailUpdate => {
                    Message::ProductDetailUpdate(serde_json::from_value(data).map_err(malformed)?)
                }
                EventKind::StockUpdate => Message::StockUpdate(serde_json::from_value(data).map_err(malformed)?),
                EventKind::LowStockUpdate => {
                    Message::LowStockUpdate(serde_json::from_value(data).map_err(malformed)?)
                }
                EventKind::Event => Message::Event(serde_json::from_value(data).map_err(malformed)?),
                EventKind::NewEvent => Message::NewEvent(serde_json::from_value(data).map_err(malformed)?),
                EventKind::ResourceEvent => Message::ResourceEvent(serde_json::from_value(data).map_err(malformed)?),
                EventKind::ActivityUpdate => {
                    Message::ActivityUpdate(serde_json::from_value(data).map_err(malformed)?)
                }
            };
            Ok(vec![message])
        }
    }
}

/// Requests the client sends over the push channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    SubscribeEvents { products: bool, events: bool },
    Join(String),
    Leave(String),
    ProductUpdate(ProductChange),
    ProductCreate(Product),
    ProductDelete { id: ProductId, product: Option<Product> },
}

/// Room carrying detail updates for one product.
pub fn product_room(id: &ProductId) -> String {
    format!("product-{id}")
}

impl Outbound {
    pub fn name(&self) -> &'static str {
        match self {
            Outbound::SubscribeEvents { .. } => "subscribe-events",
            Outbound::Join(_) => "join",
            Outbound::Leave(_) => "leave",
            Outbound::ProductUpdate(_) => "product-update",
            Outbound::ProductCreate(_) => "product-create",
            Outbound::ProductDelete { .. } => "product-delete",
        }
    }

    pub fn into_frame(self) -> Frame {
        let name = self.name();
        let data = match self {
            Outbound::SubscribeEvents { products, events } => json!({ "products": products, "events": events }),
            Outbound::Join(room) | Outbound::Leave(room) => Value::String(room),
            Outbound::ProductUpdate(change) => change.to_value(),
            Outbound::ProductCreate(product) => json!({ "data": product }),
            Outbound::ProductDelete { id, product } => json!({ "id": id, "product": product }),
        };
        Frame::new(name, data)
    }
}
