//! Activity log entries and the bounded feed the dashboard shows.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use pantry_core::{ActivityId, ProductId};

use crate::lenient;
use crate::product::Product;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActivityAction {
    Create,
    Update,
    Delete,
    /// Any other action string, kept verbatim (lowercased).
    Other(String),
}

impl ActivityAction {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "create" | "created" => ActivityAction::Create,
            "update" | "updated" => ActivityAction::Update,
            "delete" | "deleted" => ActivityAction::Delete,
            other => ActivityAction::Other(other.to_string()),
        }
    }

    fn unknown() -> Self {
        ActivityAction::Other("unknown".to_string())
    }

    pub fn as_str(&self) -> &str {
        match self {
            ActivityAction::Create => "create",
            ActivityAction::Update => "update",
            ActivityAction::Delete => "delete",
            ActivityAction::Other(s) => s,
        }
    }

    /// Past-tense label ("Created", "Updated", "Deleted"); unknown actions as-is.
    pub fn label(&self) -> &str {
        match self {
            ActivityAction::Create => "Created",
            ActivityAction::Update => "Updated",
            ActivityAction::Delete => "Deleted",
            ActivityAction::Other(s) => s,
        }
    }
}

impl Serialize for ActivityAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ActivityAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = lenient::text(deserializer)?;
        Ok(ActivityAction::parse(&raw))
    }
}

/// One entry of the activity log.
///
/// Entries come from `GET /dashboard/activity`, `GET /events`,
/// `GET /products/:id/events` and `activity-update` pushes, which disagree on
/// key names; all of them decode into this shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ActivityId>,
    pub action: ActivityAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<ProductId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiated_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity_change: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Every spelling a producer may use, each in its own slot; a row carrying
/// two spellings of the same key is merged, not rejected.
#[derive(Deserialize)]
struct ActivityRecord {
    #[serde(default)]
    id: Option<ActivityId>,
    #[serde(default)]
    action: Option<ActivityAction>,
    #[serde(default)]
    event_type: Option<ActivityAction>,
    #[serde(default, rename = "type")]
    kind: Option<ActivityAction>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    resource_type: Option<String>,
    #[serde(default, rename = "resourceType", deserialize_with = "lenient::opt_text")]
    resource_type_camel: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    resource_id: Option<String>,
    #[serde(default, rename = "resourceId", deserialize_with = "lenient::opt_text")]
    resource_id_camel: Option<String>,
    #[serde(default, deserialize_with = "opt_product_id")]
    product_id: Option<ProductId>,
    #[serde(default, rename = "productId", deserialize_with = "opt_product_id")]
    product_id_camel: Option<ProductId>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    product_name: Option<String>,
    #[serde(default, rename = "productName", deserialize_with = "lenient::opt_text")]
    product_name_camel: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    description: String,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    initiated_by: Option<String>,
    #[serde(default, deserialize_with = "opt_signed_number")]
    quantity_change: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    unit: Option<String>,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    timestamp: Option<DateTime<Utc>>,
}

impl<'de> Deserialize<'de> for ActivityEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let r = ActivityRecord::deserialize(deserializer)?;
        Ok(ActivityEvent {
            id: r.id,
            action: r.action.or(r.event_type).or(r.kind).unwrap_or_else(ActivityAction::unknown),
            resource_type: r.resource_type.or(r.resource_type_camel),
            resource_id: r.resource_id.or(r.resource_id_camel),
            product_id: r.product_id.or(r.product_id_camel),
            product_name: r.product_name.or(r.product_name_camel),
            description: r.description,
            initiated_by: r.initiated_by,
            quantity_change: r.quantity_change,
            unit: r.unit,
            timestamp: r.timestamp,
        })
    }
}

fn opt_product_id<'de, D>(deserializer: D) -> Result<Option<ProductId>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient::opt_text(deserializer)?.map(ProductId::from))
}

// Quantity changes are signed, unlike every other numeric field.
fn opt_signed_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64().filter(|n| n.is_finite()),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    })
}

impl ActivityEvent {
    pub fn new(action: ActivityAction, description: impl Into<String>) -> Self {
        Self {
            id: None,
            action,
            resource_type: None,
            resource_id: None,
            product_id: None,
            product_name: None,
            description: description.into(),
            initiated_by: None,
            quantity_change: None,
            unit: None,
            timestamp: None,
        }
    }

    /// A `product` activity for `action` on `product`, stamped `at`.
    pub fn for_product(action: ActivityAction, product: &Product, at: DateTime<Utc>) -> Self {
        let name = if product.name.is_empty() { "Unknown Product" } else { product.name.as_str() };
        let description = match &action {
            ActivityAction::Create => format!("Product \"{name}\" was added to the system"),
            ActivityAction::Update => format!("Product \"{name}\" was updated"),
            ActivityAction::Delete => format!("Product \"{name}\" was deleted from the system"),
            ActivityAction::Other(a) => format!("Product \"{name}\": {a}"),
        };
        Self {
            resource_type: Some("product".to_string()),
            resource_id: Some(product.id.to_string()),
            product_id: Some(product.id.clone()),
            product_name: Some(name.to_string()),
            initiated_by: Some("user".to_string()),
            timestamp: Some(at),
            ..Self::new(action, description)
        }
    }

    /// Record posted to `POST /events` before a product is deleted.
    pub fn product_deleted(product: &Product, at: DateTime<Utc>) -> Self {
        Self::for_product(ActivityAction::Delete, product, at)
    }

    pub fn is_about(&self, product_id: &ProductId) -> bool {
        self.product_id.as_ref() == Some(product_id)
            || self.resource_id.as_deref() == Some(product_id.as_str())
    }
}

/// Bounded, newest-first activity window.
#[derive(Debug, Clone)]
pub struct ActivityFeed {
    entries: VecDeque<ActivityEvent>,
    capacity: usize,
}

impl ActivityFeed {
    pub const DEFAULT_CAPACITY: usize = 10;

    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Replace the window with a fetched batch (already newest first).
    pub fn replace(&mut self, batch: impl IntoIterator<Item = ActivityEvent>) {
        self.entries = batch.into_iter().take(self.capacity).collect();
    }

    /// Prepend a pushed entry, evicting the oldest when full.
    pub fn push(&mut self, event: ActivityEvent) {
        self.entries.push_front(event);
        self.entries.truncate(self.capacity);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActivityEvent> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&ActivityEvent> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn to_vec(&self) -> Vec<ActivityEvent> {
        self.entries.iter().cloned().collect()
    }
}

impl Default for ActivityFeed {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(desc: &str) -> ActivityEvent {
        ActivityEvent::new(ActivityAction::Update, desc)
    }

    #[test]
    fn decodes_backend_activity() {
        let event: ActivityEvent = serde_json::from_value(json!({
            "id": "a1",
            "product_id": "p1",
            "product_name": "Milk",
            "action": "update",
            "description": "Stock updated from 5 to 3 l",
            "timestamp": "2024-03-01T09:00:00.5"
        }))
        .unwrap();

        assert_eq!(event.action, ActivityAction::Update);
        assert_eq!(event.product_id, Some(ProductId::new("p1")));
        assert!(event.timestamp.is_some());
    }

    #[test]
    fn decodes_product_event_history_rows() {
        let event: ActivityEvent = serde_json::from_value(json!({
            "event_type": "STOCK_OUT",
            "description": "Sold",
            "quantity_change": -4,
            "unit": "kg",
            "resourceType": "product"
        }))
        .unwrap();

        assert_eq!(event.action, ActivityAction::Other("stock_out".into()));
        assert_eq!(event.quantity_change, Some(-4.0));
        assert_eq!(event.resource_type.as_deref(), Some("product"));
    }

    #[test]
    fn rows_with_several_spellings_of_a_key_decode() {
        let event: ActivityEvent = serde_json::from_value(json!({
            "action": "delete",
            "event_type": "DELETE",
            "resource_id": "p1",
            "resourceId": "p1",
            "product_id": "p1",
            "productName": "Milk"
        }))
        .unwrap();

        assert_eq!(event.action, ActivityAction::Delete);
        assert_eq!(event.resource_id.as_deref(), Some("p1"));
        assert_eq!(event.product_name.as_deref(), Some("Milk"));

        // A whole feed survives one such row.
        let feed: Vec<ActivityEvent> = serde_json::from_value(json!([
            { "action": "update", "event_type": "UPDATE", "description": "a" },
            { "type": "create", "description": "b" }
        ]))
        .unwrap();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[1].action, ActivityAction::Create);
    }

    #[test]
    fn posted_records_decode_back() {
        let product = Product::new("p7", "Butter", 3.0, 1.0);
        let event = ActivityEvent::product_deleted(&product, Utc::now());
        let back: ActivityEvent = serde_json::from_value(serde_json::to_value(&event).unwrap()).unwrap();
        assert_eq!(back.action, ActivityAction::Delete);
        assert!(back.is_about(&ProductId::new("p7")));
    }

    #[test]
    fn delete_record_names_the_product() {
        let product = Product::new("p7", "Butter", 3.0, 1.0);
        let at = Utc::now();
        let event = ActivityEvent::product_deleted(&product, at);

        assert_eq!(event.action, ActivityAction::Delete);
        assert_eq!(event.resource_id.as_deref(), Some("p7"));
        assert!(event.description.contains("Butter"));
        assert!(event.is_about(&ProductId::new("p7")));

        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["action"], "delete");
        assert_eq!(wire["resource_type"], "product");
    }

    #[test]
    fn feed_keeps_newest_within_capacity() {
        let mut feed = ActivityFeed::new(3);
        for n in 0..5 {
            feed.push(entry(&n.to_string()));
        }

        let order: Vec<&str> = feed.iter().map(|e| e.description.as_str()).collect();
        assert_eq!(order, vec!["4", "3", "2"]);
        assert_eq!(feed.latest().map(|e| e.description.as_str()), Some("4"));
    }

    #[test]
    fn replace_truncates_batch() {
        let mut feed = ActivityFeed::new(2);
        feed.replace(vec![entry("a"), entry("b"), entry("c")]);
        assert_eq!(feed.len(), 2);
        assert_eq!(feed.to_vec()[0].description, "a");
    }

    #[test]
    fn action_labels() {
        assert_eq!(ActivityAction::parse("Create").label(), "Created");
        assert_eq!(ActivityAction::parse("restock").label(), "restock");
    }
}
