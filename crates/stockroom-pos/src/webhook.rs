//! Inventory push notifications.
//!
//! Accepts a single event object, a bare array of events, or
//! `{"events": [...]}`. Events without an item id are dropped.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum WebhookEventType {
    InventoryUpdate,
    ItemUpdate,
    ItemCreate,
    ItemDelete,
    Unknown(String),
}

impl WebhookEventType {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "INVENTORY_UPDATE" => Self::InventoryUpdate,
            "ITEM_UPDATE" => Self::ItemUpdate,
            "ITEM_CREATE" => Self::ItemCreate,
            "ITEM_DELETE" => Self::ItemDelete,
            _ => Self::Unknown(raw.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookEvent {
    pub event_type: WebhookEventType,
    pub item_id: String,
    /// Absent for events that carry no stock figure.
    pub stock_count: Option<i64>,
}

fn parse_event(obj: &Value) -> Option<WebhookEvent> {
    let event_type = obj
        .get("type")
        .and_then(Value::as_str)
        .map_or(WebhookEventType::Unknown(String::new()), WebhookEventType::parse);
    let item_id = match obj.get("itemId").or_else(|| obj.get("objectId")) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return None,
    };
    let stock_count = ["stockCount", "quantity"]
        .iter()
        .filter_map(|k| obj.get(*k))
        .find_map(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        });

    Some(WebhookEvent {
        event_type,
        item_id,
        stock_count,
    })
}

/// Extracts every well-formed event from a webhook body.
#[must_use]
pub fn parse_webhook(body: &Value) -> Vec<WebhookEvent> {
    let events: &[Value] = match body {
        Value::Array(arr) => arr,
        Value::Object(map) => match map.get("events").and_then(Value::as_array) {
            Some(arr) => arr,
            None => std::slice::from_ref(body),
        },
        _ => return Vec::new(),
    };
    events.iter().filter_map(parse_event).collect()
}
