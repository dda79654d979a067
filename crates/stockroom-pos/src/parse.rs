//! Tolerant parsing of inventory listing responses.
//!
//! The inventory source has answered with several envelope shapes over time.
//! Known shapes are tried in order; anything unrecognized yields no items
//! rather than an error, and individual items missing an id or name are
//! skipped.

use serde_json::Value;
use stockroom_core::RawItem;

/// Item arrays found in a listing response, by envelope shape.
#[derive(Debug, PartialEq)]
enum Envelope<'a> {
    /// `{"elements": [...]}`
    Elements(&'a [Value]),
    /// `{"items": [...]}`
    Items(&'a [Value]),
    /// `{"data": [...]}` or `{"data": {"items": [...]}}`
    Data(&'a [Value]),
    /// A bare JSON array.
    Bare(&'a [Value]),
    Unknown,
}

fn classify_envelope(body: &Value) -> Envelope<'_> {
    if let Some(arr) = body.as_array() {
        return Envelope::Bare(arr);
    }
    if let Some(arr) = body.get("elements").and_then(Value::as_array) {
        return Envelope::Elements(arr);
    }
    if let Some(arr) = body.get("items").and_then(Value::as_array) {
        return Envelope::Items(arr);
    }
    match body.get("data") {
        Some(Value::Array(arr)) => Envelope::Data(arr),
        Some(inner) => match inner.get("items").and_then(Value::as_array) {
            Some(arr) => Envelope::Data(arr),
            None => Envelope::Unknown,
        },
        None => Envelope::Unknown,
    }
}

/// Parsed contents of one listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPage {
    pub items: Vec<RawItem>,
    /// Elements present in the response, including skipped ones. Used to
    /// decide whether another page may exist.
    pub raw_count: usize,
}

/// Extracts inventory items from any known listing envelope.
#[must_use]
pub fn parse_items_page(body: &Value) -> ParsedPage {
    let elements = match classify_envelope(body) {
        Envelope::Elements(arr)
        | Envelope::Items(arr)
        | Envelope::Data(arr)
        | Envelope::Bare(arr) => arr,
        Envelope::Unknown => {
            tracing::warn!("unrecognized inventory response envelope; treating as empty");
            return ParsedPage::default();
        }
    };

    let items = elements.iter().filter_map(parse_item).collect();
    ParsedPage {
        items,
        raw_count: elements.len(),
    }
}

fn first_str<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Integer from a JSON number or a numeric string.
fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round()).and_then(f64_to_i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn f64_to_i64(f: f64) -> Option<i64> {
    // Range-checked before the cast.
    if f.is_finite() && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn first_i64(obj: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().filter_map(|k| obj.get(*k)).find_map(as_i64)
}

fn stock_of(obj: &Value) -> i32 {
    let direct = first_i64(obj, &["stockCount", "stock_count", "stock", "quantity"]);
    let nested = obj
        .get("itemStock")
        .and_then(|s| first_i64(s, &["quantity", "stockCount"]));
    let count = direct.or(nested).unwrap_or(0).max(0);
    i32::try_from(count).unwrap_or(i32::MAX)
}

/// One inventory element. Returns `None` when the id or name is missing.
fn parse_item(obj: &Value) -> Option<RawItem> {
    let external_id = match obj.get("id").or_else(|| obj.get("itemId")) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return None,
    };
    let display_name = first_str(obj, &["name", "displayName", "title"])?.to_string();
    let unit_price = first_i64(obj, &["price", "unitPrice", "unit_price"]);

    Some(RawItem {
        external_id,
        display_name,
        unit_price,
        stock_count: stock_of(obj),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_elements_envelope() {
        let body = json!({"elements": [
            {"id": "A1", "name": "Nike Dunk Low Panda 10", "price": 12000, "stockCount": 2}
        ]});
        let page = parse_items_page(&body);
        assert_eq!(page.raw_count, 1);
        assert_eq!(
            page.items,
            vec![RawItem {
                external_id: "A1".to_string(),
                display_name: "Nike Dunk Low Panda 10".to_string(),
                unit_price: Some(12000),
                stock_count: 2,
            }]
        );
    }

    #[test]
    fn parses_items_data_and_bare_shapes() {
        let item = json!({"id": "B", "name": "Thing", "price": 100});
        for body in [
            json!({"items": [item.clone()]}),
            json!({"data": [item.clone()]}),
            json!({"data": {"items": [item.clone()]}}),
            json!([item.clone()]),
        ] {
            let page = parse_items_page(&body);
            assert_eq!(page.items.len(), 1, "shape: {body}");
            assert_eq!(page.items[0].external_id, "B");
        }
    }

    #[test]
    fn unknown_envelope_fails_closed() {
        let page = parse_items_page(&json!({"message": "hello"}));
        assert!(page.items.is_empty());
        assert_eq!(page.raw_count, 0);
        assert!(parse_items_page(&json!("nope")).items.is_empty());
    }

    #[test]
    fn skips_items_without_id_or_name_but_counts_them() {
        let body = json!({"elements": [
            {"name": "No id", "price": 100},
            {"id": "X", "price": 100},
            {"id": "Y", "name": "  ", "price": 100},
            {"id": "Z", "name": "Keeper", "price": 100}
        ]});
        let page = parse_items_page(&body);
        assert_eq!(page.raw_count, 4);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].external_id, "Z");
    }

    #[test]
    fn field_aliases_and_nested_stock() {
        let body = json!({"elements": [
            {"itemId": 42, "displayName": "Hoodie", "unitPrice": "4500",
             "itemStock": {"quantity": 3.0}}
        ]});
        let page = parse_items_page(&body);
        let item = &page.items[0];
        assert_eq!(item.external_id, "42");
        assert_eq!(item.display_name, "Hoodie");
        assert_eq!(item.unit_price, Some(4500));
        assert_eq!(item.stock_count, 3);
    }

    #[test]
    fn negative_or_missing_stock_is_zero() {
        let body = json!([
            {"id": "A", "name": "a", "stockCount": -4},
            {"id": "B", "name": "b"}
        ]);
        let page = parse_items_page(&body);
        assert_eq!(page.items[0].stock_count, 0);
        assert_eq!(page.items[1].stock_count, 0);
        assert_eq!(page.items[1].unit_price, None);
    }
}
