//! Validation of raw classifier output into a [`Classification`].

use serde_json::Value;
use stockroom_core::{Classification, Condition, Confidence, ProductType};

fn field<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k)).filter(|v| !v.is_null())
}

/// Non-empty trimmed text; numbers are accepted and rendered (sizes like `10.5`).
fn text(obj: &Value, keys: &[&str]) -> Option<String> {
    match field(obj, keys)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Removes a leading copy of `brand` from `model`, plus any separator after it.
///
/// Leaves `model` alone if stripping would empty it or if the brand is only a
/// prefix of a longer word (`"Nikelab"` is not `"Nike"` + `"lab"`).
fn strip_brand_prefix(model: &str, brand: &str) -> String {
    let head_len = brand.len();
    if model.len() <= head_len || !model.is_char_boundary(head_len) {
        return model.to_string();
    }
    let (head, rest) = model.split_at(head_len);
    if !head.eq_ignore_ascii_case(brand) {
        return model.to_string();
    }
    if rest
        .chars()
        .next()
        .is_some_and(char::is_alphanumeric)
    {
        return model.to_string();
    }
    let stripped = rest.trim_start_matches(|c: char| c.is_whitespace() || "-_/:|".contains(c));
    if stripped.is_empty() {
        model.to_string()
    } else {
        stripped.to_string()
    }
}

/// Turns a parsed JSON object into a [`Classification`], or `None` when
/// required fields are missing.
///
/// - `cleanedName` and `brand` are required.
/// - `model` falls back to the cleaned name minus the brand.
/// - `productType` outside the known set becomes `other`.
/// - `condition` outside the known set is dropped.
/// - A missing or unknown `confidence` is `low`.
#[must_use]
pub fn validate_classification(value: &Value) -> Option<Classification> {
    if !value.is_object() {
        return None;
    }

    let cleaned_name = text(value, &["cleanedName", "cleaned_name"])?;
    let brand = text(value, &["brand"])?;

    let model = text(value, &["model"]).unwrap_or_else(|| cleaned_name.clone());
    let model = strip_brand_prefix(&model, &brand);
    if model.eq_ignore_ascii_case(&brand) {
        return None;
    }

    let product_type = text(value, &["productType", "product_type"])
        .map_or(ProductType::Other, |s| ProductType::parse_lenient(&s));
    let condition = text(value, &["condition"]).and_then(|s| Condition::parse(&s));
    let confidence = Confidence::parse_lenient(text(value, &["confidence"]).as_deref());

    Some(Classification {
        cleaned_name,
        brand,
        model,
        product_type,
        size: text(value, &["size"]),
        colorway: text(value, &["colorway", "color"]),
        condition,
        variant_label: text(value, &["variantLabel", "variant_label"]),
        confidence,
    })
}
