//! Pulls the first well-formed JSON object out of free-form completion text.
//!
//! Completions often wrap the object in markdown fences or add a sentence
//! before or after it. Each `{` is tried as a start position and the first
//! one that deserializes to a complete object wins.

use serde_json::Value;

#[must_use]
pub fn extract_first_json_object(text: &str) -> Option<Value> {
    text.match_indices('{').find_map(|(start, _)| {
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value @ Value::Object(_))) => Some(value),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_object() {
        assert_eq!(
            extract_first_json_object(r#"{"brand":"Nike"}"#),
            Some(json!({"brand": "Nike"}))
        );
    }

    #[test]
    fn fenced_with_preamble_and_postamble() {
        let text = "Sure! Here is the result:\n```json\n{\"brand\": \"Nike\", \"model\": \"Dunk\"}\n```\nLet me know.";
        assert_eq!(
            extract_first_json_object(text),
            Some(json!({"brand": "Nike", "model": "Dunk"}))
        );
    }

    #[test]
    fn skips_broken_leading_brace() {
        let text = "{ not json } then {\"ok\": true}";
        assert_eq!(extract_first_json_object(text), Some(json!({"ok": true})));
    }

    #[test]
    fn nested_braces_inside_strings() {
        let text = r#"{"cleanedName": "Tee {Limited}", "brand": "Supreme"}"#;
        let value = extract_first_json_object(text).unwrap();
        assert_eq!(value["cleanedName"], "Tee {Limited}");
    }

    #[test]
    fn no_object_at_all() {
        assert_eq!(extract_first_json_object("I cannot help with that."), None);
        assert_eq!(extract_first_json_object("{\"truncated\": "), None);
    }
}
