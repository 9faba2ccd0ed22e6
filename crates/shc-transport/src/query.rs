// SPDX-License-Identifier: MIT OR Apache-2.0
//! Query-string rendering for the Gen1 REST dialect.

use serde_json::Value;

/// Fold a JSON object into URL query parameters.
///
/// Gen1 firmware expects booleans as the strings `"true"`/`"false"` and
/// floats in shortest round-trip form (no trailing zeros). Nested arrays
/// and objects are rendered as compact JSON. `null` values are skipped.
#[must_use]
pub fn render_query(params: &serde_json::Map<String, Value>) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        let rendered = match value {
            Value::Null => continue,
            Value::Bool(b) => b.to_string(),
            // `Display` on f64 already produces the shortest representation
            // that round-trips.
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        serializer.append_pair(key, &rendered);
    }
    serializer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn booleans_render_as_words() {
        let q = render_query(&obj(json!({"turn": true, "overtemp": false})));
        assert_eq!(q, "overtemp=false&turn=true");
    }

    #[test]
    fn floats_have_no_trailing_zeros() {
        let q = render_query(&obj(json!({"brightness": 50.5, "gain": 100.0})));
        assert_eq!(q, "brightness=50.5&gain=100.0");
        let q = render_query(&obj(json!({"pos": 33.333333})));
        assert_eq!(q, "pos=33.333333");
    }

    #[test]
    fn integers_render_plain() {
        let q = render_query(&obj(json!({"timer": 30, "offset": -2})));
        assert_eq!(q, "offset=-2&timer=30");
    }

    #[test]
    fn strings_are_url_encoded() {
        let q = render_query(&obj(json!({"name": "living room"})));
        assert_eq!(q, "name=living+room");
    }

    #[test]
    fn nulls_are_skipped() {
        let q = render_query(&obj(json!({"turn": "on", "timer": null})));
        assert_eq!(q, "turn=on");
    }

    #[test]
    fn empty_map_is_empty_string() {
        let q = render_query(&serde_json::Map::new());
        assert_eq!(q, "");
    }
}
