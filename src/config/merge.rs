//! Deep merge of configuration fragments.
//!
//! Later fragments take precedence over earlier ones. Objects are merged
//! key by key, every other value (arrays included) is replaced entirely.

use serde_json::{Map, Value};

/// Merge `fragments` left to right into a brand-new object.
///
/// Fragments that are not objects (null, strings, arrays, ...) are skipped.
/// The result never shares structure with any input.
///
/// # Example
/// ```
/// use serde_json::json;
/// use rigger::config::merge;
///
/// let defaults = json!({"server": {"port": 8080, "host": "localhost"}, "features": ["a", "b"]});
/// let custom = json!({"server": {"port": 9000}, "features": ["c"]});
/// let merged = merge([&defaults, &custom]);
/// assert_eq!(merged, json!({"server": {"port": 9000, "host": "localhost"}, "features": ["c"]}));
/// ```
pub fn merge<'a>(fragments: impl IntoIterator<Item = &'a Value>) -> Value {
    let mut result = Map::new();
    for fragment in fragments {
        if let Value::Object(map) = fragment {
            merge_into(&mut result, map);
        }
    }
    Value::Object(result)
}

fn merge_into(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_into(existing, incoming);
            }
            (_, Value::Object(incoming)) => {
                let mut fresh = Map::new();
                merge_into(&mut fresh, incoming);
                target.insert(key.clone(), Value::Object(fresh));
            }
            (_, other) => {
                target.insert(key.clone(), other.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_simple_objects() {
        let result = merge([&json!({"a": 1, "b": 2}), &json!({"b": 3, "c": 4})]);
        assert_eq!(result, json!({"a": 1, "b": 3, "c": 4}));
    }

    #[test]
    fn test_merge_nested_objects() {
        let base = json!({
            "server": {"host": "localhost", "port": 8080},
            "debug": true
        });
        let overlay = json!({
            "server": {"port": 9000}
        });
        assert_eq!(
            merge([&base, &overlay]),
            json!({
                "server": {"host": "localhost", "port": 9000},
                "debug": true
            })
        );
    }

    #[test]
    fn test_arrays_replaced_not_merged() {
        let result = merge([&json!({"items": [1, 2, 3]}), &json!({"items": [4, 5]})]);
        assert_eq!(result, json!({"items": [4, 5]}));
    }

    #[test]
    fn test_null_value_overrides() {
        let result = merge([&json!({"a": 1}), &json!({"a": null})]);
        assert_eq!(result, json!({"a": null}));
    }

    #[test]
    fn test_non_object_fragments_are_skipped() {
        let result = merge([
            &Value::Null,
            &json!({"a": 1}),
            &json!("alias"),
            &json!([1, 2]),
            &json!({"b": 2}),
        ]);
        assert_eq!(result, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_merge_nothing_is_empty_object() {
        assert_eq!(merge([]), json!({}));
    }

    #[test]
    fn test_result_is_independent_of_inputs() {
        let mut a = json!({"nested": {"x": 1}, "list": [1]});
        let mut b = json!({"other": {"y": 2}});
        let merged = merge([&a, &b]);

        a["nested"]["x"] = json!(100);
        a["list"].as_array_mut().unwrap().push(json!(2));
        b["other"]["y"] = json!(200);

        assert_eq!(
            merged,
            json!({"nested": {"x": 1}, "list": [1], "other": {"y": 2}})
        );
    }

    #[test]
    fn test_overlay_replaces_primitive_with_object() {
        let result = merge([&json!({"value": 42}), &json!({"value": {"nested": true}})]);
        assert_eq!(result, json!({"value": {"nested": true}}));
    }

    #[test]
    fn test_overlay_replaces_object_with_primitive() {
        let result = merge([&json!({"value": {"nested": true}}), &json!({"value": 42})]);
        assert_eq!(result, json!({"value": 42}));
    }
}
