//! Shared JSON helpers for the pipeline crate.

use serde_json::Value;

/// Recursively merge `updates` into `base`.
///
/// Objects are merged key by key. Any other value in `updates`, arrays
/// included, replaces the value in `base` outright, so an edit can shorten
/// or clear a list.
pub fn deep_merge(base: &mut Value, updates: Value) {
    match (base, updates) {
        (Value::Object(base_map), Value::Object(update_map)) => {
            for (key, value) in update_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, updates) => *base = updates,
    }
}

/// Whether `value` is an array or object with at least one element.
pub fn is_non_empty_collection(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        _ => false,
    }
}

/// Whether any of `keys` holds a non-empty collection in the object `data`.
pub fn has_non_empty_any(data: Option<&Value>, keys: &[&str]) -> bool {
    data.is_some_and(|d| keys.iter().any(|k| is_non_empty_collection(d.get(*k))))
}

/// Top-level keys of a JSON object, sorted. Empty for non-objects.
pub fn top_level_keys(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

/// Whether a payload carries any content at all.
pub fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deep_merge_nested_objects() {
        let mut base = json!({"can_proceed": {"extraction_allowed": false, "missing": ["scale"]}, "score": 3});
        deep_merge(&mut base, json!({"can_proceed": {"extraction_allowed": true}}));
        assert_eq!(
            base,
            json!({"can_proceed": {"extraction_allowed": true, "missing": ["scale"]}, "score": 3})
        );
    }

    #[test]
    fn test_deep_merge_adds_new_keys() {
        let mut base = json!({"a": 1});
        deep_merge(&mut base, json!({"b": {"c": 2}}));
        assert_eq!(base, json!({"a": 1, "b": {"c": 2}}));
    }

    #[test]
    fn test_deep_merge_arrays_replace_wholesale() {
        let mut base = json!({"notes": ["a", "b", "c"], "scale": "1:20"});
        deep_merge(&mut base, json!({"notes": ["x"]}));
        assert_eq!(base, json!({"notes": ["x"], "scale": "1:20"}));

        let mut base = json!({"blockers": ["Drawing scale is not stated"]});
        deep_merge(&mut base, json!({"blockers": []}));
        assert_eq!(base, json!({"blockers": []}));

        let mut base = json!([1]);
        deep_merge(&mut base, json!([9, 8]));
        assert_eq!(base, json!([9, 8]));
    }

    #[test]
    fn test_deep_merge_scalar_replaces_structure() {
        let mut base = json!({"scale": {"ratio": "1:20"}});
        deep_merge(&mut base, json!({"scale": "unknown"}));
        assert_eq!(base, json!({"scale": "unknown"}));
    }

    #[test]
    fn test_deep_merge_into_null() {
        let mut base = Value::Null;
        deep_merge(&mut base, json!({"a": 1}));
        assert_eq!(base, json!({"a": 1}));
    }

    #[test]
    fn test_is_non_empty_collection() {
        assert!(is_non_empty_collection(Some(&json!(["w"]))));
        assert!(is_non_empty_collection(Some(&json!({"k": 1}))));
        assert!(!is_non_empty_collection(Some(&json!([]))));
        assert!(!is_non_empty_collection(Some(&json!({}))));
        assert!(!is_non_empty_collection(Some(&json!("text"))));
        assert!(!is_non_empty_collection(None));
    }

    #[test]
    fn test_has_non_empty_any() {
        let data = json!({"warnings": [], "flags": ["non-standard toe kick"]});
        assert!(has_non_empty_any(Some(&data), &["warnings", "flags"]));
        assert!(!has_non_empty_any(Some(&data), &["warnings", "discrepancies"]));
        assert!(!has_non_empty_any(None, &["warnings"]));
    }

    #[test]
    fn test_top_level_keys() {
        let data = json!({"view_type": "elevation", "scale": "1:20"});
        assert_eq!(top_level_keys(Some(&data)), vec!["scale".to_string(), "view_type".to_string()]);
        assert!(top_level_keys(Some(&json!([1, 2]))).is_empty());
    }
}
