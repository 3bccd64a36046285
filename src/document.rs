//! Document tree helpers.
//!
//! Documents are `serde_json::Value` trees. Everything that walks them by
//! dotted path lives here: value lookup, path removal, merging incoming
//! write payloads, and criteria matching for queries.

use serde_json::Value;

use crate::rules::ROOT;

/// Walk a document along a dotted path and return the value found there.
///
/// The root sentinel returns the document itself. A missing intermediate
/// node yields `None`, never an error.
pub fn deep_value<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    if path == ROOT {
        return Some(document);
    }

    let mut current = document;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Remove the node at the end of a dotted path, leaving siblings intact.
///
/// Missing intermediate nodes make this a no-op. The root sentinel is not a
/// removable path (root denial collapses the whole document instead).
pub fn remove_path(document: &mut Value, path: &str) {
    if path == ROOT {
        return;
    }

    let mut segments: Vec<&str> = path.split('.').collect();
    let last = match segments.pop() {
        Some(last) => last,
        None => return,
    };

    let mut current = document;
    for segment in segments {
        match current.get_mut(segment) {
            Some(next) => current = next,
            None => return,
        }
    }

    if let Some(map) = current.as_object_mut() {
        map.remove(last);
    }
}

/// Merge an incoming payload into a target document.
///
/// Nested objects merge key by key; any other value (including arrays)
/// replaces the target outright.
pub fn deep_merge(target: &mut Value, incoming: &Value) {
    if let Value::Object(incoming_map) = incoming {
        if let Value::Object(target_map) = target {
            for (key, value) in incoming_map {
                match target_map.get_mut(key) {
                    Some(slot) if slot.is_object() && value.is_object() => {
                        deep_merge(slot, value);
                    }
                    _ => {
                        target_map.insert(key.clone(), value.clone());
                    }
                }
            }
            return;
        }
    }

    *target = incoming.clone();
}

/// Check a document against query criteria.
///
/// Criteria are an object of `dotted path -> expected value` equality
/// checks. `null` criteria match everything; any other non-object shape
/// matches nothing.
pub fn matches_criteria(document: &Value, criteria: &Value) -> bool {
    match criteria {
        Value::Null => true,
        Value::Object(fields) => fields
            .iter()
            .all(|(path, expected)| deep_value(document, path) == Some(expected)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deep_value_walks_nested_paths() {
        let doc = json!({"profile": {"email": "a@b.c", "age": 7}});

        assert_eq!(deep_value(&doc, "profile.email"), Some(&json!("a@b.c")));
        assert_eq!(deep_value(&doc, "profile.age"), Some(&json!(7)));
        assert_eq!(deep_value(&doc, ROOT), Some(&doc));
    }

    #[test]
    fn test_deep_value_missing_intermediate_is_none() {
        let doc = json!({"a": 1});

        assert_eq!(deep_value(&doc, "missing.nested"), None);
        assert_eq!(deep_value(&doc, "a.nested"), None);
    }

    #[test]
    fn test_remove_path_keeps_siblings() {
        let mut doc = json!({"a": 1, "b": {"c": 2, "d": 3}});

        remove_path(&mut doc, "b.c");
        assert_eq!(doc, json!({"a": 1, "b": {"d": 3}}));

        remove_path(&mut doc, "a");
        assert_eq!(doc, json!({"b": {"d": 3}}));
    }

    #[test]
    fn test_remove_path_missing_is_noop() {
        let mut doc = json!({"a": 1});

        remove_path(&mut doc, "x.y.z");
        remove_path(&mut doc, ROOT);
        assert_eq!(doc, json!({"a": 1}));
    }

    #[test]
    fn test_deep_merge_nested_objects() {
        let mut target = json!({"name": "x", "profile": {"email": "a@b.c", "age": 7}});
        let incoming = json!({"profile": {"age": 8}, "new": true});

        deep_merge(&mut target, &incoming);
        assert_eq!(
            target,
            json!({"name": "x", "profile": {"email": "a@b.c", "age": 8}, "new": true})
        );
    }

    #[test]
    fn test_deep_merge_scalar_replaces() {
        let mut target = json!({"a": {"b": 1}});
        deep_merge(&mut target, &json!({"a": 5}));
        assert_eq!(target, json!({"a": 5}));
    }

    #[test]
    fn test_matches_criteria() {
        let doc = json!({"role": "admin", "profile": {"age": 7}});

        assert!(matches_criteria(&doc, &Value::Null));
        assert!(matches_criteria(&doc, &json!({})));
        assert!(matches_criteria(&doc, &json!({"role": "admin"})));
        assert!(matches_criteria(&doc, &json!({"profile.age": 7})));
        assert!(!matches_criteria(&doc, &json!({"role": "guest"})));
        assert!(!matches_criteria(&doc, &json!(42)));
    }
}
