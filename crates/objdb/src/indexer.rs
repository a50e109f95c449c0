//! Flattens a JSON payload into addressable field descriptors.
//!
//! Every leaf gets a plain entry at its dotted path (array elements by index).
//! Every non-empty array additionally gets array-compressed entries under
//! `[*]`, one per leaf sub-path found in its elements. Arrays nested inside
//! elements are described at their own indexed path, never folded into the
//! parent's compressed view.

use objdb_api::path::WILDCARD;
use objdb_api::{FieldDescriptor, JsonType};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

pub type FieldMap = BTreeMap<String, FieldDescriptor>;

fn join(prefix: Option<&str>, segment: &str) -> String {
    match prefix {
        Some(p) => format!("{}.{}", p, segment),
        None => segment.to_string(),
    }
}

/// Index a payload. Pure and deterministic.
pub fn index(value: &Value) -> FieldMap {
    let mut out = FieldMap::new();
    walk(value, None, &mut out);
    out
}

fn walk(value: &Value, path: Option<&str>, out: &mut FieldMap) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = join(path, key);
                walk(child, Some(&child_path), out);
            }
        }
        Value::Array(items) => {
            if items.is_empty() {
                return;
            }
            for (i, item) in items.iter().enumerate() {
                let child_path = join(path, &i.to_string());
                walk(item, Some(&child_path), out);
            }
            let compressed_root = join(path, WILDCARD);
            for (sub_path, types) in element_leaf_types(items) {
                let full = match sub_path {
                    Some(sub) => format!("{}.{}", compressed_root, sub),
                    None => compressed_root.clone(),
                };
                out.insert(full.clone(), FieldDescriptor::compressed(full, types));
            }
        }
        leaf => {
            // A scalar payload has no addressable path
            if let (Some(p), Some(t)) = (path, JsonType::of_leaf(leaf)) {
                out.insert(p.to_string(), FieldDescriptor::leaf(p, t));
            }
        }
    }
}

/// Leaf types per sub-path across all elements. `None` is the element itself.
fn element_leaf_types(items: &[Value]) -> BTreeMap<Option<String>, BTreeSet<JsonType>> {
    let mut acc: BTreeMap<Option<String>, BTreeSet<JsonType>> = BTreeMap::new();
    for item in items {
        match item {
            Value::Object(_) => collect_object_leaves(item, None, &mut acc),
            Value::Array(_) => {}
            leaf => {
                if let Some(t) = JsonType::of_leaf(leaf) {
                    acc.entry(None).or_default().insert(t);
                }
            }
        }
    }
    acc
}

fn collect_object_leaves(
    value: &Value,
    path: Option<&str>,
    acc: &mut BTreeMap<Option<String>, BTreeSet<JsonType>>,
) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = join(path, key);
                collect_object_leaves(child, Some(&child_path), acc);
            }
        }
        Value::Array(_) => {}
        leaf => {
            if let (Some(p), Some(t)) = (path, JsonType::of_leaf(leaf)) {
                acc.entry(Some(p.to_string())).or_default().insert(t);
            }
        }
    }
}

/// Keep only fields at or under one of the `allowed` paths.
pub fn filter_fields(fields: FieldMap, allowed: &[String]) -> FieldMap {
    fields
        .into_iter()
        .filter(|(path, _)| {
            allowed.iter().any(|a| {
                path == a
                    || path
                        .strip_prefix(a.as_str())
                        .is_some_and(|rest| rest.starts_with('.'))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn types(list: &[JsonType]) -> BTreeSet<JsonType> {
        list.iter().copied().collect()
    }

    #[test]
    fn test_numbers_example() {
        let fields = index(&json!({"numbers": [1, 2, 3]}));
        assert_eq!(fields.len(), 4);
        for i in 0..3 {
            assert_eq!(
                fields[&format!("numbers.{}", i)],
                FieldDescriptor::leaf(format!("numbers.{}", i), JsonType::Number)
            );
        }
        let compressed = &fields["numbers.[*]"];
        assert_eq!(compressed.field_type, JsonType::Number);
        assert_eq!(compressed.array_types, Some(types(&[JsonType::Number])));
        assert!(compressed.is_array_compressed);
    }

    #[test]
    fn test_mixed_example() {
        let fields = index(&json!({"mixed": [1, "a", true]}));
        let compressed = &fields["mixed.[*]"];
        assert_eq!(compressed.field_type, JsonType::String);
        assert_eq!(
            compressed.array_types,
            Some(types(&[JsonType::Number, JsonType::String, JsonType::Boolean]))
        );
    }

    #[test]
    fn test_objects_are_transparent() {
        let fields = index(&json!({"a": {"b": {"c": null}}, "d": "x"}));
        let paths: Vec<&str> = fields.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["a.b.c", "d"]);
        assert_eq!(fields["a.b.c"].field_type, JsonType::Null);
    }

    #[test]
    fn test_empty_array_produces_nothing() {
        let fields = index(&json!({"tags": [], "name": "n"}));
        assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["name"]);
    }

    #[test]
    fn test_array_of_objects_compresses_per_leaf() {
        let fields = index(&json!({
            "items": [
                {"sku": "A", "qty": 1},
                {"sku": "B", "qty": "2", "meta": {"gift": true}}
            ]
        }));
        assert_eq!(fields["items.[*].sku"].field_type, JsonType::String);
        assert_eq!(
            fields["items.[*].qty"].array_types,
            Some(types(&[JsonType::Number, JsonType::String]))
        );
        assert_eq!(fields["items.[*].meta.gift"].field_type, JsonType::Boolean);
        assert!(fields.contains_key("items.1.meta.gift"));
        assert!(!fields.contains_key("items.[*]"));
    }

    #[test]
    fn test_matrix_is_not_folded() {
        let fields = index(&json!({"a": [[1, 2], ["x"]]}));
        assert!(fields.contains_key("a.0.[*]"));
        assert!(fields.contains_key("a.1.[*]"));
        assert!(fields.contains_key("a.0.1"));
        assert!(!fields.contains_key("a.[*]"));
        assert!(!fields.keys().any(|k| k.contains("[*].[*]")));
    }

    #[test]
    fn test_nested_arrays_inside_objects_elements() {
        let fields = index(&json!({"rows": [{"tags": ["x", "y"]}]}));
        assert!(fields.contains_key("rows.0.tags.[*]"));
        assert!(!fields.contains_key("rows.[*].tags"));
        assert!(!fields.contains_key("rows.[*].tags.[*]"));
    }

    #[test]
    fn test_filter_fields() {
        let fields = index(&json!({"a": {"b": 1, "bc": 2}, "ab": 3}));
        let kept = filter_fields(fields, &["a.b".to_string(), "ab".to_string()]);
        assert_eq!(kept.keys().collect::<Vec<_>>(), vec!["a.b", "ab"]);

        let fields = index(&json!({"items": [{"x": 1}]}));
        let kept = filter_fields(fields, &["items".to_string()]);
        assert_eq!(kept.len(), 2);
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(|n| json!(n)),
            "[a-z]{0,4}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-c]{1,2}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    fn arb_primitive() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(|n| json!(n)),
            "[a-z]{0,4}".prop_map(Value::String),
        ]
    }

    proptest! {
        #[test]
        fn prop_index_is_deterministic(value in arb_json()) {
            prop_assert_eq!(index(&value), index(&value));
        }

        #[test]
        fn prop_compressed_type_policy(items in prop::collection::vec(arb_primitive(), 1..8)) {
            let fields = index(&json!({ "arr": items.clone() }));
            let compressed = &fields["arr.[*]"];
            let observed: BTreeSet<JsonType> =
                items.iter().filter_map(JsonType::of_leaf).collect();
            prop_assert_eq!(compressed.array_types.as_ref(), Some(&observed));
            if observed.len() == 1 {
                prop_assert_eq!(Some(&compressed.field_type), observed.iter().next());
            } else {
                prop_assert_eq!(compressed.field_type, JsonType::String);
            }
            prop_assert_eq!(fields.len(), items.len() + 1);
        }

        #[test]
        fn prop_no_entries_under_empty_arrays(value in arb_json()) {
            let doc = json!({ "empty": [], "other": value });
            let fields = index(&doc);
            prop_assert!(!fields.keys().any(|k| k == "empty" || k.starts_with("empty.")));
        }
    }
}
