//! Payload merge strategies used by update and upsert.

use objdb_api::UpdateWay;
use serde_json::Value;

/// Combine an existing payload with an incoming one.
///
/// Objects merge key by key for every strategy except `Replace`. Scalars and
/// mismatched shapes always take the incoming value.
pub fn merge_values(existing: &Value, incoming: &Value, way: UpdateWay) -> Value {
    match way {
        UpdateWay::Replace => incoming.clone(),
        _ => merge_inner(existing, incoming, way),
    }
}

fn merge_inner(existing: &Value, incoming: &Value, way: UpdateWay) -> Value {
    match (existing, incoming) {
        (Value::Object(old), Value::Object(new)) => {
            let mut out = old.clone();
            for (key, value) in new {
                let merged = match old.get(key) {
                    Some(prev) => merge_inner(prev, value, way),
                    None => value.clone(),
                };
                out.insert(key.clone(), merged);
            }
            Value::Object(out)
        }
        (Value::Array(old), Value::Array(new)) => merge_arrays(old, new, way),
        (Value::Array(old), _) if way == UpdateWay::MergeButKeepArrays => {
            Value::Array(old.clone())
        }
        _ => incoming.clone(),
    }
}

fn merge_arrays(old: &[Value], new: &[Value], way: UpdateWay) -> Value {
    match way {
        UpdateWay::MergeButReplaceArrays | UpdateWay::Replace => Value::Array(new.to_vec()),
        UpdateWay::MergeButConcatArrays => {
            Value::Array(old.iter().chain(new.iter()).cloned().collect())
        }
        UpdateWay::MergeButKeepArrays => Value::Array(old.to_vec()),
        UpdateWay::Merge => {
            // Index-wise: overlapping slots merge, the longer side supplies the tail
            let len = old.len().max(new.len());
            let merged = (0..len)
                .map(|i| match (old.get(i), new.get(i)) {
                    (Some(a), Some(b)) => merge_inner(a, b, way),
                    (Some(a), None) => a.clone(),
                    (None, Some(b)) => b.clone(),
                    (None, None) => Value::Null,
                })
                .collect();
            Value::Array(merged)
        }
    }
}
