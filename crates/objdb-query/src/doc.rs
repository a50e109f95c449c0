//! Compiler for the document backend (MongoDB query dialect).
//!
//! Filters are MongoDB query documents. Payload predicates compile to `$expr`
//! aggregation expressions that read exactly the value at the path
//! (`$getField`/`$arrayElemAt`), so arrays are never traversed implicitly;
//! each `[*]` becomes `$map`/`$anyElementTrue` over the array's elements.
//! `exists`, metadata columns and sorting use plain dotted field paths.

use crate::{CmpOp, FieldPredicate, QueryCompiler, SortKey, SortTarget};
use objdb_api::{Column, FieldPath, PathSegment, Result, SortDirection};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const DOC_ROOT: &str = "objRecord";

/// Ordered sort keys.
pub type DocSort = Vec<(String, SortDirection)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocPagination {
    pub skip: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Default)]
pub struct DocQueryCompiler;

impl DocQueryCompiler {
    pub fn new() -> Self {
        Self
    }
}

fn is_empty_doc(filter: &Value) -> bool {
    matches!(filter, Value::Object(map) if map.is_empty())
}

fn op_doc(key: String, op: &str, operand: Value) -> Value {
    let mut inner = Map::new();
    inner.insert(op.to_string(), operand);
    let mut outer = Map::new();
    outer.insert(key, Value::Object(inner));
    Value::Object(outer)
}

fn cmp_name(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Gt => "$gt",
        CmpOp::Gte => "$gte",
        CmpOp::Lt => "$lt",
        CmpOp::Lte => "$lte",
    }
}

/// Aggregation expression reading exactly the value at `segments` below
/// `root` (`$objRecord`, `$$el0`, ...).
///
/// Keys go through `$getField` and indices through `$arrayElemAt`, so arrays
/// of documents are not traversed and indices only address arrays.
fn value_expr(root: &str, segments: &[PathSegment]) -> Value {
    segments
        .iter()
        .fold(Value::String(root.to_string()), |expr, segment| match segment {
            PathSegment::Key(k) => json!({"$getField": {"field": k, "input": expr}}),
            PathSegment::Index(i) => json!({"$arrayElemAt": [expr, i]}),
            // Callers split at wildcards before reading values
            PathSegment::Wildcard => expr,
        })
}

/// Numbers as-is, strings holding a JSON number literal converted, anything else null.
fn numeric_expr(input: Value) -> Value {
    json!({
        "$cond": [
            {"$or": [
                {"$isNumber": input},
                {"$eq": [{"$type": input}, "string"]}
            ]},
            {"$convert": {"input": input, "to": "double", "onError": null, "onNull": null}},
            null
        ]
    })
}

fn numeric_condition(input: Value, predicate: &FieldPredicate) -> Value {
    let n = numeric_expr(input);
    let mut terms = vec![json!({"$ne": [n, null]})];
    match predicate {
        FieldPredicate::Compare(op, bound) => {
            terms.push(json!({ cmp_name(*op): [n, bound] }));
        }
        FieldPredicate::Between(min, max) => {
            terms.push(json!({"$gte": [n, min]}));
            terms.push(json!({"$lte": [n, max]}));
        }
        _ => {}
    }
    json!({ "$and": terms })
}

fn literal_eq(input: &Value, value: &Value) -> Value {
    json!({"$eq": [input, {"$literal": value}]})
}

fn any_literal(input: &Value, list: &[Value]) -> Value {
    json!({"$or": list.iter().map(|v| literal_eq(input, v)).collect::<Vec<_>>()})
}

/// Positive condition on one value; `None` for `exists`, which keeps the
/// query operator form.
fn value_condition(input: Value, predicate: &FieldPredicate) -> Option<Value> {
    Some(match predicate {
        FieldPredicate::Eq(v) | FieldPredicate::Neq(v) => literal_eq(&input, v),
        FieldPredicate::In(list) | FieldPredicate::NotIn(list) => any_literal(&input, list),
        FieldPredicate::Like {
            needle,
            case_sensitive,
        } => {
            let mut args = Map::new();
            args.insert("input".into(), input.clone());
            args.insert("regex".into(), Value::String(regex::escape(needle)));
            if !case_sensitive {
                args.insert("options".into(), Value::String("i".into()));
            }
            json!({"$and": [
                {"$eq": [{"$type": input}, "string"]},
                {"$regexMatch": args}
            ]})
        }
        FieldPredicate::Compare(..) | FieldPredicate::Between(..) => {
            numeric_condition(input, predicate)
        }
        FieldPredicate::Exists(_) => return None,
    })
}

/// Builds the condition at `segments`, mapping over every array under a `[*]`.
fn condition_at(
    root: &str,
    segments: &[PathSegment],
    depth: usize,
    predicate: &FieldPredicate,
) -> Option<Value> {
    match segments.iter().position(|s| *s == PathSegment::Wildcard) {
        None => value_condition(value_expr(root, segments), predicate),
        Some(pos) => {
            let array = value_expr(root, &segments[..pos]);
            let var = format!("el{}", depth);
            let inner = condition_at(
                &format!("$${}", var),
                &segments[pos + 1..],
                depth + 1,
                predicate,
            )?;
            Some(json!({
                "$anyElementTrue": [{
                    "$map": {
                        "input": {"$cond": [{"$isArray": [array]}, array, []]},
                        "as": var,
                        "in": inner
                    }
                }]
            }))
        }
    }
}

fn doc_path(path: &FieldPath) -> String {
    let rest = path.without_wildcards();
    if rest.is_empty() {
        DOC_ROOT.to_string()
    } else {
        format!("{}.{}", DOC_ROOT, rest)
    }
}

fn query_operator(key: String, predicate: &FieldPredicate) -> Value {
    match predicate {
        FieldPredicate::Eq(v) => op_doc(key, "$eq", v.clone()),
        FieldPredicate::Neq(v) => op_doc(key, "$ne", v.clone()),
        FieldPredicate::In(list) => op_doc(key, "$in", Value::Array(list.clone())),
        FieldPredicate::NotIn(list) => op_doc(key, "$nin", Value::Array(list.clone())),
        FieldPredicate::Exists(flag) => op_doc(key, "$exists", Value::Bool(*flag)),
        FieldPredicate::Like {
            needle,
            case_sensitive,
        } => {
            let mut inner = Map::new();
            inner.insert("$regex".into(), Value::String(regex::escape(needle)));
            if !case_sensitive {
                inner.insert("$options".into(), Value::String("i".into()));
            }
            let mut outer = Map::new();
            outer.insert(key, Value::Object(inner));
            Value::Object(outer)
        }
        FieldPredicate::Compare(op, bound) => op_doc(key, cmp_name(*op), json!(bound)),
        FieldPredicate::Between(min, max) => {
            json!({ key: {"$gte": min, "$lte": max} })
        }
    }
}

impl QueryCompiler for DocQueryCompiler {
    type Filter = Value;
    type Sort = DocSort;
    type Pagination = DocPagination;

    fn always_true(&self) -> Value {
        json!({})
    }

    fn and_all(&self, filters: Vec<Value>) -> Value {
        let mut kept: Vec<Value> = filters.into_iter().filter(|f| !is_empty_doc(f)).collect();
        match kept.len() {
            0 => self.always_true(),
            1 => kept.remove(0),
            _ => json!({ "$and": kept }),
        }
    }

    fn compile_payload(&self, path: &FieldPath, predicate: &FieldPredicate) -> Result<Value> {
        let root = format!("${}", DOC_ROOT);
        let Some(condition) = condition_at(&root, path.segments(), 0, predicate) else {
            return Ok(query_operator(doc_path(path), predicate));
        };
        // Negation sits outside the element scopes: no element matches
        let condition = match predicate {
            FieldPredicate::Neq(_) | FieldPredicate::NotIn(_) => json!({"$not": [condition]}),
            _ => condition,
        };
        Ok(json!({ "$expr": condition }))
    }

    fn compile_column(&self, column: Column, predicate: &FieldPredicate) -> Result<Value> {
        Ok(query_operator(column.key().to_string(), predicate))
    }

    fn id_after(&self, cursor: &str) -> Value {
        op_doc(Column::Id.key().to_string(), "$gt", Value::String(cursor.to_string()))
    }

    fn compile_sort(&self, keys: &[SortKey]) -> Result<DocSort> {
        Ok(keys
            .iter()
            .map(|k| {
                let key = match &k.target {
                    SortTarget::Column(c) => c.key().to_string(),
                    SortTarget::Payload(p) => doc_path(p),
                };
                (key, k.direction)
            })
            .collect())
    }

    fn compile_pagination(&self, offset: u64, limit: u64) -> DocPagination {
        DocPagination {
            skip: offset,
            limit,
        }
    }
}

#[cfg(test)]
#[path = "doc_tests.rs"]
mod tests;
