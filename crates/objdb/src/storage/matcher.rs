//! Evaluates MongoDB query documents against JSON documents.
//!
//! Covers the subset the document compiler emits: logical operators, field
//! operators with implicit array traversal, and `$expr` aggregation
//! expressions. Comparisons follow BSON ordering across types.

use objdb_api::{Result, StoreError};
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

/// BSON sort rank: null (and missing) < numbers < strings < objects < arrays < booleans.
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    value.as_f64()
}

/// Total order over JSON values, BSON-style.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            for ((lk, lv), (rk, rv)) in x.iter().zip(y.iter()) {
                let ord = compare_values(lv, rv).then_with(|| lk.cmp(rk));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => Ordering::Equal,
    }
}

/// Structural equality with numbers compared by value (`1 == 1.0`).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => as_f64(a) == as_f64(b) || x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => a == b,
    }
}

/// Read a dotted path the way sort keys do: no array traversal, numeric
/// segments index arrays. Missing reads as null.
pub fn lookup_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Whether `doc` satisfies `filter`.
pub fn matches(doc: &Value, filter: &Value) -> Result<bool> {
    let Value::Object(clauses) = filter else {
        return Err(StoreError::validation("filter must be a document"));
    };
    for (key, condition) in clauses {
        let ok = match key.as_str() {
            "$and" => logical_list(condition)?
                .iter()
                .try_fold(true, |acc, f| Ok::<_, StoreError>(acc && matches(doc, f)?))?,
            "$or" => {
                let mut any = false;
                for f in logical_list(condition)? {
                    if matches(doc, f)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for f in logical_list(condition)? {
                    if matches(doc, f)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            "$expr" => truthy(&Evaluator::new(doc).eval(condition)?),
            op if op.starts_with('$') => {
                return Err(StoreError::validation(format!(
                    "unsupported top-level operator {}",
                    op
                )));
            }
            path => field_matches(doc, path, condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn logical_list(condition: &Value) -> Result<&Vec<Value>> {
    condition
        .as_array()
        .ok_or_else(|| StoreError::validation("logical operators take a list of filters"))
}

/// Values reached by a dotted path, traversing arrays of documents.
///
/// `None` marks a branch where the path is missing.
fn resolve<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<Option<&'a Value>>) {
    let Some((segment, rest)) = segments.split_first() else {
        out.push(Some(value));
        return;
    };
    match value {
        Value::Object(map) => match map.get(*segment) {
            Some(child) => resolve(child, rest, out),
            None => out.push(None),
        },
        Value::Array(items) => {
            if let Some(child) = segment.parse::<usize>().ok().and_then(|i| items.get(i)) {
                resolve(child, rest, out);
            }
            for item in items.iter().filter(|i| i.is_object()) {
                resolve(item, segments, out);
            }
        }
        _ => out.push(None),
    }
}

fn is_operator_doc(condition: &Value) -> bool {
    match condition {
        Value::Object(map) => !map.is_empty() && map.keys().all(|k| k.starts_with('$')),
        _ => false,
    }
}

fn field_matches(doc: &Value, path: &str, condition: &Value) -> Result<bool> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut found = Vec::new();
    resolve(doc, &segments, &mut found);
    if found.is_empty() {
        found.push(None);
    }

    let Some(operators) = condition.as_object().filter(|_| is_operator_doc(condition)) else {
        return Ok(eq_any(&found, condition));
    };

    for (op, operand) in operators {
        let ok = match op.as_str() {
            "$eq" => eq_any(&found, operand),
            "$ne" => !eq_any(&found, operand),
            "$in" => in_list(&found, operand)?,
            "$nin" => !in_list(&found, operand)?,
            "$exists" => {
                let present = found.iter().any(Option::is_some);
                present == truthy(operand)
            }
            "$gt" | "$gte" | "$lt" | "$lte" => range_any(&found, op, operand),
            "$regex" => regex_any(&found, operand, operators.get("$options"))?,
            "$options" => true,
            other => {
                return Err(StoreError::validation(format!(
                    "unsupported field operator {}",
                    other
                )));
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Candidates plus, for arrays, their direct elements.
fn expanded<'a>(found: &'a [Option<&'a Value>]) -> impl Iterator<Item = &'a Value> + 'a {
    found.iter().flatten().flat_map(|v| {
        let elements: &[Value] = match v {
            Value::Array(items) => items.as_slice(),
            _ => &[],
        };
        std::iter::once(*v).chain(elements.iter())
    })
}

fn eq_any(found: &[Option<&Value>], operand: &Value) -> bool {
    if operand.is_null() && found.iter().any(Option::is_none) {
        return true;
    }
    expanded(found).any(|v| values_equal(v, operand))
}

fn in_list(found: &[Option<&Value>], operand: &Value) -> Result<bool> {
    let list = operand
        .as_array()
        .ok_or_else(|| StoreError::validation("$in/$nin need a list"))?;
    Ok(list.iter().any(|candidate| eq_any(found, candidate)))
}

fn same_class(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Number(_), Value::Number(_)) | (Value::String(_), Value::String(_))
    )
}

fn range_any(found: &[Option<&Value>], op: &str, bound: &Value) -> bool {
    expanded(found)
        .filter(|v| same_class(v, bound))
        .any(|v| cmp_holds(op, compare_values(v, bound)))
}

fn cmp_holds(op: &str, ord: Ordering) -> bool {
    match op {
        "$gt" => ord == Ordering::Greater,
        "$gte" => ord != Ordering::Less,
        "$lt" => ord == Ordering::Less,
        "$lte" => ord != Ordering::Greater,
        _ => false,
    }
}

fn build_regex(pattern: &Value, options: Option<&Value>) -> Result<Regex> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| StoreError::validation("$regex needs a string"))?;
    let insensitive = options
        .and_then(Value::as_str)
        .is_some_and(|o| o.contains('i'));
    RegexBuilder::new(pattern)
        .case_insensitive(insensitive)
        .build()
        .map_err(|e| StoreError::validation(format!("invalid $regex: {}", e)))
}

fn regex_any(found: &[Option<&Value>], pattern: &Value, options: Option<&Value>) -> Result<bool> {
    let re = build_regex(pattern, options)?;
    Ok(expanded(found).any(|v| v.as_str().is_some_and(|s| re.is_match(s))))
}

/// Aggregation truthiness: false, null, missing and zero are false.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}

/// Evaluates aggregation expressions against one document.
struct Evaluator<'a> {
    root: &'a Value,
    vars: HashMap<String, Value>,
}

impl<'a> Evaluator<'a> {
    fn new(root: &'a Value) -> Self {
        Self {
            root,
            vars: HashMap::new(),
        }
    }

    fn eval(&mut self, expr: &Value) -> Result<Value> {
        match expr {
            Value::String(s) if s.starts_with("$$") => {
                let mut parts = s[2..].splitn(2, '.');
                let name = parts.next().unwrap_or_default();
                let base = self.vars.get(name).cloned().ok_or_else(|| {
                    StoreError::validation(format!("undefined variable $${}", name))
                })?;
                Ok(match parts.next() {
                    Some(rest) => expr_path(&base, rest),
                    None => base,
                })
            }
            Value::String(s) if s.starts_with('$') => Ok(expr_path(self.root, &s[1..])),
            Value::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<Vec<_>>>()?,
            )),
            Value::Object(map) => match map.iter().next() {
                Some((op, args)) if map.len() == 1 && op.starts_with('$') => self.operator(op, args),
                _ => {
                    let mut out = Map::new();
                    for (k, v) in map {
                        out.insert(k.clone(), self.eval(v)?);
                    }
                    Ok(Value::Object(out))
                }
            },
            literal => Ok(literal.clone()),
        }
    }

    /// Positional arguments; a bare argument counts as a one-element list.
    fn args(&mut self, args: &Value) -> Result<Vec<Value>> {
        match args {
            Value::Array(items) => items.iter().map(|a| self.eval(a)).collect(),
            other => Ok(vec![self.eval(other)?]),
        }
    }

    fn pair(&mut self, op: &str, args: &Value) -> Result<(Value, Value)> {
        let mut values = self.args(args)?;
        if values.len() != 2 {
            return Err(StoreError::validation(format!("{} takes two arguments", op)));
        }
        let right = values.pop().unwrap_or(Value::Null);
        let left = values.pop().unwrap_or(Value::Null);
        Ok((left, right))
    }

    fn named<'v>(args: &'v Value, name: &str) -> Option<&'v Value> {
        args.as_object().and_then(|m| m.get(name))
    }

    fn operator(&mut self, op: &str, args: &Value) -> Result<Value> {
        match op {
            "$and" => {
                let raw = args.as_array().cloned().unwrap_or_else(|| vec![args.clone()]);
                for item in &raw {
                    if !truthy(&self.eval(item)?) {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            "$or" => {
                let raw = args.as_array().cloned().unwrap_or_else(|| vec![args.clone()]);
                for item in &raw {
                    if truthy(&self.eval(item)?) {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            "$not" => {
                let values = self.args(args)?;
                Ok(Value::Bool(!values.first().is_some_and(truthy)))
            }
            "$eq" | "$ne" => {
                let (l, r) = self.pair(op, args)?;
                let equal = compare_values(&l, &r) == Ordering::Equal && type_rank(&l) == type_rank(&r);
                Ok(Value::Bool(if op == "$eq" { equal } else { !equal }))
            }
            "$gt" | "$gte" | "$lt" | "$lte" => {
                let (l, r) = self.pair(op, args)?;
                Ok(Value::Bool(cmp_holds(op, compare_values(&l, &r))))
            }
            "$cond" => {
                let (cond, then, otherwise) = match args {
                    Value::Array(items) if items.len() == 3 => (&items[0], &items[1], &items[2]),
                    Value::Object(_) => match (
                        Self::named(args, "if"),
                        Self::named(args, "then"),
                        Self::named(args, "else"),
                    ) {
                        (Some(c), Some(t), Some(e)) => (c, t, e),
                        _ => return Err(StoreError::validation("$cond needs if/then/else")),
                    },
                    _ => return Err(StoreError::validation("$cond needs three arguments")),
                };
                if truthy(&self.eval(cond)?) {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            "$ifNull" => {
                for value in self.args(args)? {
                    if !value.is_null() {
                        return Ok(value);
                    }
                }
                Ok(Value::Null)
            }
            "$isArray" => {
                let values = self.args(args)?;
                Ok(Value::Bool(values.first().is_some_and(Value::is_array)))
            }
            "$isNumber" => {
                let values = self.args(args)?;
                Ok(Value::Bool(values.first().is_some_and(Value::is_number)))
            }
            "$type" => {
                let values = self.args(args)?;
                Ok(Value::String(
                    type_name(values.first().unwrap_or(&Value::Null)).to_string(),
                ))
            }
            "$convert" => self.convert(args),
            "$map" => {
                let (Some(input), Some(body)) = (Self::named(args, "input"), Self::named(args, "in"))
                else {
                    return Err(StoreError::validation("$map needs input and in"));
                };
                let var = Self::named(args, "as")
                    .and_then(Value::as_str)
                    .unwrap_or("this")
                    .to_string();
                let Value::Array(items) = self.eval(input)? else {
                    return Ok(Value::Null);
                };
                let previous = self.vars.get(&var).cloned();
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    self.vars.insert(var.clone(), item);
                    out.push(self.eval(body)?);
                }
                match previous {
                    Some(v) => self.vars.insert(var, v),
                    None => self.vars.remove(&var),
                };
                Ok(Value::Array(out))
            }
            "$anyElementTrue" => {
                let values = self.args(args)?;
                match values.first() {
                    Some(Value::Array(items)) => Ok(Value::Bool(items.iter().any(truthy))),
                    _ => Err(StoreError::validation("$anyElementTrue needs an array")),
                }
            }
            "$arrayElemAt" => {
                let (array, index) = self.pair(op, args)?;
                let (Value::Array(items), Some(i)) = (array, index.as_i64()) else {
                    return Ok(Value::Null);
                };
                let i = if i < 0 { items.len() as i64 + i } else { i };
                Ok(usize::try_from(i)
                    .ok()
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or(Value::Null))
            }
            "$getField" => {
                let (field, input) = match args {
                    Value::String(f) => (f.clone(), self.root.clone()),
                    _ => {
                        let field = Self::named(args, "field")
                            .and_then(Value::as_str)
                            .ok_or_else(|| StoreError::validation("$getField needs a field"))?
                            .to_string();
                        let input = match Self::named(args, "input") {
                            Some(i) => self.eval(i)?,
                            None => self.root.clone(),
                        };
                        (field, input)
                    }
                };
                Ok(input.get(&field).cloned().unwrap_or(Value::Null))
            }
            "$regexMatch" => {
                let input = match Self::named(args, "input") {
                    Some(i) => self.eval(i)?,
                    None => return Err(StoreError::validation("$regexMatch needs an input")),
                };
                let pattern = match Self::named(args, "regex") {
                    Some(r) => self.eval(r)?,
                    None => Value::Null,
                };
                let options = match Self::named(args, "options") {
                    Some(o) => Some(self.eval(o)?),
                    None => None,
                };
                let re = build_regex(&pattern, options.as_ref())?;
                match input {
                    Value::String(s) => Ok(Value::Bool(re.is_match(&s))),
                    Value::Null => Ok(Value::Bool(false)),
                    _ => Err(StoreError::validation("$regexMatch needs a string input")),
                }
            }
            "$literal" => Ok(args.clone()),
            other => Err(StoreError::validation(format!(
                "unsupported expression operator {}",
                other
            ))),
        }
    }

    fn convert(&mut self, args: &Value) -> Result<Value> {
        let input = match Self::named(args, "input") {
            Some(i) => self.eval(i)?,
            None => return Err(StoreError::validation("$convert needs an input")),
        };
        let to = Self::named(args, "to").and_then(Value::as_str).unwrap_or("double");
        if to != "double" {
            return Err(StoreError::validation(format!(
                "$convert to {} is not supported",
                to
            )));
        }
        let fallback = |this: &mut Self, name: &str| -> Result<Value> {
            match Self::named(args, name) {
                Some(v) => this.eval(v),
                None => Ok(Value::Null),
            }
        };
        let converted = match &input {
            Value::Null => return fallback(self, "onNull"),
            Value::Number(n) => n.as_f64(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => serde_json::from_str::<f64>(s).ok().filter(|f| f.is_finite()),
            _ => None,
        };
        match converted.and_then(serde_json::Number::from_f64) {
            Some(n) => Ok(Value::Number(n)),
            None => fallback(self, "onError"),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "double",
        Value::Number(n) => match n.as_i64() {
            Some(i) if i32::try_from(i).is_ok() => "int",
            _ => "long",
        },
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Expression field paths map over arrays of documents and do not index them.
fn expr_path(value: &Value, path: &str) -> Value {
    path.split('.').fold(value.clone(), |current, segment| match current {
        Value::Object(map) => map.get(segment).cloned().unwrap_or(Value::Null),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::Object(map) => map.get(segment).cloned(),
                    Value::Array(_) => Some(expr_path(item, segment)),
                    _ => None,
                })
                .collect(),
        ),
        _ => Value::Null,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "id": "o1",
            "deletedAt": null,
            "objRecord": {
                "name": "Alice Smith",
                "score": "42",
                "level": 7,
                "tags": ["red", "blue"],
                "items": [{"sku": "A", "price": 5}, {"sku": "B", "price": "12.5"}],
                "points": [1, 2, 3]
            }
        })
    }

    fn check(filter: Value) -> bool {
        matches(&doc(), &filter).unwrap()
    }

    #[test]
    fn test_query_operators_traverse_arrays() {
        assert!(check(json!({"objRecord.tags": {"$eq": "red"}})));
        assert!(check(json!({"objRecord.tags": ["red", "blue"]})));
        assert!(check(json!({"objRecord.items.sku": {"$in": ["B", "Z"]}})));
        assert!(!check(json!({"objRecord.tags": {"$ne": "blue"}})));
        assert!(check(json!({"objRecord.items.sku": {"$nin": ["C"]}})));
        assert!(check(json!({"objRecord.points.1": {"$eq": 2}})));
        assert!(check(json!({"objRecord.level": {"$eq": 7.0}})));
    }

    #[test]
    fn test_null_and_exists() {
        assert!(check(json!({"deletedAt": {"$eq": null}})));
        assert!(check(json!({"objRecord.missing": {"$eq": null}})));
        assert!(check(json!({"objRecord.missing": {"$exists": false}})));
        assert!(check(json!({"objRecord.items.price": {"$exists": true}})));
        assert!(!check(json!({"deletedAt": {"$ne": null}})));
    }

    #[test]
    fn test_ranges_stay_within_type_class() {
        assert!(check(json!({"objRecord.level": {"$gte": 7, "$lt": 8}})));
        assert!(!check(json!({"objRecord.score": {"$gt": 1}})));
        assert!(check(json!({"objRecord.name": {"$gt": "A"}})));
    }

    #[test]
    fn test_regex() {
        assert!(check(json!({"objRecord.name": {"$regex": "Smith"}})));
        assert!(!check(json!({"objRecord.name": {"$regex": "smith"}})));
        assert!(check(json!({"objRecord.name": {"$regex": "smith", "$options": "i"}})));
        assert!(check(json!({"objRecord.tags": {"$regex": "lu"}})));
    }

    #[test]
    fn test_logical_operators() {
        assert!(check(json!({"$and": [{"id": "o1"}, {"objRecord.level": 7}]})));
        assert!(check(json!({"$or": [{"id": "x"}, {"objRecord.level": 7}]})));
        assert!(!check(json!({"$nor": [{"id": "o1"}]})));
        assert!(check(json!({})));
    }

    #[test]
    fn test_expr_numeric_coercion() {
        let coerced = json!({"$expr": {"$gt": [
            {"$convert": {"input": "$objRecord.score", "to": "double", "onError": null, "onNull": null}},
            40
        ]}});
        assert!(check(coerced));

        let any_price = json!({"$expr": {"$anyElementTrue": [{"$map": {
            "input": {"$cond": [{"$isArray": ["$objRecord.items"]}, "$objRecord.items", []]},
            "as": "el0",
            "in": {"$gte": [
                {"$convert": {"input": "$$el0.price", "to": "double", "onError": null, "onNull": null}},
                10
            ]}
        }}]}});
        assert!(check(any_price));

        let elem = json!({"$expr": {"$eq": [{"$arrayElemAt": ["$objRecord.points", -1]}, 3]}});
        assert!(check(elem));
    }

    #[test]
    fn test_get_field_reads_whole_values() {
        let tags = json!({"$getField": {"field": "tags", "input": "$objRecord"}});
        assert!(!check(json!({"$expr": {"$eq": [tags, {"$literal": "red"}]}})));
        assert!(check(json!({"$expr": {"$eq": [tags, {"$literal": ["red", "blue"]}]}})));

        let skus = json!({"$getField": {"field": "sku", "input":
            {"$getField": {"field": "items", "input": "$objRecord"}}}});
        assert!(check(json!({"$expr": {"$eq": [skus, null]}})));
    }

    #[test]
    fn test_expr_helpers() {
        let mut eval = Evaluator::new(&Value::Null);
        assert_eq!(eval.eval(&json!({"$type": "abc"})).unwrap(), json!("string"));
        assert_eq!(eval.eval(&json!({"$type": 1.5})).unwrap(), json!("double"));
        assert_eq!(eval.eval(&json!({"$isNumber": 3})).unwrap(), json!(true));
        assert_eq!(eval.eval(&json!({"$ifNull": [null, 4]})).unwrap(), json!(4));
        assert_eq!(
            eval.eval(&json!({"$convert": {"input": "x", "to": "double", "onError": -1}}))
                .unwrap(),
            json!(-1)
        );
        assert_eq!(
            eval.eval(&json!({"$getField": {"field": "a", "input": {"$literal": {"a": 2}}}}))
                .unwrap(),
            json!(2)
        );
        assert_eq!(
            eval.eval(&json!({"$regexMatch": {"input": "Ann Smith", "regex": "smith", "options": "i"}}))
                .unwrap(),
            json!(true)
        );
        assert!(eval
            .eval(&json!({"$regexMatch": {"input": ["Smith"], "regex": "S"}}))
            .unwrap_err()
            .is_validation());
        assert!(eval.eval(&json!({"$bogus": 1})).unwrap_err().is_validation());
    }

    #[test]
    fn test_bson_ordering() {
        let ordered = [
            json!(null),
            json!(-1),
            json!(2.5),
            json!("a"),
            json!({"a": 1}),
            json!([1]),
            json!(false),
            json!(true),
        ];
        for pair in ordered.windows(2) {
            assert_eq!(compare_values(&pair[0], &pair[1]), Ordering::Less, "{:?}", pair);
        }
    }

    #[test]
    fn test_lookup_path() {
        let d = doc();
        assert_eq!(lookup_path(&d, "objRecord.points.2"), Some(&json!(3)));
        assert_eq!(lookup_path(&d, "objRecord.nope"), None);
    }

    #[test]
    fn test_unknown_operator_is_rejected() {
        assert!(matches(&doc(), &json!({"a": {"$near": 1}})).is_err());
        assert!(matches(&doc(), &json!({"$where": "1"})).is_err());
    }
}
