//! Compiler for the relational backend (SQLite JSON1).
//!
//! Every atom evaluates to 0 or 1, never NULL, so negation and AND-ing are
//! always safe. Paths and literals are bound parameters; the only identifiers
//! spliced into SQL are the fixed column names of the `objs` table.

use crate::{CmpOp, FieldPredicate, QueryCompiler, SortKey, SortTarget};
use objdb_api::{Column, FieldPath, PathSegment, Result, SortDirection};
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write;

/// Column holding the JSON payload.
pub const DOC_COLUMN: &str = "obj_record";

const ALWAYS_TRUE: &str = "1 = 1";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl SqlValue {
    pub fn from_number(n: &serde_json::Number) -> Self {
        match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlPredicate {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl SqlPredicate {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn always_true() -> Self {
        Self::new(ALWAYS_TRUE, vec![])
    }

    pub fn is_always_true(&self) -> bool {
        self.sql == ALWAYS_TRUE && self.params.is_empty()
    }

    fn not(self) -> Self {
        Self::new(format!("NOT ({})", self.sql), self.params)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlOrderBy {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlPagination {
    pub limit: u64,
    pub offset: u64,
}

impl SqlPagination {
    pub fn sql(&self) -> &'static str {
        "LIMIT ? OFFSET ?"
    }

    pub fn params(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Integer(self.limit as i64),
            SqlValue::Integer(self.offset as i64),
        ]
    }
}

/// SQL fragment with its parameters, in textual order.
#[derive(Debug, Clone, Default)]
struct Expr {
    sql: String,
    params: Vec<SqlValue>,
}

#[derive(Default)]
struct Builder {
    sql: String,
    params: Vec<SqlValue>,
}

impl Builder {
    fn text(mut self, s: &str) -> Self {
        self.sql.push_str(s);
        self
    }

    fn expr(mut self, e: &Expr) -> Self {
        self.sql.push_str(&e.sql);
        self.params.extend(e.params.iter().cloned());
        self
    }

    fn param(mut self, v: SqlValue) -> Self {
        self.sql.push('?');
        self.params.push(v);
        self
    }

    fn param_list(mut self, values: Vec<SqlValue>) -> Self {
        let placeholders = vec!["?"; values.len()].join(", ");
        self.sql.push_str(&placeholders);
        self.params.extend(values);
        self
    }

    fn into_expr(self) -> Expr {
        Expr {
            sql: self.sql,
            params: self.params,
        }
    }

    fn build(self) -> SqlPredicate {
        SqlPredicate::new(self.sql, self.params)
    }

    /// Wrap a condition so it yields 0/1 instead of NULL.
    fn flag(self) -> SqlPredicate {
        SqlPredicate::new(
            format!("CASE WHEN {} THEN 1 ELSE 0 END", self.sql),
            self.params,
        )
    }
}

fn b() -> Builder {
    Builder::default()
}

/// JSON path suffix: `."a"[0]."b"`. Wildcards never reach here.
fn json_path(segments: &[PathSegment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            PathSegment::Key(k) => {
                let _ = write!(out, ".\"{}\"", k);
            }
            PathSegment::Index(i) => {
                let _ = write!(out, "[{}]", i);
            }
            PathSegment::Wildcard => {}
        }
    }
    out
}

/// Where a payload path is addressed from: the document root or an array
/// element bound by an enclosing `json_each`.
enum Base<'a> {
    Root,
    Element(&'a str),
}

fn path_expr(base: &Base<'_>, segments: &[PathSegment]) -> Expr {
    match base {
        Base::Root => b()
            .param(SqlValue::Text(format!("${}", json_path(segments))))
            .into_expr(),
        Base::Element(alias) if segments.is_empty() => {
            b().text(&format!("{}.fullkey", alias)).into_expr()
        }
        Base::Element(alias) => b()
            .text(&format!("{}.fullkey || ", alias))
            .param(SqlValue::Text(json_path(segments)))
            .into_expr(),
    }
}

/// A comparable value: its type expression, its value expression and
/// whether types are reported by `json_type` or by `typeof`.
struct Operand {
    ty: Expr,
    value: Expr,
    json: bool,
}

impl Operand {
    fn payload(path: &Expr) -> Self {
        let call = |func: &str| {
            b().text(&format!("{}({}, ", func, DOC_COLUMN))
                .expr(path)
                .text(")")
                .into_expr()
        };
        Self {
            ty: call("json_type"),
            value: call("json_extract"),
            json: true,
        }
    }

    fn column(column: Column) -> Self {
        let name = column.sql_name();
        Self {
            ty: b().text(&format!("typeof({})", name)).into_expr(),
            value: b().text(name).into_expr(),
            json: false,
        }
    }

    fn numeric_types(&self) -> Builder {
        b().expr(&self.ty).text(" IN ('integer', 'real')")
    }

    fn eq(&self, value: &Value) -> SqlPredicate {
        match value {
            Value::Null if self.json => b()
                .text("IFNULL(")
                .expr(&self.ty)
                .text(", 'null') = 'null'")
                .flag(),
            Value::Null => b().expr(&self.value).text(" IS NULL").build(),
            Value::Bool(flag) if self.json => b()
                .expr(&self.ty)
                .text(if *flag { " = 'true'" } else { " = 'false'" })
                .flag(),
            Value::Bool(flag) => b()
                .expr(&self.ty)
                .text(" = 'integer' AND ")
                .expr(&self.value)
                .text(" = ")
                .param(SqlValue::Bool(*flag))
                .flag(),
            Value::Number(n) => self
                .numeric_types()
                .text(" AND ")
                .expr(&self.value)
                .text(" = ")
                .param(SqlValue::from_number(n))
                .flag(),
            Value::String(s) => b()
                .expr(&self.ty)
                .text(" = 'text' AND ")
                .expr(&self.value)
                .text(" = ")
                .param(SqlValue::Text(s.clone()))
                .flag(),
            Value::Array(_) | Value::Object(_) if self.json => {
                let kind = if value.is_array() { "array" } else { "object" };
                b().expr(&self.ty)
                    .text(&format!(" = '{}' AND ", kind))
                    .expr(&self.value)
                    .text(" = json(")
                    .param(SqlValue::Text(value.to_string()))
                    .text(")")
                    .flag()
            }
            // Container-valued columns are stored as serialized JSON text
            Value::Array(_) | Value::Object(_) => b()
                .expr(&self.ty)
                .text(" = 'text' AND ")
                .expr(&self.value)
                .text(" = ")
                .param(SqlValue::Text(value.to_string()))
                .flag(),
        }
    }

    /// Strings and numbers are grouped into `IN (...)` lists to keep the
    /// expression tree shallow; other literals fall back to equality atoms.
    fn one_of(&self, values: &[Value]) -> SqlPredicate {
        let mut strings = Vec::new();
        let mut numbers = Vec::new();
        let mut others = Vec::new();
        for value in values {
            match value {
                Value::String(s) => strings.push(SqlValue::Text(s.clone())),
                Value::Number(n) => numbers.push(SqlValue::from_number(n)),
                other => others.push(other),
            }
        }

        let mut alternatives = Vec::new();
        if !strings.is_empty() {
            alternatives.push(
                b().expr(&self.ty)
                    .text(" = 'text' AND ")
                    .expr(&self.value)
                    .text(" IN (")
                    .param_list(strings)
                    .text(")")
                    .flag(),
            );
        }
        if !numbers.is_empty() {
            alternatives.push(
                self.numeric_types()
                    .text(" AND ")
                    .expr(&self.value)
                    .text(" IN (")
                    .param_list(numbers)
                    .text(")")
                    .flag(),
            );
        }
        alternatives.extend(others.into_iter().map(|v| self.eq(v)));

        match alternatives.len() {
            0 => SqlPredicate::new("0", vec![]),
            1 => alternatives.remove(0),
            _ => {
                let sql = alternatives
                    .iter()
                    .map(|p| format!("({})", p.sql))
                    .collect::<Vec<_>>()
                    .join(" OR ");
                let params = alternatives.into_iter().flat_map(|p| p.params).collect();
                SqlPredicate::new(format!("CASE WHEN {} THEN 1 ELSE 0 END", sql), params)
            }
        }
    }

    fn like(&self, needle: &str, case_sensitive: bool) -> SqlPredicate {
        let builder = b().expr(&self.ty).text(" = 'text' AND ");
        let builder = if case_sensitive {
            builder
                .text("instr(")
                .expr(&self.value)
                .text(", ")
                .param(SqlValue::Text(needle.to_string()))
                .text(")")
        } else {
            builder
                .text("instr(lower(")
                .expr(&self.value)
                .text("), lower(")
                .param(SqlValue::Text(needle.to_string()))
                .text("))")
        };
        builder.text(" > 0").flag()
    }

    fn exists(&self) -> SqlPredicate {
        let probe = if self.json { &self.ty } else { &self.value };
        b().expr(probe).text(" IS NOT NULL").build()
    }

    /// Numeric view of the operand, NULL when it is not a number.
    ///
    /// Payload strings holding a JSON number literal are coerced; columns are
    /// taken as typed.
    fn numeric(&self) -> Builder {
        if self.json {
            let v = &self.value;
            b().text("CASE ")
                .expr(&self.ty)
                .text(" WHEN 'integer' THEN ")
                .expr(v)
                .text(" WHEN 'real' THEN ")
                .expr(v)
                .text(" WHEN 'text' THEN CASE WHEN json_valid(")
                .expr(v)
                .text(") THEN CASE WHEN json_type(")
                .expr(v)
                .text(") IN ('integer', 'real') THEN CAST(")
                .expr(v)
                .text(" AS REAL) END END END")
        } else {
            b().text("CASE WHEN ")
                .expr(&self.ty)
                .text(" IN ('integer', 'real') THEN ")
                .expr(&self.value)
                .text(" END")
        }
    }

    fn compare(&self, op: CmpOp, bound: f64) -> SqlPredicate {
        self.numeric()
            .text(&format!(" {} ", cmp_sql(op)))
            .param(SqlValue::Real(bound))
            .flag()
    }

    fn between(&self, min: f64, max: f64) -> SqlPredicate {
        self.numeric()
            .text(" BETWEEN ")
            .param(SqlValue::Real(min))
            .text(" AND ")
            .param(SqlValue::Real(max))
            .flag()
    }

    fn predicate(&self, predicate: &FieldPredicate) -> SqlPredicate {
        match predicate {
            FieldPredicate::Eq(v) | FieldPredicate::Neq(v) => self.eq(v),
            FieldPredicate::In(list) | FieldPredicate::NotIn(list) => self.one_of(list),
            FieldPredicate::Compare(op, bound) => self.compare(*op, *bound),
            FieldPredicate::Between(min, max) => self.between(*min, *max),
            FieldPredicate::Like {
                needle,
                case_sensitive,
            } => self.like(needle, *case_sensitive),
            FieldPredicate::Exists(_) => self.exists(),
        }
    }
}

fn cmp_sql(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Gt => ">",
        CmpOp::Gte => ">=",
        CmpOp::Lt => "<",
        CmpOp::Lte => "<=",
    }
}

/// Negated predicates compile to the positive atom wrapped in `NOT`, applied
/// outside any `[*]` scope: "no element matches".
fn is_negated(predicate: &FieldPredicate) -> bool {
    matches!(
        predicate,
        FieldPredicate::Neq(_) | FieldPredicate::NotIn(_) | FieldPredicate::Exists(false)
    )
}

#[derive(Debug, Clone, Default)]
pub struct SqlQueryCompiler;

impl SqlQueryCompiler {
    pub fn new() -> Self {
        Self
    }

    /// Compile `atom` at `segments`, opening one `json_each` scope per `[*]`.
    fn scoped(
        &self,
        base: Base<'_>,
        segments: &[PathSegment],
        depth: usize,
        predicate: &FieldPredicate,
    ) -> SqlPredicate {
        match segments.iter().position(|s| *s == PathSegment::Wildcard) {
            None => Operand::payload(&path_expr(&base, segments)).predicate(predicate),
            Some(pos) => {
                let array = path_expr(&base, &segments[..pos]);
                let alias = format!("j{}", depth);
                let inner = self.scoped(
                    Base::Element(&alias),
                    &segments[pos + 1..],
                    depth + 1,
                    predicate,
                );
                let inner = Expr {
                    sql: inner.sql,
                    params: inner.params,
                };
                b().text(&format!("json_type({}, ", DOC_COLUMN))
                    .expr(&array)
                    .text(") = 'array' AND EXISTS (SELECT 1 FROM ")
                    .text(&format!("json_each({}, ", DOC_COLUMN))
                    .expr(&array)
                    .text(&format!(") AS {} WHERE ", alias))
                    .expr(&inner)
                    .text(")")
                    .flag()
            }
        }
    }

    pub fn json_path(path: &FieldPath) -> String {
        format!("${}", json_path(path.segments()))
    }
}

impl QueryCompiler for SqlQueryCompiler {
    type Filter = SqlPredicate;
    type Sort = SqlOrderBy;
    type Pagination = SqlPagination;

    fn always_true(&self) -> SqlPredicate {
        SqlPredicate::always_true()
    }

    fn and_all(&self, filters: Vec<SqlPredicate>) -> SqlPredicate {
        let mut kept: Vec<SqlPredicate> =
            filters.into_iter().filter(|f| !f.is_always_true()).collect();
        match kept.len() {
            0 => self.always_true(),
            1 => kept.remove(0),
            _ => {
                let sql = kept
                    .iter()
                    .map(|f| format!("({})", f.sql))
                    .collect::<Vec<_>>()
                    .join(" AND ");
                let params = kept.into_iter().flat_map(|f| f.params).collect();
                SqlPredicate::new(sql, params)
            }
        }
    }

    fn compile_payload(&self, path: &FieldPath, predicate: &FieldPredicate) -> Result<SqlPredicate> {
        let compiled = self.scoped(Base::Root, path.segments(), 0, predicate);
        Ok(if is_negated(predicate) {
            compiled.not()
        } else {
            compiled
        })
    }

    fn compile_column(&self, column: Column, predicate: &FieldPredicate) -> Result<SqlPredicate> {
        let compiled = Operand::column(column).predicate(predicate);
        Ok(if is_negated(predicate) {
            compiled.not()
        } else {
            compiled
        })
    }

    fn id_after(&self, cursor: &str) -> SqlPredicate {
        SqlPredicate::new(
            format!("{} > ?", Column::Id.sql_name()),
            vec![SqlValue::Text(cursor.to_string())],
        )
    }

    fn compile_sort(&self, keys: &[SortKey]) -> Result<SqlOrderBy> {
        let mut parts = Vec::with_capacity(keys.len());
        let mut params = Vec::new();
        for key in keys {
            let target = match &key.target {
                SortTarget::Column(c) => c.sql_name().to_string(),
                SortTarget::Payload(p) => {
                    params.push(SqlValue::Text(Self::json_path(p)));
                    format!("json_extract({}, ?)", DOC_COLUMN)
                }
            };
            let direction = match key.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            parts.push(format!("{} {}", target, direction));
        }
        Ok(SqlOrderBy {
            sql: parts.join(", "),
            params,
        })
    }

    fn compile_pagination(&self, offset: u64, limit: u64) -> SqlPagination {
        SqlPagination { limit, offset }
    }
}

#[cfg(test)]
#[path = "sql_tests.rs"]
mod tests;
