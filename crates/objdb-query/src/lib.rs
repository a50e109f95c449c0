//! Query compilers.
//!
//! One [`QueryCompiler`] trait carries the backend-independent parts of
//! compilation (logical grouping, metadata routing, sort defaults, pagination
//! validation) as provided methods. Implementations only supply the native
//! primitives.

pub mod doc;
pub mod sql;

pub use doc::{DocPagination, DocQueryCompiler, DocSort};
pub use sql::{SqlOrderBy, SqlPagination, SqlPredicate, SqlQueryCompiler, SqlValue};

use objdb_api::{
    Column, DeletedAtQuery, FieldOp, FieldPath, LogicalQuery, MetaQueryMap, NumberMetaQuery,
    ObjQuery, PartQueryItem, Result, SortDirection, SortItem, StoreError, StringMetaQuery,
    TopLevelFieldsQuery, TypedMetaQuery,
};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt::Debug;

/// Prefix accepted on sort fields to force payload resolution.
pub const PAYLOAD_PREFIX: &str = "objRecord.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    pub fn holds(&self, ord: Ordering) -> bool {
        match self {
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Gte => ord != Ordering::Less,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Lte => ord != Ordering::Greater,
        }
    }
}

/// A validated predicate with every relative duration resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldPredicate {
    Eq(Value),
    Neq(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Compare(CmpOp, f64),
    /// Inclusive on both ends
    Between(f64, f64),
    Like { needle: String, case_sensitive: bool },
    Exists(bool),
}

impl FieldPredicate {
    pub fn from_part(item: &PartQueryItem, reference_ms: i64) -> Result<Self> {
        let compare = |op| -> Result<FieldPredicate> {
            Ok(FieldPredicate::Compare(
                op,
                item.numeric_operand()?.resolve(reference_ms),
            ))
        };
        match item.op {
            FieldOp::Eq => Ok(FieldPredicate::Eq(item.value.clone())),
            FieldOp::Neq => Ok(FieldPredicate::Neq(item.value.clone())),
            FieldOp::In => Ok(FieldPredicate::In(item.list_operand()?.to_vec())),
            FieldOp::NotIn => Ok(FieldPredicate::NotIn(item.list_operand()?.to_vec())),
            FieldOp::Gt => compare(CmpOp::Gt),
            FieldOp::Gte => compare(CmpOp::Gte),
            FieldOp::Lt => compare(CmpOp::Lt),
            FieldOp::Lte => compare(CmpOp::Lte),
            FieldOp::Between => {
                let (min, max) = item.between_operands()?;
                Ok(FieldPredicate::Between(
                    min.resolve(reference_ms),
                    max.resolve(reference_ms),
                ))
            }
            FieldOp::Like => Ok(FieldPredicate::Like {
                needle: item.like_operand()?.to_string(),
                case_sensitive: item.is_case_sensitive(),
            }),
            FieldOp::Exists => Ok(FieldPredicate::Exists(item.exists_operand()?)),
        }
    }
}

fn number(n: f64) -> Value {
    Value::from(n)
}

fn string_meta_predicates(query: &StringMetaQuery) -> Vec<FieldPredicate> {
    let mut preds = Vec::new();
    if let Some(v) = &query.eq {
        preds.push(FieldPredicate::Eq(Value::String(v.clone())));
    }
    if let Some(v) = &query.neq {
        preds.push(FieldPredicate::Neq(Value::String(v.clone())));
    }
    if let Some(list) = &query.in_ {
        preds.push(FieldPredicate::In(
            list.iter().cloned().map(Value::String).collect(),
        ));
    }
    if let Some(list) = &query.not_in {
        preds.push(FieldPredicate::NotIn(
            list.iter().cloned().map(Value::String).collect(),
        ));
    }
    preds
}

fn number_meta_predicates(query: &NumberMetaQuery, reference_ms: i64) -> Vec<FieldPredicate> {
    let mut preds = Vec::new();
    if let Some(v) = query.eq {
        preds.push(FieldPredicate::Eq(number(v)));
    }
    if let Some(v) = query.neq {
        preds.push(FieldPredicate::Neq(number(v)));
    }
    if let Some(list) = &query.in_ {
        preds.push(FieldPredicate::In(list.iter().copied().map(number).collect()));
    }
    if let Some(list) = &query.not_in {
        preds.push(FieldPredicate::NotIn(
            list.iter().copied().map(number).collect(),
        ));
    }
    let bounds = [
        (CmpOp::Gt, query.gt),
        (CmpOp::Gte, query.gte),
        (CmpOp::Lt, query.lt),
        (CmpOp::Lte, query.lte),
    ];
    for (op, bound) in bounds {
        if let Some(bound) = bound {
            preds.push(FieldPredicate::Compare(op, bound.resolve(reference_ms)));
        }
    }
    if let Some([min, max]) = query.between {
        preds.push(FieldPredicate::Between(
            min.resolve(reference_ms),
            max.resolve(reference_ms),
        ));
    }
    preds
}

/// What a sort key orders by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortTarget {
    Column(Column),
    Payload(FieldPath),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub target: SortTarget,
    pub direction: SortDirection,
}

impl SortKey {
    /// Known top-level names sort by the column; `objRecord.`-prefixed and
    /// unknown names sort by the payload path.
    pub fn resolve(item: &SortItem) -> Result<Self> {
        let target = match item.field.strip_prefix(PAYLOAD_PREFIX) {
            Some(path) => SortTarget::Payload(FieldPath::parse(path)?),
            None => match Column::from_key(&item.field) {
                Some(column) => SortTarget::Column(column),
                None => SortTarget::Payload(FieldPath::parse(&item.field)?),
            },
        };
        if let SortTarget::Payload(path) = &target {
            if path.has_wildcard() {
                return Err(StoreError::validation(format!(
                    "cannot sort by array-compressed path '{}'",
                    item.field
                )));
            }
        }
        Ok(Self {
            target,
            direction: item.direction,
        })
    }

    pub fn column(column: Column, direction: SortDirection) -> Self {
        Self {
            target: SortTarget::Column(column),
            direction,
        }
    }
}

/// Compiles the backend-independent query model into native filters.
pub trait QueryCompiler: Send + Sync + Debug {
    type Filter: Clone + Debug + Send + Sync;
    type Sort: Clone + Debug + Send + Sync;
    type Pagination: Clone + Debug + Send + Sync;

    /// Filter matching every record. Must be the identity of [`and_all`](Self::and_all).
    fn always_true(&self) -> Self::Filter;

    fn and_all(&self, filters: Vec<Self::Filter>) -> Self::Filter;

    /// Predicate on a payload path.
    fn compile_payload(&self, path: &FieldPath, predicate: &FieldPredicate)
        -> Result<Self::Filter>;

    /// Predicate on a top-level attribute. String predicates never match
    /// non-string values and number predicates never match non-numbers.
    fn compile_column(&self, column: Column, predicate: &FieldPredicate) -> Result<Self::Filter>;

    /// Keyset cursor: ids strictly greater than `cursor`.
    fn id_after(&self, cursor: &str) -> Self::Filter;

    fn compile_sort(&self, keys: &[SortKey]) -> Result<Self::Sort>;

    fn compile_pagination(&self, offset: u64, limit: u64) -> Self::Pagination;

    fn compile_part(&self, item: &PartQueryItem, reference_ms: i64) -> Result<Self::Filter> {
        let path = FieldPath::parse(&item.field)?;
        let predicate = FieldPredicate::from_part(item, reference_ms)?;
        self.compile_payload(&path, &predicate)
    }

    fn transform_filter(&self, query: &ObjQuery, reference_ms: i64) -> Result<Self::Filter> {
        let mut filters = Vec::new();
        if let Some(logical) = &query.part_query {
            filters.push(self.transform_logical(logical, reference_ms)?);
        }
        if let Some(meta) = &query.meta_query {
            filters.push(self.transform_meta(meta, reference_ms)?);
        }
        if let Some(top) = &query.top_level_fields {
            filters.push(self.transform_top_level(top, reference_ms)?);
        }
        Ok(self.and_all(filters))
    }

    /// Both lists are AND-combined and AND-ed together; `or` is not a disjunction.
    fn transform_logical(&self, logical: &LogicalQuery, reference_ms: i64) -> Result<Self::Filter> {
        let mut groups = Vec::new();
        for items in [&logical.and, &logical.or].into_iter().flatten() {
            let compiled = items
                .iter()
                .map(|item| self.compile_part(item, reference_ms))
                .collect::<Result<Vec<_>>>()?;
            groups.push(self.and_all(compiled));
        }
        Ok(self.and_all(groups))
    }

    fn transform_meta(&self, meta: &MetaQueryMap, reference_ms: i64) -> Result<Self::Filter> {
        let mut filters = Vec::new();
        for (field, query) in meta.entries() {
            let filter = match query.classify()? {
                TypedMetaQuery::String(q) => self.compile_string_meta(field.column(), &q)?,
                TypedMetaQuery::Number(q) => {
                    self.compile_number_meta(field.column(), &q, reference_ms)?
                }
            };
            filters.push(filter);
        }
        Ok(self.and_all(filters))
    }

    fn compile_string_meta(&self, column: Column, query: &StringMetaQuery) -> Result<Self::Filter> {
        let filters = string_meta_predicates(query)
            .iter()
            .map(|p| self.compile_column(column, p))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.and_all(filters))
    }

    fn compile_number_meta(
        &self,
        column: Column,
        query: &NumberMetaQuery,
        reference_ms: i64,
    ) -> Result<Self::Filter> {
        let filters = number_meta_predicates(query, reference_ms)
            .iter()
            .map(|p| self.compile_column(column, p))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.and_all(filters))
    }

    fn transform_top_level(
        &self,
        top: &TopLevelFieldsQuery,
        reference_ms: i64,
    ) -> Result<Self::Filter> {
        let mut filters = Vec::new();
        if let Some(should_index) = top.should_index {
            filters.push(self.compile_column(
                Column::ShouldIndex,
                &FieldPredicate::Eq(Value::Bool(should_index)),
            )?);
        }
        if let Some(fields) = &top.fields_to_index {
            filters.push(self.compile_column(
                Column::FieldsToIndex,
                &FieldPredicate::Eq(serde_json::to_value(fields)?),
            )?);
        }
        if let Some(tag) = &top.tag {
            filters.push(self.compile_string_meta(Column::Tag, tag)?);
        }
        if let Some(group_id) = &top.group_id {
            filters.push(self.compile_string_meta(Column::GroupId, group_id)?);
        }
        match &top.deleted_at {
            Some(DeletedAtQuery::IsNull(q)) => {
                filters.push(self.is_null(Column::DeletedAt, q.is_null)?);
            }
            Some(DeletedAtQuery::Number(q)) => {
                filters.push(self.compile_number_meta(Column::DeletedAt, q, reference_ms)?);
            }
            None => {}
        }
        Ok(self.and_all(filters))
    }

    fn is_null(&self, column: Column, is_null: bool) -> Result<Self::Filter> {
        let predicate = if is_null {
            FieldPredicate::Eq(Value::Null)
        } else {
            FieldPredicate::Neq(Value::Null)
        };
        self.compile_column(column, &predicate)
    }

    fn ids_in(&self, ids: &[String]) -> Result<Self::Filter> {
        self.compile_column(
            Column::Id,
            &FieldPredicate::In(ids.iter().cloned().map(Value::String).collect()),
        )
    }

    /// Defaults to `createdAt` descending and always ends with an `id`
    /// tie-breaker so pages are stable.
    fn transform_sort(&self, sort: &[SortItem]) -> Result<Self::Sort> {
        let mut keys = sort.iter().map(SortKey::resolve).collect::<Result<Vec<_>>>()?;
        if keys.is_empty() {
            keys.push(SortKey::column(Column::CreatedAt, SortDirection::Desc));
        }
        if !keys
            .iter()
            .any(|k| k.target == SortTarget::Column(Column::Id))
        {
            keys.push(SortKey::column(Column::Id, SortDirection::Asc));
        }
        self.compile_sort(&keys)
    }

    /// `page` is 1-based.
    fn transform_pagination(&self, page: u64, limit: u64) -> Result<Self::Pagination> {
        if page < 1 {
            return Err(StoreError::validation("page must be at least 1"));
        }
        if limit < 1 {
            return Err(StoreError::validation("limit must be at least 1"));
        }
        let offset = (page - 1)
            .checked_mul(limit)
            .ok_or_else(|| StoreError::validation("page is out of range"))?;
        Ok(self.compile_pagination(offset, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objdb_api::{DurationUnit, RelativeDuration};
    use serde_json::json;

    #[test]
    fn test_field_predicate_resolves_durations() {
        let item = PartQueryItem::new(
            FieldOp::Gte,
            "seenAt",
            serde_json::to_value(RelativeDuration::new(-1, DurationUnit::Minutes)).unwrap(),
        );
        assert_eq!(
            FieldPredicate::from_part(&item, 120_000).unwrap(),
            FieldPredicate::Compare(CmpOp::Gte, 60_000.0)
        );
    }

    #[test]
    fn test_field_predicate_validates_operands() {
        let item = PartQueryItem::new(FieldOp::In, "a", json!("x"));
        assert!(FieldPredicate::from_part(&item, 0).unwrap_err().is_validation());
    }

    #[test]
    fn test_sort_key_resolution() {
        let column = SortKey::resolve(&SortItem::asc("updatedAt")).unwrap();
        assert_eq!(column.target, SortTarget::Column(Column::UpdatedAt));

        let payload = SortKey::resolve(&SortItem::asc("objRecord.updatedAt")).unwrap();
        assert_eq!(
            payload.target,
            SortTarget::Payload(FieldPath::parse("updatedAt").unwrap())
        );

        let unknown = SortKey::resolve(&SortItem::desc("score")).unwrap();
        assert!(matches!(unknown.target, SortTarget::Payload(_)));

        let wildcard = SortKey::resolve(&SortItem::asc("items.[*].n"));
        assert!(wildcard.unwrap_err().is_validation());
    }

    #[test]
    fn test_cmp_op() {
        assert!(CmpOp::Gte.holds(Ordering::Equal));
        assert!(!CmpOp::Gt.holds(Ordering::Equal));
        assert!(CmpOp::Lte.holds(Ordering::Less));
    }
}
