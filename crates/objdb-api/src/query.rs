//! Backend-independent query model.
//!
//! This is the stable JSON wire format callers send. It is compiled into a
//! native filter by one of the `objdb-query` compilers; nothing in here knows
//! about a concrete backend.

use crate::{Result, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Operator of a payload field predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    In,
    NotIn,
    Between,
    Exists,
}

impl FieldOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldOp::Eq => "eq",
            FieldOp::Neq => "neq",
            FieldOp::Gt => "gt",
            FieldOp::Gte => "gte",
            FieldOp::Lt => "lt",
            FieldOp::Lte => "lte",
            FieldOp::Like => "like",
            FieldOp::In => "in",
            FieldOp::NotIn => "not_in",
            FieldOp::Between => "between",
            FieldOp::Exists => "exists",
        }
    }
}

/// A single predicate on a payload path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartQueryItem {
    pub op: FieldOp,
    pub field: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_sensitive: Option<bool>,
}

impl PartQueryItem {
    pub fn new(op: FieldOp, field: impl Into<String>, value: Value) -> Self {
        Self {
            op,
            field: field.into(),
            value,
            case_sensitive: None,
        }
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = Some(false);
        self
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive.unwrap_or(true)
    }

    /// Right-hand side of gt/gte/lt/lte.
    pub fn numeric_operand(&self) -> Result<NumberOrDuration> {
        NumberOrDuration::from_value(&self.value).map_err(|_| {
            StoreError::validation(format!(
                "'{}' on '{}' needs a number or relative duration",
                self.op.as_str(),
                self.field
            ))
        })
    }

    /// Inclusive `[min, max]` of a between predicate.
    pub fn between_operands(&self) -> Result<(NumberOrDuration, NumberOrDuration)> {
        match &self.value {
            Value::Array(bounds) if bounds.len() == 2 => {
                let min = NumberOrDuration::from_value(&bounds[0]);
                let max = NumberOrDuration::from_value(&bounds[1]);
                match (min, max) {
                    (Ok(min), Ok(max)) => Ok((min, max)),
                    _ => Err(StoreError::validation(format!(
                        "between bounds on '{}' must be numbers or relative durations",
                        self.field
                    ))),
                }
            }
            _ => Err(StoreError::validation(format!(
                "between on '{}' needs exactly two values",
                self.field
            ))),
        }
    }

    /// Literal list of an in/not_in predicate.
    pub fn list_operand(&self) -> Result<&[Value]> {
        match &self.value {
            Value::Array(items) => Ok(items),
            _ => Err(StoreError::validation(format!(
                "'{}' on '{}' needs a list",
                self.op.as_str(),
                self.field
            ))),
        }
    }

    pub fn like_operand(&self) -> Result<&str> {
        self.value.as_str().ok_or_else(|| {
            StoreError::validation(format!("like on '{}' needs a string", self.field))
        })
    }

    pub fn exists_operand(&self) -> Result<bool> {
        self.value.as_bool().ok_or_else(|| {
            StoreError::validation(format!("exists on '{}' needs a boolean", self.field))
        })
    }
}

/// Logical grouping of payload predicates.
///
/// Both lists are AND-combined and then AND-ed together: `or` is not a
/// disjunction. Callers relying on that keep working; a real disjunction would
/// need a new wire key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogicalQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub and: Option<Vec<PartQueryItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub or: Option<Vec<PartQueryItem>>,
}

impl LogicalQuery {
    pub fn all(items: Vec<PartQueryItem>) -> Self {
        Self {
            and: Some(items),
            or: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.and.as_ref().is_none_or(|v| v.is_empty())
            && self.or.as_ref().is_none_or(|v| v.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    Ms,
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl DurationUnit {
    pub fn millis(&self) -> i64 {
        match self {
            DurationUnit::Ms => 1,
            DurationUnit::Seconds => 1_000,
            DurationUnit::Minutes => 60_000,
            DurationUnit::Hours => 3_600_000,
            DurationUnit::Days => 86_400_000,
            DurationUnit::Weeks => 604_800_000,
        }
    }
}

/// Offset from the reference instant of a compilation, e.g. `{"amount": -7, "unit": "days"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelativeDuration {
    pub amount: i64,
    pub unit: DurationUnit,
}

impl RelativeDuration {
    pub fn new(amount: i64, unit: DurationUnit) -> Self {
        Self { amount, unit }
    }

    pub fn resolve(&self, reference_ms: i64) -> i64 {
        reference_ms.saturating_add(self.amount.saturating_mul(self.unit.millis()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrDuration {
    Number(f64),
    Duration(RelativeDuration),
}

impl NumberOrDuration {
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn resolve(&self, reference_ms: i64) -> f64 {
        match self {
            NumberOrDuration::Number(n) => *n,
            NumberOrDuration::Duration(d) => d.resolve(reference_ms) as f64,
        }
    }
}

impl From<f64> for NumberOrDuration {
    fn from(n: f64) -> Self {
        NumberOrDuration::Number(n)
    }
}

impl From<RelativeDuration> for NumberOrDuration {
    fn from(d: RelativeDuration) -> Self {
        NumberOrDuration::Duration(d)
    }
}

/// String-family predicate on a top-level attribute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StringMetaQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eq: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neq: Option<String>,
    #[serde(rename = "in", default, skip_serializing_if = "Option::is_none")]
    pub in_: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_in: Option<Vec<String>>,
}

impl StringMetaQuery {
    pub fn eq(value: impl Into<String>) -> Self {
        Self {
            eq: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.eq.is_none() && self.neq.is_none() && self.in_.is_none() && self.not_in.is_none()
    }
}

/// Number-family predicate on a top-level attribute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NumberMetaQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eq: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neq: Option<f64>,
    #[serde(rename = "in", default, skip_serializing_if = "Option::is_none")]
    pub in_: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_in: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<NumberOrDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<NumberOrDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<NumberOrDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<NumberOrDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub between: Option<[NumberOrDuration; 2]>,
}

impl NumberMetaQuery {
    pub fn is_empty(&self) -> bool {
        self.eq.is_none()
            && self.neq.is_none()
            && self.in_.is_none()
            && self.not_in.is_none()
            && self.gt.is_none()
            && self.gte.is_none()
            && self.lt.is_none()
            && self.lte.is_none()
            && self.between.is_none()
    }
}

/// Metadata predicate as received on the wire, before it is routed to a family.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetaQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eq: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neq: Option<Value>,
    #[serde(rename = "in", default, skip_serializing_if = "Option::is_none")]
    pub in_: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_in: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<NumberOrDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<NumberOrDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<NumberOrDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<NumberOrDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub between: Option<Vec<NumberOrDuration>>,
}

/// A metadata predicate routed to its family.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedMetaQuery {
    String(StringMetaQuery),
    Number(NumberMetaQuery),
}

#[derive(Clone, Copy, PartialEq)]
enum Family {
    String,
    Number,
}

fn family_of(value: &Value) -> Result<Family> {
    match value {
        Value::String(_) => Ok(Family::String),
        Value::Number(_) => Ok(Family::Number),
        other => Err(StoreError::validation(format!(
            "metadata predicates take strings or numbers, got {}",
            other
        ))),
    }
}

impl MetaQuery {
    /// Route to the string or number family by the keys and values present.
    ///
    /// Range keys force the number family. Mixing families is rejected.
    pub fn classify(&self) -> Result<TypedMetaQuery> {
        let has_range = self.gt.is_some()
            || self.gte.is_some()
            || self.lt.is_some()
            || self.lte.is_some()
            || self.between.is_some();

        let mut family = if has_range { Some(Family::Number) } else { None };
        let values = self
            .eq
            .iter()
            .chain(self.neq.iter())
            .chain(self.in_.iter().flatten())
            .chain(self.not_in.iter().flatten());
        for value in values {
            let this = family_of(value)?;
            match family {
                Some(f) if f != this => {
                    return Err(StoreError::validation(
                        "metadata predicate mixes string and number operators",
                    ));
                }
                _ => family = Some(this),
            }
        }

        match family {
            Some(Family::Number) => {
                let between = match &self.between {
                    None => None,
                    Some(bounds) if bounds.len() == 2 => Some([bounds[0], bounds[1]]),
                    Some(_) => {
                        return Err(StoreError::validation(
                            "between needs exactly two values",
                        ));
                    }
                };
                Ok(TypedMetaQuery::Number(NumberMetaQuery {
                    eq: self.eq.as_ref().and_then(Value::as_f64),
                    neq: self.neq.as_ref().and_then(Value::as_f64),
                    in_: self
                        .in_
                        .as_ref()
                        .map(|v| v.iter().filter_map(Value::as_f64).collect()),
                    not_in: self
                        .not_in
                        .as_ref()
                        .map(|v| v.iter().filter_map(Value::as_f64).collect()),
                    gt: self.gt,
                    gte: self.gte,
                    lt: self.lt,
                    lte: self.lte,
                    between,
                }))
            }
            // An empty predicate (or one with only empty lists) is a no-op string predicate
            Some(Family::String) | None => {
                let strings = |v: &Vec<Value>| -> Vec<String> {
                    v.iter().filter_map(|s| s.as_str().map(str::to_string)).collect()
                };
                Ok(TypedMetaQuery::String(StringMetaQuery {
                    eq: self.eq.as_ref().and_then(|v| v.as_str().map(str::to_string)),
                    neq: self.neq.as_ref().and_then(|v| v.as_str().map(str::to_string)),
                    in_: self.in_.as_ref().map(strings),
                    not_in: self.not_in.as_ref().map(strings),
                }))
            }
        }
    }
}

/// Top-level attributes addressable through metadata predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaField {
    Id,
    CreatedAt,
    UpdatedAt,
    CreatedBy,
    CreatedByType,
    UpdatedBy,
    UpdatedByType,
    DeletedBy,
    DeletedByType,
}

impl MetaField {
    pub fn column(&self) -> Column {
        match self {
            MetaField::Id => Column::Id,
            MetaField::CreatedAt => Column::CreatedAt,
            MetaField::UpdatedAt => Column::UpdatedAt,
            MetaField::CreatedBy => Column::CreatedBy,
            MetaField::CreatedByType => Column::CreatedByType,
            MetaField::UpdatedBy => Column::UpdatedBy,
            MetaField::UpdatedByType => Column::UpdatedByType,
            MetaField::DeletedBy => Column::DeletedBy,
            MetaField::DeletedByType => Column::DeletedByType,
        }
    }
}

/// Metadata predicates keyed by attribute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MetaQueryMap {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MetaQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<MetaQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<MetaQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<MetaQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by_type: Option<MetaQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<MetaQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by_type: Option<MetaQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<MetaQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_by_type: Option<MetaQuery>,
}

impl MetaQueryMap {
    /// Present predicates in a fixed attribute order.
    pub fn entries(&self) -> Vec<(MetaField, &MetaQuery)> {
        [
            (MetaField::Id, &self.id),
            (MetaField::CreatedAt, &self.created_at),
            (MetaField::UpdatedAt, &self.updated_at),
            (MetaField::CreatedBy, &self.created_by),
            (MetaField::CreatedByType, &self.created_by_type),
            (MetaField::UpdatedBy, &self.updated_by),
            (MetaField::UpdatedByType, &self.updated_by_type),
            (MetaField::DeletedBy, &self.deleted_by),
            (MetaField::DeletedByType, &self.deleted_by_type),
        ]
        .into_iter()
        .filter_map(|(field, q)| q.as_ref().map(|q| (field, q)))
        .collect()
    }
}

/// `deletedAt` predicate: either a null check or number-family semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeletedAtQuery {
    IsNull(IsNullQuery),
    Number(NumberMetaQuery),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IsNullQuery {
    pub is_null: bool,
}

impl DeletedAtQuery {
    pub fn is_null(is_null: bool) -> Self {
        DeletedAtQuery::IsNull(IsNullQuery { is_null })
    }
}

/// Predicates on top-level attributes other than the metadata ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TopLevelFieldsQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub should_index: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields_to_index: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<StringMetaQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<StringMetaQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DeletedAtQuery>,
}

/// A full filter: payload predicates, metadata predicates and top-level predicates, AND-ed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_query: Option<LogicalQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_query: Option<MetaQueryMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_level_fields: Option<TopLevelFieldsQuery>,
}

impl ObjQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a payload predicate to the `and` list.
    pub fn with_part(mut self, item: PartQueryItem) -> Self {
        self.part_query
            .get_or_insert_with(LogicalQuery::default)
            .and
            .get_or_insert_with(Vec::new)
            .push(item);
        self
    }

    pub fn with_meta(mut self, meta: MetaQueryMap) -> Self {
        self.meta_query = Some(meta);
        self
    }

    pub fn with_top_level(mut self, fields: TopLevelFieldsQuery) -> Self {
        self.top_level_fields = Some(fields);
        self
    }
}

/// Top-level record attributes as stored by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Id,
    AppId,
    GroupId,
    Tag,
    CreatedAt,
    UpdatedAt,
    CreatedBy,
    CreatedByType,
    UpdatedBy,
    UpdatedByType,
    DeletedAt,
    DeletedBy,
    DeletedByType,
    ShouldIndex,
    FieldsToIndex,
}

impl Column {
    pub const ALL: [Column; 15] = [
        Column::Id,
        Column::AppId,
        Column::GroupId,
        Column::Tag,
        Column::CreatedAt,
        Column::UpdatedAt,
        Column::CreatedBy,
        Column::CreatedByType,
        Column::UpdatedBy,
        Column::UpdatedByType,
        Column::DeletedAt,
        Column::DeletedBy,
        Column::DeletedByType,
        Column::ShouldIndex,
        Column::FieldsToIndex,
    ];

    /// Wire / document key.
    pub fn key(&self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::AppId => "appId",
            Column::GroupId => "groupId",
            Column::Tag => "tag",
            Column::CreatedAt => "createdAt",
            Column::UpdatedAt => "updatedAt",
            Column::CreatedBy => "createdBy",
            Column::CreatedByType => "createdByType",
            Column::UpdatedBy => "updatedBy",
            Column::UpdatedByType => "updatedByType",
            Column::DeletedAt => "deletedAt",
            Column::DeletedBy => "deletedBy",
            Column::DeletedByType => "deletedByType",
            Column::ShouldIndex => "shouldIndex",
            Column::FieldsToIndex => "fieldsToIndex",
        }
    }

    /// Relational column name.
    pub fn sql_name(&self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::AppId => "app_id",
            Column::GroupId => "group_id",
            Column::Tag => "tag",
            Column::CreatedAt => "created_at",
            Column::UpdatedAt => "updated_at",
            Column::CreatedBy => "created_by",
            Column::CreatedByType => "created_by_type",
            Column::UpdatedBy => "updated_by",
            Column::UpdatedByType => "updated_by_type",
            Column::DeletedAt => "deleted_at",
            Column::DeletedBy => "deleted_by",
            Column::DeletedByType => "deleted_by_type",
            Column::ShouldIndex => "should_index",
            Column::FieldsToIndex => "fields_to_index",
        }
    }

    pub fn from_key(key: &str) -> Option<Column> {
        Column::ALL.into_iter().find(|c| c.key() == key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortItem {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortItem {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}
