//! Record and catalog types.
//!
//! - `Obj`: a stored record (metadata columns + free-form `objRecord` payload)
//! - `NewObj`: caller input, turned into an `Obj` by the store
//! - `FieldDescriptor`: one addressable path produced by the indexer
//! - `ObjField`: a persisted catalog row for a descriptor

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Who performed a write: an actor id and its kind (e.g. "user", "agentToken").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub kind: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
        }
    }
}

/// A generic tagged document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Obj {
    pub id: String,
    pub app_id: String,
    pub group_id: String,
    pub tag: String,
    pub obj_record: Value,
    /// Epoch milliseconds
    pub created_at: i64,
    /// Epoch milliseconds
    pub updated_at: i64,
    pub created_by: String,
    pub created_by_type: String,
    pub updated_by: String,
    pub updated_by_type: String,
    #[serde(default)]
    pub deleted_at: Option<i64>,
    #[serde(default)]
    pub deleted_by: Option<String>,
    #[serde(default)]
    pub deleted_by_type: Option<String>,
    pub should_index: bool,
    #[serde(default)]
    pub fields_to_index: Option<Vec<String>>,
}

impl Obj {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Stamp update metadata after the payload changed.
    pub fn touch(&mut self, at: i64, by: &Actor) {
        self.updated_at = at;
        self.updated_by = by.id.clone();
        self.updated_by_type = by.kind.clone();
    }

    pub fn mark_deleted(&mut self, at: i64, by: &Actor) {
        self.deleted_at = Some(at);
        self.deleted_by = Some(by.id.clone());
        self.deleted_by_type = Some(by.kind.clone());
    }
}

fn default_should_index() -> bool {
    true
}

/// Input for create and upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewObj {
    pub app_id: String,
    pub group_id: String,
    pub tag: String,
    pub obj_record: Value,
    #[serde(default = "default_should_index")]
    pub should_index: bool,
    #[serde(default)]
    pub fields_to_index: Option<Vec<String>>,
}

impl NewObj {
    pub fn new(
        app_id: impl Into<String>,
        group_id: impl Into<String>,
        tag: impl Into<String>,
        obj_record: Value,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            group_id: group_id.into(),
            tag: tag.into(),
            obj_record,
            should_index: true,
            fields_to_index: None,
        }
    }

    pub fn with_fields_to_index(mut self, fields: Vec<String>) -> Self {
        self.fields_to_index = Some(fields);
        self
    }

    pub fn without_indexing(mut self) -> Self {
        self.should_index = false;
        self
    }
}

/// Type of a JSON leaf as reported by the indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    String,
    Number,
    Boolean,
    Null,
    Undefined,
}

impl JsonType {
    /// Type of a leaf value. Containers have no leaf type.
    pub fn of_leaf(value: &Value) -> Option<Self> {
        match value {
            Value::String(_) => Some(JsonType::String),
            Value::Number(_) => Some(JsonType::Number),
            Value::Bool(_) => Some(JsonType::Boolean),
            Value::Null => Some(JsonType::Null),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JsonType::String => "string",
            JsonType::Number => "number",
            JsonType::Boolean => "boolean",
            JsonType::Null => "null",
            JsonType::Undefined => "undefined",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(JsonType::String),
            "number" => Some(JsonType::Number),
            "boolean" => Some(JsonType::Boolean),
            "null" => Some(JsonType::Null),
            "undefined" => Some(JsonType::Undefined),
            _ => None,
        }
    }

    /// Representative type of an array-compressed field.
    ///
    /// A single observed type is used as-is; mixed arrays always fall back to
    /// `string`, whatever the member types are.
    pub fn representative(types: &BTreeSet<JsonType>) -> JsonType {
        match types.iter().next() {
            Some(only) if types.len() == 1 => *only,
            _ => JsonType::String,
        }
    }
}

/// One addressable field path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub path: String,
    #[serde(rename = "type")]
    pub field_type: JsonType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_types: Option<BTreeSet<JsonType>>,
    pub is_array_compressed: bool,
}

impl FieldDescriptor {
    pub fn leaf(path: impl Into<String>, field_type: JsonType) -> Self {
        Self {
            path: path.into(),
            field_type,
            array_types: None,
            is_array_compressed: false,
        }
    }

    pub fn compressed(path: impl Into<String>, array_types: BTreeSet<JsonType>) -> Self {
        Self {
            path: path.into(),
            field_type: JsonType::representative(&array_types),
            array_types: Some(array_types),
            is_array_compressed: true,
        }
    }
}

/// A field catalog row: one distinct path observed for an app/group/tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjField {
    pub app_id: String,
    pub group_id: String,
    pub tag: String,
    pub path: String,
    #[serde(rename = "type")]
    pub field_type: JsonType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_types: Option<BTreeSet<JsonType>>,
    /// Every type ever observed at this path
    pub value_types: BTreeSet<JsonType>,
    pub is_array_compressed: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ObjField {
    /// Fold a freshly indexed descriptor into an existing row, or start a new one.
    ///
    /// Observed types only ever grow. Plain fields keep their recorded type;
    /// compressed fields recompute it from the merged array types.
    pub fn merge_descriptor(
        existing: Option<&ObjField>,
        app_id: &str,
        group_id: &str,
        tag: &str,
        descriptor: &FieldDescriptor,
        now: i64,
    ) -> ObjField {
        let incoming_types: BTreeSet<JsonType> = match &descriptor.array_types {
            Some(types) => types.clone(),
            None => BTreeSet::from([descriptor.field_type]),
        };

        match existing {
            None => ObjField {
                app_id: app_id.to_string(),
                group_id: group_id.to_string(),
                tag: tag.to_string(),
                path: descriptor.path.clone(),
                field_type: descriptor.field_type,
                array_types: descriptor.array_types.clone(),
                value_types: incoming_types,
                is_array_compressed: descriptor.is_array_compressed,
                created_at: now,
                updated_at: now,
            },
            Some(row) => {
                let mut merged = row.clone();
                merged.value_types.extend(incoming_types.iter().copied());
                if descriptor.is_array_compressed {
                    let mut array_types = row.array_types.clone().unwrap_or_default();
                    array_types.extend(incoming_types);
                    merged.field_type = JsonType::representative(&array_types);
                    merged.array_types = Some(array_types);
                    merged.is_array_compressed = true;
                }
                merged.updated_at = now;
                merged
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_obj_wire_names_are_camel_case() {
        let obj = Obj {
            id: "o1".into(),
            app_id: "app".into(),
            group_id: "grp".into(),
            tag: "log".into(),
            obj_record: json!({"a": 1}),
            created_at: 1,
            updated_at: 2,
            created_by: "u1".into(),
            created_by_type: "user".into(),
            updated_by: "u1".into(),
            updated_by_type: "user".into(),
            deleted_at: None,
            deleted_by: None,
            deleted_by_type: None,
            should_index: true,
            fields_to_index: None,
        };

        let value = serde_json::to_value(&obj).unwrap();
        assert_eq!(value["appId"], json!("app"));
        assert_eq!(value["objRecord"], json!({"a": 1}));
        assert_eq!(value["deletedAt"], Value::Null);
        assert_eq!(value["shouldIndex"], json!(true));
    }

    #[test]
    fn test_new_obj_defaults_to_indexing() {
        let input: NewObj = serde_json::from_value(json!({
            "appId": "a", "groupId": "g", "tag": "t", "objRecord": {}
        }))
        .unwrap();
        assert!(input.should_index);
        assert!(input.fields_to_index.is_none());
    }

    #[test]
    fn test_representative_type() {
        let single = BTreeSet::from([JsonType::Number]);
        assert_eq!(JsonType::representative(&single), JsonType::Number);

        let mixed = BTreeSet::from([JsonType::Number, JsonType::Boolean]);
        assert_eq!(JsonType::representative(&mixed), JsonType::String);
    }

    #[test]
    fn test_merge_descriptor_unions_types() {
        let first = FieldDescriptor::compressed("a.[*]", BTreeSet::from([JsonType::Number]));
        let row = ObjField::merge_descriptor(None, "app", "g", "t", &first, 10);
        assert_eq!(row.field_type, JsonType::Number);

        let second = FieldDescriptor::compressed("a.[*]", BTreeSet::from([JsonType::String]));
        let merged = ObjField::merge_descriptor(Some(&row), "app", "g", "t", &second, 20);
        assert_eq!(merged.field_type, JsonType::String);
        assert_eq!(
            merged.array_types,
            Some(BTreeSet::from([JsonType::String, JsonType::Number]))
        );
        assert_eq!(merged.created_at, 10);
        assert_eq!(merged.updated_at, 20);
    }

    #[test]
    fn test_merge_descriptor_keeps_plain_type() {
        let first = FieldDescriptor::leaf("name", JsonType::String);
        let row = ObjField::merge_descriptor(None, "app", "g", "t", &first, 1);

        let second = FieldDescriptor::leaf("name", JsonType::Null);
        let merged = ObjField::merge_descriptor(Some(&row), "app", "g", "t", &second, 2);
        assert_eq!(merged.field_type, JsonType::String);
        assert_eq!(
            merged.value_types,
            BTreeSet::from([JsonType::String, JsonType::Null])
        );
    }
}
