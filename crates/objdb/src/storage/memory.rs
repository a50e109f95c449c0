//! In-memory document collection.
//!
//! Records are kept as their JSON documents and filtered with the same
//! query documents the document compiler produces for MongoDB.

use super::backend::{DeleteMarker, StorageBackend};
use super::matcher::{compare_values, lookup_path, matches};
use async_trait::async_trait;
use objdb_api::{Column, Obj, Result, SortDirection, StoreError};
use objdb_query::{DocPagination, DocQueryCompiler, DocSort};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Document collection held in memory.
///
/// Useful for:
/// - Unit tests without a database
/// - Exercising the document compiler end to end
/// - A reference for cross-backend agreement tests
///
/// Clones share the collection. There are no transactions: `begin` returns
/// `None` and writes apply immediately.
///
/// # Example
///
/// ```rust,no_run
/// use objdb::{MemoryBackend, NewObj, ObjStore, Actor};
/// use serde_json::json;
///
/// async fn example() -> anyhow::Result<()> {
///     let store = ObjStore::new(MemoryBackend::new());
///     let actor = Actor::new("u1", "user");
///
///     let created = store
///         .create(vec![NewObj::new("app", "g", "note", json!({"title": "hi"}))], &actor)
///         .await?;
///     let found = store.get_by_id("app", "note", &created[0].id).await?;
///
///     assert!(found.is_some());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    docs: Arc<RwLock<BTreeMap<String, Value>>>,
    compiler: DocQueryCompiler,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents, deleted ones included.
    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }
}

fn to_doc(obj: &Obj) -> Result<Value> {
    Ok(serde_json::to_value(obj)?)
}

fn from_doc(doc: &Value) -> Result<Obj> {
    Ok(serde_json::from_value(doc.clone())?)
}

fn compare_docs(a: &Value, b: &Value, sort: &DocSort) -> Ordering {
    for (key, direction) in sort {
        let left = lookup_path(a, key).unwrap_or(&Value::Null);
        let right = lookup_path(b, key).unwrap_or(&Value::Null);
        let ord = compare_values(left, right);
        let ord = match direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    type Compiler = DocQueryCompiler;

    fn compiler(&self) -> &DocQueryCompiler {
        &self.compiler
    }

    async fn insert(&self, objs: &[Obj]) -> Result<()> {
        let mut docs = self.docs.write().await;
        let mut batch = BTreeMap::new();
        for obj in objs {
            if docs.contains_key(&obj.id) || batch.contains_key(&obj.id) {
                return Err(StoreError::Conflict(format!("duplicate id {}", obj.id)));
            }
            batch.insert(obj.id.clone(), to_doc(obj)?);
        }
        docs.extend(batch);
        Ok(())
    }

    async fn find(
        &self,
        filter: &Value,
        sort: &DocSort,
        pagination: Option<&DocPagination>,
    ) -> Result<Vec<Obj>> {
        let docs = self.docs.read().await;
        let mut hits = Vec::new();
        for doc in docs.values() {
            if matches(doc, filter)? {
                hits.push(doc);
            }
        }
        hits.sort_by(|a, b| compare_docs(a, b, sort));

        let (skip, limit) = match pagination {
            Some(p) => (p.skip as usize, p.limit as usize),
            None => (0, usize::MAX),
        };
        hits.into_iter()
            .skip(skip)
            .take(limit)
            .map(from_doc)
            .collect()
    }

    async fn count(&self, filter: &Value) -> Result<u64> {
        let docs = self.docs.read().await;
        let mut n = 0;
        for doc in docs.values() {
            if matches(doc, filter)? {
                n += 1;
            }
        }
        Ok(n)
    }

    async fn replace(&self, objs: &[Obj]) -> Result<u64> {
        let mut docs = self.docs.write().await;
        let mut replaced = 0;
        for obj in objs {
            if let Some(slot) = docs.get_mut(&obj.id) {
                *slot = to_doc(obj)?;
                replaced += 1;
            }
        }
        Ok(replaced)
    }

    async fn mark_deleted(&self, filter: &Value, marker: &DeleteMarker) -> Result<u64> {
        let mut docs = self.docs.write().await;
        let mut marked = 0;
        for doc in docs.values_mut() {
            if !matches(doc, filter)? {
                continue;
            }
            if let Value::Object(fields) = doc {
                fields.insert(Column::DeletedAt.key().into(), Value::from(marker.at));
                fields.insert(Column::DeletedBy.key().into(), Value::from(marker.by.clone()));
                fields.insert(
                    Column::DeletedByType.key().into(),
                    Value::from(marker.by_type.clone()),
                );
                marked += 1;
            }
        }
        Ok(marked)
    }

    async fn remove(&self, ids: &[String]) -> Result<u64> {
        let mut docs = self.docs.write().await;
        Ok(ids.iter().filter(|id| docs.remove(*id).is_some()).count() as u64)
    }

    async fn begin(&self) -> Result<Option<Self>> {
        Ok(None)
    }

    async fn commit(&self) -> Result<()> {
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        Ok(())
    }
}
