//! Indexing pipeline: runs the indexer over recently updated records and
//! folds the resulting descriptors into the field catalog.

use crate::catalog::{FieldCatalog, Partition};
use crate::indexer::{filter_fields, index};
use crate::storage::StorageBackend;
use crate::store::ObjStore;
use objdb_api::{Column, FieldDescriptor, Obj, Result, StoreError};
use objdb_query::{CmpOp, FieldPredicate, QueryCompiler};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Per-app field lists used when a record carries no `fieldsToIndex` of its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppIndexSettings {
    #[serde(default)]
    pub default_fields_to_index: HashMap<String, Vec<String>>,
}

impl AppIndexSettings {
    pub fn with_app_default(mut self, app_id: impl Into<String>, fields: Vec<String>) -> Self {
        self.default_fields_to_index.insert(app_id.into(), fields);
        self
    }

    /// The record's own list, else its app's default, else `None` (index everything).
    pub fn fields_for<'a>(&'a self, obj: &'a Obj) -> Option<&'a [String]> {
        obj.fields_to_index
            .as_deref()
            .or_else(|| self.default_fields_to_index.get(&obj.app_id).map(Vec::as_slice))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexRunStats {
    /// Store clock when the run started; the next run's `last_success_at`.
    pub started_at: i64,
    pub objs_indexed: u64,
    pub fields_written: u64,
    pub partitions: usize,
}

/// Descriptors of one record after applying its field restriction.
fn descriptors_for(obj: &Obj, settings: &AppIndexSettings) -> Vec<FieldDescriptor> {
    let fields = index(&obj.obj_record);
    let fields = match settings.fields_for(obj) {
        Some(allowed) => filter_fields(fields, allowed),
        None => fields,
    };
    fields.into_values().collect()
}

/// Re-index every live record with `shouldIndex` updated at or after
/// `last_success_at` (all of them when `None`).
#[tracing::instrument(skip(store, catalog, settings))]
pub async fn index_objs<B, C>(
    last_success_at: Option<i64>,
    store: &ObjStore<B>,
    catalog: &C,
    settings: &AppIndexSettings,
) -> Result<IndexRunStats>
where
    B: StorageBackend,
    C: FieldCatalog + ?Sized,
{
    let batch_size = store.config().index_batch_size as u64;
    if batch_size == 0 {
        return Err(StoreError::validation("index batch size must be at least 1"));
    }

    let started_at = store.now();
    let c = store.backend().compiler();
    let mut filters = vec![
        c.compile_column(Column::ShouldIndex, &FieldPredicate::Eq(Value::Bool(true)))?,
        c.is_null(Column::DeletedAt, true)?,
    ];
    if let Some(since) = last_success_at {
        filters.push(c.compile_column(
            Column::UpdatedAt,
            &FieldPredicate::Compare(CmpOp::Gte, since as f64),
        )?);
    }
    let base = c.and_all(filters);

    let mut stats = IndexRunStats {
        started_at,
        ..IndexRunStats::default()
    };
    let mut seen_partitions = HashSet::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = store.next_page(&base, cursor.as_deref(), batch_size).await?;
        let Some(last) = page.last() else {
            break;
        };
        cursor = Some(last.id.clone());

        let mut grouped: BTreeMap<Partition, (Vec<FieldDescriptor>, HashSet<FieldDescriptor>)> =
            BTreeMap::new();
        for obj in &page {
            let partition = Partition::new(&obj.app_id, &obj.group_id, &obj.tag);
            let (ordered, seen) = grouped.entry(partition).or_default();
            for descriptor in descriptors_for(obj, settings) {
                if seen.insert(descriptor.clone()) {
                    ordered.push(descriptor);
                }
            }
        }

        for (partition, (descriptors, _)) in grouped {
            if descriptors.is_empty() {
                continue;
            }
            let rows = catalog
                .upsert_fields(&partition, &descriptors, store.now())
                .await?;
            stats.fields_written += rows.len() as u64;
            seen_partitions.insert(partition);
        }

        stats.objs_indexed += page.len() as u64;
        debug!("[Indexer] Indexed batch of {} records", page.len());
        if (page.len() as u64) < batch_size {
            break;
        }
    }

    stats.partitions = seen_partitions.len();
    info!(
        "[Indexer] Indexed {} records into {} partitions ({} catalog rows)",
        stats.objs_indexed, stats.partitions, stats.fields_written
    );
    Ok(stats)
}

/// Repeated indexing runs that remember the last successful start instant.
///
/// Scheduling is left to the caller; `run_once` is one pass.
pub struct IndexingJob<B: StorageBackend> {
    store: ObjStore<B>,
    catalog: Arc<dyn FieldCatalog>,
    settings: AppIndexSettings,
    last_success_at: Option<i64>,
}

impl<B: StorageBackend> IndexingJob<B> {
    pub fn new(store: ObjStore<B>, catalog: Arc<dyn FieldCatalog>, settings: AppIndexSettings) -> Self {
        Self {
            store,
            catalog,
            settings,
            last_success_at: None,
        }
    }

    pub fn last_success_at(&self) -> Option<i64> {
        self.last_success_at
    }

    /// A failed run leaves `last_success_at` unchanged so the next run retries the window.
    pub async fn run_once(&mut self) -> Result<IndexRunStats> {
        let stats = index_objs(
            self.last_success_at,
            &self.store,
            self.catalog.as_ref(),
            &self.settings,
        )
        .await?;
        self.last_success_at = Some(stats.started_at);
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryFieldCatalog;
    use crate::clock::{ManualClock, SequentialIds};
    use crate::storage::MemoryBackend;
    use crate::store::{DeleteRequest, UpdateRequest};
    use objdb_api::{Actor, FieldOp, JsonType, NewObj, ObjQuery, PartQueryItem};
    use serde_json::json;

    fn actor() -> Actor {
        Actor::new("u1", "user")
    }

    fn setup() -> (ObjStore<MemoryBackend>, Arc<ManualClock>, Arc<MemoryFieldCatalog>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = ObjStore::new(MemoryBackend::new())
            .with_clock(clock.clone())
            .with_ids(Arc::new(SequentialIds::default()));
        (store, clock, Arc::new(MemoryFieldCatalog::new()))
    }

    fn paths(rows: &[objdb_api::ObjField]) -> Vec<&str> {
        rows.iter().map(|r| r.path.as_str()).collect()
    }

    #[tokio::test]
    async fn test_index_objs_writes_catalog_rows_per_partition() {
        let (store, _clock, catalog) = setup();
        store
            .create(
                vec![
                    NewObj::new("app", "g", "note", json!({"title": "a", "tags": ["x"]})),
                    NewObj::new("app", "g", "note", json!({"title": "b", "tags": [1]})),
                    NewObj::new("app", "g", "task", json!({"done": true})),
                ],
                &actor(),
            )
            .await
            .unwrap();

        let stats = index_objs(None, &store, catalog.as_ref(), &AppIndexSettings::default())
            .await
            .unwrap();
        assert_eq!(stats.objs_indexed, 3);
        assert_eq!(stats.partitions, 2);

        let rows = catalog
            .list_fields(&Partition::new("app", "g", "note"))
            .await
            .unwrap();
        assert_eq!(paths(&rows), vec!["tags.0", "tags.[*]", "title"]);
        let compressed = rows.iter().find(|r| r.path == "tags.[*]").unwrap();
        assert!(compressed.is_array_compressed);
        assert!(compressed.array_types.as_ref().unwrap().contains(&JsonType::Number));
        assert!(compressed.array_types.as_ref().unwrap().contains(&JsonType::String));
    }

    #[tokio::test]
    async fn test_field_restrictions_and_skipped_records() {
        let (store, _clock, catalog) = setup();
        let settings = AppIndexSettings::default().with_app_default("app", vec!["a".into()]);
        store
            .create(
                vec![
                    NewObj::new("app", "g", "note", json!({"a": {"x": 1}, "b": 2})),
                    NewObj::new("app", "g", "note", json!({"c": 3, "d": 4}))
                        .with_fields_to_index(vec!["c".into()]),
                    NewObj::new("app", "g", "note", json!({"e": 5})).without_indexing(),
                ],
                &actor(),
            )
            .await
            .unwrap();
        store
            .create(vec![NewObj::new("app", "g", "note", json!({"gone": 1}))], &actor())
            .await
            .unwrap();
        store
            .delete(DeleteRequest::new(
                "app",
                "note",
                ObjQuery::new().with_part(PartQueryItem::new(FieldOp::Exists, "gone", json!(true))),
                actor(),
            ))
            .await
            .unwrap();

        let stats = index_objs(None, &store, catalog.as_ref(), &settings).await.unwrap();
        assert_eq!(stats.objs_indexed, 2);
        let rows = catalog
            .list_fields(&Partition::new("app", "g", "note"))
            .await
            .unwrap();
        assert_eq!(paths(&rows), vec!["a.x", "c"]);
    }

    #[tokio::test]
    async fn test_job_only_reindexes_records_updated_since_last_success() {
        let (store, clock, catalog) = setup();
        store
            .create(vec![NewObj::new("app", "g", "note", json!({"v": 1}))], &actor())
            .await
            .unwrap();

        clock.advance(100);
        let mut job = IndexingJob::new(store.clone(), catalog.clone(), AppIndexSettings::default());
        assert_eq!(job.run_once().await.unwrap().objs_indexed, 1);
        assert_eq!(job.last_success_at(), Some(1_100));

        clock.advance(500);
        assert_eq!(job.run_once().await.unwrap().objs_indexed, 0);

        clock.advance(500);
        store
            .update(UpdateRequest::new(
                "app",
                "note",
                ObjQuery::default(),
                json!({"w": "x"}),
                actor(),
            ))
            .await
            .unwrap();
        let stats = job.run_once().await.unwrap();
        assert_eq!(stats.objs_indexed, 1);
        let rows = catalog
            .list_fields(&Partition::new("app", "g", "note"))
            .await
            .unwrap();
        assert_eq!(paths(&rows), vec!["v", "w"]);
    }
}
