//! Bulk-mutation engine: conflict-aware upsert, batched update and delete,
//! and the cleanup pass for soft-deleted rows.
//!
//! Batches run strictly one after another; batch N+1 starts only after the
//! writes of batch N returned. Paging uses an `id > last` cursor so rows
//! touched in an earlier batch are never revisited.

use super::types::*;
use super::ObjStore;
use crate::catalog::FieldCatalog;
use crate::merge::merge_values;
use crate::storage::{DeleteMarker, FilterOf, StorageBackend};
use objdb_api::{Column, FieldPath, NewObj, Obj, OnConflict, Result, StoreError};
use objdb_query::{FieldPredicate, QueryCompiler};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// A record an upsert batch will write, either fresh or loaded by key.
struct Target {
    obj: Obj,
    is_new: bool,
    dirty: bool,
}

fn batch_size_or(requested: Option<usize>, default: usize, name: &str) -> Result<usize> {
    match requested.unwrap_or(default) {
        0 => Err(StoreError::validation(format!("{} must be at least 1", name))),
        n => Ok(n),
    }
}

/// Key values of an item, or `None` when any key is missing or null.
fn key_values(item: &NewObj, keys: &[FieldPath]) -> Option<Vec<Value>> {
    if keys.is_empty() {
        return None;
    }
    keys.iter()
        .map(|path| match path.get(&item.obj_record) {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.clone()),
        })
        .collect()
}

fn report(progress: &mut Option<ProgressCallback>, processed: u64, total: u64) {
    if let Some(f) = progress.as_mut() {
        f(processed, total);
    }
}

impl<B: StorageBackend> ObjStore<B> {
    /// Insert items, or fold them into the existing live record sharing all
    /// `conflict_on_keys` values within the same `(appId, groupId, tag)`.
    #[tracing::instrument(skip(self, items, options), fields(count = items.len(), on_conflict = ?options.on_conflict))]
    pub async fn bulk_upsert(
        &self,
        items: Vec<NewObj>,
        options: BulkUpsertOptions,
    ) -> Result<BulkUpsertResult> {
        let keys = options
            .conflict_on_keys
            .iter()
            .map(|raw| {
                let path = FieldPath::parse(raw)?;
                if path.has_wildcard() {
                    return Err(StoreError::validation(format!(
                        "conflict key '{}' cannot be array-compressed",
                        raw
                    )));
                }
                Ok(path)
            })
            .collect::<Result<Vec<_>>>()?;
        let batch_size = batch_size_or(
            options.batch_size,
            self.config().upsert_batch_size,
            "batch size",
        )?;

        let mut result = BulkUpsertResult::default();
        let mut items = items.into_iter();
        loop {
            let batch: Vec<NewObj> = items.by_ref().take(batch_size).collect();
            if batch.is_empty() {
                break;
            }
            self.upsert_batch(batch, &keys, &options, &mut result).await?;
        }

        info!(
            "[ObjStore] Bulk upsert: {} new, {} updated, {} ignored, {} failed",
            result.new_objs.len(),
            result.updated_objs.len(),
            result.ignored_items.len(),
            result.failed_items.len()
        );
        Ok(result)
    }

    async fn upsert_batch(
        &self,
        batch: Vec<NewObj>,
        keys: &[FieldPath],
        options: &BulkUpsertOptions,
        result: &mut BulkUpsertResult,
    ) -> Result<()> {
        let mut targets: Vec<Target> = Vec::new();
        let mut by_key: HashMap<String, usize> = HashMap::new();

        for item in batch {
            result.total_processed += 1;
            let Some(values) = key_values(&item, keys) else {
                targets.push(Target {
                    obj: self.new_obj(item, &options.by),
                    is_new: true,
                    dirty: true,
                });
                continue;
            };

            let key = serde_json::to_string(&(&item.app_id, &item.group_id, &item.tag, &values))?;
            let index = match by_key.get(&key) {
                Some(index) => *index,
                None => {
                    let existing = self.find_by_keys(&item, keys, &values).await?;
                    let target = match existing {
                        Some(obj) => Target {
                            obj,
                            is_new: false,
                            dirty: false,
                        },
                        None => {
                            by_key.insert(key, targets.len());
                            targets.push(Target {
                                obj: self.new_obj(item, &options.by),
                                is_new: true,
                                dirty: true,
                            });
                            continue;
                        }
                    };
                    by_key.insert(key, targets.len());
                    targets.push(target);
                    targets.len() - 1
                }
            };

            let target = &mut targets[index];
            match options.on_conflict.merge_strategy() {
                Some(way) => {
                    target.obj.obj_record = merge_values(&target.obj.obj_record, &item.obj_record, way);
                    if !target.is_new {
                        target.obj.touch(self.now(), &options.by);
                    }
                    target.dirty = true;
                }
                None if options.on_conflict == OnConflict::Ignore => {
                    result.ignored_items.push(item);
                }
                None => {
                    warn!(
                        "[ObjStore] Upsert item conflicts with record {}",
                        target.obj.id
                    );
                    result.failed_items.push(FailedItem {
                        reason: format!("conflicts with record {}", target.obj.id),
                        item,
                    });
                }
            }
        }

        let (new_objs, existing): (Vec<Target>, Vec<Target>) =
            targets.into_iter().partition(|t| t.is_new);
        let new_objs: Vec<Obj> = new_objs.into_iter().map(|t| t.obj).collect();
        let updated: Vec<Obj> = existing
            .into_iter()
            .filter(|t| t.dirty)
            .map(|t| t.obj)
            .collect();

        if !new_objs.is_empty() {
            self.backend().insert(&new_objs).await?;
        }
        if !updated.is_empty() {
            self.backend().replace(&updated).await?;
        }
        debug!(
            "[ObjStore] Upsert batch wrote {} new and {} updated records",
            new_objs.len(),
            updated.len()
        );
        result.new_objs.extend(new_objs);
        result.updated_objs.extend(updated);
        Ok(())
    }

    /// The most recent live record of the item's partition matching every key value.
    async fn find_by_keys(
        &self,
        item: &NewObj,
        keys: &[FieldPath],
        values: &[Value],
    ) -> Result<Option<Obj>> {
        let c = self.backend().compiler();
        let mut filters = vec![
            self.scope_filter(&item.app_id, &item.tag, false)?,
            c.compile_column(
                Column::GroupId,
                &FieldPredicate::Eq(Value::from(item.group_id.as_str())),
            )?,
        ];
        for (path, value) in keys.iter().zip(values) {
            filters.push(c.compile_payload(path, &FieldPredicate::Eq(value.clone()))?);
        }
        let filter = c.and_all(filters);
        let sort = c.transform_sort(&[])?;
        let page = c.compile_pagination(0, 1);
        Ok(self
            .backend()
            .find(&filter, &sort, Some(&page))
            .await?
            .into_iter()
            .next())
    }

    /// Merge `update` into every live match, batch by batch, up to `count`.
    #[tracing::instrument(skip(self, request), fields(app_id = %request.app_id, tag = %request.tag))]
    pub async fn bulk_update(&self, mut request: BulkUpdateRequest) -> Result<BulkUpdateResult> {
        let batch_size = batch_size_or(
            request.batch_size,
            self.config().update_batch_size,
            "batch size",
        )? as u64;
        let base = self.query_filter(&request.app_id, &request.tag, &request.query, false)?;

        let matching = self.backend().count(&base).await?;
        let total = request.count.map_or(matching, |cap| cap.min(matching));

        let mut processed = 0u64;
        let mut cursor: Option<String> = None;
        while processed < total {
            let limit = batch_size.min(total - processed);
            let mut page = self.next_page(&base, cursor.as_deref(), limit).await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(last.id.clone());

            let now = self.now();
            for obj in &mut page {
                obj.obj_record = merge_values(&obj.obj_record, &request.update, request.update_way);
                obj.touch(now, &request.by);
            }
            self.backend().replace(&page).await?;
            processed += page.len() as u64;
            debug!("[ObjStore] Bulk update batch: {}/{}", processed, total);
            report(&mut request.on_progress, processed, total);
        }

        info!("[ObjStore] Bulk update finished: {} records", processed);
        Ok(BulkUpdateResult {
            updated_count: processed,
            total,
        })
    }

    /// Soft- or hard-delete live matches batch by batch.
    ///
    /// With `delete_many` off only the first match by the default sort
    /// (most recent first) is affected.
    #[tracing::instrument(skip(self, request), fields(app_id = %request.app_id, tag = %request.tag, hard = request.hard_delete))]
    pub async fn bulk_delete(&self, mut request: BulkDeleteRequest) -> Result<BulkDeleteResult> {
        let batch_size = batch_size_or(
            request.batch_size,
            self.config().delete_batch_size,
            "batch size",
        )? as u64;
        let base = self.query_filter(&request.app_id, &request.tag, &request.query, false)?;
        let marker = DeleteMarker {
            at: self.now(),
            by: request.by.id.clone(),
            by_type: request.by.kind.clone(),
        };

        if !request.delete_many {
            let c = self.backend().compiler();
            let sort = c.transform_sort(&[])?;
            let page = c.compile_pagination(0, 1);
            let first = self.backend().find(&base, &sort, Some(&page)).await?;
            let deleted_count = self.delete_ids(&first, request.hard_delete, &marker).await?;
            report(&mut request.on_progress, deleted_count, deleted_count);
            info!("[ObjStore] Bulk delete (single) removed {} records", deleted_count);
            return Ok(BulkDeleteResult { deleted_count });
        }

        let total = self.backend().count(&base).await?;
        let mut deleted_count = 0u64;
        let mut cursor: Option<String> = None;
        loop {
            let page = self.next_page(&base, cursor.as_deref(), batch_size).await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(last.id.clone());
            deleted_count += self.delete_ids(&page, request.hard_delete, &marker).await?;
            debug!("[ObjStore] Bulk delete batch: {}/{}", deleted_count, total);
            report(&mut request.on_progress, deleted_count, total);
            if (page.len() as u64) < batch_size {
                break;
            }
        }

        info!("[ObjStore] Bulk delete finished: {} records", deleted_count);
        Ok(BulkDeleteResult { deleted_count })
    }

    async fn delete_ids(&self, objs: &[Obj], hard: bool, marker: &DeleteMarker) -> Result<u64> {
        if objs.is_empty() {
            return Ok(0);
        }
        let ids: Vec<String> = objs.iter().map(|o| o.id.clone()).collect();
        if hard {
            self.backend().remove(&ids).await
        } else {
            let filter = self.backend().compiler().ids_in(&ids)?;
            self.backend().mark_deleted(&filter, marker).await
        }
    }

    /// Physically remove soft-deleted rows.
    ///
    /// With a catalog, partitions that end up with no records are dropped
    /// from it afterwards.
    #[tracing::instrument(skip(self, request, catalog), fields(app_id = ?request.app_id))]
    pub async fn cleanup(
        &self,
        mut request: CleanupRequest,
        catalog: Option<&dyn FieldCatalog>,
    ) -> Result<CleanupResult> {
        let batch_size = batch_size_or(
            request.batch_size,
            self.config().cleanup_batch_size,
            "batch size",
        )? as u64;
        let c = self.backend().compiler();
        let mut filters = vec![c.is_null(Column::DeletedAt, false)?];
        if let Some(app_id) = &request.app_id {
            filters.push(c.compile_column(
                Column::AppId,
                &FieldPredicate::Eq(Value::from(app_id.as_str())),
            )?);
        }
        let base = c.and_all(filters);

        let total = self.backend().count(&base).await?;
        let mut removed_count = 0u64;
        let mut cursor: Option<String> = None;
        loop {
            let page = self.next_page(&base, cursor.as_deref(), batch_size).await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(last.id.clone());
            let ids: Vec<String> = page.iter().map(|o| o.id.clone()).collect();
            removed_count += self.backend().remove(&ids).await?;
            debug!("[ObjStore] Cleanup batch: {}/{}", removed_count, total);
            report(&mut request.on_progress, removed_count, total);
            if (page.len() as u64) < batch_size {
                break;
            }
        }

        let mut dropped_partitions = Vec::new();
        if let Some(catalog) = catalog {
            for partition in catalog.partitions(request.app_id.as_deref()).await? {
                if self.partition_is_empty(&partition).await? {
                    catalog.delete_partition(&partition).await?;
                    dropped_partitions.push(partition);
                }
            }
        }

        info!(
            "[ObjStore] Cleanup removed {} records, dropped {} catalog partitions",
            removed_count,
            dropped_partitions.len()
        );
        Ok(CleanupResult {
            removed_count,
            dropped_partitions,
        })
    }

    async fn partition_is_empty(&self, partition: &crate::catalog::Partition) -> Result<bool> {
        let c = self.backend().compiler();
        let filter: FilterOf<B> = c.and_all(vec![
            self.scope_filter(&partition.app_id, &partition.tag, true)?,
            c.compile_column(
                Column::GroupId,
                &FieldPredicate::Eq(Value::from(partition.group_id.as_str())),
            )?,
        ]);
        Ok(self.backend().count(&filter).await? == 0)
    }
}
