//! The document store: CRUD over a [`StorageBackend`] plus the bulk-mutation
//! engine in [`bulk`].
//!
//! Every operation is scoped to one `(appId, tag)` and, unless asked
//! otherwise, to records that are not soft-deleted. Relative durations in
//! queries resolve against the store clock at call time.

pub mod bulk;
pub mod types;

pub use types::*;

use crate::clock::{Clock, IdGenerator, SystemClock, UuidV7Ids};
use crate::config::StoreConfig;
use crate::merge::merge_values;
use crate::storage::{DeleteMarker, FilterOf, StorageBackend};
use objdb_api::{Actor, Column, NewObj, Obj, ObjQuery, Result, SortDirection};
use objdb_query::{FieldPredicate, QueryCompiler, SortKey};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ObjStore<B: StorageBackend> {
    backend: B,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    config: StoreConfig,
}

impl<B: StorageBackend> ObjStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidV7Ids),
            config: StoreConfig::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Same clock, ids and config over another handle of the backend.
    fn rebind(&self, backend: B) -> Self {
        Self {
            backend,
            clock: self.clock.clone(),
            ids: self.ids.clone(),
            config: self.config.clone(),
        }
    }

    /// Stamp a fresh id and creation metadata onto caller input.
    pub fn new_obj(&self, item: NewObj, by: &Actor) -> Obj {
        let now = self.now();
        Obj {
            id: self.ids.next_id(),
            app_id: item.app_id,
            group_id: item.group_id,
            tag: item.tag,
            obj_record: item.obj_record,
            created_at: now,
            updated_at: now,
            created_by: by.id.clone(),
            created_by_type: by.kind.clone(),
            updated_by: by.id.clone(),
            updated_by_type: by.kind.clone(),
            deleted_at: None,
            deleted_by: None,
            deleted_by_type: None,
            should_index: item.should_index,
            fields_to_index: item.fields_to_index,
        }
    }

    /// `appId = ? AND tag = ?`, plus `deletedAt IS NULL` unless deleted rows are wanted.
    pub(crate) fn scope_filter(
        &self,
        app_id: &str,
        tag: &str,
        include_deleted: bool,
    ) -> Result<FilterOf<B>> {
        let c = self.backend.compiler();
        let mut filters = vec![
            c.compile_column(Column::AppId, &FieldPredicate::Eq(Value::from(app_id)))?,
            c.compile_column(Column::Tag, &FieldPredicate::Eq(Value::from(tag)))?,
        ];
        if !include_deleted {
            filters.push(c.is_null(Column::DeletedAt, true)?);
        }
        Ok(c.and_all(filters))
    }

    pub(crate) fn query_filter(
        &self,
        app_id: &str,
        tag: &str,
        query: &ObjQuery,
        include_deleted: bool,
    ) -> Result<FilterOf<B>> {
        let c = self.backend.compiler();
        let scope = self.scope_filter(app_id, tag, include_deleted)?;
        let user = c.transform_filter(query, self.now())?;
        Ok(c.and_all(vec![scope, user]))
    }

    /// Up to `limit` matches with ids strictly after `cursor`, in id order.
    pub(crate) async fn next_page(
        &self,
        base: &FilterOf<B>,
        cursor: Option<&str>,
        limit: u64,
    ) -> Result<Vec<Obj>> {
        let c = self.backend.compiler();
        let filter = match cursor {
            Some(id) => c.and_all(vec![base.clone(), c.id_after(id)]),
            None => base.clone(),
        };
        let sort = c.compile_sort(&[SortKey::column(Column::Id, SortDirection::Asc)])?;
        let page = c.compile_pagination(0, limit);
        self.backend.find(&filter, &sort, Some(&page)).await
    }

    #[tracing::instrument(skip(self, items, by), fields(count = items.len()))]
    pub async fn create(&self, items: Vec<NewObj>, by: &Actor) -> Result<Vec<Obj>> {
        let objs: Vec<Obj> = items.into_iter().map(|item| self.new_obj(item, by)).collect();
        if objs.is_empty() {
            return Ok(objs);
        }
        self.backend.insert(&objs).await?;
        debug!("[ObjStore] Created {} records", objs.len());
        Ok(objs)
    }

    #[tracing::instrument(skip(self, request), fields(app_id = %request.app_id, tag = %request.tag))]
    pub async fn read(&self, request: ReadRequest) -> Result<ReadResult> {
        let c = self.backend.compiler();
        let filter = self.query_filter(
            &request.app_id,
            &request.tag,
            &request.query,
            request.include_deleted,
        )?;
        let sort = c.transform_sort(&request.sort)?;
        let pagination = c.transform_pagination(request.page, request.limit)?;

        let objs = self.backend.find(&filter, &sort, Some(&pagination)).await?;
        let has_more = objs.len() as u64 == request.limit;
        debug!(
            "[ObjStore] Read page {} ({} records, has_more={})",
            request.page,
            objs.len(),
            has_more
        );
        Ok(ReadResult {
            objs,
            page: request.page,
            limit: request.limit,
            has_more,
        })
    }

    /// A live record by id, `None` when absent or soft-deleted.
    pub async fn get_by_id(&self, app_id: &str, tag: &str, id: &str) -> Result<Option<Obj>> {
        let c = self.backend.compiler();
        let filter = c.and_all(vec![
            self.scope_filter(app_id, tag, false)?,
            c.compile_column(Column::Id, &FieldPredicate::Eq(Value::from(id)))?,
        ]);
        let sort = c.transform_sort(&[])?;
        let page = c.compile_pagination(0, 1);
        Ok(self
            .backend
            .find(&filter, &sort, Some(&page))
            .await?
            .into_iter()
            .next())
    }

    pub async fn count(&self, request: CountRequest) -> Result<u64> {
        let filter = self.query_filter(
            &request.app_id,
            &request.tag,
            &request.query,
            request.include_deleted,
        )?;
        self.backend.count(&filter).await
    }

    /// Apply `update` to every live match. Zero matches is not an error.
    #[tracing::instrument(skip(self, request), fields(app_id = %request.app_id, tag = %request.tag))]
    pub async fn update(&self, request: UpdateRequest) -> Result<UpdateResult> {
        let base = self.query_filter(&request.app_id, &request.tag, &request.query, false)?;
        let batch = self.config.update_batch_size.max(1) as u64;

        let mut updated_objs = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut page = self.next_page(&base, cursor.as_deref(), batch).await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(last.id.clone());
            let full = page.len() as u64 == batch;

            let now = self.now();
            for obj in &mut page {
                obj.obj_record = merge_values(&obj.obj_record, &request.update, request.update_way);
                obj.touch(now, &request.by);
            }
            self.backend.replace(&page).await?;
            updated_objs.extend(page);
            if !full {
                break;
            }
        }

        info!("[ObjStore] Updated {} records", updated_objs.len());
        Ok(UpdateResult {
            updated_count: updated_objs.len() as u64,
            updated_objs,
        })
    }

    /// Soft delete: set the markers on every live match.
    #[tracing::instrument(skip(self, request), fields(app_id = %request.app_id, tag = %request.tag))]
    pub async fn delete(&self, request: DeleteRequest) -> Result<DeleteResult> {
        let filter = self.query_filter(&request.app_id, &request.tag, &request.query, false)?;
        let marker = DeleteMarker {
            at: request.date.unwrap_or_else(|| self.now()),
            by: request.by.id.clone(),
            by_type: request.by.kind.clone(),
        };
        let deleted_count = self.backend.mark_deleted(&filter, &marker).await?;
        info!("[ObjStore] Soft-deleted {} records", deleted_count);
        Ok(DeleteResult { deleted_count })
    }

    /// Run `f` against a transaction-bound store.
    ///
    /// Commits when `f` returns `Ok` and rolls back on `Err`. Backends without
    /// transactions (and stores already inside one) run `f` directly.
    pub async fn with_transaction<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce(ObjStore<B>) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let Some(tx) = self.backend.begin().await? else {
            return f(self.clone()).await;
        };
        match f(self.rebind(tx.clone())).await {
            Ok(value) => {
                tx.commit().await?;
                debug!("[ObjStore] Transaction committed");
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("[ObjStore] Rollback failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
