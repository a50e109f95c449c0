//! Request and result types for the store API.

use objdb_api::{Actor, NewObj, Obj, ObjQuery, OnConflict, SortItem, UpdateWay};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Called after each batch with `(processed, total)`.
pub type ProgressCallback = Box<dyn FnMut(u64, u64) + Send>;

pub const DEFAULT_READ_LIMIT: u64 = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadRequest {
    pub app_id: String,
    pub tag: String,
    #[serde(default)]
    pub query: ObjQuery,
    #[serde(default)]
    pub sort: Vec<SortItem>,
    /// 1-based
    pub page: u64,
    pub limit: u64,
    #[serde(default)]
    pub include_deleted: bool,
}

impl ReadRequest {
    pub fn new(app_id: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            tag: tag.into(),
            query: ObjQuery::default(),
            sort: Vec::new(),
            page: 1,
            limit: DEFAULT_READ_LIMIT,
            include_deleted: false,
        }
    }

    pub fn with_query(mut self, query: ObjQuery) -> Self {
        self.query = query;
        self
    }

    pub fn with_sort(mut self, sort: Vec<SortItem>) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_page(mut self, page: u64, limit: u64) -> Self {
        self.page = page;
        self.limit = limit;
        self
    }

    pub fn including_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResult {
    pub objs: Vec<Obj>,
    pub page: u64,
    pub limit: u64,
    /// The page came back full; there may be more.
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountRequest {
    pub app_id: String,
    pub tag: String,
    #[serde(default)]
    pub query: ObjQuery,
    #[serde(default)]
    pub include_deleted: bool,
}

impl CountRequest {
    pub fn new(app_id: impl Into<String>, tag: impl Into<String>, query: ObjQuery) -> Self {
        Self {
            app_id: app_id.into(),
            tag: tag.into(),
            query,
            include_deleted: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub app_id: String,
    pub tag: String,
    pub query: ObjQuery,
    pub update: Value,
    pub update_way: UpdateWay,
    pub by: Actor,
}

impl UpdateRequest {
    pub fn new(
        app_id: impl Into<String>,
        tag: impl Into<String>,
        query: ObjQuery,
        update: Value,
        by: Actor,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            tag: tag.into(),
            query,
            update,
            update_way: UpdateWay::default(),
            by,
        }
    }

    pub fn with_update_way(mut self, way: UpdateWay) -> Self {
        self.update_way = way;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub updated_count: u64,
    pub updated_objs: Vec<Obj>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRequest {
    pub app_id: String,
    pub tag: String,
    pub query: ObjQuery,
    pub by: Actor,
    /// Soft-delete instant; the store clock when absent.
    pub date: Option<i64>,
}

impl DeleteRequest {
    pub fn new(app_id: impl Into<String>, tag: impl Into<String>, query: ObjQuery, by: Actor) -> Self {
        Self {
            app_id: app_id.into(),
            tag: tag.into(),
            query,
            by,
            date: None,
        }
    }

    pub fn at(mut self, date: i64) -> Self {
        self.date = Some(date);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub deleted_count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkUpsertOptions {
    /// Payload paths that together identify a logical record.
    pub conflict_on_keys: Vec<String>,
    pub on_conflict: OnConflict,
    /// Falls back to `StoreConfig::upsert_batch_size`.
    pub batch_size: Option<usize>,
    pub by: Actor,
}

impl BulkUpsertOptions {
    pub fn new(by: Actor) -> Self {
        Self {
            conflict_on_keys: Vec::new(),
            on_conflict: OnConflict::default(),
            batch_size: None,
            by,
        }
    }

    pub fn conflict_on(mut self, keys: &[&str]) -> Self {
        self.conflict_on_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn on_conflict(mut self, policy: OnConflict) -> Self {
        self.on_conflict = policy;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedItem {
    pub item: NewObj,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUpsertResult {
    pub new_objs: Vec<Obj>,
    pub updated_objs: Vec<Obj>,
    pub ignored_items: Vec<NewObj>,
    pub failed_items: Vec<FailedItem>,
    pub total_processed: u64,
}

pub struct BulkUpdateRequest {
    pub app_id: String,
    pub tag: String,
    pub query: ObjQuery,
    pub update: Value,
    pub update_way: UpdateWay,
    pub by: Actor,
    /// Stop after this many records.
    pub count: Option<u64>,
    /// Falls back to `StoreConfig::update_batch_size`.
    pub batch_size: Option<usize>,
    pub on_progress: Option<ProgressCallback>,
}

impl BulkUpdateRequest {
    pub fn new(
        app_id: impl Into<String>,
        tag: impl Into<String>,
        query: ObjQuery,
        update: Value,
        by: Actor,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            tag: tag.into(),
            query,
            update,
            update_way: UpdateWay::default(),
            by,
            count: None,
            batch_size: None,
            on_progress: None,
        }
    }

    pub fn with_update_way(mut self, way: UpdateWay) -> Self {
        self.update_way = way;
        self
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn on_progress(mut self, f: impl FnMut(u64, u64) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUpdateResult {
    pub updated_count: u64,
    /// Matches at the start of the run, capped by `count`.
    pub total: u64,
}

pub struct BulkDeleteRequest {
    pub app_id: String,
    pub tag: String,
    pub query: ObjQuery,
    pub by: Actor,
    pub hard_delete: bool,
    pub delete_many: bool,
    /// Falls back to `StoreConfig::delete_batch_size`.
    pub batch_size: Option<usize>,
    pub on_progress: Option<ProgressCallback>,
}

impl BulkDeleteRequest {
    pub fn new(app_id: impl Into<String>, tag: impl Into<String>, query: ObjQuery, by: Actor) -> Self {
        Self {
            app_id: app_id.into(),
            tag: tag.into(),
            query,
            by,
            hard_delete: false,
            delete_many: true,
            batch_size: None,
            on_progress: None,
        }
    }

    pub fn hard(mut self) -> Self {
        self.hard_delete = true;
        self
    }

    pub fn only_one(mut self) -> Self {
        self.delete_many = false;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn on_progress(mut self, f: impl FnMut(u64, u64) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeleteResult {
    pub deleted_count: u64,
}

#[derive(Default)]
pub struct CleanupRequest {
    /// Restrict the pass to one app; every app when `None`.
    pub app_id: Option<String>,
    /// Falls back to `StoreConfig::cleanup_batch_size`.
    pub batch_size: Option<usize>,
    pub on_progress: Option<ProgressCallback>,
}

impl CleanupRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_app(app_id: impl Into<String>) -> Self {
        Self {
            app_id: Some(app_id.into()),
            ..Self::default()
        }
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn on_progress(mut self, f: impl FnMut(u64, u64) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupResult {
    pub removed_count: u64,
    /// Catalog partitions dropped because no records were left in them.
    pub dropped_partitions: Vec<crate::catalog::Partition>,
}
