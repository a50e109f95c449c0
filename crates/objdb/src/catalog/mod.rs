//! Field catalog: the distinct paths observed per app/group/tag.
//!
//! Rows are written by the indexing pipeline only. Path-based read APIs use
//! the catalog to decide which payload paths are legal sort and filter
//! targets.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryFieldCatalog;
pub use sqlite::SqliteFieldCatalog;

use async_trait::async_trait;
use objdb_api::{FieldDescriptor, ObjField, Result, SortItem, StoreError};
use objdb_query::{SortKey, SortTarget};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One catalog partition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    pub app_id: String,
    pub group_id: String,
    pub tag: String,
}

impl Partition {
    pub fn new(
        app_id: impl Into<String>,
        group_id: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            group_id: group_id.into(),
            tag: tag.into(),
        }
    }
}

#[async_trait]
pub trait FieldCatalog: Send + Sync {
    /// Fold descriptors into the partition's rows and return the rows written.
    ///
    /// Types only accumulate; nothing is removed.
    async fn upsert_fields(
        &self,
        partition: &Partition,
        fields: &[FieldDescriptor],
        now: i64,
    ) -> Result<Vec<ObjField>>;

    /// Rows of one partition, ordered by path.
    async fn list_fields(&self, partition: &Partition) -> Result<Vec<ObjField>>;

    async fn delete_fields(&self, partition: &Partition, paths: &[String]) -> Result<u64>;

    async fn delete_partition(&self, partition: &Partition) -> Result<u64>;

    /// Distinct partitions, optionally restricted to one app.
    async fn partitions(&self, app_id: Option<&str>) -> Result<Vec<Partition>>;
}

/// Fold a batch of descriptors into the current rows, in order.
///
/// Shared by the catalog implementations so both apply the same type policy.
pub(crate) fn fold_descriptors(
    mut current: BTreeMap<String, ObjField>,
    partition: &Partition,
    fields: &[FieldDescriptor],
    now: i64,
) -> Vec<ObjField> {
    let mut touched = Vec::new();
    for descriptor in fields {
        let merged = ObjField::merge_descriptor(
            current.get(&descriptor.path),
            &partition.app_id,
            &partition.group_id,
            &partition.tag,
            descriptor,
            now,
        );
        if !touched.contains(&descriptor.path) {
            touched.push(descriptor.path.clone());
        }
        current.insert(descriptor.path.clone(), merged);
    }
    touched
        .into_iter()
        .filter_map(|path| current.remove(&path))
        .collect()
}

/// Reject sort items naming payload paths the catalog has never seen.
///
/// Metadata fields are always sortable.
pub async fn validate_sort_fields<C: FieldCatalog + ?Sized>(
    catalog: &C,
    partition: &Partition,
    sort: &[SortItem],
) -> Result<()> {
    let mut paths = Vec::new();
    for item in sort {
        if let SortTarget::Payload(path) = SortKey::resolve(item)?.target {
            paths.push(path.to_string());
        }
    }
    ensure_fields_indexed(catalog, partition, &paths).await
}

/// Every payload path must have a catalog row in the partition.
pub async fn ensure_fields_indexed<C: FieldCatalog + ?Sized>(
    catalog: &C,
    partition: &Partition,
    paths: &[String],
) -> Result<()> {
    if paths.is_empty() {
        return Ok(());
    }
    let known = catalog.list_fields(partition).await?;
    let missing: Vec<&str> = paths
        .iter()
        .map(String::as_str)
        .filter(|p| !known.iter().any(|row| row.path == *p))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(StoreError::validation(format!(
            "fields are not indexed for {}/{}/{}: {}",
            partition.app_id,
            partition.group_id,
            partition.tag,
            missing.join(", ")
        )))
    }
}
