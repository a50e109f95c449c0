use super::{FieldCatalog, Partition, fold_descriptors};
use async_trait::async_trait;
use objdb_api::{FieldDescriptor, ObjField, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type Rows = BTreeMap<Partition, BTreeMap<String, ObjField>>;

/// In-memory field catalog.
///
/// Clones share the same rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryFieldCatalog {
    rows: Arc<RwLock<Rows>>,
}

impl MemoryFieldCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FieldCatalog for MemoryFieldCatalog {
    async fn upsert_fields(
        &self,
        partition: &Partition,
        fields: &[FieldDescriptor],
        now: i64,
    ) -> Result<Vec<ObjField>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        let mut rows = self.rows.write().await;
        let current = rows.entry(partition.clone()).or_default();
        let written = fold_descriptors(current.clone(), partition, fields, now);
        for row in &written {
            current.insert(row.path.clone(), row.clone());
        }
        Ok(written)
    }

    async fn list_fields(&self, partition: &Partition) -> Result<Vec<ObjField>> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(partition)
            .map(|fields| fields.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_fields(&self, partition: &Partition, paths: &[String]) -> Result<u64> {
        let mut rows = self.rows.write().await;
        let Some(fields) = rows.get_mut(partition) else {
            return Ok(0);
        };
        let removed = paths.iter().filter(|p| fields.remove(*p).is_some()).count();
        if fields.is_empty() {
            rows.remove(partition);
        }
        Ok(removed as u64)
    }

    async fn delete_partition(&self, partition: &Partition) -> Result<u64> {
        let mut rows = self.rows.write().await;
        Ok(rows
            .remove(partition)
            .map(|fields| fields.len() as u64)
            .unwrap_or(0))
    }

    async fn partitions(&self, app_id: Option<&str>) -> Result<Vec<Partition>> {
        let rows = self.rows.read().await;
        Ok(rows
            .keys()
            .filter(|p| app_id.is_none_or(|app| p.app_id == app))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objdb_api::JsonType;
    use std::collections::BTreeSet;

    #[tokio::test]
    async fn test_upsert_accumulates_across_calls() {
        let catalog = MemoryFieldCatalog::new();
        let p = Partition::new("app", "g", "t");

        catalog
            .upsert_fields(&p, &[FieldDescriptor::leaf("name", JsonType::String)], 1)
            .await
            .unwrap();
        let rows = catalog
            .upsert_fields(&p, &[FieldDescriptor::leaf("name", JsonType::Number)], 2)
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].field_type, JsonType::String);
        assert_eq!(
            rows[0].value_types,
            BTreeSet::from([JsonType::String, JsonType::Number])
        );
        assert_eq!(rows[0].created_at, 1);
        assert_eq!(catalog.list_fields(&p).await.unwrap(), rows);
    }

    #[tokio::test]
    async fn test_deletes_and_partitions() {
        let catalog = MemoryFieldCatalog::new();
        let a = Partition::new("app", "g", "a");
        let b = Partition::new("other", "g", "b");
        let fields = [
            FieldDescriptor::leaf("x", JsonType::Null),
            FieldDescriptor::leaf("y", JsonType::Boolean),
        ];
        catalog.upsert_fields(&a, &fields, 1).await.unwrap();
        catalog.upsert_fields(&b, &fields, 1).await.unwrap();

        assert_eq!(catalog.partitions(None).await.unwrap().len(), 2);
        assert_eq!(catalog.partitions(Some("app")).await.unwrap(), vec![a.clone()]);

        assert_eq!(
            catalog
                .delete_fields(&a, &["x".to_string(), "missing".to_string()])
                .await
                .unwrap(),
            1
        );
        assert_eq!(catalog.delete_partition(&b).await.unwrap(), 2);
        assert_eq!(catalog.delete_partition(&b).await.unwrap(), 0);
        assert_eq!(catalog.partitions(None).await.unwrap(), vec![a]);
    }
}
