use super::{FieldCatalog, Partition, fold_descriptors};
use crate::config::validate_identifier;
use crate::storage::map_sqlx_error;
use crate::storage::schema::{TableSchema, fields_schema};
use async_trait::async_trait;
use objdb_api::{FieldDescriptor, JsonType, ObjField, Result, StoreError};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

const PATH_CHUNK: usize = 500;

/// Field catalog stored in a SQLite table, unique on app/group/tag/path.
#[derive(Debug, Clone)]
pub struct SqliteFieldCatalog {
    pool: SqlitePool,
    schema: Arc<TableSchema>,
}

impl SqliteFieldCatalog {
    pub fn new(pool: SqlitePool, table: &str) -> Result<Self> {
        validate_identifier(table).map_err(|e| StoreError::validation(e.to_string()))?;
        Ok(Self {
            pool,
            schema: Arc::new(fields_schema(table)),
        })
    }

    /// Create the table and share the pool of an existing backend.
    pub async fn connect(pool: SqlitePool, table: &str) -> Result<Self> {
        let catalog = Self::new(pool, table)?;
        catalog.migrate().await?;
        Ok(catalog)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(&self.schema.to_create_table_sql())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        for statement in self.schema.to_index_sql() {
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        }
        Ok(())
    }

    fn table(&self) -> &str {
        &self.schema.table_name
    }

    fn columns(&self) -> String {
        self.schema.column_names().join(", ")
    }

    fn encode_types(types: &BTreeSet<JsonType>) -> Result<String> {
        Ok(serde_json::to_string(types)?)
    }

    fn decode_types(raw: &str) -> Result<BTreeSet<JsonType>> {
        Ok(serde_json::from_str(raw)?)
    }

    fn row_to_field(row: &SqliteRow) -> Result<ObjField> {
        let get_err = |e: sqlx::Error| StoreError::Serialization(e.to_string());
        let field_type: String = row.try_get("field_type").map_err(get_err)?;
        let array_types: Option<String> = row.try_get("array_types").map_err(get_err)?;
        let value_types: String = row.try_get("value_types").map_err(get_err)?;
        Ok(ObjField {
            app_id: row.try_get("app_id").map_err(get_err)?,
            group_id: row.try_get("group_id").map_err(get_err)?,
            tag: row.try_get("tag").map_err(get_err)?,
            path: row.try_get("path").map_err(get_err)?,
            field_type: JsonType::parse(&field_type).ok_or_else(|| {
                StoreError::Serialization(format!("unknown field type {:?}", field_type))
            })?,
            array_types: array_types
                .as_deref()
                .map(Self::decode_types)
                .transpose()?,
            value_types: Self::decode_types(&value_types)?,
            is_array_compressed: row.try_get("is_array_compressed").map_err(get_err)?,
            created_at: row.try_get("created_at").map_err(get_err)?,
            updated_at: row.try_get("updated_at").map_err(get_err)?,
        })
    }
}

#[async_trait]
impl FieldCatalog for SqliteFieldCatalog {
    async fn upsert_fields(
        &self,
        partition: &Partition,
        fields: &[FieldDescriptor],
        now: i64,
    ) -> Result<Vec<ObjField>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let paths: BTreeSet<&str> = fields.iter().map(|f| f.path.as_str()).collect();
        let paths: Vec<&str> = paths.into_iter().collect();
        let mut current = BTreeMap::new();
        for chunk in paths.chunks(PATH_CHUNK) {
            let sql = format!(
                "SELECT {} FROM {} WHERE app_id = ? AND group_id = ? AND tag = ? AND path IN ({})",
                self.columns(),
                self.table(),
                vec!["?"; chunk.len()].join(", ")
            );
            let mut query = sqlx::query(&sql)
                .bind(&partition.app_id)
                .bind(&partition.group_id)
                .bind(&partition.tag);
            for path in chunk {
                query = query.bind(*path);
            }
            let rows = query.fetch_all(&mut *tx).await.map_err(map_sqlx_error)?;
            for row in &rows {
                let field = Self::row_to_field(row)?;
                current.insert(field.path.clone(), field);
            }
        }

        let written = fold_descriptors(current, partition, fields, now);

        let sql = format!(
            "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(app_id, group_id, tag, path) DO UPDATE SET \
             field_type = excluded.field_type, \
             array_types = excluded.array_types, \
             value_types = excluded.value_types, \
             is_array_compressed = excluded.is_array_compressed, \
             updated_at = excluded.updated_at",
            self.table(),
            self.columns()
        );
        for row in &written {
            let array_types = row
                .array_types
                .as_ref()
                .map(Self::encode_types)
                .transpose()?;
            sqlx::query(&sql)
                .bind(&row.app_id)
                .bind(&row.group_id)
                .bind(&row.tag)
                .bind(&row.path)
                .bind(row.field_type.as_str())
                .bind(array_types)
                .bind(Self::encode_types(&row.value_types)?)
                .bind(row.is_array_compressed)
                .bind(row.created_at)
                .bind(row.updated_at)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        tracing::debug!(
            "[SqliteFieldCatalog] upserted {} fields for {}/{}/{}",
            written.len(),
            partition.app_id,
            partition.group_id,
            partition.tag
        );
        Ok(written)
    }

    async fn list_fields(&self, partition: &Partition) -> Result<Vec<ObjField>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE app_id = ? AND group_id = ? AND tag = ? ORDER BY path",
            self.columns(),
            self.table()
        );
        let rows = sqlx::query(&sql)
            .bind(&partition.app_id)
            .bind(&partition.group_id)
            .bind(&partition.tag)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(Self::row_to_field).collect()
    }

    async fn delete_fields(&self, partition: &Partition, paths: &[String]) -> Result<u64> {
        let mut removed = 0;
        for chunk in paths.chunks(PATH_CHUNK) {
            let sql = format!(
                "DELETE FROM {} WHERE app_id = ? AND group_id = ? AND tag = ? AND path IN ({})",
                self.table(),
                vec!["?"; chunk.len()].join(", ")
            );
            let mut query = sqlx::query(&sql)
                .bind(&partition.app_id)
                .bind(&partition.group_id)
                .bind(&partition.tag);
            for path in chunk {
                query = query.bind(path);
            }
            removed += query
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?
                .rows_affected();
        }
        Ok(removed)
    }

    async fn delete_partition(&self, partition: &Partition) -> Result<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE app_id = ? AND group_id = ? AND tag = ?",
            self.table()
        );
        let result = sqlx::query(&sql)
            .bind(&partition.app_id)
            .bind(&partition.group_id)
            .bind(&partition.tag)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn partitions(&self, app_id: Option<&str>) -> Result<Vec<Partition>> {
        let base = format!("SELECT DISTINCT app_id, group_id, tag FROM {}", self.table());
        let order = " ORDER BY app_id, group_id, tag";
        let rows = match app_id {
            Some(app) => {
                sqlx::query(&format!("{} WHERE app_id = ?{}", base, order))
                    .bind(app)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query(&format!("{}{}", base, order))
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(map_sqlx_error)?;

        rows.iter()
            .map(|row| {
                let get_err = |e: sqlx::Error| StoreError::Serialization(e.to_string());
                Ok(Partition {
                    app_id: row.try_get("app_id").map_err(get_err)?,
                    group_id: row.try_get("group_id").map_err(get_err)?,
                    tag: row.try_get("tag").map_err(get_err)?,
                })
            })
            .collect()
    }
}
