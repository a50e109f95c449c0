use super::backend::{DeleteMarker, StorageBackend};
use super::schema::{TableSchema, objs_schema};
use crate::config::{SqliteConfig, StoreConfig, validate_identifier};
use async_trait::async_trait;
use objdb_api::{Obj, Result, StoreError};
use objdb_query::{SqlOrderBy, SqlPagination, SqlPredicate, SqlQueryCompiler, SqlValue};
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteQueryResult, SqliteRow,
};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Largest id list bound into one statement.
const ID_CHUNK: usize = 500;

/// Map driver errors onto the store's error type.
///
/// Unique violations become `Conflict`; everything else is a backend error.
pub fn map_sqlx_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(db.message().to_string())
        }
        _ => StoreError::Backend(e.to_string()),
    }
}

pub(crate) fn bind_params(mut query: SqliteQuery<'_>, params: Vec<SqlValue>) -> SqliteQuery<'_> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Integer(i) => query.bind(i),
            SqlValue::Real(f) => query.bind(f),
            SqlValue::Text(s) => query.bind(s),
            SqlValue::Bool(b) => query.bind(b),
        };
    }
    query
}

/// Where statements run: the shared pool, or one open transaction.
#[derive(Clone)]
enum Conn {
    Pool(SqlitePool),
    Tx(Arc<Mutex<Option<Transaction<'static, Sqlite>>>>),
}

impl std::fmt::Debug for Conn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Conn::Pool(_) => f.write_str("Conn::Pool"),
            Conn::Tx(_) => f.write_str("Conn::Tx"),
        }
    }
}

/// Records in one SQLite table with a JSON payload column.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
    conn: Conn,
    schema: Arc<TableSchema>,
    columns: Arc<String>,
    compiler: SqlQueryCompiler,
}

impl SqliteBackend {
    pub async fn connect(sqlite: &SqliteConfig, store: &StoreConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&sqlite.database_url)
            .map_err(map_sqlx_error)?
            .create_if_missing(true);

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(sqlite.max_connections)
            .acquire_timeout(Duration::from_secs(sqlite.acquire_timeout_secs));
        if sqlite.is_in_memory() {
            // Each connection to :memory: is its own database
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(map_sqlx_error)?;

        tracing::info!("SQLite store opened at: {}", sqlite.database_url);

        let backend = Self::from_pool(pool, &store.objs_table)?;
        backend.migrate().await?;
        Ok(backend)
    }

    pub async fn new_in_memory() -> Result<Self> {
        Self::connect(&SqliteConfig::default(), &StoreConfig::default()).await
    }

    /// Wrap an existing pool. Call [`migrate`](Self::migrate) before use.
    pub fn from_pool(pool: SqlitePool, table: &str) -> Result<Self> {
        validate_identifier(table).map_err(|e| StoreError::validation(e.to_string()))?;
        let schema = objs_schema(table);
        let columns = schema.column_names().join(", ");
        Ok(Self {
            conn: Conn::Pool(pool.clone()),
            pool,
            schema: Arc::new(schema),
            columns: Arc::new(columns),
            compiler: SqlQueryCompiler::new(),
        })
    }

    /// The underlying pool, for sharing with the field catalog.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn table(&self) -> &str {
        &self.schema.table_name
    }

    pub async fn migrate(&self) -> Result<()> {
        self.execute_raw(&self.schema.to_create_table_sql()).await?;
        for statement in self.schema.to_index_sql() {
            self.execute_raw(&statement).await?;
        }
        Ok(())
    }

    async fn execute_raw(&self, sql: &str) -> Result<()> {
        self.execute(sql, Vec::new()).await.map(|_| ())
    }

    async fn fetch_all(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<SqliteRow>> {
        let query = bind_params(sqlx::query(sql), params);
        match &self.conn {
            Conn::Pool(pool) => query.fetch_all(pool).await.map_err(map_sqlx_error),
            Conn::Tx(tx) => {
                let mut guard = tx.lock().await;
                let tx = guard.as_mut().ok_or_else(transaction_closed)?;
                query.fetch_all(&mut **tx).await.map_err(map_sqlx_error)
            }
        }
    }

    async fn execute(&self, sql: &str, params: Vec<SqlValue>) -> Result<SqliteQueryResult> {
        let query = bind_params(sqlx::query(sql), params);
        match &self.conn {
            Conn::Pool(pool) => query.execute(pool).await.map_err(map_sqlx_error),
            Conn::Tx(tx) => {
                let mut guard = tx.lock().await;
                let tx = guard.as_mut().ok_or_else(transaction_closed)?;
                query.execute(&mut **tx).await.map_err(map_sqlx_error)
            }
        }
    }

    /// Run several statements atomically; reuses the open transaction if any.
    async fn write_batch(&self, statements: Vec<(String, Vec<SqlValue>)>) -> Result<u64> {
        let mut affected = 0;
        match &self.conn {
            Conn::Pool(pool) => {
                let mut tx = pool.begin().await.map_err(map_sqlx_error)?;
                for (sql, params) in statements {
                    let result = bind_params(sqlx::query(&sql), params)
                        .execute(&mut *tx)
                        .await
                        .map_err(map_sqlx_error)?;
                    affected += result.rows_affected();
                }
                tx.commit().await.map_err(map_sqlx_error)?;
            }
            Conn::Tx(tx) => {
                let mut guard = tx.lock().await;
                let tx = guard.as_mut().ok_or_else(transaction_closed)?;
                for (sql, params) in statements {
                    let result = bind_params(sqlx::query(&sql), params)
                        .execute(&mut **tx)
                        .await
                        .map_err(map_sqlx_error)?;
                    affected += result.rows_affected();
                }
            }
        }
        Ok(affected)
    }

    fn obj_params(obj: &Obj) -> Result<Vec<SqlValue>> {
        let fields_to_index = match &obj.fields_to_index {
            Some(list) => SqlValue::Text(serde_json::to_string(list)?),
            None => SqlValue::Null,
        };
        let optional = |v: &Option<String>| match v {
            Some(s) => SqlValue::Text(s.clone()),
            None => SqlValue::Null,
        };
        Ok(vec![
            SqlValue::Text(obj.id.clone()),
            SqlValue::Text(obj.app_id.clone()),
            SqlValue::Text(obj.group_id.clone()),
            SqlValue::Text(obj.tag.clone()),
            SqlValue::Text(serde_json::to_string(&obj.obj_record)?),
            SqlValue::Integer(obj.created_at),
            SqlValue::Integer(obj.updated_at),
            SqlValue::Text(obj.created_by.clone()),
            SqlValue::Text(obj.created_by_type.clone()),
            SqlValue::Text(obj.updated_by.clone()),
            SqlValue::Text(obj.updated_by_type.clone()),
            obj.deleted_at.map_or(SqlValue::Null, SqlValue::Integer),
            optional(&obj.deleted_by),
            optional(&obj.deleted_by_type),
            SqlValue::Bool(obj.should_index),
            fields_to_index,
        ])
    }

    fn row_to_obj(row: &SqliteRow) -> Result<Obj> {
        let get_err = |e: sqlx::Error| StoreError::Serialization(e.to_string());
        let obj_record: String = row.try_get("obj_record").map_err(get_err)?;
        let fields_to_index: Option<String> = row.try_get("fields_to_index").map_err(get_err)?;
        Ok(Obj {
            id: row.try_get("id").map_err(get_err)?,
            app_id: row.try_get("app_id").map_err(get_err)?,
            group_id: row.try_get("group_id").map_err(get_err)?,
            tag: row.try_get("tag").map_err(get_err)?,
            obj_record: serde_json::from_str(&obj_record)?,
            created_at: row.try_get("created_at").map_err(get_err)?,
            updated_at: row.try_get("updated_at").map_err(get_err)?,
            created_by: row.try_get("created_by").map_err(get_err)?,
            created_by_type: row.try_get("created_by_type").map_err(get_err)?,
            updated_by: row.try_get("updated_by").map_err(get_err)?,
            updated_by_type: row.try_get("updated_by_type").map_err(get_err)?,
            deleted_at: row.try_get("deleted_at").map_err(get_err)?,
            deleted_by: row.try_get("deleted_by").map_err(get_err)?,
            deleted_by_type: row.try_get("deleted_by_type").map_err(get_err)?,
            should_index: row.try_get("should_index").map_err(get_err)?,
            fields_to_index: fields_to_index
                .map(|raw| serde_json::from_str(&raw))
                .transpose()?,
        })
    }

    fn placeholders(n: usize) -> String {
        vec!["?"; n].join(", ")
    }
}

fn transaction_closed() -> StoreError {
    StoreError::Backend("transaction already finished".to_string())
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    type Compiler = SqlQueryCompiler;

    fn compiler(&self) -> &SqlQueryCompiler {
        &self.compiler
    }

    async fn insert(&self, objs: &[Obj]) -> Result<()> {
        if objs.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table(),
            self.columns,
            Self::placeholders(self.schema.columns.len())
        );
        let statements = objs
            .iter()
            .map(|obj| Ok((sql.clone(), Self::obj_params(obj)?)))
            .collect::<Result<Vec<_>>>()?;
        self.write_batch(statements).await?;
        Ok(())
    }

    async fn find(
        &self,
        filter: &SqlPredicate,
        sort: &SqlOrderBy,
        pagination: Option<&SqlPagination>,
    ) -> Result<Vec<Obj>> {
        let mut sql = format!(
            "SELECT {} FROM {} WHERE {}",
            self.columns,
            self.table(),
            filter.sql
        );
        let mut params = filter.params.clone();
        if !sort.sql.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&sort.sql);
            params.extend(sort.params.iter().cloned());
        }
        if let Some(page) = pagination {
            sql.push(' ');
            sql.push_str(page.sql());
            params.extend(page.params());
        }
        tracing::debug!("[SqliteBackend] find: {}", sql);
        let rows = self.fetch_all(&sql, params).await?;
        rows.iter().map(Self::row_to_obj).collect()
    }

    async fn count(&self, filter: &SqlPredicate) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) AS n FROM {} WHERE {}", self.table(), filter.sql);
        let rows = self.fetch_all(&sql, filter.params.clone()).await?;
        let n: i64 = match rows.first() {
            Some(row) => row
                .try_get("n")
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            None => 0,
        };
        Ok(n.max(0) as u64)
    }

    async fn replace(&self, objs: &[Obj]) -> Result<u64> {
        if objs.is_empty() {
            return Ok(0);
        }
        let names = self.schema.column_names();
        let assignments = names[1..]
            .iter()
            .map(|c| format!("{} = ?", c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("UPDATE {} SET {} WHERE id = ?", self.table(), assignments);
        let statements = objs
            .iter()
            .map(|obj| {
                let mut params = Self::obj_params(obj)?;
                let id = params.remove(0);
                params.push(id);
                Ok((sql.clone(), params))
            })
            .collect::<Result<Vec<_>>>()?;
        self.write_batch(statements).await
    }

    async fn mark_deleted(&self, filter: &SqlPredicate, marker: &DeleteMarker) -> Result<u64> {
        let sql = format!(
            "UPDATE {} SET deleted_at = ?, deleted_by = ?, deleted_by_type = ? WHERE {}",
            self.table(),
            filter.sql
        );
        let mut params = vec![
            SqlValue::Integer(marker.at),
            SqlValue::Text(marker.by.clone()),
            SqlValue::Text(marker.by_type.clone()),
        ];
        params.extend(filter.params.iter().cloned());
        Ok(self.execute(&sql, params).await?.rows_affected())
    }

    async fn remove(&self, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let statements = ids
            .chunks(ID_CHUNK)
            .map(|chunk| {
                (
                    format!(
                        "DELETE FROM {} WHERE id IN ({})",
                        self.table(),
                        Self::placeholders(chunk.len())
                    ),
                    chunk.iter().cloned().map(SqlValue::Text).collect(),
                )
            })
            .collect();
        self.write_batch(statements).await
    }

    async fn begin(&self) -> Result<Option<Self>> {
        match &self.conn {
            Conn::Tx(_) => Ok(None),
            Conn::Pool(pool) => {
                let tx = pool.begin().await.map_err(map_sqlx_error)?;
                tracing::debug!("[SqliteBackend] transaction started");
                Ok(Some(Self {
                    conn: Conn::Tx(Arc::new(Mutex::new(Some(tx)))),
                    ..self.clone()
                }))
            }
        }
    }

    async fn commit(&self) -> Result<()> {
        if let Conn::Tx(tx) = &self.conn {
            let tx = tx.lock().await.take().ok_or_else(transaction_closed)?;
            tx.commit().await.map_err(map_sqlx_error)?;
            tracing::debug!("[SqliteBackend] transaction committed");
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        if let Conn::Tx(tx) = &self.conn {
            let tx = tx.lock().await.take().ok_or_else(transaction_closed)?;
            tx.rollback().await.map_err(map_sqlx_error)?;
            tracing::debug!("[SqliteBackend] transaction rolled back");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "sqlite_tests.rs"]
mod tests;
