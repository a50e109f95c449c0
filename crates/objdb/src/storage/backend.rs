use async_trait::async_trait;
use objdb_api::{Obj, Result};
use objdb_query::QueryCompiler;

pub type FilterOf<B> = <<B as StorageBackend>::Compiler as QueryCompiler>::Filter;
pub type SortOf<B> = <<B as StorageBackend>::Compiler as QueryCompiler>::Sort;
pub type PaginationOf<B> = <<B as StorageBackend>::Compiler as QueryCompiler>::Pagination;

/// Soft-delete markers written by `mark_deleted`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteMarker {
    pub at: i64,
    pub by: String,
    pub by_type: String,
}

/// Record storage behind the store.
///
/// Each backend owns the compiler producing its native filters, so the
/// store can stay generic over both.
#[async_trait]
pub trait StorageBackend: Send + Sync + Clone + 'static {
    type Compiler: QueryCompiler;

    fn compiler(&self) -> &Self::Compiler;

    /// Insert new records. A duplicate id fails the whole batch with `Conflict`.
    async fn insert(&self, objs: &[Obj]) -> Result<()>;

    async fn find(
        &self,
        filter: &FilterOf<Self>,
        sort: &SortOf<Self>,
        pagination: Option<&PaginationOf<Self>>,
    ) -> Result<Vec<Obj>>;

    async fn count(&self, filter: &FilterOf<Self>) -> Result<u64>;

    /// Overwrite existing records by id. Returns how many existed.
    async fn replace(&self, objs: &[Obj]) -> Result<u64>;

    async fn mark_deleted(&self, filter: &FilterOf<Self>, marker: &DeleteMarker) -> Result<u64>;

    /// Hard-delete by id.
    async fn remove(&self, ids: &[String]) -> Result<u64>;

    /// Open a transaction-bound handle, or `None` when the backend has no
    /// transactions (or this handle is already inside one).
    async fn begin(&self) -> Result<Option<Self>>;

    async fn commit(&self) -> Result<()>;

    async fn rollback(&self) -> Result<()>;
}
