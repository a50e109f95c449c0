pub mod catalog;
pub mod clock;
pub mod config;
pub mod indexer;
pub mod merge;
pub mod pipeline;
pub mod storage;
pub mod store;
pub mod telemetry;

// Re-export the data model and query types so callers need one dependency
pub use objdb_api::{
    Actor, FieldDescriptor, JsonType, NewObj, Obj, ObjField, ObjQuery, OnConflict, Result,
    SortDirection, SortItem, StoreError, UpdateWay,
};
pub use objdb_query::{DocQueryCompiler, QueryCompiler, SqlQueryCompiler};

pub use catalog::{FieldCatalog, MemoryFieldCatalog, Partition, SqliteFieldCatalog};
pub use clock::{Clock, IdGenerator, ManualClock, SequentialIds, SystemClock, UuidV7Ids};
pub use config::{ObjdbConfig, SqliteConfig, StoreConfig};
pub use pipeline::{AppIndexSettings, IndexRunStats, IndexingJob, index_objs};
pub use storage::{MemoryBackend, SqliteBackend, StorageBackend};
pub use store::ObjStore;
