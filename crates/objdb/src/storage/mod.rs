pub mod backend;
pub mod matcher;
pub mod memory;
pub mod schema;
pub mod sqlite;

pub use backend::*;
pub use memory::MemoryBackend;
pub use schema::{ColumnSchema, TableSchema};
pub use sqlite::{SqliteBackend, map_sqlx_error};
