//! Table DDL for the SQLite tables.

use objdb_api::Column;

/// Schema for a table.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnSchema>,
    /// Column groups that must be unique together
    pub unique: Vec<Vec<String>>,
    /// Extra composite indexes
    pub composite_indexes: Vec<Vec<String>>,
}

impl TableSchema {
    pub fn new(table_name: impl Into<String>, columns: Vec<ColumnSchema>) -> Self {
        Self {
            table_name: table_name.into(),
            columns,
            unique: Vec::new(),
            composite_indexes: Vec::new(),
        }
    }

    pub fn unique(mut self, columns: &[&str]) -> Self {
        self.unique
            .push(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn composite_index(mut self, columns: &[&str]) -> Self {
        self.composite_indexes
            .push(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Generate CREATE TABLE SQL statement
    pub fn to_create_table_sql(&self) -> String {
        let mut lines = Vec::new();

        for column in &self.columns {
            let mut col = format!("{} {}", column.name, column.sql_type);

            if column.primary_key {
                col.push_str(" PRIMARY KEY");
            }

            if !column.nullable {
                col.push_str(" NOT NULL");
            }

            lines.push(col);
        }

        for group in &self.unique {
            lines.push(format!("UNIQUE ({})", group.join(", ")));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            self.table_name,
            lines.join(",\n  ")
        )
    }

    /// Generate CREATE INDEX SQL statements for indexed columns
    pub fn to_index_sql(&self) -> Vec<String> {
        let single = self
            .columns
            .iter()
            .filter(|c| c.indexed && !c.primary_key)
            .map(|c| vec![c.name.clone()]);

        single
            .chain(self.composite_indexes.iter().cloned())
            .map(|columns| {
                format!(
                    "CREATE INDEX IF NOT EXISTS idx_{}_{} ON {} ({})",
                    self.table_name,
                    columns.join("_"),
                    self.table_name,
                    columns.join(", ")
                )
            })
            .collect()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Schema for a single column.
#[derive(Debug, Clone)]
pub struct ColumnSchema {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    pub indexed: bool,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable: false,
            primary_key: false,
            indexed: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }
}

/// Records table: one typed column per top-level attribute, payload as JSON text.
pub fn objs_schema(table: &str) -> TableSchema {
    let column = |c: Column| c.sql_name();
    TableSchema::new(
        table,
        vec![
            ColumnSchema::new(column(Column::Id), "TEXT").primary_key(),
            ColumnSchema::new(column(Column::AppId), "TEXT"),
            ColumnSchema::new(column(Column::GroupId), "TEXT"),
            ColumnSchema::new(column(Column::Tag), "TEXT"),
            ColumnSchema::new("obj_record", "TEXT"),
            ColumnSchema::new(column(Column::CreatedAt), "INTEGER").indexed(),
            ColumnSchema::new(column(Column::UpdatedAt), "INTEGER").indexed(),
            ColumnSchema::new(column(Column::CreatedBy), "TEXT"),
            ColumnSchema::new(column(Column::CreatedByType), "TEXT"),
            ColumnSchema::new(column(Column::UpdatedBy), "TEXT"),
            ColumnSchema::new(column(Column::UpdatedByType), "TEXT"),
            ColumnSchema::new(column(Column::DeletedAt), "INTEGER")
                .nullable()
                .indexed(),
            ColumnSchema::new(column(Column::DeletedBy), "TEXT").nullable(),
            ColumnSchema::new(column(Column::DeletedByType), "TEXT").nullable(),
            ColumnSchema::new(column(Column::ShouldIndex), "INTEGER"),
            ColumnSchema::new(column(Column::FieldsToIndex), "TEXT").nullable(),
        ],
    )
    .composite_index(&["app_id", "tag"])
}

/// Field catalog table.
pub fn fields_schema(table: &str) -> TableSchema {
    TableSchema::new(
        table,
        vec![
            ColumnSchema::new("app_id", "TEXT"),
            ColumnSchema::new("group_id", "TEXT"),
            ColumnSchema::new("tag", "TEXT"),
            ColumnSchema::new("path", "TEXT"),
            ColumnSchema::new("field_type", "TEXT"),
            ColumnSchema::new("array_types", "TEXT").nullable(),
            ColumnSchema::new("value_types", "TEXT"),
            ColumnSchema::new("is_array_compressed", "INTEGER"),
            ColumnSchema::new("created_at", "INTEGER"),
            ColumnSchema::new("updated_at", "INTEGER"),
        ],
    )
    .unique(&["app_id", "group_id", "tag", "path"])
}
