pub mod builder;
pub mod render;

pub use builder::{build_catalog, CatalogLimits, SchemaCatalog, TableEntry};

/// maximum number of foreign-key edges kept in a catalog
pub const MAX_FOREIGN_KEYS: usize = 500;

/// one row of the column introspection query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRow {
    pub schema: String,
    pub table: String,
    pub column: String,
}

impl ColumnRow {
    pub fn new(schema: impl Into<String>, table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

/// child.column -> parent.column, tables schema-qualified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub child_table: String,
    pub child_column: String,
    pub parent_table: String,
    pub parent_column: String,
}

impl ForeignKey {
    pub fn new(
        child_table: impl Into<String>,
        child_column: impl Into<String>,
        parent_table: impl Into<String>,
        parent_column: impl Into<String>,
    ) -> Self {
        Self {
            child_table: child_table.into(),
            child_column: child_column.into(),
            parent_table: parent_table.into(),
            parent_column: parent_column.into(),
        }
    }
}
