use super::{ColumnRow, ForeignKey, MAX_FOREIGN_KEYS};
use crate::db::Database;
use crate::error::Result;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogLimits {
    pub max_tables: usize,
    pub max_columns: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    /// `schema.table`
    pub name: String,
    /// ordinal order, truncated at `max_columns`
    pub columns: Vec<String>,
}

/// size-bounded view of the database shown to the model. lossy on purpose:
/// columns past the per-table cap, tables past the table cap and foreign
/// keys past `MAX_FOREIGN_KEYS` are dropped without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaCatalog {
    tables: Vec<TableEntry>,
    foreign_keys: Vec<ForeignKey>,
}

impl SchemaCatalog {
    /// groups introspection rows into a catalog. `columns` must already be
    /// ordered by schema, table, ordinal position.
    pub fn from_rows(
        columns: impl IntoIterator<Item = ColumnRow>,
        foreign_keys: impl IntoIterator<Item = ForeignKey>,
        limits: CatalogLimits,
    ) -> Self {
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for row in columns {
            let entry = grouped.entry(row.qualified_table()).or_default();
            if entry.len() < limits.max_columns {
                entry.push(row.column);
            }
        }

        let tables = grouped
            .into_iter()
            .take(limits.max_tables)
            .map(|(name, columns)| TableEntry { name, columns })
            .collect();

        let foreign_keys = foreign_keys.into_iter().take(MAX_FOREIGN_KEYS).collect();

        Self {
            tables,
            foreign_keys,
        }
    }

    pub fn tables(&self) -> &[TableEntry] {
        &self.tables
    }

    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn column_count(&self) -> usize {
        self.tables.iter().map(|t| t.columns.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// introspects `db` once; any database error aborts the session
#[tracing::instrument(skip(db), fields(max_tables = limits.max_tables, max_columns = limits.max_columns))]
pub async fn build_catalog(db: &dyn Database, limits: CatalogLimits) -> Result<SchemaCatalog> {
    let columns = db.fetch_columns().await?;
    let foreign_keys = db.fetch_foreign_keys().await?;

    tracing::debug!(
        column_rows = columns.len(),
        foreign_keys = foreign_keys.len(),
        "schema introspection complete"
    );

    let catalog = SchemaCatalog::from_rows(columns, foreign_keys, limits);

    tracing::info!(
        tables = catalog.table_count(),
        columns = catalog.column_count(),
        relations = catalog.foreign_keys().len(),
        "catalog built"
    );

    Ok(catalog)
}
