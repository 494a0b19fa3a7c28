use super::builder::SchemaCatalog;
use std::fmt::Write as _;

pub const TABLES_HEADER: &str = "Tables/columns:";
pub const RELATIONS_HEADER: &str = "Relations (FK):";

impl SchemaCatalog {
    /// text form embedded in the system prompt and printed on final failure
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str(TABLES_HEADER);
        out.push('\n');
        for table in self.tables() {
            let _ = writeln!(out, "- {}({})", table.name, table.columns.join(", "));
        }

        if !self.foreign_keys().is_empty() {
            out.push_str(RELATIONS_HEADER);
            out.push('\n');
            for fk in self.foreign_keys() {
                let _ = writeln!(
                    out,
                    "- {}({}) -> {}({})",
                    fk.child_table, fk.child_column, fk.parent_table, fk.parent_column
                );
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use crate::catalog::{CatalogLimits, ColumnRow, ForeignKey, SchemaCatalog};

    const LIMITS: CatalogLimits = CatalogLimits {
        max_tables: 200,
        max_columns: 60,
    };

    #[test]
    fn test_render_tables_and_relations() {
        let catalog = SchemaCatalog::from_rows(
            vec![
                ColumnRow::new("public", "empresa", "id"),
                ColumnRow::new("public", "empresa", "razao_social"),
                ColumnRow::new("public", "usuario_empresa", "id_usuario"),
                ColumnRow::new("public", "usuario_empresa", "id_empresa"),
            ],
            vec![ForeignKey::new(
                "public.usuario_empresa",
                "id_empresa",
                "public.empresa",
                "id",
            )],
            LIMITS,
        );

        let text = catalog.render();
        assert_eq!(
            text,
            "Tables/columns:\n\
             - public.empresa(id, razao_social)\n\
             - public.usuario_empresa(id_usuario, id_empresa)\n\
             Relations (FK):\n\
             - public.usuario_empresa(id_empresa) -> public.empresa(id)\n"
        );
    }

    #[test]
    fn test_render_empty_catalog_keeps_header() {
        let catalog = SchemaCatalog::from_rows(vec![], vec![], LIMITS);
        let text = catalog.render();

        assert!(text.contains("Tables/columns:"));
        assert!(!text.contains("- "));
        assert!(!text.contains("Relations (FK):"));
    }
}
