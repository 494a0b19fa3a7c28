use crate::catalog::SchemaCatalog;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::collections::HashSet;

static IDENTIFIER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z_][A-Za-z0-9_$]*(?:\.[A-Za-z_][A-Za-z0-9_$]*)*").unwrap()
});

/// one csv line per attempt; never touched again once handed to a sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    #[serde(rename = "timestamp_utc", serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub question: String,
    pub model: String,
    pub attempt: u8,
    #[serde(serialize_with = "serialize_flag")]
    pub success: bool,
    pub rows: u64,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    #[serde(rename = "dur_ms_total")]
    pub duration_ms_total: u64,
    #[serde(rename = "dur_ms_llm")]
    pub duration_ms_llm: u64,
    #[serde(rename = "dur_ms_sql")]
    pub duration_ms_sql: u64,
    pub sql: String,
    pub tables_used: String,
    pub columns_used: String,
    pub catalog_tables: usize,
    pub catalog_columns: usize,
    pub system_prompt_chars: usize,
    pub user_prompt_chars: usize,
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn serialize_flag<S: Serializer>(flag: &bool, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u8(u8::from(*flag))
}

/// catalog tables the sql mentions (qualified or bare name) and, for those
/// tables, the columns it mentions. both `;`-separated.
pub fn detect_usage(catalog: &SchemaCatalog, sql: &str) -> (String, String) {
    let mut words: HashSet<String> = HashSet::new();
    for m in IDENTIFIER_REGEX.find_iter(sql) {
        let token = m.as_str().to_lowercase();
        for part in token.split('.') {
            words.insert(part.to_string());
        }
        words.insert(token);
    }

    let mut tables = Vec::new();
    let mut columns = Vec::new();

    for table in catalog.tables() {
        let qualified = table.name.to_lowercase();
        let bare = qualified.rsplit('.').next().unwrap_or(&qualified);

        if !words.contains(&qualified) && !words.contains(bare) {
            continue;
        }

        tables.push(table.name.clone());
        for column in &table.columns {
            if words.contains(&column.to_lowercase()) {
                columns.push(format!("{}.{}", table.name, column));
            }
        }
    }

    (tables.join(";"), columns.join(";"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogLimits, ColumnRow};

    #[test]
    fn test_detect_usage() {
        let catalog = SchemaCatalog::from_rows(
            vec![
                ColumnRow::new("public", "usuario", "id"),
                ColumnRow::new("public", "usuario", "email"),
                ColumnRow::new("public", "usuario", "senha"),
                ColumnRow::new("public", "empresa", "id"),
                ColumnRow::new("public", "cargo", "nome"),
            ],
            vec![],
            CatalogLimits {
                max_tables: 10,
                max_columns: 10,
            },
        );

        let (tables, columns) = detect_usage(
            &catalog,
            "SELECT u.id, u.email FROM public.usuario u JOIN empresa e ON e.id = u.id LIMIT 100",
        );

        assert_eq!(tables, "public.empresa;public.usuario");
        assert_eq!(columns, "public.empresa.id;public.usuario.id;public.usuario.email");
    }
}
