use crate::error::{AskDbError, Result};
use crate::metrics::{AttemptRecord, MetricsSink};
use csv::{QuoteStyle, WriterBuilder};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

/// appends attempt records to a csv file, writing the header only when the
/// file is new or empty
pub struct CsvMetricsSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CsvMetricsSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

impl MetricsSink for CsvMetricsSink {
    fn record(&self, record: AttemptRecord) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| AskDbError::Metrics("metrics lock poisoned".to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let needs_header = fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut writer = WriterBuilder::new()
            .has_headers(needs_header)
            .quote_style(QuoteStyle::Always)
            .from_writer(file);

        writer.serialize(&record)?;
        writer.flush()?;

        tracing::debug!(path = %self.path.display(), attempt = record.attempt, "metrics appended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(attempt: u8, success: bool) -> AttemptRecord {
        AttemptRecord {
            timestamp: Utc::now(),
            session_id: "abc123".to_string(),
            question: "quantos \"usuarios\" ativos?".to_string(),
            model: "mistral".to_string(),
            attempt,
            success,
            rows: if success { 3 } else { 0 },
            error_code: (!success).then(|| "42703".to_string()),
            error_message: (!success).then(|| "column \"x\" does not exist".to_string()),
            duration_ms_total: 40,
            duration_ms_llm: 30,
            duration_ms_sql: 10,
            sql: "SELECT id, nome FROM public.usuario LIMIT 100".to_string(),
            tables_used: "public.usuario".to_string(),
            columns_used: "public.usuario.id;public.usuario.nome".to_string(),
            catalog_tables: 4,
            catalog_columns: 12,
            system_prompt_chars: 900,
            user_prompt_chars: 200,
        }
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("metrics.csv");
        let sink = CsvMetricsSink::new(&path);

        sink.record(record(1, false)).unwrap();
        sink.record(record(2, true)).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("\"timestamp_utc\",\"session_id\",\"question\""));
        assert!(lines[0].contains("\"dur_ms_llm\""));
        assert_eq!(content.matches("timestamp_utc").count(), 1);
    }

    #[test]
    fn test_fields_round_trip_through_csv_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let sink = CsvMetricsSink::new(&path);

        sink.record(record(1, false)).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        let row = reader.records().next().unwrap().unwrap();
        let field = |name: &str| {
            let idx = headers.iter().position(|h| h == name).unwrap();
            row.get(idx).unwrap().to_string()
        };

        assert_eq!(field("question"), "quantos \"usuarios\" ativos?");
        assert_eq!(field("attempt"), "1");
        assert_eq!(field("success"), "0");
        assert_eq!(field("error_code"), "42703");
        assert_eq!(field("catalog_tables"), "4");
    }

    #[test]
    fn test_numeric_fields_are_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let sink = CsvMetricsSink::new(&path);

        sink.record(record(2, true)).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let line = content.lines().nth(1).unwrap();
        assert!(line.contains(",\"2\",\"1\",\"3\","));
        assert!(line.contains(",\"40\",\"30\",\"10\","));
        assert!(line.ends_with(",\"900\",\"200\""));
    }
}
