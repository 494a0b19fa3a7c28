pub mod csv_sink;
pub mod record;

pub use csv_sink::CsvMetricsSink;
pub use record::{detect_usage, AttemptRecord};

use crate::error::Result;

/// destination for per-attempt records. failures here are logged by the
/// caller and never fail an attempt.
pub trait MetricsSink: Send + Sync {
    fn record(&self, record: AttemptRecord) -> Result<()>;
}

/// drops every record
pub struct NullMetricsSink;

impl MetricsSink for NullMetricsSink {
    fn record(&self, _record: AttemptRecord) -> Result<()> {
        Ok(())
    }
}
