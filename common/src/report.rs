use crate::db::AttemptFailure;

/// receives human-facing progress of a session; formatting is the
/// implementor's business. all hooks default to no-ops.
pub trait Reporter: Send + Sync {
    /// sql about to be executed for `attempt` (1 or 2)
    fn sql_attempt(&self, _attempt: u8, _sql: &str) {}

    /// the database accepted the statement and rows are about to stream
    fn executing(&self, _sql: &str) {}

    /// one formatted result row, emitted as it is read
    fn row(&self, _line: &str) {}

    fn row_count(&self, _count: u64) {}

    /// first attempt failed; a repair attempt follows
    fn first_failure(&self, _failure: &AttemptFailure) {}

    /// repair attempt failed too; nothing else will be tried
    fn final_failure(&self, _failure: &AttemptFailure, _catalog_text: &str) {}
}

/// discards everything
pub struct NullReporter;

impl Reporter for NullReporter {}
