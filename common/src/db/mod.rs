pub mod executor;
pub mod postgres;

pub use executor::{execute, format_row, AttemptFailure, ExecutionOutcome, FailureKind};
pub use postgres::PostgresDatabase;

use crate::catalog::{ColumnRow, ForeignKey};
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// text-rendered row values in column order; `None` is sql null
pub type TextRow = Vec<Option<String>>;

/// a running read: column names resolved once, rows pulled lazily
pub struct QueryStream {
    pub columns: Vec<String>,
    pub rows: BoxStream<'static, Result<TextRow>>,
}

/// everything the pipeline asks of a database connection
#[async_trait]
pub trait Database: Send + Sync {
    /// user table/view columns ordered by schema, table, ordinal position
    async fn fetch_columns(&self) -> Result<Vec<ColumnRow>>;

    /// foreign keys ordered by child schema, table, column
    async fn fetch_foreign_keys(&self) -> Result<Vec<ForeignKey>>;

    /// start a parameterless read; failures surface as `AskDbError::Execution`
    async fn query(&self, sql: &str) -> Result<QueryStream>;

    /// best-effort cancel of whatever query is in flight
    async fn cancel(&self) {}
}
