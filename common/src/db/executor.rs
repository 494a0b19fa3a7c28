use crate::db::Database;
use crate::error::{AskDbError, Result};
use crate::report::Reporter;
use futures::StreamExt;
use std::fmt;
use std::time::Duration;

/// sqlstate postgres uses for statement timeouts and cancels
pub const QUERY_CANCELED: &str = "57014";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Schema,
    Model,
    Validation,
    Execution,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Schema => "schema",
            FailureKind::Model => "model",
            FailureKind::Validation => "validation",
            FailureKind::Execution => "execution",
        }
    }
}

/// structured reason an attempt failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub kind: FailureKind,
    pub code: Option<String>,
    pub message: String,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{}: {}", code, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl From<&AskDbError> for AttemptFailure {
    fn from(e: &AskDbError) -> Self {
        match e {
            AskDbError::Execution(exec) => AttemptFailure {
                kind: FailureKind::Execution,
                code: exec.code.clone(),
                message: exec.message.clone(),
            },
            AskDbError::Model(msg) => AttemptFailure {
                kind: FailureKind::Model,
                code: None,
                message: msg.clone(),
            },
            AskDbError::Validation(msg) => AttemptFailure {
                kind: FailureKind::Validation,
                code: None,
                message: msg.clone(),
            },
            AskDbError::Schema(msg) => AttemptFailure {
                kind: FailureKind::Schema,
                code: None,
                message: msg.clone(),
            },
            other => AttemptFailure {
                kind: FailureKind::Execution,
                code: None,
                message: other.to_string(),
            },
        }
    }
}

/// result of one attempt; never retried in place
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub row_count: u64,
    pub error: Option<AttemptFailure>,
}

impl ExecutionOutcome {
    pub fn succeeded(row_count: u64) -> Self {
        Self {
            success: true,
            row_count,
            error: None,
        }
    }

    pub fn failed(failure: AttemptFailure) -> Self {
        Self {
            success: false,
            row_count: 0,
            error: Some(failure),
        }
    }
}

/// `col=value | col2=NULL`
pub fn format_row(columns: &[String], values: &[Option<String>]) -> String {
    columns
        .iter()
        .zip(values.iter())
        .map(|(name, value)| match value {
            Some(v) => format!("{}={}", name, v),
            None => format!("{}=NULL", name),
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

async fn stream_rows(db: &dyn Database, sql: &str, reporter: &dyn Reporter) -> Result<u64> {
    let mut stream = db.query(sql).await?;
    reporter.executing(sql);

    let mut rows = 0u64;
    while let Some(row) = stream.rows.next().await {
        let row = row?;
        rows += 1;
        reporter.row(&format_row(&stream.columns, &row));
    }

    reporter.row_count(rows);
    Ok(rows)
}

/// runs `sql` once under `timeout`, streaming each row to `reporter`. every
/// failure, timeouts included, comes back as a failed outcome.
#[tracing::instrument(skip(db, sql, reporter), fields(sql_len = sql.len(), timeout_secs = timeout.as_secs()))]
pub async fn execute(
    db: &dyn Database,
    sql: &str,
    timeout: Duration,
    reporter: &dyn Reporter,
) -> ExecutionOutcome {
    match tokio::time::timeout(timeout, stream_rows(db, sql, reporter)).await {
        Ok(Ok(rows)) => {
            tracing::info!(rows, "query succeeded");
            ExecutionOutcome::succeeded(rows)
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "query failed");
            ExecutionOutcome::failed(AttemptFailure::from(&e))
        }
        Err(_) => {
            tracing::warn!("query exceeded {}s, cancelling", timeout.as_secs());
            db.cancel().await;
            ExecutionOutcome::failed(AttemptFailure {
                kind: FailureKind::Execution,
                code: Some(QUERY_CANCELED.to_string()),
                message: "canceling statement due to statement timeout".to_string(),
            })
        }
    }
}
