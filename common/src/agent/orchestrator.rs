use crate::agent::normalizer::normalize;
use crate::agent::prompt::{
    build_repair_user_prompt, build_system_prompt, build_user_prompt, initial_conversation,
    repair_conversation,
};
use crate::catalog::{build_catalog, CatalogLimits, SchemaCatalog};
use crate::config::AppConfig;
use crate::db::{execute, AttemptFailure, Database, ExecutionOutcome, FailureKind};
use crate::error::Result;
use crate::llm::{Message, SqlGenerator};
use crate::metrics::{detect_usage, AttemptRecord, MetricsSink};
use crate::report::Reporter;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

/// first attempt plus one repair; there is never a third
pub const MAX_ATTEMPTS: u8 = 2;

const NO_SQL_PLACEHOLDER: &str = "(no SQL was produced)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptReport {
    pub attempt: u8,
    /// normalized sql when execution was reached, the rejected text when
    /// normalization failed, `None` when the model produced nothing usable
    pub sql: Option<String>,
    pub outcome: ExecutionOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub success: bool,
    pub attempts: Vec<AttemptReport>,
    pub last_error: Option<AttemptFailure>,
    /// rendered catalog, kept only when the session failed
    pub catalog_text: Option<String>,
}

/// session-local values shared by both attempts
struct SessionContext<'a> {
    session_id: String,
    question: &'a str,
    catalog: &'a SchemaCatalog,
    system_prompt: &'a str,
}

/// drives generate -> normalize -> execute, then at most one repair cycle
pub struct Orchestrator {
    config: AppConfig,
    database: Arc<dyn Database>,
    generator: Arc<dyn SqlGenerator>,
    reporter: Arc<dyn Reporter>,
    metrics: Arc<dyn MetricsSink>,
}

impl Orchestrator {
    pub fn new(
        config: AppConfig,
        database: Arc<dyn Database>,
        generator: Arc<dyn SqlGenerator>,
        reporter: Arc<dyn Reporter>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            config,
            database,
            generator,
            reporter,
            metrics,
        }
    }

    /// introspects the database with the configured caps
    pub async fn catalog(&self) -> Result<SchemaCatalog> {
        let limits = CatalogLimits {
            max_tables: self.config.max_tables,
            max_columns: self.config.max_columns,
        };
        build_catalog(self.database.as_ref(), limits).await
    }

    /// answers one question. only catalog introspection failures are `Err`;
    /// every attempt-level failure lands in the returned report.
    #[tracing::instrument(skip(self, question), fields(model = %self.generator.model_id(), question_len = question.len()))]
    pub async fn run(&self, question: &str) -> Result<SessionReport> {
        let catalog = self.catalog().await?;
        if catalog.is_empty() {
            tracing::warn!("schema catalog is empty, the model sees no tables");
        }
        let catalog_text = catalog.render();
        let limit = self.config.row_limit;

        let system_prompt = build_system_prompt(&catalog_text, limit);
        let user_prompt = build_user_prompt(question, limit);

        let ctx = SessionContext {
            session_id: uuid::Uuid::new_v4().simple().to_string(),
            question,
            catalog: &catalog,
            system_prompt: &system_prompt,
        };

        let mut messages = initial_conversation(&system_prompt, &user_prompt, limit);
        let mut user_prompt_chars = user_prompt.len();
        let mut attempts = Vec::with_capacity(MAX_ATTEMPTS as usize);

        for attempt in 1..=MAX_ATTEMPTS {
            tracing::info!("sql attempt {}/{}", attempt, MAX_ATTEMPTS);

            let report = self
                .run_attempt(&ctx, attempt, &messages, user_prompt_chars)
                .await;

            if report.outcome.success {
                tracing::info!(rows = report.outcome.row_count, "attempt {} succeeded", attempt);
                attempts.push(report);
                return Ok(SessionReport {
                    success: true,
                    attempts,
                    last_error: None,
                    catalog_text: None,
                });
            }

            let failure = report.outcome.error.clone().unwrap_or_else(|| AttemptFailure {
                kind: FailureKind::Execution,
                code: None,
                message: "unknown error".to_string(),
            });

            if attempt < MAX_ATTEMPTS {
                self.reporter.first_failure(&failure);

                // fresh conversation: no example pair, no attempt-1 history
                let repair_prompt = build_repair_user_prompt(
                    question,
                    report.sql.as_deref().unwrap_or(NO_SQL_PLACEHOLDER),
                    &failure.to_string(),
                    limit,
                );
                user_prompt_chars = repair_prompt.len();
                messages = repair_conversation(ctx.system_prompt, &repair_prompt);
            } else {
                tracing::warn!(error = %failure, "giving up after {} attempts", MAX_ATTEMPTS);
                self.reporter.final_failure(&failure, &catalog_text);
            }

            attempts.push(report);
        }

        let last_error = attempts.last().and_then(|a| a.outcome.error.clone());
        Ok(SessionReport {
            success: false,
            attempts,
            last_error,
            catalog_text: Some(catalog_text),
        })
    }

    #[tracing::instrument(skip(self, ctx, messages), fields(message_count = messages.len()))]
    async fn run_attempt(
        &self,
        ctx: &SessionContext<'_>,
        attempt: u8,
        messages: &[Message],
        user_prompt_chars: usize,
    ) -> AttemptReport {
        let total_start = Instant::now();

        let llm_start = Instant::now();
        let generated = self.generator.generate_sql(messages).await;
        let duration_ms_llm = llm_start.elapsed().as_millis() as u64;
        let mut duration_ms_sql = 0;

        let (sql, outcome) = match generated {
            Err(e) => {
                tracing::warn!("model produced no usable sql: {}", e);
                (None, ExecutionOutcome::failed(AttemptFailure::from(&e)))
            }
            Ok(raw) => match normalize(&raw, self.config.row_limit) {
                Err(e) => {
                    tracing::warn!("normalized sql rejected: {}", e);
                    (Some(raw), ExecutionOutcome::failed(AttemptFailure::from(&e)))
                }
                Ok(sql) => {
                    self.reporter.sql_attempt(attempt, &sql);

                    let sql_start = Instant::now();
                    let outcome = execute(
                        self.database.as_ref(),
                        &sql,
                        self.config.statement_timeout,
                        self.reporter.as_ref(),
                    )
                    .await;
                    duration_ms_sql = sql_start.elapsed().as_millis() as u64;

                    (Some(sql), outcome)
                }
            },
        };

        let (tables_used, columns_used) = sql
            .as_deref()
            .map(|s| detect_usage(ctx.catalog, s))
            .unwrap_or_default();

        let record = AttemptRecord {
            timestamp: Utc::now(),
            session_id: ctx.session_id.clone(),
            question: ctx.question.to_string(),
            model: self.generator.model_id().to_string(),
            attempt,
            success: outcome.success,
            rows: outcome.row_count,
            error_code: outcome.error.as_ref().and_then(|f| f.code.clone()),
            error_message: outcome.error.as_ref().map(|f| f.message.clone()),
            duration_ms_total: total_start.elapsed().as_millis() as u64,
            duration_ms_llm,
            duration_ms_sql,
            sql: sql.clone().unwrap_or_default(),
            tables_used,
            columns_used,
            catalog_tables: ctx.catalog.table_count(),
            catalog_columns: ctx.catalog.column_count(),
            system_prompt_chars: ctx.system_prompt.len(),
            user_prompt_chars,
        };

        if let Err(e) = self.metrics.record(record) {
            tracing::warn!("failed to record attempt metrics: {}", e);
        }

        AttemptReport {
            attempt,
            sql,
            outcome,
        }
    }
}
