use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use common::AppConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "askdb")]
#[command(about = "ask a postgres database questions in plain language", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnectionArgs {
    /// PostgreSQL connection string
    #[arg(long, env = "ASKDB_DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum number of tables shown to the model
    #[arg(long, env = "ASKDB_MAX_TABLES")]
    max_tables: Option<usize>,

    /// Maximum number of columns listed per table
    #[arg(long, env = "ASKDB_MAX_COLUMNS")]
    max_columns: Option<usize>,
}

impl ConnectionArgs {
    fn apply(self, config: &mut AppConfig) {
        if let Some(url) = self.database_url {
            config.database_url = url;
        }
        if let Some(max_tables) = self.max_tables {
            config.max_tables = max_tables;
        }
        if let Some(max_columns) = self.max_columns {
            config.max_columns = max_columns;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate and run a read-only SQL query answering a question
    Ask {
        /// Question to answer (prompted on stdin when omitted)
        question: Option<String>,

        #[command(flatten)]
        connection: ConnectionArgs,

        /// Base URL of the ollama-compatible model server
        #[arg(long, env = "ASKDB_MODEL_ENDPOINT")]
        model_endpoint: Option<String>,

        /// Model identifier
        #[arg(long, env = "ASKDB_MODEL")]
        model: Option<String>,

        /// Row limit appended to generated queries
        #[arg(long, env = "ASKDB_ROW_LIMIT")]
        limit: Option<u32>,

        /// Database execution timeout in seconds
        #[arg(long, env = "ASKDB_STATEMENT_TIMEOUT_SECS")]
        statement_timeout_secs: Option<u64>,

        /// Model request timeout in seconds
        #[arg(long, env = "ASKDB_MODEL_TIMEOUT_SECS")]
        model_timeout_secs: Option<u64>,

        /// CSV file receiving one metrics line per attempt
        #[arg(long, env = "AI_SQL_CSV_PATH")]
        metrics_csv: Option<PathBuf>,

        /// Disable metrics recording
        #[arg(long, default_value = "false")]
        no_metrics: bool,
    },

    /// Print the schema catalog the model would see
    Catalog {
        #[command(flatten)]
        connection: ConnectionArgs,
    },
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let _guard = common::tracing::init_tracing("askdb")?;
        let mut config = AppConfig::from_env()?;

        match self.command {
            Commands::Ask {
                question,
                connection,
                model_endpoint,
                model,
                limit,
                statement_timeout_secs,
                model_timeout_secs,
                metrics_csv,
                no_metrics,
            } => {
                connection.apply(&mut config);
                if let Some(endpoint) = model_endpoint {
                    config.model_endpoint = common::config::normalize_endpoint(&endpoint);
                }
                if let Some(model) = model {
                    config.model = model;
                }
                if let Some(limit) = limit {
                    config.row_limit = limit;
                }
                if let Some(secs) = statement_timeout_secs {
                    config.statement_timeout = Duration::from_secs(secs);
                }
                if let Some(secs) = model_timeout_secs {
                    config.model_timeout = Duration::from_secs(secs);
                }
                if let Some(path) = metrics_csv {
                    config.metrics_path = path;
                }

                ask(question, config, no_metrics).await
            }
            Commands::Catalog { connection } => {
                connection.apply(&mut config);
                print_catalog(config).await
            }
        }
    }
}

async fn read_question() -> Result<String> {
    tokio::task::spawn_blocking(|| {
        use std::io::Write;

        println!("Question (e.g. list active users with their company):");
        std::io::stdout().flush()?;

        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok::<_, std::io::Error>(line)
    })
    .await
    .context("stdin reader task failed")?
    .context("failed to read question from stdin")
}

async fn ask(question: Option<String>, config: AppConfig, no_metrics: bool) -> Result<()> {
    use crate::console::ConsoleReporter;
    use common::agent::Orchestrator;
    use common::db::PostgresDatabase;
    use common::llm::OllamaClient;
    use common::metrics::{CsvMetricsSink, MetricsSink, NullMetricsSink};
    use std::sync::Arc;

    let question = match question {
        Some(q) => q,
        None => read_question().await?,
    };
    let question = question.trim().to_string();
    if question.is_empty() {
        return Ok(());
    }

    config.validate()?;

    let database = Arc::new(PostgresDatabase::connect(&config.database_url).await?);
    let generator = Arc::new(OllamaClient::from_config(&config)?);
    let metrics: Arc<dyn MetricsSink> = if no_metrics {
        Arc::new(NullMetricsSink)
    } else {
        tracing::info!("recording attempt metrics to {}", config.metrics_path.display());
        Arc::new(CsvMetricsSink::new(config.metrics_path.clone()))
    };

    let orchestrator = Orchestrator::new(
        config,
        database,
        generator,
        Arc::new(ConsoleReporter),
        metrics,
    );

    // dropping the session future aborts whichever phase is suspended
    let report = tokio::select! {
        report = orchestrator.run(&question) => report?,
        _ = tokio::signal::ctrl_c() => return Err(anyhow!("cancelled")),
    };

    if report.success {
        Ok(())
    } else {
        Err(anyhow!(
            "no working query after {} attempts{}",
            report.attempts.len(),
            report
                .last_error
                .map(|e| format!(": {}", e))
                .unwrap_or_default()
        ))
    }
}

async fn print_catalog(config: AppConfig) -> Result<()> {
    use common::catalog::{build_catalog, CatalogLimits};
    use common::db::PostgresDatabase;

    config.validate()?;

    let database = PostgresDatabase::connect(&config.database_url).await?;
    let limits = CatalogLimits {
        max_tables: config.max_tables,
        max_columns: config.max_columns,
    };
    let catalog = build_catalog(&database, limits).await?;

    print!("{}", catalog.render());
    Ok(())
}
