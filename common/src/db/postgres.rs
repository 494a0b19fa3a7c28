use crate::catalog::{ColumnRow, ForeignKey};
use crate::db::{Database, QueryStream, TextRow};
use crate::error::{AskDbError, ExecutionError, Result};
use async_trait::async_trait;
use futures::{future, StreamExt};
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage};

const COLUMNS_SQL: &str = "
SELECT c.table_schema::text,
       c.table_name::text,
       c.column_name::text
FROM information_schema.columns c
JOIN information_schema.tables t
  ON t.table_schema = c.table_schema AND t.table_name = c.table_name
WHERE c.table_schema NOT IN ('pg_catalog', 'information_schema')
  AND t.table_type IN ('BASE TABLE', 'VIEW')
ORDER BY c.table_schema, c.table_name, c.ordinal_position";

const FOREIGN_KEYS_SQL: &str = "
SELECT tc.table_schema::text  AS child_schema,
       tc.table_name::text    AS child_table,
       kcu.column_name::text  AS child_column,
       ccu.table_schema::text AS parent_schema,
       ccu.table_name::text   AS parent_table,
       ccu.column_name::text  AS parent_column
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
  ON tc.constraint_name = kcu.constraint_name
 AND tc.table_schema    = kcu.table_schema
JOIN information_schema.constraint_column_usage ccu
  ON ccu.constraint_name = tc.constraint_name
 AND ccu.table_schema    = tc.table_schema
WHERE tc.constraint_type = 'FOREIGN KEY'
  AND tc.table_schema NOT IN ('pg_catalog', 'information_schema')
ORDER BY child_schema, child_table, child_column";

// every transaction on the session starts read only, so writing ctes fail server side
const READ_ONLY_OPTION: &str = "-c default_transaction_read_only=on";

pub struct PostgresDatabase {
    client: Client,
}

impl PostgresDatabase {
    #[tracing::instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self> {
        let config = session_config(database_url)?;
        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|e| AskDbError::Connection(describe(&e)))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("postgres connection error: {}", e);
            }
        });

        tracing::info!("connected to postgres");
        Ok(Self { client })
    }
}

/// parses the connection string and forces read-only transactions, keeping
/// any startup options it already carries
fn session_config(database_url: &str) -> Result<Config> {
    let mut config: Config = database_url
        .parse()
        .map_err(|e| AskDbError::Connection(format!("invalid connection string: {}", e)))?;

    let options = match config.get_options() {
        Some(existing) if !existing.trim().is_empty() => {
            format!("{} {}", existing.trim(), READ_ONLY_OPTION)
        }
        _ => READ_ONLY_OPTION.to_string(),
    };
    config.options(&options);
    Ok(config)
}

/// sqlstate + server message when the server answered, transport text otherwise
fn execution_error(e: tokio_postgres::Error) -> AskDbError {
    match e.as_db_error() {
        Some(db) => AskDbError::Execution(ExecutionError::new(
            Some(db.code().code().to_string()),
            db.message(),
        )),
        None => AskDbError::Execution(ExecutionError::new(None, e.to_string())),
    }
}

fn describe(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => format!("{}: {}", db.code().code(), db.message()),
        None => e.to_string(),
    }
}

fn schema_error(e: tokio_postgres::Error) -> AskDbError {
    AskDbError::Schema(describe(&e))
}

#[async_trait]
impl Database for PostgresDatabase {
    async fn fetch_columns(&self) -> Result<Vec<ColumnRow>> {
        let rows = self.client.query(COLUMNS_SQL, &[]).await.map_err(schema_error)?;

        rows.iter()
            .map(|row| -> Result<ColumnRow> {
                Ok(ColumnRow {
                    schema: row.try_get(0).map_err(schema_error)?,
                    table: row.try_get(1).map_err(schema_error)?,
                    column: row.try_get(2).map_err(schema_error)?,
                })
            })
            .collect()
    }

    async fn fetch_foreign_keys(&self) -> Result<Vec<ForeignKey>> {
        let rows = self
            .client
            .query(FOREIGN_KEYS_SQL, &[])
            .await
            .map_err(schema_error)?;

        rows.iter()
            .map(|row| -> Result<ForeignKey> {
                let child_schema: String = row.try_get(0).map_err(schema_error)?;
                let child_table: String = row.try_get(1).map_err(schema_error)?;
                let child_column: String = row.try_get(2).map_err(schema_error)?;
                let parent_schema: String = row.try_get(3).map_err(schema_error)?;
                let parent_table: String = row.try_get(4).map_err(schema_error)?;
                let parent_column: String = row.try_get(5).map_err(schema_error)?;

                Ok(ForeignKey::new(
                    format!("{}.{}", child_schema, child_table),
                    child_column,
                    format!("{}.{}", parent_schema, parent_table),
                    parent_column,
                ))
            })
            .collect()
    }

    async fn query(&self, sql: &str) -> Result<QueryStream> {
        // the extended protocol refuses multi-statement text, so a smuggled
        // second statement never reaches the simple protocol below
        let statement = self.client.prepare(sql).await.map_err(execution_error)?;
        let columns = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let messages = self.client.simple_query_raw(sql).await.map_err(execution_error)?;

        let rows = messages
            .filter_map(|message| {
                future::ready(match message {
                    Ok(SimpleQueryMessage::Row(row)) => Some(Ok((0..row.len())
                        .map(|i| row.get(i).map(str::to_string))
                        .collect::<TextRow>())),
                    Ok(_) => None,
                    Err(e) => Some(Err(execution_error(e))),
                })
            })
            .boxed();

        Ok(QueryStream { columns, rows })
    }

    async fn cancel(&self) {
        if let Err(e) = self.client.cancel_token().cancel_query(NoTls).await {
            tracing::warn!("failed to cancel running query: {}", e);
        }
    }
}
