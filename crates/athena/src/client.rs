//! AWS Athena client.
//!
//! Provides [`AthenaClient`] with a two-phase contract: every operation
//! submits a statement and returns a [`QuerySubmission`] handle
//! immediately; callers that need completion use
//! [`wait_for_completion`](AthenaClient::wait_for_completion), which polls
//! with exponential backoff, enforces the configured timeout, and cancels
//! on expiry.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_athena::config::Region;
use aws_sdk_athena::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_athena::operation::get_query_results::GetQueryResultsOutput;
use aws_sdk_athena::types::QueryExecutionState;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use lakewire_core::{AwsConfig, Config, RemoteError};

use crate::statement::{
    add_partition_sql, count_rows_sql, create_database_sql, ddl_references_table,
    is_valid_identifier, PartitionSpec, StatementError,
};
use crate::submission::{QueryMetadata, QueryResultSet, QuerySubmission, ResultColumn};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors that can occur during Athena operations.
#[derive(Debug, thiserror::Error)]
pub enum AthenaError {
    /// No output bucket configured for query results.
    #[error("athena output bucket is not configured")]
    NotConfigured,

    /// The query execution failed on the Athena side.
    #[error("query {query_id} failed: {reason}")]
    QueryFailed { query_id: String, reason: String },

    /// The query was cancelled (by the caller or by Athena).
    #[error("query {query_id} was cancelled")]
    QueryCancelled { query_id: String },

    /// The query exceeded the configured wait timeout.
    #[error("query {query_id} timed out after {seconds}s")]
    QueryTimeout { query_id: String, seconds: u32 },

    /// Statement construction or validation failed before submission.
    #[error(transparent)]
    Statement(#[from] StatementError),

    /// Categorized remote failure.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Failed to interpret the provider's response.
    #[error("parse error: {0}")]
    Parse(String),
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Client for submitting statements to AWS Athena.
#[derive(Debug)]
pub struct AthenaClient {
    athena: aws_sdk_athena::Client,
    workgroup: String,
    output_location: String,
    timeout_seconds: u32,
}

impl AthenaClient {
    /// Create a client for the session described by `config`.
    ///
    /// Fails with [`AthenaError::NotConfigured`] when no output bucket is
    /// set: Athena refuses statements without a result location.
    pub async fn new(config: &Config) -> Result<Self, AthenaError> {
        let output_location = config
            .athena
            .output_location()
            .ok_or(AthenaError::NotConfigured)?;

        let sdk_config = sdk_config(&config.aws).await;
        let athena = aws_sdk_athena::Client::new(&sdk_config);

        info!(
            region = %config.aws.region,
            workgroup = %config.athena.workgroup,
            output = %output_location,
            "AthenaClient initialised"
        );

        Ok(Self {
            athena,
            workgroup: config.athena.workgroup.clone(),
            output_location,
            timeout_seconds: config.athena.timeout_seconds,
        })
    }

    // -----------------------------------------------------------------------
    // Submission operations
    // -----------------------------------------------------------------------

    /// Submit `create database if not exists <database>`.
    pub async fn create_database(&self, database: &str) -> Result<QuerySubmission, AthenaError> {
        let sql = create_database_sql(database)?;
        self.submit(&sql, None).await
    }

    /// Submit a caller-provided table DDL, scoped to `database`.
    ///
    /// The DDL must reference `table`; a mismatch is rejected before
    /// submission rather than creating a differently-named table.
    pub async fn create_table(
        &self,
        database: &str,
        table: &str,
        ddl: &str,
    ) -> Result<QuerySubmission, AthenaError> {
        if !is_valid_identifier(database) {
            return Err(StatementError::InvalidIdentifier(database.to_string()).into());
        }
        if !is_valid_identifier(table) {
            return Err(StatementError::InvalidIdentifier(table.to_string()).into());
        }
        if !ddl_references_table(ddl, table) {
            return Err(StatementError::TableNotInDdl(table.to_string()).into());
        }
        self.submit(ddl, Some(database)).await
    }

    /// Submit an ALTER TABLE ... ADD PARTITION statement for one
    /// (year, month, day) partition.
    pub async fn add_partition(
        &self,
        database: &str,
        table: &str,
        partition: &PartitionSpec,
    ) -> Result<QuerySubmission, AthenaError> {
        let sql = add_partition_sql(database, table, partition)?;
        self.submit(&sql, Some(database)).await
    }

    /// Submit `select count(*) from <database>.<table>`.
    pub async fn count_rows(
        &self,
        database: &str,
        table: &str,
    ) -> Result<QuerySubmission, AthenaError> {
        let sql = count_rows_sql(database, table)?;
        self.submit(&sql, Some(database)).await
    }

    /// Submit a statement and return its execution handle.
    ///
    /// This never waits for completion; Athena executes asynchronously.
    pub async fn submit(
        &self,
        statement: &str,
        database: Option<&str>,
    ) -> Result<QuerySubmission, AthenaError> {
        debug!(sql = %statement, "submitting statement");

        let mut request = self
            .athena
            .start_query_execution()
            .query_string(statement)
            .result_configuration(
                aws_sdk_athena::types::ResultConfiguration::builder()
                    .output_location(&self.output_location)
                    .build(),
            )
            .work_group(&self.workgroup);

        if let Some(db) = database {
            request = request.query_execution_context(
                aws_sdk_athena::types::QueryExecutionContext::builder()
                    .database(db)
                    .build(),
            );
        }

        let response = request.send().await.map_err(|e| map_sdk_error(&e))?;

        let query_id = response
            .query_execution_id()
            .ok_or_else(|| AthenaError::Parse("no query execution ID in response".into()))?
            .to_string();

        info!(query_id = %query_id, "statement submitted");

        Ok(QuerySubmission {
            query_id,
            statement: statement.to_string(),
            database: database.map(str::to_string),
            submitted_at: Utc::now(),
        })
    }

    // -----------------------------------------------------------------------
    // Completion operations
    // -----------------------------------------------------------------------

    /// Poll until the query reaches a terminal state.
    ///
    /// Backoff grows from 200ms to 2s with jitter. On timeout a
    /// best-effort cancel is issued and [`AthenaError::QueryTimeout`]
    /// returned.
    pub async fn wait_for_completion(&self, query_id: &str) -> Result<QueryMetadata, AthenaError> {
        let start = Instant::now();
        let timeout = Duration::from_secs(self.timeout_seconds as u64);

        let initial_delay_ms: u64 = 200;
        let max_delay_ms: u64 = 2000;
        let backoff_factor: f64 = 1.5;

        let mut delay_ms = initial_delay_ms;

        loop {
            let metadata = self.query_status(query_id).await?;

            debug!(
                query_id = %query_id,
                state = %metadata.state,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "polling query status"
            );

            match metadata.state.as_str() {
                "SUCCEEDED" => return Ok(metadata),
                "FAILED" => {
                    let reason = self
                        .failure_reason(query_id)
                        .await
                        .unwrap_or_else(|| "unknown".to_string());
                    error!(query_id = %query_id, reason = %reason, "query failed");
                    return Err(AthenaError::QueryFailed {
                        query_id: query_id.to_string(),
                        reason,
                    });
                }
                "CANCELLED" => {
                    warn!(query_id = %query_id, "query was cancelled");
                    return Err(AthenaError::QueryCancelled {
                        query_id: query_id.to_string(),
                    });
                }
                // QUEUED | RUNNING | unknown future state
                _ => {}
            }

            if start.elapsed() > timeout {
                warn!(
                    query_id = %query_id,
                    timeout_seconds = self.timeout_seconds,
                    "query timed out, cancelling"
                );
                // Best-effort cancel; the timeout error is what matters.
                let _ = self.cancel(query_id).await;
                return Err(AthenaError::QueryTimeout {
                    query_id: query_id.to_string(),
                    seconds: self.timeout_seconds,
                });
            }

            // Jitter without rand: nanosecond fraction of current time.
            let jitter_ms = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .subsec_nanos()
                % 100;

            tokio::time::sleep(Duration::from_millis(delay_ms + jitter_ms as u64)).await;

            delay_ms = ((delay_ms as f64 * backoff_factor) as u64).min(max_delay_ms);
        }
    }

    /// Cancel a running query.
    pub async fn cancel(&self, query_id: &str) -> Result<(), AthenaError> {
        info!(query_id = %query_id, "cancelling query");

        self.athena
            .stop_query_execution()
            .query_execution_id(query_id)
            .send()
            .await
            .map_err(|e| map_sdk_error(&e))?;

        Ok(())
    }

    /// Single status probe for an existing execution.
    pub async fn query_status(&self, query_id: &str) -> Result<QueryMetadata, AthenaError> {
        let response = self
            .athena
            .get_query_execution()
            .query_execution_id(query_id)
            .send()
            .await
            .map_err(|e| map_sdk_error(&e))?;

        let qe = response
            .query_execution()
            .ok_or_else(|| AthenaError::Parse("no query execution in response".into()))?;

        Ok(extract_metadata(query_id, qe))
    }

    /// Fetch and parse the result rows of a completed query.
    pub async fn fetch_results(&self, query_id: &str) -> Result<QueryResultSet, AthenaError> {
        let metadata = self.query_status(query_id).await?;

        let output = self
            .athena
            .get_query_results()
            .query_execution_id(query_id)
            .send()
            .await
            .map_err(|e| map_sdk_error(&e))?;

        parse_results(&output, metadata)
    }

    /// Submit a row count, wait for it, and return the count.
    pub async fn count_rows_and_wait(
        &self,
        database: &str,
        table: &str,
    ) -> Result<u64, AthenaError> {
        let submission = self.count_rows(database, table).await?;
        self.wait_for_completion(&submission.query_id).await?;

        let results = self.fetch_results(&submission.query_id).await?;
        let cell = results
            .scalar()
            .ok_or_else(|| AthenaError::Parse("count query returned no rows".into()))?;

        cell.parse::<u64>()
            .map_err(|_| AthenaError::Parse(format!("count query returned non-numeric {cell:?}")))
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    /// State-change reason for a failed execution, if the provider kept one.
    async fn failure_reason(&self, query_id: &str) -> Option<String> {
        let response = self
            .athena
            .get_query_execution()
            .query_execution_id(query_id)
            .send()
            .await
            .ok()?;

        response
            .query_execution()?
            .status()?
            .state_change_reason()
            .map(str::to_string)
    }
}

/// Build the shared SDK config for the session.
async fn sdk_config(aws: &AwsConfig) -> aws_config::SdkConfig {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(aws.region.clone()));

    if let (Some(key), Some(secret)) = (&aws.access_key_id, &aws.secret_access_key) {
        loader = loader.credentials_provider(Credentials::new(
            key.clone(),
            secret.clone(),
            aws.session_token.clone(),
            None,
            "lakewire-static",
        ));
    }

    if let Some(endpoint) = &aws.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    loader.load().await
}

/// Reduce an SDK error to the shared taxonomy.
fn map_sdk_error<E, R>(err: &aws_sdk_athena::error::SdkError<E, R>) -> AthenaError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match err.as_service_error() {
        Some(e) => RemoteError::from_parts(e.code(), e.message()).into(),
        None => RemoteError::network(format!("{}", DisplayErrorContext(err))).into(),
    }
}

/// Extract [`QueryMetadata`] from an SDK `QueryExecution`.
fn extract_metadata(
    query_id: &str,
    qe: &aws_sdk_athena::types::QueryExecution,
) -> QueryMetadata {
    let stats = qe.statistics();
    let status = qe.status();

    QueryMetadata {
        query_id: query_id.to_string(),
        state: status
            .and_then(|s| s.state())
            .unwrap_or(&QueryExecutionState::Queued)
            .as_str()
            .to_string(),
        bytes_scanned: stats.and_then(|s| s.data_scanned_in_bytes()).unwrap_or(0) as u64,
        execution_time_ms: stats
            .and_then(|s| s.engine_execution_time_in_millis())
            .unwrap_or(0) as u64,
        output_location: qe
            .result_configuration()
            .and_then(|rc| rc.output_location())
            .map(str::to_string),
    }
}

/// Parse a raw `GetQueryResultsOutput` into a [`QueryResultSet`].
///
/// When `UpdateCount` is absent (SELECT statements) the first row echoes
/// the column headers and must be skipped.
fn parse_results(
    output: &GetQueryResultsOutput,
    metadata: QueryMetadata,
) -> Result<QueryResultSet, AthenaError> {
    let result_set = output
        .result_set()
        .ok_or_else(|| AthenaError::Parse("no result set in response".into()))?;

    let columns: Vec<ResultColumn> = result_set
        .result_set_metadata()
        .map(|meta| {
            meta.column_info()
                .iter()
                .map(|ci| ResultColumn {
                    name: ci.name().to_string(),
                    data_type: ci.r#type().to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let raw_rows = result_set.rows();
    let skip = if output.update_count().is_none() && !raw_rows.is_empty() {
        1
    } else {
        0
    };

    let rows: Vec<Vec<Option<String>>> = raw_rows
        .iter()
        .skip(skip)
        .map(|row| {
            row.data()
                .iter()
                .map(|datum| datum.var_char_value().map(str::to_string))
                .collect()
        })
        .collect();

    debug!(
        columns = columns.len(),
        rows = rows.len(),
        query_id = %metadata.query_id,
        "parsed query results"
    );

    Ok(QueryResultSet {
        columns,
        rows,
        metadata,
    })
}

// ---------------------------------------------------------------------------
// Tests — parsing and error logic only, no AWS calls
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_athena::types::{ColumnInfo, Datum, ResultSet, ResultSetMetadata, Row};

    fn metadata(query_id: &str) -> QueryMetadata {
        QueryMetadata {
            query_id: query_id.into(),
            state: "SUCCEEDED".into(),
            bytes_scanned: 1024,
            execution_time_ms: 12,
            output_location: None,
        }
    }

    fn row(values: &[&str]) -> Row {
        let mut builder = Row::builder();
        for v in values {
            builder = builder.data(Datum::builder().var_char_value(*v).build());
        }
        builder.build()
    }

    #[test]
    fn parse_skips_header_echo_for_selects() {
        let result_set = ResultSet::builder()
            .result_set_metadata(
                ResultSetMetadata::builder()
                    .column_info(
                        ColumnInfo::builder()
                            .name("_col0")
                            .r#type("bigint")
                            .build()
                            .unwrap(),
                    )
                    .build(),
            )
            .rows(row(&["_col0"]))
            .rows(row(&["42"]))
            .build();

        // No update_count: SELECT semantics, first row is a header echo.
        let output = GetQueryResultsOutput::builder().result_set(result_set).build();

        let parsed = parse_results(&output, metadata("q-1")).unwrap();
        assert_eq!(parsed.row_count(), 1);
        assert_eq!(parsed.scalar(), Some("42"));
        assert_eq!(parsed.columns[0].name, "_col0");
        assert_eq!(parsed.columns[0].data_type, "bigint");
    }

    #[test]
    fn parse_keeps_all_rows_when_update_count_present() {
        let result_set = ResultSet::builder().rows(row(&["0"])).build();
        let output = GetQueryResultsOutput::builder()
            .result_set(result_set)
            .update_count(0)
            .build();

        let parsed = parse_results(&output, metadata("q-2")).unwrap();
        assert_eq!(parsed.row_count(), 1);
    }

    #[test]
    fn parse_preserves_nulls() {
        let null_row = Row::builder()
            .data(Datum::builder().var_char_value("a").build())
            .data(Datum::builder().build())
            .build();
        let result_set = ResultSet::builder()
            .rows(row(&["x", "y"]))
            .rows(null_row)
            .build();
        let output = GetQueryResultsOutput::builder().result_set(result_set).build();

        let parsed = parse_results(&output, metadata("q-3")).unwrap();
        assert_eq!(parsed.rows[0][0].as_deref(), Some("a"));
        assert_eq!(parsed.rows[0][1], None);
    }

    #[test]
    fn parse_without_result_set_is_an_error() {
        let output = GetQueryResultsOutput::builder().build();
        let err = parse_results(&output, metadata("q-4")).unwrap_err();
        assert!(matches!(err, AthenaError::Parse(_)));
    }

    #[test]
    fn error_display_messages() {
        let err = AthenaError::NotConfigured;
        assert_eq!(err.to_string(), "athena output bucket is not configured");

        let err = AthenaError::QueryFailed {
            query_id: "abc-123".into(),
            reason: "syntax error".into(),
        };
        assert!(err.to_string().contains("abc-123"));
        assert!(err.to_string().contains("syntax error"));

        let err = AthenaError::QueryTimeout {
            query_id: "t-1".into(),
            seconds: 60,
        };
        assert!(err.to_string().contains("60s"));

        let err = AthenaError::QueryCancelled { query_id: "c-1".into() };
        assert!(err.to_string().contains("cancelled"));
    }

    #[test]
    fn statement_errors_convert() {
        let err: AthenaError = StatementError::InvalidIdentifier("bad-db".into()).into();
        assert!(err.to_string().contains("bad-db"));
    }

    #[test]
    fn jitter_is_bounded() {
        for _ in 0..1000 {
            let jitter = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .subsec_nanos()
                % 100;
            assert!(jitter < 100);
        }
    }
}
