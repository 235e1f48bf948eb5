//! Query submission handles and result types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Handle returned by every statement submission.
///
/// Athena executes asynchronously; this is the first half of the
/// submit/wait contract. Feed `query_id` to
/// [`AthenaClient::wait_for_completion`](crate::AthenaClient::wait_for_completion)
/// to block until a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySubmission {
    /// Athena query execution ID.
    pub query_id: String,
    /// The statement text that was submitted.
    pub statement: String,
    /// Database the statement was scoped to, if any.
    pub database: Option<String>,
    /// Submission wall-clock time.
    pub submitted_at: DateTime<Utc>,
}

/// Execution metadata for a query, terminal or in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMetadata {
    /// Athena query execution ID.
    pub query_id: String,
    /// Execution state ("QUEUED", "RUNNING", "SUCCEEDED", "FAILED", "CANCELLED").
    pub state: String,
    /// Total bytes scanned, once known.
    pub bytes_scanned: u64,
    /// Engine execution time in milliseconds, once known.
    pub execution_time_ms: u64,
    /// S3 location where the result set was written, if available.
    pub output_location: Option<String>,
}

impl QueryMetadata {
    pub fn is_terminal(&self) -> bool {
        matches!(self.state.as_str(), "SUCCEEDED" | "FAILED" | "CANCELLED")
    }
}

/// Column definition returned with a result set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultColumn {
    pub name: String,
    /// Athena data type (e.g. "varchar", "bigint").
    pub data_type: String,
}

/// Parsed result set of a completed query.
///
/// Rows are `Vec<Option<String>>`; `None` is SQL NULL. Row ordering and
/// per-row cell ordering match `columns`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResultSet {
    pub columns: Vec<ResultColumn>,
    pub rows: Vec<Vec<Option<String>>>,
    pub metadata: QueryMetadata,
}

impl QueryResultSet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Zero-based index of a column by name (case-sensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Cell value by row index and column name. `None` for out-of-bounds
    /// rows, unknown columns, and SQL NULL.
    pub fn get_value(&self, row: usize, col: &str) -> Option<&str> {
        let col_idx = self.column_index(col)?;
        self.rows.get(row)?.get(col_idx)?.as_deref()
    }

    /// First cell of the first row. This is the whole result of scalar
    /// queries such as `select count(*)`.
    pub fn scalar(&self) -> Option<&str> {
        self.rows.first()?.first()?.as_deref()
    }
}

impl fmt::Display for QueryResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.columns.is_empty() {
            return write!(f, "(empty result set)");
        }

        let header = self
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(" | ");
        writeln!(f, "{}", header)?;

        for row in &self.rows {
            let line = row
                .iter()
                .map(|cell| cell.as_deref().unwrap_or("NULL"))
                .collect::<Vec<_>>()
                .join(" | ");
            writeln!(f, "{}", line)?;
        }

        write!(
            f,
            "query {} | {} rows | {} bytes scanned | {}ms",
            self.metadata.query_id,
            self.rows.len(),
            self.metadata.bytes_scanned,
            self.metadata.execution_time_ms,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QueryResultSet {
        QueryResultSet {
            columns: vec![
                ResultColumn { name: "_col0".into(), data_type: "bigint".into() },
                ResultColumn { name: "label".into(), data_type: "varchar".into() },
            ],
            rows: vec![
                vec![Some("42".into()), Some("alpha".into())],
                vec![Some("7".into()), None],
            ],
            metadata: QueryMetadata {
                query_id: "q-123".into(),
                state: "SUCCEEDED".into(),
                bytes_scanned: 2048,
                execution_time_ms: 350,
                output_location: Some("s3://results-bucket/q-123.csv".into()),
            },
        }
    }

    #[test]
    fn accessors() {
        let r = sample();
        assert_eq!(r.row_count(), 2);
        assert!(!r.is_empty());
        assert_eq!(r.column_index("label"), Some(1));
        assert_eq!(r.column_index("missing"), None);
        assert_eq!(r.get_value(0, "label"), Some("alpha"));
        assert_eq!(r.get_value(1, "label"), None);
        assert_eq!(r.get_value(9, "label"), None);
        assert_eq!(r.scalar(), Some("42"));
    }

    #[test]
    fn scalar_of_empty_result_is_none() {
        let mut r = sample();
        r.rows.clear();
        assert_eq!(r.scalar(), None);
    }

    #[test]
    fn terminal_states() {
        let mut m = sample().metadata;
        for state in ["SUCCEEDED", "FAILED", "CANCELLED"] {
            m.state = state.into();
            assert!(m.is_terminal());
        }
        for state in ["QUEUED", "RUNNING"] {
            m.state = state.into();
            assert!(!m.is_terminal());
        }
    }

    #[test]
    fn display_includes_rows_and_metadata() {
        let text = sample().to_string();
        assert!(text.contains("_col0 | label"));
        assert!(text.contains("42 | alpha"));
        assert!(text.contains("7 | NULL"));
        assert!(text.contains("q-123"));
        assert!(text.contains("2 rows"));
    }

    #[test]
    fn serde_roundtrip() {
        let r = sample();
        let json = serde_json::to_string(&r).expect("serialize");
        let back: QueryResultSet = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.row_count(), r.row_count());
        assert_eq!(back.metadata.query_id, r.metadata.query_id);
        assert_eq!(back.get_value(0, "label"), r.get_value(0, "label"));
    }

    #[test]
    fn submission_serde_roundtrip() {
        let s = QuerySubmission {
            query_id: "q-9".into(),
            statement: "select count(*) from db.t".into(),
            database: Some("db".into()),
            submitted_at: Utc::now(),
        };
        let json = serde_json::to_string(&s).expect("serialize");
        let back: QuerySubmission = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.query_id, "q-9");
        assert_eq!(back.statement, s.statement);
        assert_eq!(back.database.as_deref(), Some("db"));
    }
}
