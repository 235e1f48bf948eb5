//! SQL statement construction.
//!
//! Every statement submitted to Athena is built here, from validated
//! parts. Identifiers are checked against a strict pattern and string
//! literals are escaped before interpolation, so no caller-supplied value
//! reaches the query text raw.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatementError {
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("invalid {field} value: {value:?}")]
    InvalidPartitionValue { field: &'static str, value: String },

    #[error("partition location must be an s3:// URI: {0:?}")]
    InvalidLocation(String),

    #[error("invalid column type: {0:?}")]
    InvalidColumnType(String),

    #[error("DDL does not reference table {0:?}")]
    TableNotInDdl(String),

    #[error("table definition has no columns")]
    EmptyTableDefinition,
}

/// `[A-Za-z_][A-Za-z0-9_]*` — the only shape we interpolate as an identifier.
pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn ensure_identifier(s: &str) -> Result<&str, StatementError> {
    if is_valid_identifier(s) {
        Ok(s)
    } else {
        Err(StatementError::InvalidIdentifier(s.to_string()))
    }
}

/// Double embedded single quotes for use inside a quoted SQL literal.
pub fn escape_literal(s: &str) -> String {
    s.replace('\'', "''")
}

/// Whether `ddl` references `table` as a standalone identifier
/// (case-insensitive). Used to reject DDL that does not match the table
/// the caller claims to be creating.
pub fn ddl_references_table(ddl: &str, table: &str) -> bool {
    let ddl = ddl.to_ascii_lowercase();
    let table = table.to_ascii_lowercase();
    if table.is_empty() {
        return false;
    }
    let boundary =
        |c: Option<char>| c.map_or(true, |c| !(c.is_ascii_alphanumeric() || c == '_'));
    ddl.match_indices(&table).any(|(i, _)| {
        let before = ddl[..i].chars().next_back();
        let after = ddl[i + table.len()..].chars().next();
        boundary(before) && boundary(after)
    })
}

// ── Statements ───────────────────────────────────────────────

pub fn create_database_sql(database: &str) -> Result<String, StatementError> {
    let database = ensure_identifier(database)?;
    Ok(format!("create database if not exists {}", database))
}

pub fn count_rows_sql(database: &str, table: &str) -> Result<String, StatementError> {
    let database = ensure_identifier(database)?;
    let table = ensure_identifier(table)?;
    Ok(format!("select count(*) from {}.{}", database, table))
}

/// One `(year, month, day)` partition and the S3 prefix holding its data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSpec {
    pub year: String,
    pub month: String,
    pub day: String,
    pub location: String,
}

impl PartitionSpec {
    pub fn validate(&self) -> Result<(), StatementError> {
        validate_digits("year", &self.year, 4, 4)?;
        validate_digits("month", &self.month, 1, 2)?;
        validate_digits("day", &self.day, 1, 2)?;
        if !self.location.starts_with("s3://") || self.location.len() <= "s3://".len() {
            return Err(StatementError::InvalidLocation(self.location.clone()));
        }
        Ok(())
    }
}

fn validate_digits(
    field: &'static str,
    value: &str,
    min_len: usize,
    max_len: usize,
) -> Result<(), StatementError> {
    let len_ok = (min_len..=max_len).contains(&value.len());
    if len_ok && value.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(StatementError::InvalidPartitionValue {
            field,
            value: value.to_string(),
        })
    }
}

/// Renders the legacy ALTER TABLE text byte-for-byte for well-formed
/// values, including its uneven spacing around `=`.
pub fn add_partition_sql(
    database: &str,
    table: &str,
    partition: &PartitionSpec,
) -> Result<String, StatementError> {
    let database = ensure_identifier(database)?;
    let table = ensure_identifier(table)?;
    partition.validate()?;

    Ok(format!(
        "ALTER TABLE {}.{} ADD PARTITION (year = '{}', month ='{}', day ='{}') location '{}'",
        database,
        table,
        partition.year,
        partition.month,
        partition.day,
        escape_literal(&partition.location),
    ))
}

// ── Table definitions ────────────────────────────────────────

/// A column in an external table definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }

    fn validate(&self) -> Result<(), StatementError> {
        ensure_identifier(&self.name)?;
        let ty = self.data_type.trim();
        let chars_ok = ty.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '(' | ')' | ',' | '<' | '>' | '_' | ' ')
        });
        if ty.is_empty() || !chars_ok || !ty.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return Err(StatementError::InvalidColumnType(self.data_type.clone()));
        }
        Ok(())
    }
}

/// Builder for a `CREATE EXTERNAL TABLE` statement over Parquet data in S3.
///
/// Replaces the hand-written DDL blobs that used to be passed around as
/// literals: columns, partition columns, location, and table properties go
/// in as values and come out as validated SQL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDefinition {
    pub database: String,
    pub table: String,
    pub columns: Vec<ColumnDef>,
    pub partitioned_by: Vec<ColumnDef>,
    pub location: String,
    pub properties: Vec<(String, String)>,
}

impl TableDefinition {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            columns: Vec::new(),
            partitioned_by: Vec::new(),
            location: String::new(),
            properties: Vec::new(),
        }
    }

    pub fn column(mut self, name: impl Into<String>, data_type: impl Into<String>) -> Self {
        self.columns.push(ColumnDef::new(name, data_type));
        self
    }

    pub fn partition_column(
        mut self,
        name: impl Into<String>,
        data_type: impl Into<String>,
    ) -> Self {
        self.partitioned_by.push(ColumnDef::new(name, data_type));
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push((key.into(), value.into()));
        self
    }

    /// Render the full DDL statement.
    pub fn render(&self) -> Result<String, StatementError> {
        let database = ensure_identifier(&self.database)?;
        let table = ensure_identifier(&self.table)?;

        if self.columns.is_empty() {
            return Err(StatementError::EmptyTableDefinition);
        }
        for col in self.columns.iter().chain(&self.partitioned_by) {
            col.validate()?;
        }
        if !self.location.starts_with("s3://") {
            return Err(StatementError::InvalidLocation(self.location.clone()));
        }

        let mut sql = format!("CREATE EXTERNAL TABLE IF NOT EXISTS {}.{} (\n", database, table);
        let column_list = self
            .columns
            .iter()
            .map(|c| format!("  {} {}", c.name, c.data_type.trim()))
            .collect::<Vec<_>>()
            .join(",\n");
        sql.push_str(&column_list);
        sql.push_str("\n)");

        if !self.partitioned_by.is_empty() {
            let partition_list = self
                .partitioned_by
                .iter()
                .map(|c| format!("{} {}", c.name, c.data_type.trim()))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!("\nPARTITIONED BY ({})", partition_list));
        }

        sql.push_str("\nSTORED AS PARQUET");
        sql.push_str(&format!("\nLOCATION '{}'", escape_literal(&self.location)));

        if !self.properties.is_empty() {
            let props = self
                .properties
                .iter()
                .map(|(k, v)| format!("'{}' = '{}'", escape_literal(k), escape_literal(v)))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!("\nTBLPROPERTIES ({})", props));
        }

        Ok(sql)
    }
}

// ── Tests ────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_validation() {
        assert!(is_valid_identifier("events"));
        assert!(is_valid_identifier("_private"));
        assert!(is_valid_identifier("t2"));

        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("2fast"));
        assert!(!is_valid_identifier("bad-name"));
        assert!(!is_valid_identifier("drop table; --"));
    }

    #[test]
    fn create_database_text_is_exact() {
        let sql = create_database_sql("analytics").unwrap();
        assert_eq!(sql, "create database if not exists analytics");
    }

    #[test]
    fn create_database_rejects_injection() {
        let err = create_database_sql("x; drop database y").unwrap_err();
        assert!(matches!(err, StatementError::InvalidIdentifier(_)));
    }

    #[test]
    fn count_rows_text_is_exact() {
        let sql = count_rows_sql("analytics", "event_logs").unwrap();
        assert_eq!(sql, "select count(*) from analytics.event_logs");
    }

    #[test]
    fn add_partition_text_is_exact() {
        // Spacing is part of the contract: `year = '`, `month ='`, `day ='`.
        let partition = PartitionSpec {
            year: "2019".into(),
            month: "10".into(),
            day: "29".into(),
            location: "s3://data-drops/2019/10/29".into(),
        };
        let sql = add_partition_sql("analytics", "event_logs", &partition).unwrap();
        assert_eq!(
            sql,
            "ALTER TABLE analytics.event_logs ADD PARTITION (year = '2019', month ='10', \
             day ='29') location 's3://data-drops/2019/10/29'",
        );
    }

    #[test]
    fn add_partition_accepts_single_digit_month_and_day() {
        let partition = PartitionSpec {
            year: "2021".into(),
            month: "1".into(),
            day: "5".into(),
            location: "s3://data-drops/2021/1/5".into(),
        };
        let sql = add_partition_sql("db", "t", &partition).unwrap();
        assert!(sql.contains("month ='1'"));
        assert!(sql.contains("day ='5'"));
    }

    #[test]
    fn partition_validation_rejects_bad_values() {
        let base = PartitionSpec {
            year: "2021".into(),
            month: "10".into(),
            day: "29".into(),
            location: "s3://bucket/p".into(),
        };

        let bad_year = PartitionSpec { year: "21".into(), ..base.clone() };
        assert!(matches!(
            bad_year.validate(),
            Err(StatementError::InvalidPartitionValue { field: "year", .. }),
        ));

        let bad_month = PartitionSpec { month: "123".into(), ..base.clone() };
        assert!(matches!(
            bad_month.validate(),
            Err(StatementError::InvalidPartitionValue { field: "month", .. }),
        ));

        let injected = PartitionSpec { day: "1') --".into(), ..base.clone() };
        assert!(matches!(
            injected.validate(),
            Err(StatementError::InvalidPartitionValue { field: "day", .. }),
        ));

        let bad_location = PartitionSpec { location: "/local/path".into(), ..base };
        assert!(matches!(
            bad_location.validate(),
            Err(StatementError::InvalidLocation(_)),
        ));
    }

    #[test]
    fn location_quotes_are_escaped() {
        let partition = PartitionSpec {
            year: "2021".into(),
            month: "10".into(),
            day: "29".into(),
            location: "s3://bucket/o'brien".into(),
        };
        let sql = add_partition_sql("db", "t", &partition).unwrap();
        assert!(sql.ends_with("location 's3://bucket/o''brien'"));
    }

    #[test]
    fn ddl_reference_check_is_word_boundary_aware() {
        let ddl = "CREATE EXTERNAL TABLE IF NOT EXISTS db.event_logs (id int)";
        assert!(ddl_references_table(ddl, "event_logs"));
        assert!(ddl_references_table(ddl, "EVENT_LOGS"));

        assert!(!ddl_references_table(ddl, "event"));
        assert!(!ddl_references_table(ddl, "logs"));
        assert!(!ddl_references_table(ddl, "other_table"));
    }

    #[test]
    fn table_definition_renders_full_ddl() {
        let ddl = TableDefinition::new("analytics", "event_logs")
            .column("adid", "string")
            .column("amplitude_id", "int")
            .column("event_time", "date")
            .column("location_lat", "float")
            .column("paying", "boolean")
            .partition_column("year", "string")
            .partition_column("month", "string")
            .partition_column("day", "string")
            .location("s3://data-drops/")
            .property("parquet.compression", "SNAPPY")
            .render()
            .unwrap();

        assert!(ddl.starts_with("CREATE EXTERNAL TABLE IF NOT EXISTS analytics.event_logs ("));
        assert!(ddl.contains("  adid string,\n"));
        assert!(ddl.contains("  paying boolean\n)"));
        assert!(ddl.contains("PARTITIONED BY (year string, month string, day string)"));
        assert!(ddl.contains("STORED AS PARQUET"));
        assert!(ddl.contains("LOCATION 's3://data-drops/'"));
        assert!(ddl.contains("TBLPROPERTIES ('parquet.compression' = 'SNAPPY')"));

        // The rendered DDL must pass the reference check used on submission.
        assert!(ddl_references_table(&ddl, "event_logs"));
    }

    #[test]
    fn table_definition_rejects_bad_parts() {
        assert!(matches!(
            TableDefinition::new("db", "t").location("s3://b/").render(),
            Err(StatementError::EmptyTableDefinition),
        ));

        assert!(matches!(
            TableDefinition::new("db", "t")
                .column("bad-col", "string")
                .location("s3://b/")
                .render(),
            Err(StatementError::InvalidIdentifier(_)),
        ));

        assert!(matches!(
            TableDefinition::new("db", "t")
                .column("c", "string'); drop table t; --")
                .location("s3://b/")
                .render(),
            Err(StatementError::InvalidColumnType(_)),
        ));

        assert!(matches!(
            TableDefinition::new("db", "t")
                .column("c", "string")
                .location("file:///tmp/x")
                .render(),
            Err(StatementError::InvalidLocation(_)),
        ));
    }

    #[test]
    fn complex_column_types_are_allowed() {
        let ddl = TableDefinition::new("db", "t")
            .column("tags", "array<string>")
            .column("amount", "decimal(10, 2)")
            .location("s3://b/")
            .render()
            .unwrap();
        assert!(ddl.contains("tags array<string>"));
        assert!(ddl.contains("amount decimal(10, 2)"));
    }

    #[test]
    fn escape_literal_doubles_quotes() {
        assert_eq!(escape_literal("plain"), "plain");
        assert_eq!(escape_literal("o'brien"), "o''brien");
        assert_eq!(escape_literal("''"), "''''");
    }
}
