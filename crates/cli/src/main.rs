//! lakewire — provision an S3-backed Athena data lake from the command line.
//!
//! Credentials and session settings come from the environment (see
//! `Config::from_env`); each subcommand maps to one client operation.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use lakewire_athena::{AthenaClient, PartitionSpec, QuerySubmission};
use lakewire_core::Config;
use lakewire_storage::{BucketOutcome, StorageClient};

// ── CLI ─────────────────────────────────────────────────────────────

/// Provision S3 buckets and Athena databases, tables, and partitions.
#[derive(Parser, Debug)]
#[command(name = "lakewire", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a storage bucket (tolerates the bucket already existing).
    CreateBucket {
        /// Bucket name.
        name: String,
    },

    /// Upload a local file to a bucket with SSE-KMS encryption.
    Upload {
        /// Path of the local file.
        local_path: PathBuf,

        /// Destination bucket.
        #[arg(long)]
        bucket: String,

        /// Object key; defaults to the local file name.
        #[arg(long)]
        key: Option<String>,
    },

    /// Create an Athena database if it does not exist.
    CreateDatabase {
        /// Database name.
        database: String,

        /// Wait for the statement to complete.
        #[arg(long)]
        wait: bool,
    },

    /// Register an external table from a DDL file.
    CreateTable {
        /// Database the table belongs to.
        database: String,

        /// Table name (must appear in the DDL).
        table: String,

        /// File containing the CREATE EXTERNAL TABLE statement.
        #[arg(long)]
        ddl_file: PathBuf,

        /// Wait for the statement to complete.
        #[arg(long)]
        wait: bool,
    },

    /// Add a (year, month, day) partition to a table.
    AddPartition {
        /// Database the table belongs to.
        database: String,

        /// Table name.
        table: String,

        #[arg(long)]
        year: String,

        #[arg(long)]
        month: String,

        #[arg(long)]
        day: String,

        /// S3 prefix holding the partition's data.
        #[arg(long)]
        location: String,

        /// Wait for the statement to complete.
        #[arg(long)]
        wait: bool,
    },

    /// Count the rows of a table.
    CountRows {
        /// Database the table belongs to.
        database: String,

        /// Table name.
        table: String,

        /// Wait for the result and print the count.
        #[arg(long)]
        wait: bool,
    },
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    lakewire_core::load_dotenv();
    let config = Config::from_env();
    config.log_summary();

    let cli = Cli::parse();

    match cli.command {
        Command::CreateBucket { name } => {
            let storage = StorageClient::new(&config).await;
            match storage.create_bucket(&name).await? {
                BucketOutcome::Created => println!("bucket {name} created"),
                BucketOutcome::AlreadyExists => println!("bucket {name} already exists"),
            }
        }

        Command::Upload { local_path, bucket, key } => {
            let key = match key {
                Some(k) => k,
                None => local_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .context("cannot derive object key from local path; pass --key")?
                    .to_string(),
            };

            let storage = StorageClient::new(&config).await;
            let receipt = storage.upload_file(&local_path, &bucket, &key).await?;
            println!(
                "uploaded {} to s3://{}/{} (etag: {})",
                local_path.display(),
                receipt.bucket,
                receipt.key,
                receipt.etag.as_deref().unwrap_or("unknown"),
            );
        }

        Command::CreateDatabase { database, wait } => {
            let athena = AthenaClient::new(&config).await?;
            let submission = athena.create_database(&database).await?;
            report_submission(&athena, &submission, wait).await?;
        }

        Command::CreateTable { database, table, ddl_file, wait } => {
            let ddl = std::fs::read_to_string(&ddl_file)
                .with_context(|| format!("reading DDL file {}", ddl_file.display()))?;

            let athena = AthenaClient::new(&config).await?;
            let submission = athena.create_table(&database, &table, &ddl).await?;
            report_submission(&athena, &submission, wait).await?;
        }

        Command::AddPartition { database, table, year, month, day, location, wait } => {
            let partition = PartitionSpec { year, month, day, location };

            let athena = AthenaClient::new(&config).await?;
            let submission = athena.add_partition(&database, &table, &partition).await?;
            report_submission(&athena, &submission, wait).await?;
        }

        Command::CountRows { database, table, wait } => {
            let athena = AthenaClient::new(&config).await?;
            if wait {
                let count = athena.count_rows_and_wait(&database, &table).await?;
                println!("{database}.{table}: {count} rows");
            } else {
                let submission = athena.count_rows(&database, &table).await?;
                println!("submitted query {}", submission.query_id);
            }
        }
    }

    Ok(())
}

/// Print the execution handle, optionally waiting for a terminal state.
async fn report_submission(
    athena: &AthenaClient,
    submission: &QuerySubmission,
    wait: bool,
) -> anyhow::Result<()> {
    info!(query_id = %submission.query_id, sql = %submission.statement, "submitted");

    if wait {
        let metadata = athena.wait_for_completion(&submission.query_id).await?;
        println!(
            "query {} finished: {} ({}ms, {} bytes scanned)",
            metadata.query_id,
            metadata.state,
            metadata.execution_time_ms,
            metadata.bytes_scanned,
        );
    } else {
        println!("submitted query {}", submission.query_id);
    }

    Ok(())
}
