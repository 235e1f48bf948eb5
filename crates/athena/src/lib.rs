pub mod client;
pub mod statement;
pub mod submission;

pub use client::{AthenaClient, AthenaError};
pub use statement::{ColumnDef, PartitionSpec, StatementError, TableDefinition};
pub use submission::{QueryMetadata, QueryResultSet, QuerySubmission, ResultColumn};
