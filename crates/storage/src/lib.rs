pub mod client;
pub mod error;

pub use client::{BucketOutcome, StorageClient, UploadReceipt};
pub use error::StorageError;
