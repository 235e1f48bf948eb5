use std::path::PathBuf;

use thiserror::Error;

use lakewire_core::{ErrorKind, RemoteError};

#[derive(Error, Debug)]
pub enum StorageError {
    /// Local file missing. Raised before any network call is made.
    #[error("local file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Credentials could not be resolved or were rejected by the provider.
    #[error("credentials unavailable")]
    CredentialsUnavailable,

    #[error("invalid bucket name: {0:?}")]
    InvalidBucketName(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Error category, for retry/abort decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::FileNotFound(_) => ErrorKind::NotFound,
            StorageError::CredentialsUnavailable => ErrorKind::Unauthorized,
            StorageError::InvalidBucketName(_) => ErrorKind::MalformedRequest,
            StorageError::Remote(e) => e.kind,
            StorageError::Io(_) => ErrorKind::Other,
        }
    }
}
