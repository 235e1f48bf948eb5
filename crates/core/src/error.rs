use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of a remote service failure.
///
/// Both service clients reduce provider errors to one of these kinds so
/// callers can decide retry vs. abort without matching on raw SDK types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Referenced bucket, object, database, or table does not exist.
    NotFound,
    /// Authentication or authorization was rejected.
    Unauthorized,
    /// Provider asked us to slow down.
    Throttled,
    /// The request itself was invalid (bad name, bad SQL, bad parameter).
    MalformedRequest,
    /// Connection-level failure: timeout, DNS, dispatch.
    TransientNetwork,
    /// Anything the taxonomy does not model.
    Other,
}

impl ErrorKind {
    /// Categorize from a provider error code string.
    ///
    /// `None` means the request never produced a service response, which is
    /// a connection-level failure.
    pub fn from_code(code: Option<&str>) -> Self {
        let Some(code) = code else {
            return ErrorKind::TransientNetwork;
        };
        match code {
            "NoSuchBucket" | "NoSuchKey" | "NotFound" | "ResourceNotFoundException"
            | "EntityNotFoundException" | "MetadataException" => ErrorKind::NotFound,

            "AccessDenied" | "AccessDeniedException" | "InvalidAccessKeyId"
            | "SignatureDoesNotMatch" | "UnrecognizedClientException"
            | "ExpiredToken" | "ExpiredTokenException" | "TokenRefreshRequired" => {
                ErrorKind::Unauthorized
            }

            "Throttling" | "ThrottlingException" | "TooManyRequestsException"
            | "SlowDown" | "RequestLimitExceeded" => ErrorKind::Throttled,

            "InvalidRequestException" | "ValidationException" | "InvalidBucketName"
            | "InvalidArgument" | "MalformedXML" | "InvalidParameterValue" => {
                ErrorKind::MalformedRequest
            }

            "RequestTimeout" | "RequestTimeoutException" => ErrorKind::TransientNetwork,

            _ => ErrorKind::Other,
        }
    }

    /// Whether a caller may reasonably retry the operation as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Throttled | ErrorKind::TransientNetwork)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not-found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Throttled => "throttled",
            ErrorKind::MalformedRequest => "malformed-request",
            ErrorKind::TransientNetwork => "transient-network",
            ErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// A categorized failure returned by a remote AWS call.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{kind} error{}: {message}", .code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default())]
pub struct RemoteError {
    pub kind: ErrorKind,
    /// Provider error code, when the service produced a response.
    pub code: Option<String>,
    pub message: String,
}

impl RemoteError {
    /// Build from the code/message pair exposed by SDK error metadata.
    pub fn from_parts(code: Option<&str>, message: Option<&str>) -> Self {
        Self {
            kind: ErrorKind::from_code(code),
            code: code.map(str::to_string),
            message: message.unwrap_or("unknown service error").to_string(),
        }
    }

    /// A connection-level failure with no service response.
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::TransientNetwork,
            code: None,
            message: message.into(),
        }
    }
}
