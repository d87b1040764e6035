//! Error types for file-broker
//!
//! This module provides comprehensive error handling for the library, including:
//! - Domain-specific error types (Database, Storage, status conflicts, tenancy)
//! - HTTP status code mapping for transport integration
//! - Structured error responses with machine-readable error codes
//! - Context information (operation, current status, attempt counts)

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for file-broker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for file-broker
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "storage_dir")
        key: Option<String>,
    },

    /// Request failed structural validation before touching any state
    #[error("validation error: {0}")]
    Validation(String),

    /// The requested service is not registered for any tenant
    #[error("service not configured: {service_code}/{service_edition_code}")]
    ServiceNotConfigured {
        /// Service code the caller presented
        service_code: String,
        /// Service edition code the caller presented
        service_edition_code: String,
    },

    /// The service exists but its owning tenant has no configuration
    #[error("service owner not configured: {owner_id}")]
    ServiceOwnerNotConfigured {
        /// Organization identifier of the unconfigured owner
        owner_id: String,
    },

    /// Resource absent, or the caller is not authorized to learn it exists
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Operation illegal in the resource's current status
    #[error("cannot {operation} in status {current_status}")]
    Conflict {
        /// The operation that was attempted (e.g., "download", "confirm")
        operation: String,
        /// The current status that prevents the operation
        current_status: String,
    },

    /// Caller-declared checksum disagrees with the computed content hash
    #[error("checksum mismatch: declared {declared}, computed {computed}")]
    ChecksumMismatch {
        /// Checksum the sender declared at initiation
        declared: String,
        /// Checksum computed over the uploaded bytes
        computed: String,
    },

    /// Storage backend rejected the content during validation
    #[error("content rejected by scan: {0}")]
    ScanRejected(String),

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Storage provider error
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Persistence retries exhausted; the operation may succeed later
    #[error("service unavailable after {attempts} attempts")]
    Unavailable {
        /// Number of attempts made before giving up
        attempts: u32,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shutdown in progress - not accepting new operations
    #[error("shutdown in progress: not accepting new operations")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Constraint violation (e.g., duplicate key)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Optimistic update lost against a concurrent writer; re-read and reapply
    #[error("version conflict on {record}")]
    VersionConflict {
        /// Description of the record whose version check failed
        record: String,
    },
}

/// Storage provider errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend temporarily unreachable; the operation may be retried
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Content absent (purged, or upload never completed)
    #[error("content not found for file transfer {0}")]
    NotFound(i64),

    /// Content not yet validated; download must wait for the scan verdict
    #[error("content for file transfer {0} is awaiting validation")]
    AwaitingValidation(i64),

    /// Underlying I/O failure
    #[error("storage I/O error: {0}")]
    Io(String),
}

/// API error response format
///
/// This structure is what a transport layer should serialize when an
/// operation fails. It follows a standard format with machine-readable error
/// codes, human-readable messages, and optional contextual details — never an
/// internal stack trace or provider-specific detail.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "not_found",
///     "message": "resource not found: file transfer 123",
///     "details": {
///       "file_transfer_id": 123
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "conflict")
    ///
    /// Clients can use this for programmatic error handling.
    pub code: String,

    /// Human-readable error message
    ///
    /// This is suitable for displaying to end users.
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create a "conflict" error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("conflict", message)
    }

    /// Create a "service unavailable" error
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new("service_unavailable", message)
    }
}

/// Convert errors to HTTP status codes for transport responses
///
/// This trait maps domain errors to appropriate HTTP status codes. It is the
/// single mapping table a transport layer consults; error kinds are stable.
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - Client error (invalid input)
            Error::Config { .. } => 400,
            Error::Validation(_) => 400,

            // 422 Unprocessable Entity - Tenant setup missing
            Error::ServiceNotConfigured { .. } => 422,
            Error::ServiceOwnerNotConfigured { .. } => 422,

            // 404 Not Found - Absent or unauthorized (deliberately conflated)
            Error::NotFound(_) => 404,
            Error::Storage(StorageError::NotFound(_)) => 404,

            // 409 Conflict - Operation illegal in current status
            Error::Conflict { .. } => 409,
            Error::ChecksumMismatch { .. } => 409,
            Error::ScanRejected(_) => 409,
            Error::Database(DatabaseError::VersionConflict { .. }) => 409,
            Error::Storage(StorageError::AwaitingValidation(_)) => 409,

            // 500 Internal Server Error - Server-side issues
            Error::Database(_) => 500,
            Error::Sqlx(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::Other(_) => 500,
            Error::Storage(StorageError::Io(_)) => 500,

            // 503 Service Unavailable
            Error::Storage(StorageError::Unavailable(_)) => 503,
            Error::Unavailable { .. } => 503,
            Error::ShuttingDown => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Validation(_) => "validation_error",
            Error::ServiceNotConfigured { .. } => "service_not_configured",
            Error::ServiceOwnerNotConfigured { .. } => "service_owner_not_configured",
            Error::NotFound(_) => "not_found",
            Error::Conflict { .. } => "conflict",
            Error::ChecksumMismatch { .. } => "checksum_mismatch",
            Error::ScanRejected(_) => "scan_rejected",
            Error::Database(e) => match e {
                DatabaseError::VersionConflict { .. } => "version_conflict",
                _ => "database_error",
            },
            Error::Sqlx(_) => "database_error",
            Error::Storage(e) => match e {
                StorageError::Unavailable(_) => "storage_unavailable",
                StorageError::NotFound(_) => "not_found",
                StorageError::AwaitingValidation(_) => "conflict",
                StorageError::Io(_) => "storage_error",
            },
            Error::Unavailable { .. } => "unavailable",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ShuttingDown => "shutting_down",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        // Add contextual details for specific error types
        let details = match &error {
            Error::Conflict {
                operation,
                current_status,
            } => Some(serde_json::json!({
                "operation": operation,
                "current_status": current_status,
            })),
            Error::ChecksumMismatch { declared, computed } => Some(serde_json::json!({
                "declared": declared,
                "computed": computed,
            })),
            Error::ServiceNotConfigured {
                service_code,
                service_edition_code,
            } => Some(serde_json::json!({
                "service_code": service_code,
                "service_edition_code": service_edition_code,
            })),
            Error::ServiceOwnerNotConfigured { owner_id } => Some(serde_json::json!({
                "owner_id": owner_id,
            })),
            Error::Unavailable { attempts } => Some(serde_json::json!({
                "attempts": attempts,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
