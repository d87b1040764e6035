//! Pluggable byte storage for file transfer content
//!
//! Storage providers own the bytes; the metadata store owns everything else.
//! Implementations differ only in whether content is validated (malware
//! scanned) before becoming eligible for download — handlers observe that
//! difference purely through status transitions, never through the scanning
//! mechanism itself.

use crate::error::StorageError;
use crate::types::FileTransferId;
use async_trait::async_trait;
use tokio::io::AsyncRead;

mod disk;
mod scanning;

pub use disk::DiskStorageProvider;
pub use scanning::{ScanOutcome, ScanVerdict, Scanner, ScanningStorageProvider};

/// Readable stream of stored content
pub type ContentStream = Box<dyn AsyncRead + Send + Unpin>;

/// Outcome of a durable write
#[must_use]
#[derive(Debug, Clone)]
pub struct PutOutcome {
    /// SHA-256 of the stored bytes, lowercase hex
    pub checksum: String,
    /// Number of bytes stored
    pub size_bytes: u64,
}

/// Trait for byte-level storage of file transfer content
///
/// Implementations must be safe for concurrent use; each file transfer id
/// maps to at most one stored object.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Store content for a file transfer, streaming from `reader`.
    ///
    /// The write is durable when this returns. Content may still be
    /// ineligible for [`get`](Self::get) on providers that validate
    /// asynchronously.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] for transient backend faults
    /// (the caller may retry the whole upload) or [`StorageError::Io`] for
    /// unrecoverable write failures.
    async fn put(
        &self,
        id: FileTransferId,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<PutOutcome, StorageError>;

    /// Open stored content for reading.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the content was purged or the
    /// upload never completed, and [`StorageError::AwaitingValidation`] on
    /// scanning providers while a verdict is outstanding.
    async fn get(&self, id: FileTransferId) -> Result<ContentStream, StorageError>;

    /// Remove stored content. Removing absent content is a no-op so purge
    /// runs are idempotent.
    async fn delete(&self, id: FileTransferId) -> Result<(), StorageError>;

    /// Whether this provider validates content asynchronously after `put`.
    ///
    /// Selected per service owner in configuration; handlers use this only
    /// to choose which status a completed upload transitions into.
    fn scans_content(&self) -> bool;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
