//! Scanning storage provider
//!
//! Wraps another provider and holds every stored object back from download
//! until an asynchronous malware scan delivers a verdict. Verdicts flow out
//! over an mpsc channel to the broker's scan listener, which drives the
//! `UploadProcessing -> Published` / `-> Failed` transition through the same
//! validation path as handler-driven transitions.

use crate::error::StorageError;
use crate::status::FileStatus;
use crate::storage::{ContentStream, PutOutcome, StorageProvider};
use crate::types::FileTransferId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::{Mutex, mpsc};

/// Result of scanning one stored object
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Content passed validation and may be published
    Clean,
    /// Content was rejected; the reason is surfaced in status text
    Rejected(String),
}

/// Verdict delivered to the broker when a scan completes
#[derive(Clone, Debug)]
pub struct ScanVerdict {
    /// The transfer whose content was scanned
    pub file_transfer_id: FileTransferId,
    /// What the scanner concluded
    pub outcome: ScanOutcome,
}

/// Trait for content scanners
///
/// Implementations read the stored content and decide whether it is safe to
/// publish. A scanner that cannot complete (backend outage, corrupt stream)
/// should return `Rejected` so the transfer fails visibly rather than
/// staying in processing forever.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Scan stored content, reading from the provided stream
    async fn scan(&self, id: FileTransferId, content: ContentStream) -> ScanOutcome;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Storage provider that gates publication on an asynchronous scan
pub struct ScanningStorageProvider {
    inner: Arc<dyn StorageProvider>,
    scanner: Arc<dyn Scanner>,
    verdict_tx: mpsc::UnboundedSender<ScanVerdict>,
    /// Content-level state per stored object; the authoritative transfer
    /// status lives in the metadata store
    content_status: Arc<Mutex<HashMap<FileTransferId, FileStatus>>>,
}

impl ScanningStorageProvider {
    /// Wrap `inner`, scanning every stored object with `scanner` and sending
    /// verdicts on `verdict_tx`.
    pub fn new(
        inner: Arc<dyn StorageProvider>,
        scanner: Arc<dyn Scanner>,
        verdict_tx: mpsc::UnboundedSender<ScanVerdict>,
    ) -> Self {
        Self {
            inner,
            scanner,
            verdict_tx,
            content_status: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl StorageProvider for ScanningStorageProvider {
    async fn put(
        &self,
        id: FileTransferId,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<PutOutcome, StorageError> {
        let outcome = self.inner.put(id, reader).await?;

        self.content_status
            .lock()
            .await
            .insert(id, FileStatus::Processing);

        let inner = self.inner.clone();
        let scanner = self.scanner.clone();
        let verdict_tx = self.verdict_tx.clone();
        let content_status = self.content_status.clone();

        // Scan runs detached; the durable write has already been acknowledged
        tokio::spawn(async move {
            let scan_outcome = match inner.get(id).await {
                Ok(stream) => scanner.scan(id, stream).await,
                Err(e) => {
                    tracing::warn!(file_transfer_id = %id, error = %e, "content unreadable for scanning");
                    ScanOutcome::Rejected(format!("content unavailable for scanning: {e}"))
                }
            };

            let file_status = match &scan_outcome {
                ScanOutcome::Clean => FileStatus::Ready,
                ScanOutcome::Rejected(reason) => {
                    tracing::warn!(file_transfer_id = %id, reason = %reason, "scan rejected content");
                    FileStatus::Failed
                }
            };
            content_status.lock().await.insert(id, file_status);

            verdict_tx
                .send(ScanVerdict {
                    file_transfer_id: id,
                    outcome: scan_outcome,
                })
                .ok();
        });

        Ok(outcome)
    }

    async fn get(&self, id: FileTransferId) -> Result<ContentStream, StorageError> {
        match self.content_status.lock().await.get(&id) {
            Some(FileStatus::Processing) => return Err(StorageError::AwaitingValidation(id.get())),
            Some(FileStatus::Failed) | Some(FileStatus::Deleted) => {
                return Err(StorageError::NotFound(id.get()));
            }
            // Ready, or unknown to this process (restart after publication)
            _ => {}
        }
        self.inner.get(id).await
    }

    async fn delete(&self, id: FileTransferId) -> Result<(), StorageError> {
        self.content_status
            .lock()
            .await
            .insert(id, FileStatus::Deleted);
        self.inner.delete(id).await
    }

    fn scans_content(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "scanning"
    }
}
