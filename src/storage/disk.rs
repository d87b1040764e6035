//! Direct disk storage provider
//!
//! Streams content to the local filesystem and publishes immediately: a
//! durable write is all it takes for content to become downloadable.

use crate::error::StorageError;
use crate::storage::{ContentStream, PutOutcome, StorageProvider};
use crate::types::FileTransferId;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

/// Storage provider backed by a local directory, one object per transfer id
pub struct DiskStorageProvider {
    root: PathBuf,
}

impl DiskStorageProvider {
    /// Create a provider rooted at `root`, creating the directory if needed
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            StorageError::Io(format!(
                "Failed to create storage directory '{}': {}",
                root.display(),
                e
            ))
        })?;
        Ok(Self { root })
    }

    fn object_path(&self, id: FileTransferId) -> PathBuf {
        self.root.join(id.to_string())
    }

    fn partial_path(&self, id: FileTransferId) -> PathBuf {
        self.root.join(format!("{id}.partial"))
    }
}

#[async_trait]
impl StorageProvider for DiskStorageProvider {
    async fn put(
        &self,
        id: FileTransferId,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<PutOutcome, StorageError> {
        let partial = self.partial_path(id);
        let outcome = write_and_hash(&partial, reader).await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                // An aborted stream must not leave a half-written object
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        // Rename is the commit point; readers never observe a partial object
        tokio::fs::rename(&partial, self.object_path(id))
            .await
            .map_err(|e| StorageError::Io(format!("Failed to commit object {id}: {e}")))?;

        tracing::debug!(
            file_transfer_id = %id,
            size_bytes = outcome.size_bytes,
            "content stored"
        );
        Ok(outcome)
    }

    async fn get(&self, id: FileTransferId) -> Result<ContentStream, StorageError> {
        let file = tokio::fs::File::open(self.object_path(id))
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => StorageError::NotFound(id.get()),
                _ => StorageError::Io(format!("Failed to open object {id}: {e}")),
            })?;
        Ok(Box::new(file))
    }

    async fn delete(&self, id: FileTransferId) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.object_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(format!(
                "Failed to delete object {id}: {e}"
            ))),
        }
    }

    fn scans_content(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "disk"
    }
}

/// Stream `reader` to `path`, computing the SHA-256 of everything written.
async fn write_and_hash(
    path: &Path,
    reader: &mut (dyn AsyncRead + Send + Unpin),
) -> Result<PutOutcome, StorageError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| StorageError::Io(format!("Failed to create '{}': {}", path.display(), e)))?;

    let mut hasher = Sha256::new();
    let mut size_bytes: u64 = 0;
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| StorageError::Io(format!("Failed to read upload stream: {e}")))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        file.write_all(&buf[..n])
            .await
            .map_err(|e| StorageError::Io(format!("Failed to write content: {e}")))?;
        size_bytes += n as u64;
    }

    file.flush()
        .await
        .map_err(|e| StorageError::Io(format!("Failed to flush content: {e}")))?;
    file.sync_all()
        .await
        .map_err(|e| StorageError::Io(format!("Failed to sync content: {e}")))?;

    let checksum = format!("{:x}", hasher.finalize());
    Ok(PutOutcome {
        checksum,
        size_bytes,
    })
}
