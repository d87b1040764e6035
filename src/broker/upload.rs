//! Upload streaming and checksum verification.

use crate::error::{Error, Result};
use crate::events::{EventKind, LifecycleEvent};
use crate::retry::execute_with_retry;
use crate::status::{TransferEvent, TransferStatus};
use crate::types::{CallerIdentity, FileTransferId, FileTransferOverview, ShipmentId};
use tokio::io::AsyncRead;

use super::FileBroker;

impl FileBroker {
    /// Stream a file's content into storage
    ///
    /// Content is piped straight through to the service owner's storage
    /// provider — never buffered whole in memory — while a SHA-256 is
    /// computed over the bytes. The metadata store is only touched with the
    /// result after the stream completes, so an aborted upload leaves the
    /// transfer in `UploadStarted` for the sender to retry.
    ///
    /// On a provider that scans, the transfer lands in `UploadProcessing`
    /// and publication waits for the scan verdict; otherwise it is
    /// `Published` immediately.
    pub async fn upload_file(
        &self,
        identity: &CallerIdentity,
        id: FileTransferId,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<FileTransferOverview> {
        self.ensure_accepting()?;

        let row = self
            .db
            .get_transfer(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("file transfer {id}")))?;
        self.authorize_sender(identity, id, &row.sender)?;

        let shipment = self
            .db
            .get_shipment(ShipmentId::new(row.shipment_id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("file transfer {id}")))?;
        let (service, _owner) =
            self.resolve_tenant(&shipment.service_code, &shipment.service_edition_code)?;
        let provider = self.provider_for(&service.owner_id)?;

        self.apply_transfer_event(id, TransferEvent::UploadStarted, None)
            .await?;

        let outcome = provider.put(id, reader).await?;

        // Verify the declared checksum before anything becomes visible
        if let Some(declared) = &row.declared_checksum
            && !declared.eq_ignore_ascii_case(&outcome.checksum)
        {
            provider.delete(id).await.ok();
            self.apply_transfer_event(
                id,
                TransferEvent::Failed,
                Some("Upload failed: checksum mismatch"),
            )
            .await?;
            self.publisher.publish(LifecycleEvent {
                kind: EventKind::UploadFailed,
                shipment_id: ShipmentId::new(row.shipment_id),
                file_transfer_id: Some(id),
                subject: None,
            });
            return Err(Error::ChecksumMismatch {
                declared: declared.clone(),
                computed: outcome.checksum,
            });
        }

        let (completion_event, event_kind) = if provider.scans_content() {
            (
                TransferEvent::UploadQueuedForProcessing,
                EventKind::UploadProcessing,
            )
        } else {
            (TransferEvent::Published, EventKind::Published)
        };

        // Re-read for the version the UploadStarted transition produced, and
        // validate the completion transition against it
        let current = self
            .db
            .get_transfer(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("file transfer {id}")))?;
        let current_status = TransferStatus::from_i32(current.status);
        let next_status =
            current_status
                .transition(completion_event)
                .ok_or_else(|| Error::Conflict {
                    operation: "complete upload".to_string(),
                    current_status: format!("{current_status:?}"),
                })?;

        let db = self.db.clone();
        let checksum = outcome.checksum.clone();
        let version = current.version;
        let size_bytes = outcome.size_bytes;
        execute_with_retry(&self.config.retry, || {
            let db = db.clone();
            let checksum = checksum.clone();
            async move {
                db.set_transfer_content(
                    id,
                    version,
                    &checksum,
                    size_bytes,
                    next_status,
                    next_status.describe(),
                )
                .await
            }
        })
        .await?;

        tracing::info!(
            file_transfer_id = %id,
            size_bytes = outcome.size_bytes,
            status = ?next_status,
            provider = provider.name(),
            "upload completed"
        );

        self.publisher.publish(LifecycleEvent {
            kind: event_kind,
            shipment_id: ShipmentId::new(row.shipment_id),
            file_transfer_id: Some(id),
            subject: None,
        });

        self.assemble_transfer_overview(id).await
    }
}
