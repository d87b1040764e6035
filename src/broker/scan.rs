//! Scan verdict handling.
//!
//! Verdicts arrive out-of-band from the scanning storage provider, not as
//! handler requests. They still pass through [`FileBroker::apply_transfer_event`]
//! — the same transition authority handlers use — so an illegal transition
//! (say, a verdict racing a cancellation) is rejected, never clamped.

use crate::error::{Error, Result};
use crate::events::{EventKind, LifecycleEvent};
use crate::status::TransferEvent;
use crate::storage::{ScanOutcome, ScanVerdict};
use crate::types::{FileTransferId, ShipmentId};
use tokio::sync::mpsc;

use super::FileBroker;

impl FileBroker {
    /// Consume scan verdicts until shutdown
    pub(crate) fn spawn_scan_listener(
        &self,
        mut verdict_rx: mpsc::UnboundedReceiver<ScanVerdict>,
    ) -> tokio::task::JoinHandle<()> {
        let broker = self.clone();
        let token = self.shutdown_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    verdict = verdict_rx.recv() => {
                        match verdict {
                            Some(verdict) => {
                                let id = verdict.file_transfer_id;
                                if let Err(e) = broker.apply_scan_verdict(verdict).await {
                                    tracing::warn!(
                                        file_transfer_id = %id,
                                        error = %e,
                                        "failed to apply scan verdict"
                                    );
                                }
                            }
                            None => break,
                        }
                    }
                    _ = token.cancelled() => break,
                }
            }
            tracing::debug!("scan listener stopped");
        })
    }

    /// Apply a scan verdict to a file transfer
    ///
    /// `Clean` publishes the transfer; `Rejected` fails it, removes the
    /// stored bytes, and publishes an `UploadFailed` event. Exposed so an
    /// embedding service whose scanner reports through its own callback
    /// endpoint can feed verdicts in directly.
    pub async fn apply_scan_verdict(&self, verdict: ScanVerdict) -> Result<()> {
        let id = verdict.file_transfer_id;
        let row = self.wait_for_processing_row(id).await?;
        let shipment_id = ShipmentId::new(row.shipment_id);

        match verdict.outcome {
            ScanOutcome::Clean => {
                self.apply_transfer_event(id, TransferEvent::Published, None)
                    .await?;

                tracing::info!(file_transfer_id = %id, "scan clean, transfer published");
                self.publisher.publish(LifecycleEvent {
                    kind: EventKind::Published,
                    shipment_id,
                    file_transfer_id: Some(id),
                    subject: None,
                });
            }
            ScanOutcome::Rejected(reason) => {
                self.apply_transfer_event(
                    id,
                    TransferEvent::Failed,
                    Some(&format!("Upload failed: {reason}")),
                )
                .await?;

                self.delete_content(id, shipment_id).await;

                tracing::warn!(
                    file_transfer_id = %id,
                    reason = %reason,
                    "scan rejected content, transfer failed"
                );
                self.publisher.publish(LifecycleEvent {
                    kind: EventKind::UploadFailed,
                    shipment_id,
                    file_transfer_id: Some(id),
                    subject: None,
                });
            }
        }

        Ok(())
    }

    /// Load the transfer, waiting out the window where the durable write has
    /// been acknowledged but the upload handler's `UploadProcessing` write
    /// has not landed yet
    ///
    /// A fast scanner can deliver its verdict inside that window; applying
    /// it then would let the handler's pending metadata write regress the
    /// status afterwards. If the row never leaves `UploadStarted` the
    /// verdict is abandoned — the transfer stays retryable for the sender.
    async fn wait_for_processing_row(&self, id: FileTransferId) -> Result<crate::db::FileTransferRow> {
        const WAIT: std::time::Duration = std::time::Duration::from_millis(50);
        const MAX_ROUNDS: u32 = 40;

        for _ in 0..MAX_ROUNDS {
            let row = self
                .db
                .get_transfer(id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("file transfer {id}")))?;
            if crate::status::TransferStatus::from_i32(row.status)
                != crate::status::TransferStatus::UploadStarted
            {
                return Ok(row);
            }
            tokio::time::sleep(WAIT).await;
        }

        tracing::warn!(
            file_transfer_id = %id,
            "upload metadata never caught up with the stored content; dropping scan verdict"
        );
        Err(Error::Conflict {
            operation: "apply scan verdict".to_string(),
            current_status: "UploadStarted".to_string(),
        })
    }

    /// Best-effort removal of stored bytes for a transfer
    pub(crate) async fn delete_content(&self, id: FileTransferId, shipment_id: ShipmentId) {
        let shipment = match self.db.get_shipment(shipment_id).await {
            Ok(Some(shipment)) => shipment,
            _ => return,
        };
        if let Ok((service, _)) =
            self.resolve_tenant(&shipment.service_code, &shipment.service_edition_code)
            && let Ok(provider) = self.provider_for(&service.owner_id)
            && let Err(e) = provider.delete(id).await
        {
            tracing::warn!(file_transfer_id = %id, error = %e, "failed to delete content");
        }
    }
}
