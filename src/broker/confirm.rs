//! Download confirmation.

use crate::error::{Error, Result};
use crate::events::{EventKind, LifecycleEvent};
use crate::retry::execute_with_retry;
use crate::types::{CallerIdentity, FileTransferId, FileTransferOverview, ShipmentId};

use super::FileBroker;

impl FileBroker {
    /// Confirm a completed download
    ///
    /// Idempotent: confirming an already-confirmed transfer succeeds without
    /// changing state or publishing duplicate events. When the last
    /// outstanding recipient confirms, the transfer moves to
    /// `AllConfirmedDownloaded` — computed from the authoritative recipient
    /// list inside the same transaction as the confirmation itself — and
    /// the shipment aggregate follows.
    pub async fn confirm_download(
        &self,
        identity: &CallerIdentity,
        id: FileTransferId,
    ) -> Result<FileTransferOverview> {
        self.ensure_accepting()?;

        let row = self
            .db
            .get_transfer(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("file transfer {id}")))?;

        let recipients = self
            .db
            .get_shipment_recipients(ShipmentId::new(row.shipment_id))
            .await?;
        self.authorize_recipient(identity, id, &recipients)?;

        let db = self.db.clone();
        let recipient = identity.consumer_id.clone();
        let outcome = execute_with_retry(&self.config.retry, || {
            let db = db.clone();
            let recipient = recipient.clone();
            async move { db.confirm_download(id, &recipient).await }
        })
        .await?;

        if outcome.newly_confirmed {
            tracing::info!(
                file_transfer_id = %id,
                recipient = %identity.consumer_id,
                all_confirmed = outcome.transfer_all_confirmed,
                "download confirmed"
            );

            self.publisher.publish(LifecycleEvent {
                kind: EventKind::DownloadConfirmed,
                shipment_id: ShipmentId::new(outcome.shipment_id),
                file_transfer_id: Some(id),
                subject: Some(identity.consumer_id.clone()),
            });

            if outcome.transfer_all_confirmed {
                self.publisher.publish(LifecycleEvent {
                    kind: EventKind::AllConfirmedDownloaded,
                    shipment_id: ShipmentId::new(outcome.shipment_id),
                    file_transfer_id: Some(id),
                    subject: None,
                });
            }
        }

        self.assemble_transfer_overview(id).await
    }
}
