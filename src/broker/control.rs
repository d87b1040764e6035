//! Sender-driven cancellation.

use crate::error::{Error, Result};
use crate::status::{TransferEvent, TransferStatus};
use crate::types::{CallerIdentity, FileTransferId, FileTransferOverview, ShipmentId};

use super::FileBroker;

impl FileBroker {
    /// Cancel a file transfer before publication
    ///
    /// Once content is published, recipients may already be downloading;
    /// from there retention and purging govern teardown, so cancellation is
    /// a conflict. `Cancelled` is absorbing.
    pub async fn cancel_file_transfer(
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
        self.authorize_sender(identity, id, &row.sender)?;

        let status = TransferStatus::from_i32(row.status);
        if status.is_published_or_later() {
            return Err(Error::Conflict {
                operation: "cancel".to_string(),
                current_status: format!("{status:?}"),
            });
        }

        self.apply_transfer_event(id, TransferEvent::Cancelled, None)
            .await?;

        tracing::info!(
            file_transfer_id = %id,
            sender = %identity.consumer_id,
            "file transfer cancelled"
        );

        // Cancelled bytes have no further use
        self.delete_content(id, ShipmentId::new(row.shipment_id))
            .await;

        self.assemble_transfer_overview(id).await
    }
}
