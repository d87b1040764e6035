//! Download streaming and per-recipient tracking.

use crate::error::{Error, Result};
use crate::retry::execute_with_retry;
use crate::status::TransferStatus;
use crate::storage::ContentStream;
use crate::types::{CallerIdentity, FileTransferId, ShipmentId};

use super::FileBroker;

impl FileBroker {
    /// Stream a file's content to a recipient
    ///
    /// Requires the transfer to be `Published` or later — downloading an
    /// unpublished transfer is a conflict, not absence. The recipient's
    /// status moves to `DownloadStarted` once the content stream is open;
    /// completing the download is acknowledged separately through
    /// [`confirm_download`](Self::confirm_download).
    pub async fn download_file(
        &self,
        identity: &CallerIdentity,
        id: FileTransferId,
    ) -> Result<ContentStream> {
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

        let status = TransferStatus::from_i32(row.status);
        if !status.is_published_or_later() {
            return Err(Error::Conflict {
                operation: "download".to_string(),
                current_status: format!("{status:?}"),
            });
        }

        let shipment = self
            .db
            .get_shipment(ShipmentId::new(row.shipment_id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("file transfer {id}")))?;
        let (service, _owner) =
            self.resolve_tenant(&shipment.service_code, &shipment.service_edition_code)?;
        let provider = self.provider_for(&service.owner_id)?;

        // Purged or never-completed content reads as absent
        let stream = provider.get(id).await?;

        let db = self.db.clone();
        let recipient = identity.consumer_id.clone();
        execute_with_retry(&self.config.retry, || {
            let db = db.clone();
            let recipient = recipient.clone();
            async move { db.set_actor_download_started(id, &recipient).await }
        })
        .await?;

        tracing::info!(
            file_transfer_id = %id,
            recipient = %identity.consumer_id,
            "download started"
        );

        Ok(stream)
    }
}
