//! Status overview read models.

use crate::db::FileTransferRow;
use crate::error::{Error, Result};
use crate::status::{ActorFileStatus, ShipmentStatus, TransferStatus};
use crate::types::{
    ActorOverview, CallerIdentity, FileTransferId, FileTransferOverview, ShipmentId,
    ShipmentOverview,
};
use chrono::{DateTime, TimeZone, Utc};

use super::FileBroker;

impl FileBroker {
    /// Read one file transfer's overview
    ///
    /// Available to the sender and listed recipients; anyone else learns
    /// nothing beyond "not found".
    pub async fn get_file_transfer_overview(
        &self,
        identity: &CallerIdentity,
        id: FileTransferId,
    ) -> Result<FileTransferOverview> {
        let row = self
            .db
            .get_transfer(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("file transfer {id}")))?;

        let recipients = self
            .db
            .get_shipment_recipients(ShipmentId::new(row.shipment_id))
            .await?;
        self.authorize_participant(identity, id, &row.sender, &recipients)?;

        self.assemble_transfer_overview(id).await
    }

    /// Read a shipment's overview, including all its file transfers
    pub async fn get_shipment_overview(
        &self,
        identity: &CallerIdentity,
        id: ShipmentId,
    ) -> Result<ShipmentOverview> {
        let shipment = self
            .db
            .get_shipment(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("shipment {id}")))?;

        let recipients = self.db.get_shipment_recipients(id).await?;

        // Same opacity rule as transfers, keyed on the shipment
        let is_participant = identity.consumer_id == shipment.sender
            || recipients.iter().any(|r| *r == identity.consumer_id);
        if !identity.has_scope(crate::types::SCOPE_READ) || !is_participant {
            return Err(Error::NotFound(format!("shipment {id}")));
        }

        self.assemble_shipment_overview(id).await
    }

    /// Build a shipment overview from current rows
    pub(crate) async fn assemble_shipment_overview(
        &self,
        id: ShipmentId,
    ) -> Result<ShipmentOverview> {
        let shipment = self
            .db
            .get_shipment(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("shipment {id}")))?;
        let recipients = self.db.get_shipment_recipients(id).await?;
        let transfer_rows = self.db.get_transfers_for_shipment(id.get()).await?;

        let mut file_transfers = Vec::with_capacity(transfer_rows.len());
        for row in transfer_rows {
            let overview = self.transfer_overview_from_row(row).await?;
            file_transfers.push(overview);
        }

        Ok(ShipmentOverview {
            id,
            sender: shipment.sender,
            sender_reference: shipment.sender_reference,
            service_code: shipment.service_code,
            service_edition_code: shipment.service_edition_code,
            recipients,
            properties: serde_json::from_str(&shipment.properties)?,
            status: ShipmentStatus::from_i32(shipment.status),
            file_transfers,
        })
    }

    /// Build a file transfer overview from current rows
    pub(crate) async fn assemble_transfer_overview(
        &self,
        id: FileTransferId,
    ) -> Result<FileTransferOverview> {
        let row = self
            .db
            .get_transfer(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("file transfer {id}")))?;
        self.transfer_overview_from_row(row).await
    }

    async fn transfer_overview_from_row(
        &self,
        row: FileTransferRow,
    ) -> Result<FileTransferOverview> {
        let actors = self
            .db
            .get_actor_statuses(FileTransferId::new(row.id))
            .await?;

        Ok(FileTransferOverview {
            id: FileTransferId::new(row.id),
            shipment_id: ShipmentId::new(row.shipment_id),
            sender: row.sender,
            sender_reference: row.sender_reference,
            file_name: row.file_name,
            checksum: row.checksum,
            size_bytes: row.size_bytes.map(|s| s as u64),
            status: TransferStatus::from_i32(row.status),
            status_text: row.status_text,
            status_changed_at: timestamp_to_datetime(row.status_changed_at),
            recipients: actors
                .into_iter()
                .map(|a| ActorOverview {
                    recipient: a.recipient,
                    status: ActorFileStatus::from_i32(a.status),
                    status_changed_at: timestamp_to_datetime(a.status_changed_at),
                })
                .collect(),
        })
    }
}

fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now)
}
