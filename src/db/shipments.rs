//! Shipment and recipient CRUD operations.

use crate::error::DatabaseError;
use crate::status::{ActorFileStatus, ShipmentStatus, TransferStatus};
use crate::types::{FileTransferId, ShipmentId};
use crate::{Error, Result};

use super::{Database, NewShipment, ShipmentRow};

impl Database {
    /// Insert a shipment together with its recipients and file transfers
    ///
    /// Everything is created in one transaction: the shipment row, the
    /// ordered recipient list, one Initialized file transfer per registered
    /// file, and one Initialized actor-status row per (transfer, recipient)
    /// pair.
    pub async fn insert_shipment(
        &self,
        shipment: &NewShipment,
    ) -> Result<(ShipmentId, Vec<FileTransferId>)> {
        let now = chrono::Utc::now().timestamp();
        let properties = serde_json::to_string(&shipment.properties)?;

        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin shipment transaction: {}",
                e
            )))
        })?;

        let result = sqlx::query(
            r#"
            INSERT INTO shipments (
                sender, sender_reference, service_code, service_edition_code,
                properties, status, created_at, status_changed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&shipment.sender)
        .bind(&shipment.sender_reference)
        .bind(&shipment.service_code)
        .bind(&shipment.service_edition_code)
        .bind(&properties)
        .bind(ShipmentStatus::Initialized.to_i32())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert shipment: {}",
                e
            )))
        })?;

        let shipment_id = result.last_insert_rowid();

        for (position, recipient) in shipment.recipients.iter().enumerate() {
            sqlx::query(
                "INSERT INTO shipment_recipients (shipment_id, position, recipient) VALUES (?, ?, ?)",
            )
            .bind(shipment_id)
            .bind(position as i64)
            .bind(recipient)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert recipient: {}",
                    e
                )))
            })?;
        }

        let mut transfer_ids = Vec::with_capacity(shipment.files.len());
        for file in &shipment.files {
            let result = sqlx::query(
                r#"
                INSERT INTO file_transfers (
                    shipment_id, sender, sender_reference, file_name,
                    declared_checksum, status, status_text, status_changed_at,
                    version, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(shipment_id)
            .bind(&shipment.sender)
            .bind(&file.sender_reference)
            .bind(&file.file_name)
            .bind(&file.declared_checksum)
            .bind(TransferStatus::Initialized.to_i32())
            .bind(TransferStatus::Initialized.describe())
            .bind(now)
            .bind(0i64)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert file transfer: {}",
                    e
                )))
            })?;

            let transfer_id = result.last_insert_rowid();
            transfer_ids.push(FileTransferId(transfer_id));

            for recipient in &shipment.recipients {
                sqlx::query(
                    r#"
                    INSERT INTO actor_file_status (file_transfer_id, recipient, status, status_changed_at)
                    VALUES (?, ?, ?, ?)
                    "#,
                )
                .bind(transfer_id)
                .bind(recipient)
                .bind(ActorFileStatus::Initialized.to_i32())
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to insert actor status: {}",
                        e
                    )))
                })?;
            }
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit shipment transaction: {}",
                e
            )))
        })?;

        Ok((ShipmentId(shipment_id), transfer_ids))
    }

    /// Get a shipment by ID
    pub async fn get_shipment(&self, id: ShipmentId) -> Result<Option<ShipmentRow>> {
        let row = sqlx::query_as::<_, ShipmentRow>(
            r#"
            SELECT
                id, sender, sender_reference, service_code, service_edition_code,
                properties, status, created_at, status_changed_at
            FROM shipments
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get shipment: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Get a shipment's recipients in registration order
    pub async fn get_shipment_recipients(&self, id: ShipmentId) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT recipient FROM shipment_recipients WHERE shipment_id = ? ORDER BY position ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get recipients: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(|(r,)| r).collect())
    }
}
