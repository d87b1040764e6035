//! File transfer CRUD and versioned status updates.
//!
//! Status updates are conditional on the `version` the writer last read.
//! A lost check surfaces as `VersionConflict`; callers re-read the row,
//! re-validate the transition, and reapply. The owning shipment's aggregate
//! status is recomputed inside the same transaction as every transfer
//! change so it can never drift from its constituents.

use crate::error::DatabaseError;
use crate::status::{TransferStatus, aggregate_shipment_status};
use crate::types::FileTransferId;
use crate::{Error, Result};
use sqlx::SqliteConnection;

use super::{Database, FileTransferRow};

impl Database {
    /// Get a file transfer by ID
    pub async fn get_transfer(&self, id: FileTransferId) -> Result<Option<FileTransferRow>> {
        let row = sqlx::query_as::<_, FileTransferRow>(
            r#"
            SELECT
                id, shipment_id, sender, sender_reference, file_name,
                declared_checksum, checksum, size_bytes, status, status_text,
                status_changed_at, version, never_confirmed_flagged_at, created_at
            FROM file_transfers
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get file transfer: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List a shipment's file transfers in creation order
    pub async fn get_transfers_for_shipment(
        &self,
        shipment_id: i64,
    ) -> Result<Vec<FileTransferRow>> {
        let rows = sqlx::query_as::<_, FileTransferRow>(
            r#"
            SELECT
                id, shipment_id, sender, sender_reference, file_name,
                declared_checksum, checksum, size_bytes, status, status_text,
                status_changed_at, version, never_confirmed_flagged_at, created_at
            FROM file_transfers
            WHERE shipment_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(shipment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list file transfers: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Update a transfer's status, conditional on the version the caller read
    ///
    /// Bumps `version`, stamps `status_changed_at`, and recomputes the owning
    /// shipment's aggregate status in the same transaction.
    ///
    /// # Errors
    ///
    /// [`DatabaseError::VersionConflict`] when a concurrent writer got there
    /// first; [`DatabaseError::NotFound`] when the transfer does not exist.
    pub async fn update_transfer_status(
        &self,
        id: FileTransferId,
        expected_version: i64,
        status: TransferStatus,
        status_text: &str,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin status transaction: {}",
                e
            )))
        })?;

        let result = sqlx::query(
            r#"
            UPDATE file_transfers
            SET status = ?, status_text = ?, status_changed_at = ?, version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(status.to_i32())
        .bind(status_text)
        .bind(now)
        .bind(id)
        .bind(expected_version)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update transfer status: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Err(self.classify_missed_update(&mut tx, id).await);
        }

        let shipment_id: i64 =
            sqlx::query_scalar("SELECT shipment_id FROM file_transfers WHERE id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to resolve shipment for transfer: {}",
                        e
                    )))
                })?;

        recompute_shipment_status(&mut *tx, shipment_id).await?;

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit status transaction: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Record a completed upload: verified checksum, size, and new status
    ///
    /// The checksum column is set-once; attempting to overwrite an existing
    /// checksum fails with a constraint violation regardless of version.
    pub async fn set_transfer_content(
        &self,
        id: FileTransferId,
        expected_version: i64,
        checksum: &str,
        size_bytes: u64,
        status: TransferStatus,
        status_text: &str,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin content transaction: {}",
                e
            )))
        })?;

        let result = sqlx::query(
            r#"
            UPDATE file_transfers
            SET checksum = ?, size_bytes = ?, status = ?, status_text = ?,
                status_changed_at = ?, version = version + 1
            WHERE id = ? AND version = ? AND checksum IS NULL
            "#,
        )
        .bind(checksum)
        .bind(size_bytes as i64)
        .bind(status.to_i32())
        .bind(status_text)
        .bind(now)
        .bind(id)
        .bind(expected_version)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to set transfer content: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            let existing: Option<(Option<String>,)> =
                sqlx::query_as("SELECT checksum FROM file_transfers WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| {
                        Error::Database(DatabaseError::QueryFailed(format!(
                            "Failed to inspect transfer: {}",
                            e
                        )))
                    })?;

            return Err(match existing {
                None => Error::Database(DatabaseError::NotFound(format!("file transfer {id}"))),
                Some((Some(_),)) => Error::Database(DatabaseError::ConstraintViolation(format!(
                    "checksum already set for file transfer {id}"
                ))),
                Some((None,)) => Error::Database(DatabaseError::VersionConflict {
                    record: format!("file transfer {id}"),
                }),
            });
        }

        let shipment_id: i64 =
            sqlx::query_scalar("SELECT shipment_id FROM file_transfers WHERE id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to resolve shipment for transfer: {}",
                        e
                    )))
                })?;

        recompute_shipment_status(&mut *tx, shipment_id).await?;

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit content transaction: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Published-or-confirmed transfers whose last status change is older
    /// than `cutoff`, candidates for a purge run
    pub async fn transfers_eligible_for_purge(&self, cutoff: i64) -> Result<Vec<FileTransferRow>> {
        let rows = sqlx::query_as::<_, FileTransferRow>(
            r#"
            SELECT
                id, shipment_id, sender, sender_reference, file_name,
                declared_checksum, checksum, size_bytes, status, status_text,
                status_changed_at, version, never_confirmed_flagged_at, created_at
            FROM file_transfers
            WHERE status IN (?, ?) AND status_changed_at < ?
            ORDER BY id ASC
            "#,
        )
        .bind(TransferStatus::Published.to_i32())
        .bind(TransferStatus::AllConfirmedDownloaded.to_i32())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list purge candidates: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Published transfers past `cutoff` that still have unconfirmed
    /// recipients and have not been flagged before
    pub async fn transfers_unconfirmed_past(&self, cutoff: i64) -> Result<Vec<FileTransferRow>> {
        let rows = sqlx::query_as::<_, FileTransferRow>(
            r#"
            SELECT
                id, shipment_id, sender, sender_reference, file_name,
                declared_checksum, checksum, size_bytes, status, status_text,
                status_changed_at, version, never_confirmed_flagged_at, created_at
            FROM file_transfers
            WHERE status = ?
              AND status_changed_at < ?
              AND never_confirmed_flagged_at IS NULL
            ORDER BY id ASC
            "#,
        )
        .bind(TransferStatus::Published.to_i32())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list unconfirmed transfers: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Mark a transfer as flagged never-confirmed so repeat maintenance runs
    /// skip it
    pub async fn set_never_confirmed_flagged(&self, id: FileTransferId) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            "UPDATE file_transfers SET never_confirmed_flagged_at = ? WHERE id = ? AND never_confirmed_flagged_at IS NULL",
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to flag transfer: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Work out why a conditional update touched no rows
    async fn classify_missed_update(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        id: FileTransferId,
    ) -> Error {
        let exists: Result<Option<i64>> =
            sqlx::query_scalar("SELECT id FROM file_transfers WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to inspect transfer: {}",
                        e
                    )))
                });

        match exists {
            Ok(Some(_)) => Error::Database(DatabaseError::VersionConflict {
                record: format!("file transfer {id}"),
            }),
            Ok(None) => Error::Database(DatabaseError::NotFound(format!("file transfer {id}"))),
            Err(e) => e,
        }
    }
}

/// Recompute and cache a shipment's aggregate status inside a transaction
///
/// The authoritative inputs are read here, not passed in: constituent
/// transfer statuses plus whether every (live transfer, recipient) pair has
/// confirmed.
pub(crate) async fn recompute_shipment_status(
    conn: &mut SqliteConnection,
    shipment_id: i64,
) -> Result<crate::status::ShipmentStatus> {
    let status_codes: Vec<(i32,)> =
        sqlx::query_as("SELECT status FROM file_transfers WHERE shipment_id = ?")
            .bind(shipment_id)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to read transfer statuses: {}",
                    e
                )))
            })?;

    let statuses: Vec<TransferStatus> = status_codes
        .iter()
        .map(|(code,)| TransferStatus::from_i32(*code))
        .collect();

    // Confirmation is judged against the authoritative recipient rows of
    // transfers that are still live (cancelled ones no longer count)
    let (actor_total, unconfirmed): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*), COALESCE(SUM(CASE WHEN a.status != ? THEN 1 ELSE 0 END), 0)
        FROM actor_file_status a
        JOIN file_transfers t ON t.id = a.file_transfer_id
        WHERE t.shipment_id = ? AND t.status != ?
        "#,
    )
    .bind(crate::status::ActorFileStatus::DownloadConfirmed.to_i32())
    .bind(shipment_id)
    .bind(TransferStatus::Cancelled.to_i32())
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| {
        Error::Database(DatabaseError::QueryFailed(format!(
            "Failed to count confirmations: {}",
            e
        )))
    })?;

    let all_confirmed = actor_total > 0 && unconfirmed == 0;
    let aggregate = aggregate_shipment_status(&statuses, all_confirmed);
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        r#"
        UPDATE shipments
        SET status = ?, status_changed_at = ?
        WHERE id = ? AND status != ?
        "#,
    )
    .bind(aggregate.to_i32())
    .bind(now)
    .bind(shipment_id)
    .bind(aggregate.to_i32())
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        Error::Database(DatabaseError::QueryFailed(format!(
            "Failed to update shipment status: {}",
            e
        )))
    })?;

    Ok(aggregate)
}
