//! Per-recipient status operations, including the atomic confirm.
//!
//! Confirm-download is the correctness crux: two recipients confirming
//! concurrently, or a confirmation racing a cancel, must converge on the
//! right aggregate. The whole read-validate-write sequence runs inside one
//! immediate transaction so SQLite serializes it against every other writer.

use crate::error::DatabaseError;
use crate::status::{ActorEvent, ActorFileStatus, ShipmentStatus, TransferStatus};
use crate::types::FileTransferId;
use crate::{Error, Result};

use super::{ActorStatusRow, ConfirmOutcome, Database, transfers::recompute_shipment_status};

impl Database {
    /// Get all recipient statuses for a file transfer
    pub async fn get_actor_statuses(&self, id: FileTransferId) -> Result<Vec<ActorStatusRow>> {
        let rows = sqlx::query_as::<_, ActorStatusRow>(
            r#"
            SELECT a.file_transfer_id, a.recipient, a.status, a.status_changed_at
            FROM actor_file_status a
            JOIN shipment_recipients r
              ON r.recipient = a.recipient
             AND r.shipment_id = (SELECT shipment_id FROM file_transfers WHERE id = a.file_transfer_id)
            WHERE a.file_transfer_id = ?
            ORDER BY r.position ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get actor statuses: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Get one recipient's status on a file transfer
    pub async fn get_actor_status(
        &self,
        id: FileTransferId,
        recipient: &str,
    ) -> Result<Option<ActorStatusRow>> {
        let row = sqlx::query_as::<_, ActorStatusRow>(
            r#"
            SELECT file_transfer_id, recipient, status, status_changed_at
            FROM actor_file_status
            WHERE file_transfer_id = ? AND recipient = ?
            "#,
        )
        .bind(id)
        .bind(recipient)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get actor status: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Record that a recipient began downloading
    ///
    /// Validates the actor transition and writes the new status in one
    /// immediate transaction. Re-downloads are a quiet self-transition.
    pub async fn set_actor_download_started(
        &self,
        id: FileTransferId,
        recipient: &str,
    ) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;

        begin_immediate(&mut conn).await?;

        let result = async {
            let current = read_actor_status(&mut conn, id, recipient).await?;
            let next = current
                .transition(ActorEvent::DownloadStarted)
                .ok_or_else(|| Error::Conflict {
                    operation: "start download".into(),
                    current_status: format!("{current:?}"),
                })?;

            write_actor_status(&mut conn, id, recipient, next).await?;
            Ok::<(), Error>(())
        }
        .await;

        finish(&mut conn, result).await
    }

    /// Atomically confirm a recipient's download
    ///
    /// Inside one immediate transaction: validates the actor transition,
    /// writes it, recounts outstanding confirmations against the
    /// authoritative recipient list, moves the transfer to
    /// AllConfirmedDownloaded when this was the last one, and recomputes the
    /// shipment aggregate. Confirming twice is an idempotent no-op reported
    /// through [`ConfirmOutcome::newly_confirmed`].
    pub async fn confirm_download(
        &self,
        id: FileTransferId,
        recipient: &str,
    ) -> Result<ConfirmOutcome> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;

        begin_immediate(&mut conn).await?;

        let result = async {
            let transfer: (i64, i32, i64) = sqlx::query_as(
                "SELECT shipment_id, status, version FROM file_transfers WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to load transfer: {}",
                    e
                )))
            })?
            .ok_or_else(|| {
                Error::Database(DatabaseError::NotFound(format!("file transfer {id}")))
            })?;
            let (shipment_id, status_code, version) = transfer;
            let transfer_status = TransferStatus::from_i32(status_code);

            let current = read_actor_status(&mut conn, id, recipient).await?;

            if current == ActorFileStatus::DownloadConfirmed {
                return Ok(ConfirmOutcome {
                    shipment_id,
                    newly_confirmed: false,
                    transfer_all_confirmed: false,
                    shipment_completed: false,
                });
            }

            // A confirmation arriving after a cancel or purge must not win
            if transfer_status.is_terminal() {
                return Err(Error::Conflict {
                    operation: "confirm download".into(),
                    current_status: format!("{transfer_status:?}"),
                });
            }

            let next = current
                .transition(ActorEvent::DownloadConfirmed)
                .ok_or_else(|| Error::Conflict {
                    operation: "confirm download".into(),
                    current_status: format!("{current:?}"),
                })?;

            write_actor_status(&mut conn, id, recipient, next).await?;

            // Recount against the authoritative recipient list, inside the
            // same transaction as the write we just made
            let unconfirmed: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM actor_file_status WHERE file_transfer_id = ? AND status != ?",
            )
            .bind(id)
            .bind(ActorFileStatus::DownloadConfirmed.to_i32())
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count confirmations: {}",
                    e
                )))
            })?;

            let mut transfer_all_confirmed = false;
            if unconfirmed == 0 {
                let next_status = transfer_status
                    .transition(crate::status::TransferEvent::AllConfirmed)
                    .ok_or_else(|| Error::Conflict {
                        operation: "confirm download".into(),
                        current_status: format!("{transfer_status:?}"),
                    })?;

                let now = chrono::Utc::now().timestamp();
                let updated = sqlx::query(
                    r#"
                    UPDATE file_transfers
                    SET status = ?, status_text = ?, status_changed_at = ?, version = version + 1
                    WHERE id = ? AND version = ?
                    "#,
                )
                .bind(next_status.to_i32())
                .bind(next_status.describe())
                .bind(now)
                .bind(id)
                .bind(version)
                .execute(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to update transfer status: {}",
                        e
                    )))
                })?;

                // The immediate transaction holds the write lock, so the
                // version we read cannot have moved underneath us
                if updated.rows_affected() == 0 {
                    return Err(Error::Database(DatabaseError::VersionConflict {
                        record: format!("file transfer {id}"),
                    }));
                }
                transfer_all_confirmed = true;
            }

            let aggregate = recompute_shipment_status(&mut conn, shipment_id).await?;

            Ok(ConfirmOutcome {
                shipment_id,
                newly_confirmed: true,
                transfer_all_confirmed,
                shipment_completed: aggregate == ShipmentStatus::Completed,
            })
        }
        .await;

        finish(&mut conn, result).await
    }
}

async fn begin_immediate(conn: &mut sqlx::SqliteConnection) -> Result<()> {
    // IMMEDIATE takes the write lock up front; every other writer queues
    // behind this transaction rather than failing at commit
    sqlx::query("BEGIN IMMEDIATE")
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin immediate transaction: {}",
                e
            )))
        })?;
    Ok(())
}

async fn finish<T>(conn: &mut sqlx::SqliteConnection, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            sqlx::query("COMMIT").execute(&mut *conn).await.map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to commit: {}",
                    e
                )))
            })?;
            Ok(value)
        }
        Err(e) => {
            let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            Err(e)
        }
    }
}

async fn read_actor_status(
    conn: &mut sqlx::SqliteConnection,
    id: FileTransferId,
    recipient: &str,
) -> Result<ActorFileStatus> {
    let row: Option<(i32,)> = sqlx::query_as(
        "SELECT status FROM actor_file_status WHERE file_transfer_id = ? AND recipient = ?",
    )
    .bind(id)
    .bind(recipient)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| {
        Error::Database(DatabaseError::QueryFailed(format!(
            "Failed to read actor status: {}",
            e
        )))
    })?;

    let status = match row {
        Some((code,)) => ActorFileStatus::from_i32(code),
        None => {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "recipient {recipient} on file transfer {id}"
            ))));
        }
    };
    Ok(status)
}

async fn write_actor_status(
    conn: &mut sqlx::SqliteConnection,
    id: FileTransferId,
    recipient: &str,
    status: ActorFileStatus,
) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        r#"
        UPDATE actor_file_status
        SET status = ?, status_changed_at = ?
        WHERE file_transfer_id = ? AND recipient = ?
        "#,
    )
    .bind(status.to_i32())
    .bind(now)
    .bind(id)
    .bind(recipient)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        Error::Database(DatabaseError::QueryFailed(format!(
            "Failed to write actor status: {}",
            e
        )))
    })?;

    Ok(())
}
