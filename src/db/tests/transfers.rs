use super::*;
use crate::error::DatabaseError;
use crate::status::{ShipmentStatus, TransferStatus};
use crate::Error;

#[tokio::test]
async fn versioned_update_succeeds_with_current_version() {
    let (db, _file) = test_db().await;
    let (_, transfer_ids) = insert_sample(&db).await;
    let id = transfer_ids[0];

    db.update_transfer_status(id, 0, TransferStatus::UploadStarted, "Upload in progress")
        .await
        .unwrap();

    let row = db.get_transfer(id).await.unwrap().unwrap();
    assert_eq!(
        TransferStatus::from_i32(row.status),
        TransferStatus::UploadStarted
    );
    assert_eq!(row.version, 1, "version must bump on every status update");
    assert_eq!(row.status_text, "Upload in progress");

    db.close().await;
}

#[tokio::test]
async fn stale_version_surfaces_as_version_conflict() {
    let (db, _file) = test_db().await;
    let (_, transfer_ids) = insert_sample(&db).await;
    let id = transfer_ids[0];

    db.update_transfer_status(id, 0, TransferStatus::UploadStarted, "Upload in progress")
        .await
        .unwrap();

    // Second writer still holds version 0
    let err = db
        .update_transfer_status(id, 0, TransferStatus::Cancelled, "Cancelled by sender")
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            Error::Database(DatabaseError::VersionConflict { .. })
        ),
        "a lost optimistic update must surface as VersionConflict, got {err:?}"
    );

    // The first writer's status survives untouched
    let row = db.get_transfer(id).await.unwrap().unwrap();
    assert_eq!(
        TransferStatus::from_i32(row.status),
        TransferStatus::UploadStarted
    );

    db.close().await;
}

#[tokio::test]
async fn update_of_missing_transfer_is_not_found() {
    let (db, _file) = test_db().await;

    let err = db
        .update_transfer_status(
            crate::types::FileTransferId::new(404),
            0,
            TransferStatus::Failed,
            "Failed",
        )
        .await
        .unwrap_err();

    assert!(
        matches!(err, Error::Database(DatabaseError::NotFound(_))),
        "missing record must be distinguishable from a version conflict, got {err:?}"
    );

    db.close().await;
}

#[tokio::test]
async fn set_transfer_content_records_checksum_and_size() {
    let (db, _file) = test_db().await;
    let (_, transfer_ids) = insert_sample(&db).await;
    let id = transfer_ids[0];

    db.update_transfer_status(id, 0, TransferStatus::UploadStarted, "Upload in progress")
        .await
        .unwrap();
    db.set_transfer_content(
        id,
        1,
        "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9",
        11,
        TransferStatus::Published,
        "Available for download",
    )
    .await
    .unwrap();

    let row = db.get_transfer(id).await.unwrap().unwrap();
    assert_eq!(
        row.checksum.as_deref(),
        Some("b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9")
    );
    assert_eq!(row.size_bytes, Some(11));
    assert_eq!(
        TransferStatus::from_i32(row.status),
        TransferStatus::Published
    );

    db.close().await;
}

#[tokio::test]
async fn checksum_is_immutable_once_set() {
    let (db, _file) = test_db().await;
    let (_, transfer_ids) = insert_sample(&db).await;
    let id = transfer_ids[0];

    db.update_transfer_status(id, 0, TransferStatus::UploadStarted, "Upload in progress")
        .await
        .unwrap();
    db.set_transfer_content(
        id,
        1,
        "aaaa",
        5,
        TransferStatus::Published,
        "Available for download",
    )
    .await
    .unwrap();

    // Even with the correct current version, a second write must fail
    let row = db.get_transfer(id).await.unwrap().unwrap();
    let err = db
        .set_transfer_content(
            id,
            row.version,
            "bbbb",
            6,
            TransferStatus::Published,
            "Available for download",
        )
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            Error::Database(DatabaseError::ConstraintViolation(_))
        ),
        "re-writing a verified checksum must be rejected, got {err:?}"
    );

    let row = db.get_transfer(id).await.unwrap().unwrap();
    assert_eq!(row.checksum.as_deref(), Some("aaaa"), "original survives");

    db.close().await;
}

#[tokio::test]
async fn shipment_aggregate_follows_transfer_status() {
    let (db, _file) = test_db().await;
    let (shipment_id, transfer_ids) = insert_sample(&db).await;
    let id = transfer_ids[0];

    db.update_transfer_status(id, 0, TransferStatus::UploadStarted, "Upload in progress")
        .await
        .unwrap();
    let shipment = db.get_shipment(shipment_id).await.unwrap().unwrap();
    assert_eq!(
        ShipmentStatus::from_i32(shipment.status),
        ShipmentStatus::UploadInProgress
    );

    db.set_transfer_content(
        id,
        1,
        "aaaa",
        5,
        TransferStatus::Published,
        "Available for download",
    )
    .await
    .unwrap();
    let shipment = db.get_shipment(shipment_id).await.unwrap().unwrap();
    assert_eq!(
        ShipmentStatus::from_i32(shipment.status),
        ShipmentStatus::AllFilesUploadedAndProcessed,
        "aggregate must be recomputed in the same transaction as the transfer change"
    );

    db.close().await;
}

#[tokio::test]
async fn purge_and_unconfirmed_queries_filter_by_status_and_age() {
    let (db, _file) = test_db().await;
    let (_, transfer_ids) = insert_sample(&db).await;
    let id = transfer_ids[0];

    // Not published: never a candidate
    let future = chrono::Utc::now().timestamp() + 3600;
    assert!(db.transfers_eligible_for_purge(future).await.unwrap().is_empty());
    assert!(db.transfers_unconfirmed_past(future).await.unwrap().is_empty());

    db.update_transfer_status(id, 0, TransferStatus::UploadStarted, "Upload in progress")
        .await
        .unwrap();
    db.set_transfer_content(
        id,
        1,
        "aaaa",
        5,
        TransferStatus::Published,
        "Available for download",
    )
    .await
    .unwrap();

    // Published just now: eligible only against a future cutoff
    let past = chrono::Utc::now().timestamp() - 3600;
    assert!(db.transfers_eligible_for_purge(past).await.unwrap().is_empty());
    let eligible = db.transfers_eligible_for_purge(future).await.unwrap();
    assert_eq!(eligible.len(), 1);
    assert_eq!(eligible[0].id, id.get());

    let unconfirmed = db.transfers_unconfirmed_past(future).await.unwrap();
    assert_eq!(unconfirmed.len(), 1);

    db.close().await;
}

#[tokio::test]
async fn never_confirmed_flag_makes_repeat_runs_skip_the_transfer() {
    let (db, _file) = test_db().await;
    let (_, transfer_ids) = insert_sample(&db).await;
    let id = transfer_ids[0];

    db.update_transfer_status(id, 0, TransferStatus::UploadStarted, "Upload in progress")
        .await
        .unwrap();
    db.set_transfer_content(
        id,
        1,
        "aaaa",
        5,
        TransferStatus::Published,
        "Available for download",
    )
    .await
    .unwrap();

    let future = chrono::Utc::now().timestamp() + 3600;
    assert_eq!(db.transfers_unconfirmed_past(future).await.unwrap().len(), 1);

    db.set_never_confirmed_flagged(id).await.unwrap();
    assert!(
        db.transfers_unconfirmed_past(future).await.unwrap().is_empty(),
        "a flagged transfer must not be reported twice"
    );

    db.close().await;
}
