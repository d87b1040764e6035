use super::*;

#[tokio::test]
async fn new_database_runs_migrations() {
    let (db, _file) = test_db().await;

    // Schema exists: an insert into every table succeeds
    insert_sample(&db).await;

    db.close().await;
}

#[tokio::test]
async fn reopening_a_database_is_idempotent() {
    let temp_file = NamedTempFile::new().unwrap();

    let db = Database::new(temp_file.path()).await.unwrap();
    let (shipment_id, _) = insert_sample(&db).await;
    db.close().await;

    // Re-opening must not re-run migrations or lose data
    let db = Database::new(temp_file.path()).await.unwrap();
    let shipment = db.get_shipment(shipment_id).await.unwrap();
    assert!(
        shipment.is_some(),
        "data must survive close and reopen with migrations already applied"
    );
    db.close().await;
}

#[tokio::test]
async fn creates_parent_directory_for_database_path() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("state").join("broker.db");

    let db = Database::new(&nested).await.unwrap();
    insert_sample(&db).await;
    db.close().await;

    assert!(nested.exists());
}
