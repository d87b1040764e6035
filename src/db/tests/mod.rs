mod migrations;
mod transfers;

use super::*;
use crate::types::ShipmentId;
use tempfile::NamedTempFile;

/// Open a fresh database on a temp file
pub(super) async fn test_db() -> (Database, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    (db, temp_file)
}

/// A one-file shipment to two recipients, ready to insert
pub(super) fn sample_shipment() -> NewShipment {
    NewShipment {
        sender: "910568183".to_string(),
        sender_reference: "order-42".to_string(),
        service_code: "invoice".to_string(),
        service_edition_code: "1".to_string(),
        recipients: vec!["911911911".to_string(), "922922922".to_string()],
        properties: std::collections::HashMap::new(),
        files: vec![NewFileTransfer {
            file_name: "invoice.pdf".to_string(),
            sender_reference: "order-42-file-1".to_string(),
            declared_checksum: None,
        }],
    }
}

/// Insert the sample shipment and return its ids
pub(super) async fn insert_sample(
    db: &Database,
) -> (ShipmentId, Vec<crate::types::FileTransferId>) {
    db.insert_shipment(&sample_shipment()).await.unwrap()
}
