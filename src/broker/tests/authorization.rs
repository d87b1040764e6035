use super::*;
use crate::Error;
use crate::types::FileTransferId;

async fn published_transfer(broker: &FileBroker) -> FileTransferId {
    let sender = sender_identity();
    let shipment = broker
        .initiate_shipment(&sender, shipment_request("invoice", &[RECIPIENT], None))
        .await
        .unwrap();
    let transfer_id = shipment.file_transfers[0].id;
    let mut content: &[u8] = b"hello world";
    broker
        .upload_file(&sender, transfer_id, &mut content)
        .await
        .unwrap();
    transfer_id
}

#[tokio::test]
async fn outsider_gets_not_found_indistinguishable_from_absent() {
    let (broker, _dir) = test_broker().await;
    let outsider = outsider_identity();
    let transfer_id = published_transfer(&broker).await;

    let real = broker
        .get_file_transfer_overview(&outsider, transfer_id)
        .await
        .unwrap_err();
    let absent = broker
        .get_file_transfer_overview(&outsider, FileTransferId::new(987_654))
        .await
        .unwrap_err();

    // Same variant, same error code: existence is not disclosed
    assert!(matches!(real, Error::NotFound(_)), "got {real:?}");
    assert!(matches!(absent, Error::NotFound(_)), "got {absent:?}");
    {
        use crate::error::ToHttpStatus;
        assert_eq!(real.status_code(), absent.status_code());
        assert_eq!(real.error_code(), absent.error_code());
    }
}

#[tokio::test]
async fn outsider_cannot_download() {
    let (broker, _dir) = test_broker().await;
    let outsider = outsider_identity();
    let transfer_id = published_transfer(&broker).await;

    let err = broker
        .download_file(&outsider, transfer_id)
        .await
        .err()
        .unwrap();
    assert!(
        matches!(err, Error::NotFound(_)),
        "unauthorized download must read as not found, not forbidden, got {err:?}"
    );
}

#[tokio::test]
async fn recipient_cannot_upload() {
    let (broker, _dir) = test_broker().await;
    let sender = sender_identity();
    let recipient = recipient_identity(RECIPIENT);

    let shipment = broker
        .initiate_shipment(&sender, shipment_request("invoice", &[RECIPIENT], None))
        .await
        .unwrap();
    let transfer_id = shipment.file_transfers[0].id;

    let mut content: &[u8] = b"hello world";
    let err = broker
        .upload_file(&recipient, transfer_id, &mut content)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn sender_cannot_download_own_content() {
    let (broker, _dir) = test_broker().await;
    let sender = sender_identity();
    let transfer_id = published_transfer(&broker).await;

    let err = broker.download_file(&sender, transfer_id).await.err().unwrap();
    assert!(
        matches!(err, Error::NotFound(_)),
        "download tracks per-recipient progress; the sender is not a recipient"
    );
}

#[tokio::test]
async fn sender_and_recipient_can_both_read_overviews() {
    let (broker, _dir) = test_broker().await;
    let sender = sender_identity();
    let recipient = recipient_identity(RECIPIENT);
    let transfer_id = published_transfer(&broker).await;

    broker
        .get_file_transfer_overview(&sender, transfer_id)
        .await
        .unwrap();
    broker
        .get_file_transfer_overview(&recipient, transfer_id)
        .await
        .unwrap();
}

#[tokio::test]
async fn missing_read_scope_hides_the_resource() {
    let (broker, _dir) = test_broker().await;
    let transfer_id = published_transfer(&broker).await;

    let scopeless = crate::types::CallerIdentity {
        client_id: "scopeless".to_string(),
        consumer_id: RECIPIENT.to_string(),
        scope: String::new(),
    };
    let err = broker
        .get_file_transfer_overview(&scopeless, transfer_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
