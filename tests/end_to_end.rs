//! End-to-end lifecycle scenarios driven purely through the public API.

use async_trait::async_trait;
use file_broker::{
    ActorFileStatus, CallerIdentity, Config, ContentStream, Event, EventKind, FileBroker,
    FileTransferId, NewFileRequest, NewShipmentRequest, ScanOutcome, Scanner, ServiceConfig,
    ServiceOwnerConfig, ShipmentStatus, StorageProviderKind, TransferStatus,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

const OWNER: &str = "991825827";
const SENDER: &str = "910568183";
const RECIPIENT: &str = "911911911";

// SHA-256 of "hello world"
const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

struct SignatureScanner;

#[async_trait]
impl Scanner for SignatureScanner {
    async fn scan(&self, _id: FileTransferId, mut content: ContentStream) -> ScanOutcome {
        let mut bytes = Vec::new();
        if content.read_to_end(&mut bytes).await.is_err() {
            return ScanOutcome::Rejected("content unreadable".to_string());
        }
        if bytes.windows(5).any(|w| w == b"EICAR") {
            ScanOutcome::Rejected("malware signature".to_string())
        } else {
            ScanOutcome::Clean
        }
    }

    fn name(&self) -> &'static str {
        "signature"
    }
}

fn config(dir: &TempDir, provider: StorageProviderKind) -> Config {
    let mut service_owners = HashMap::new();
    service_owners.insert(
        OWNER.to_string(),
        ServiceOwnerConfig {
            name: "Example Agency".to_string(),
            storage_provider: provider,
            file_retention: Duration::from_secs(3600),
            confirmation_window: Duration::from_secs(3600),
        },
    );

    let mut config = Config::default();
    config.persistence.database_path = dir.path().join("broker.db");
    config.storage.storage_dir = dir.path().join("storage");
    config.service_owners = service_owners;
    config.services = vec![ServiceConfig {
        service_code: "invoice".to_string(),
        service_edition_code: "1".to_string(),
        owner_id: OWNER.to_string(),
    }];
    config
}

fn sender() -> CallerIdentity {
    CallerIdentity {
        client_id: "sender-client".to_string(),
        consumer_id: SENDER.to_string(),
        scope: "broker.write broker.read".to_string(),
    }
}

fn recipient() -> CallerIdentity {
    CallerIdentity {
        client_id: "recipient-client".to_string(),
        consumer_id: RECIPIENT.to_string(),
        scope: "broker.read".to_string(),
    }
}

fn request(checksum: Option<String>) -> NewShipmentRequest {
    NewShipmentRequest {
        sender_reference: "order-42".to_string(),
        service_code: "invoice".to_string(),
        service_edition_code: "1".to_string(),
        recipients: vec![RECIPIENT.to_string()],
        properties: HashMap::new(),
        files: vec![NewFileRequest {
            file_name: "invoice.pdf".to_string(),
            sender_reference: "order-42-file-1".to_string(),
            checksum,
        }],
    }
}

async fn wait_for(
    rx: &mut tokio::sync::broadcast::Receiver<Event>,
    kind: EventKind,
) -> file_broker::LifecycleEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(Event::Lifecycle(e)) = rx.recv().await
                && e.kind == kind
            {
                return e;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {kind:?}"))
}

#[tokio::test]
async fn full_lifecycle_with_direct_provider() {
    let dir = TempDir::new().unwrap();
    let broker = FileBroker::new(config(&dir, StorageProviderKind::Direct))
        .await
        .unwrap();
    let mut events = broker.subscribe();

    // Sender registers a one-file shipment to recipient 911911911
    let shipment = broker
        .initiate_shipment(&sender(), request(Some(HELLO_SHA256.to_string())))
        .await
        .unwrap();
    let transfer_id = shipment.file_transfers[0].id;

    // Upload matching the declared checksum publishes immediately
    let mut content: &[u8] = b"hello world";
    let overview = broker
        .upload_file(&sender(), transfer_id, &mut content)
        .await
        .unwrap();
    assert_eq!(overview.status, TransferStatus::Published);
    wait_for(&mut events, EventKind::Published).await;

    // Recipient downloads the exact bytes; progress becomes DownloadStarted
    let mut stream = broker
        .download_file(&recipient(), transfer_id)
        .await
        .unwrap();
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes).await.unwrap();
    assert_eq!(bytes, b"hello world");

    let overview = broker
        .get_file_transfer_overview(&recipient(), transfer_id)
        .await
        .unwrap();
    assert_eq!(
        overview.recipients[0].status,
        ActorFileStatus::DownloadStarted
    );

    // Confirmation completes the transfer and the shipment
    let overview = broker
        .confirm_download(&recipient(), transfer_id)
        .await
        .unwrap();
    assert_eq!(overview.status, TransferStatus::AllConfirmedDownloaded);
    assert_eq!(
        overview.recipients[0].status,
        ActorFileStatus::DownloadConfirmed
    );
    let confirmed = wait_for(&mut events, EventKind::DownloadConfirmed).await;
    assert_eq!(confirmed.subject.as_deref(), Some(RECIPIENT));
    wait_for(&mut events, EventKind::AllConfirmedDownloaded).await;

    let shipment = broker
        .get_shipment_overview(&sender(), shipment.id)
        .await
        .unwrap();
    assert_eq!(shipment.status, ShipmentStatus::Completed);

    broker.shutdown().await.unwrap();
}

#[tokio::test]
async fn scan_rejection_fails_transfer_and_blocks_downloads() {
    let dir = TempDir::new().unwrap();
    let broker = FileBroker::with_scanner(
        config(&dir, StorageProviderKind::VirusScanned),
        Arc::new(SignatureScanner),
    )
    .await
    .unwrap();
    let mut events = broker.subscribe();

    let shipment = broker
        .initiate_shipment(&sender(), request(None))
        .await
        .unwrap();
    let transfer_id = shipment.file_transfers[0].id;

    // The upload lands in processing; the verdict then fails it
    let mut content: &[u8] = b"EICAR test content";
    let overview = broker
        .upload_file(&sender(), transfer_id, &mut content)
        .await
        .unwrap();
    assert_eq!(overview.status, TransferStatus::UploadProcessing);
    wait_for(&mut events, EventKind::UploadFailed).await;

    let overview = broker
        .get_file_transfer_overview(&sender(), transfer_id)
        .await
        .unwrap();
    assert_eq!(overview.status, TransferStatus::Failed);

    // Subsequent download attempts are conflicts
    let err = broker
        .download_file(&recipient(), transfer_id)
        .await
        .err()
        .unwrap();
    assert!(
        matches!(err, file_broker::Error::Conflict { .. }),
        "got {err:?}"
    );

    broker.shutdown().await.unwrap();
}

#[tokio::test]
async fn clean_scan_publishes_after_processing() {
    let dir = TempDir::new().unwrap();
    let broker = FileBroker::with_scanner(
        config(&dir, StorageProviderKind::VirusScanned),
        Arc::new(SignatureScanner),
    )
    .await
    .unwrap();
    let mut events = broker.subscribe();

    let shipment = broker
        .initiate_shipment(&sender(), request(None))
        .await
        .unwrap();
    let transfer_id = shipment.file_transfers[0].id;

    let mut content: &[u8] = b"clean content";
    broker
        .upload_file(&sender(), transfer_id, &mut content)
        .await
        .unwrap();

    wait_for(&mut events, EventKind::Published).await;

    // The published content downloads normally
    let mut stream = broker
        .download_file(&recipient(), transfer_id)
        .await
        .unwrap();
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes).await.unwrap();
    assert_eq!(bytes, b"clean content");

    broker.shutdown().await.unwrap();
}

#[tokio::test]
async fn authorization_opacity_across_the_public_surface() {
    let dir = TempDir::new().unwrap();
    let broker = FileBroker::new(config(&dir, StorageProviderKind::Direct))
        .await
        .unwrap();

    let shipment = broker
        .initiate_shipment(&sender(), request(None))
        .await
        .unwrap();
    let transfer_id = shipment.file_transfers[0].id;

    let outsider = CallerIdentity {
        client_id: "outsider".to_string(),
        consumer_id: "999888777".to_string(),
        scope: "broker.read broker.write".to_string(),
    };

    let real = broker
        .get_file_transfer_overview(&outsider, transfer_id)
        .await
        .unwrap_err();
    let absent = broker
        .get_file_transfer_overview(&outsider, FileTransferId::new(424242))
        .await
        .unwrap_err();

    assert!(matches!(real, file_broker::Error::NotFound(_)));
    assert!(matches!(absent, file_broker::Error::NotFound(_)));

    broker.shutdown().await.unwrap();
}
