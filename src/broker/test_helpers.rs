//! Shared fixtures for broker tests.

use crate::config::{
    Config, PersistenceConfig, ServiceConfig, ServiceOwnerConfig, StorageConfig,
    StorageProviderKind,
};
use crate::events::{Event, EventKind, LifecycleEvent};
use crate::storage::{ContentStream, ScanOutcome, Scanner};
use crate::types::{CallerIdentity, FileTransferId, NewFileRequest, NewShipmentRequest};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

use super::FileBroker;

/// Direct-provider tenant
pub(crate) const DIRECT_OWNER: &str = "991825827";
/// Scanning-provider tenant
pub(crate) const SCANNED_OWNER: &str = "995959595";
/// Sender organization used in tests
pub(crate) const SENDER: &str = "910568183";
/// Default recipient organization used in tests
pub(crate) const RECIPIENT: &str = "911911911";

/// Scanner that rejects content containing the EICAR marker
pub(crate) struct SignatureScanner;

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

/// Two-tenant config rooted in a temp directory
pub(crate) fn test_config(dir: &TempDir) -> Config {
    let mut service_owners = HashMap::new();
    service_owners.insert(
        DIRECT_OWNER.to_string(),
        ServiceOwnerConfig {
            name: "Direct Agency".to_string(),
            storage_provider: StorageProviderKind::Direct,
            file_retention: Duration::from_secs(3600),
            confirmation_window: Duration::from_secs(3600),
        },
    );
    service_owners.insert(
        SCANNED_OWNER.to_string(),
        ServiceOwnerConfig {
            name: "Scanned Agency".to_string(),
            storage_provider: StorageProviderKind::VirusScanned,
            file_retention: Duration::from_secs(3600),
            confirmation_window: Duration::from_secs(3600),
        },
    );

    Config {
        persistence: PersistenceConfig {
            database_path: dir.path().join("broker.db"),
        },
        storage: StorageConfig {
            storage_dir: dir.path().join("storage"),
        },
        service_owners,
        services: vec![
            ServiceConfig {
                service_code: "invoice".to_string(),
                service_edition_code: "1".to_string(),
                owner_id: DIRECT_OWNER.to_string(),
            },
            ServiceConfig {
                service_code: "report".to_string(),
                service_edition_code: "1".to_string(),
                owner_id: SCANNED_OWNER.to_string(),
            },
        ],
        ..Default::default()
    }
}

/// Broker over the default test config
pub(crate) async fn test_broker() -> (FileBroker, TempDir) {
    test_broker_with(|_| {}).await
}

/// Broker over a customized test config
pub(crate) async fn test_broker_with(customize: impl FnOnce(&mut Config)) -> (FileBroker, TempDir) {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    customize(&mut config);
    let broker = FileBroker::with_scanner(config, Arc::new(SignatureScanner))
        .await
        .unwrap();
    (broker, dir)
}

pub(crate) fn sender_identity() -> CallerIdentity {
    CallerIdentity {
        client_id: "sender-client".to_string(),
        consumer_id: SENDER.to_string(),
        scope: "broker.write broker.read".to_string(),
    }
}

pub(crate) fn recipient_identity(org: &str) -> CallerIdentity {
    CallerIdentity {
        client_id: "recipient-client".to_string(),
        consumer_id: org.to_string(),
        scope: "broker.read".to_string(),
    }
}

pub(crate) fn outsider_identity() -> CallerIdentity {
    CallerIdentity {
        client_id: "outsider-client".to_string(),
        consumer_id: "999888777".to_string(),
        scope: "broker.write broker.read".to_string(),
    }
}

/// One-file shipment request under the given service
pub(crate) fn shipment_request(
    service_code: &str,
    recipients: &[&str],
    checksum: Option<String>,
) -> NewShipmentRequest {
    NewShipmentRequest {
        sender_reference: "order-42".to_string(),
        service_code: service_code.to_string(),
        service_edition_code: "1".to_string(),
        recipients: recipients.iter().map(|r| r.to_string()).collect(),
        properties: HashMap::new(),
        files: vec![NewFileRequest {
            file_name: "invoice.pdf".to_string(),
            sender_reference: "order-42-file-1".to_string(),
            checksum,
        }],
    }
}

/// Wait for a lifecycle event of the given kind, ignoring others
pub(crate) async fn wait_for_event(
    rx: &mut tokio::sync::broadcast::Receiver<Event>,
    kind: EventKind,
) -> LifecycleEvent {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            if let Event::Lifecycle(e) = rx.recv().await.unwrap()
                && e.kind == kind
            {
                return e;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {kind:?} event"))
}
