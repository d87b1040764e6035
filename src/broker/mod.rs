//! Core broker implementation split into focused submodules.
//!
//! The `FileBroker` struct and its methods are organized by operation:
//! - [`auth`] - Tenant resolution and caller authorization
//! - [`initiate`] - Shipment initiation
//! - [`upload`] - Upload streaming and checksum verification
//! - [`download`] - Download streaming and per-recipient tracking
//! - [`confirm`] - Download confirmation
//! - [`overview`] - Status overview read models
//! - [`control`] - Sender-driven cancellation
//! - [`scan`] - Scan verdict listener and out-of-band entry point
//! - [`maintenance`] - Purge and never-confirmed maintenance runs

mod auth;
mod confirm;
mod control;
mod download;
mod initiate;
mod maintenance;
mod overview;
mod scan;
mod upload;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::{Config, StorageProviderKind};
use crate::db::Database;
use crate::error::{DatabaseError, Error, Result};
use crate::events::{Event, EventPublisher};
use crate::retry::execute_with_retry;
use crate::status::{TransferEvent, TransferStatus};
use crate::storage::{
    DiskStorageProvider, ScanVerdict, Scanner, ScanningStorageProvider, StorageProvider,
};
use crate::types::FileTransferId;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Bound on re-read-then-reapply rounds when an optimistic update keeps
/// losing to concurrent writers
const MAX_REAPPLY_ROUNDS: u32 = 5;

/// Main broker instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct FileBroker {
    /// Database instance for persistence (wrapped in Arc for sharing across tasks)
    /// Public for integration tests to query transfer status
    pub db: Arc<Database>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Lifecycle event publisher (broadcast + webhooks)
    pub(crate) publisher: EventPublisher,
    /// Storage provider per service owner, selected by configuration
    pub(crate) providers: Arc<HashMap<String, Arc<dyn StorageProvider>>>,
    /// Flag to indicate whether new operations are accepted (set to false during shutdown)
    accepting_new: Arc<AtomicBool>,
    /// Cancels the scan listener on shutdown
    shutdown_token: CancellationToken,
    /// Scan listener task, joined on shutdown
    scan_listener: Arc<tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl FileBroker {
    /// Create a new FileBroker instance
    ///
    /// This initializes all core components: opens/creates the SQLite
    /// database, runs migrations, builds one storage provider per configured
    /// service owner, and sets up the event broadcast channel.
    ///
    /// Fails with a configuration error if any service owner selects the
    /// virus-scanned provider — that requires a scanner, supplied via
    /// [`with_scanner`](Self::with_scanner).
    pub async fn new(config: Config) -> Result<Self> {
        Self::build(config, None).await
    }

    /// Create a FileBroker whose scanning providers use `scanner`
    ///
    /// The scanner is invoked asynchronously after every durable write for
    /// service owners configured with
    /// [`StorageProviderKind::VirusScanned`]; its verdicts drive the
    /// `UploadProcessing -> Published` / `-> Failed` transition.
    pub async fn with_scanner(config: Config, scanner: Arc<dyn Scanner>) -> Result<Self> {
        Self::build(config, Some(scanner)).await
    }

    async fn build(config: Config, scanner: Option<Arc<dyn Scanner>>) -> Result<Self> {
        let db = Arc::new(Database::new(&config.persistence.database_path).await?);
        let publisher = EventPublisher::new(config.notifications.webhooks.clone());

        let (verdict_tx, verdict_rx) = mpsc::unbounded_channel::<ScanVerdict>();

        let mut providers: HashMap<String, Arc<dyn StorageProvider>> = HashMap::new();
        for (owner_id, owner) in &config.service_owners {
            let root = config.storage.storage_dir.join(owner_id);
            let disk = DiskStorageProvider::new(root).await?;

            let provider: Arc<dyn StorageProvider> = match owner.storage_provider {
                StorageProviderKind::Direct => Arc::new(disk),
                StorageProviderKind::VirusScanned => {
                    let scanner = scanner.clone().ok_or_else(|| Error::Config {
                        message: format!(
                            "service owner {owner_id} requires a virus-scanned provider; \
                             construct the broker with FileBroker::with_scanner"
                        ),
                        key: Some("service_owners".to_string()),
                    })?;
                    Arc::new(ScanningStorageProvider::new(
                        Arc::new(disk),
                        scanner,
                        verdict_tx.clone(),
                    ))
                }
            };
            providers.insert(owner_id.clone(), provider);
        }
        drop(verdict_tx);

        let broker = Self {
            db,
            config: Arc::new(config),
            publisher,
            providers: Arc::new(providers),
            accepting_new: Arc::new(AtomicBool::new(true)),
            shutdown_token: CancellationToken::new(),
            scan_listener: Arc::new(tokio::sync::Mutex::new(None)),
        };

        let handle = broker.spawn_scan_listener(verdict_rx);
        *broker.scan_listener.lock().await = Some(handle);

        tracing::info!(
            owners = broker.providers.len(),
            "file broker initialized"
        );
        Ok(broker)
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.publisher.subscribe()
    }

    /// Gracefully shut down the broker
    ///
    /// Stops accepting new operations, stops the scan listener, emits a
    /// Shutdown event, and closes the database pool. In-flight webhook
    /// deliveries are fire-and-forget and are not awaited.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("shutting down file broker");
        self.accepting_new.store(false, Ordering::SeqCst);
        self.shutdown_token.cancel();

        if let Some(handle) = self.scan_listener.lock().await.take() {
            handle.await.ok();
        }

        self.publisher.send_raw(Event::Shutdown);
        self.db.close().await;
        Ok(())
    }

    /// Fail fast once shutdown has begun
    pub(crate) fn ensure_accepting(&self) -> Result<()> {
        if self.accepting_new.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::ShuttingDown)
        }
    }

    /// Apply a lifecycle event to a file transfer's status
    ///
    /// This is the single authority for transfer transitions: it re-reads
    /// the row, validates the transition against the state machine, and
    /// writes the new status conditional on the version it read. A lost
    /// version check re-reads and reapplies (the transition is re-validated
    /// against whatever the concurrent writer did); transient persistence
    /// faults are retried inside each round. Illegal transitions surface as
    /// `Conflict`.
    pub(crate) async fn apply_transfer_event(
        &self,
        id: FileTransferId,
        event: TransferEvent,
        status_text: Option<&str>,
    ) -> Result<TransferStatus> {
        for round in 0..MAX_REAPPLY_ROUNDS {
            let db = self.db.clone();
            let row = execute_with_retry(&self.config.retry, || {
                let db = db.clone();
                async move { db.get_transfer(id).await }
            })
            .await?
            .ok_or_else(|| Error::NotFound(format!("file transfer {id}")))?;

            let current = TransferStatus::from_i32(row.status);
            let next = current.transition(event).ok_or_else(|| Error::Conflict {
                operation: describe_event(event).to_string(),
                current_status: format!("{current:?}"),
            })?;

            let text = status_text.map(str::to_string).unwrap_or_else(|| next.describe().to_string());
            let db = self.db.clone();
            let version = row.version;
            let result = execute_with_retry(&self.config.retry, || {
                let db = db.clone();
                let text = text.clone();
                async move { db.update_transfer_status(id, version, next, &text).await }
            })
            .await;

            match result {
                Ok(()) => {
                    tracing::debug!(
                        file_transfer_id = %id,
                        from = ?current,
                        to = ?next,
                        "transfer status updated"
                    );
                    return Ok(next);
                }
                Err(Error::Database(DatabaseError::VersionConflict { .. })) => {
                    tracing::debug!(
                        file_transfer_id = %id,
                        round = round + 1,
                        "version conflict, re-reading"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::Database(DatabaseError::VersionConflict {
            record: format!("file transfer {id}"),
        }))
    }
}

/// Operation name used in conflict errors for each transfer event
fn describe_event(event: TransferEvent) -> &'static str {
    match event {
        TransferEvent::UploadStarted => "start upload",
        TransferEvent::UploadQueuedForProcessing => "queue upload for processing",
        TransferEvent::Published => "publish",
        TransferEvent::AllConfirmed => "confirm download",
        TransferEvent::Purged => "purge",
        TransferEvent::Cancelled => "cancel",
        TransferEvent::Failed => "fail",
    }
}
