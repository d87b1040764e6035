//! Lifecycle events and their delivery
//!
//! Status transitions are announced two ways, both fire-and-forget: an
//! in-process broadcast channel consumers subscribe to, and HTTP webhooks
//! POSTed to configured subscribers. Delivery failures are logged and never
//! roll back the metadata mutation that triggered them — the event bus is
//! not on the consistency boundary. Publication always happens after the
//! mutation commits, so ordering within a single file transfer's lifecycle
//! follows its status history.

use crate::config::WebhookConfig;
use crate::types::{FileTransferId, ShipmentId, WebhookPayload};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Kind of lifecycle event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A file transfer was registered
    FileTransferInitialized,
    /// Uploaded bytes are durably stored and being validated
    UploadProcessing,
    /// Content is available for download
    Published,
    /// Upload or validation failed
    UploadFailed,
    /// A recipient confirmed a completed download
    DownloadConfirmed,
    /// Every recipient has confirmed download
    AllConfirmedDownloaded,
    /// Content was removed by retention expiry or deletion
    Purged,
    /// The confirmation window elapsed with recipients outstanding
    NeverConfirmedDownloaded,
}

impl EventKind {
    /// Stable string form used in webhook payloads
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::FileTransferInitialized => "file_transfer_initialized",
            EventKind::UploadProcessing => "upload_processing",
            EventKind::Published => "published",
            EventKind::UploadFailed => "upload_failed",
            EventKind::DownloadConfirmed => "download_confirmed",
            EventKind::AllConfirmedDownloaded => "all_confirmed_downloaded",
            EventKind::Purged => "purged",
            EventKind::NeverConfirmedDownloaded => "never_confirmed_downloaded",
        }
    }
}

/// A status transition that external subscribers should learn about
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// What happened
    pub kind: EventKind,
    /// Shipment the event concerns
    pub shipment_id: ShipmentId,
    /// File transfer the event concerns, if any
    pub file_transfer_id: Option<FileTransferId>,
    /// Organization number of the subject actor, if the event concerns one
    pub subject: Option<String>,
}

/// Event emitted on the broadcast channel
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A lifecycle transition occurred
    Lifecycle(LifecycleEvent),

    /// Webhook delivery failed
    WebhookFailed {
        /// Webhook URL
        url: String,
        /// Error message
        error: String,
    },

    /// Graceful shutdown initiated
    Shutdown,
}

/// Fire-and-forget publisher for lifecycle events
///
/// Fans each event out to broadcast subscribers and to every configured
/// webhook whose subscription includes the event's kind.
#[derive(Clone)]
pub struct EventPublisher {
    event_tx: tokio::sync::broadcast::Sender<Event>,
    webhooks: Arc<Vec<WebhookConfig>>,
}

impl EventPublisher {
    /// Create a publisher over the given webhook subscriptions.
    ///
    /// The broadcast buffer holds 1000 events; slow subscribers observe a
    /// lag error rather than blocking publication.
    pub fn new(webhooks: Vec<WebhookConfig>) -> Self {
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);
        Self {
            event_tx,
            webhooks: Arc::new(webhooks),
        }
    }

    /// Subscribe to the event stream
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Send a non-lifecycle event (shutdown) to broadcast subscribers only
    pub(crate) fn send_raw(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Publish a lifecycle event
    ///
    /// Broadcasts in-process and sends HTTP POST requests to all webhooks
    /// subscribed to the event's kind. Webhook delivery runs on a spawned
    /// task so publication never blocks the operation that triggered it.
    pub fn publish(&self, event: LifecycleEvent) {
        tracing::debug!(
            kind = event.kind.as_str(),
            shipment_id = %event.shipment_id,
            file_transfer_id = ?event.file_transfer_id,
            "publishing lifecycle event"
        );

        self.event_tx.send(Event::Lifecycle(event.clone())).ok();

        // Filter to only webhooks that match this event kind before cloning
        let matching_webhooks: Vec<_> = self
            .webhooks
            .iter()
            .filter(|w| w.events.contains(&event.kind))
            .cloned()
            .collect();

        if matching_webhooks.is_empty() {
            return;
        }

        let event_tx = self.event_tx.clone();

        // Spawn async task to send webhooks (fire and forget)
        tokio::spawn(async move {
            let timestamp = chrono::Utc::now().timestamp();

            // Build shared payload once - use Arc to share across webhooks
            let payload = Arc::new(WebhookPayload {
                event: event.kind.as_str().to_string(),
                shipment_id: event.shipment_id,
                file_transfer_id: event.file_transfer_id,
                subject: event.subject,
                timestamp,
            });

            for webhook in matching_webhooks {
                let client = reqwest::Client::new();
                let mut request = client
                    .post(&webhook.url)
                    .json(payload.as_ref())
                    .timeout(webhook.timeout);

                // Add authentication header if configured
                if let Some(auth) = &webhook.auth_header {
                    request = request.header("Authorization", auth);
                }

                let url = webhook.url;
                let timeout = webhook.timeout;
                let result = tokio::time::timeout(timeout, request.send()).await;

                match result {
                    Ok(Ok(response)) => {
                        if !response.status().is_success() {
                            let error_msg = format!(
                                "Webhook returned status {}: {}",
                                response.status(),
                                response.text().await.unwrap_or_default()
                            );
                            tracing::warn!(url = %url, error = %error_msg, "webhook failed");
                            event_tx
                                .send(Event::WebhookFailed {
                                    url,
                                    error: error_msg,
                                })
                                .ok();
                        } else {
                            tracing::debug!(url = %url, "webhook sent successfully");
                        }
                    }
                    Ok(Err(e)) => {
                        let error_msg = format!("Failed to send webhook: {}", e);
                        tracing::warn!(url = %url, error = %error_msg, "webhook failed");
                        event_tx
                            .send(Event::WebhookFailed {
                                url,
                                error: error_msg,
                            })
                            .ok();
                    }
                    Err(_) => {
                        let error_msg = format!("Webhook timed out after {:?}", timeout);
                        tracing::warn!(url = %url, error = %error_msg, "webhook timeout");
                        event_tx
                            .send(Event::WebhookFailed {
                                url,
                                error: error_msg,
                            })
                            .ok();
                    }
                }
            }
        });
    }
}
