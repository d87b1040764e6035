//! Status state machines for file content, file transfers, and recipients.
//!
//! Three independent machines share one design: a mostly-linear happy path
//! with absorbing failure states reachable from any non-terminal state.
//! Shipment status is not a machine of its own — it is recomputed from the
//! statuses of its constituent file transfers and recipients and must never
//! be set independently.

use serde::{Deserialize, Serialize};

/// Content state of a stored file, tracked by storage providers.
///
/// Scanning providers hold content in `Processing` until a verdict arrives;
/// direct providers move straight to `Ready` on durable write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Registered, no bytes stored yet
    Initialized,
    /// Bytes durably stored, validation (e.g. malware scan) pending
    Processing,
    /// Bytes stored and validated, eligible for download
    Ready,
    /// Content removed after retention expiry or explicit deletion
    Deleted,
    /// Validation or storage failed irrecoverably
    Failed,
}

impl FileStatus {
    /// Whether this state absorbs all further events
    pub fn is_terminal(self) -> bool {
        matches!(self, FileStatus::Deleted | FileStatus::Failed)
    }
}

/// Lifecycle status of a single file transfer within a shipment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Sender has registered intent to send the file
    Initialized,
    /// Bytes are streaming in
    UploadStarted,
    /// Bytes durably stored, storage backend is validating content
    UploadProcessing,
    /// Bytes durably stored and validated, available to recipients
    Published,
    /// Every recipient has confirmed download
    AllConfirmedDownloaded,
    /// Content removed after retention expiry or explicit deletion
    Purged,
    /// Sender aborted the transfer
    Cancelled,
    /// Validation or storage failed irrecoverably
    Failed,
}

/// Event driving a [`TransferStatus`] transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferEvent {
    /// Sender began streaming bytes
    UploadStarted,
    /// Durable write completed on a provider that validates asynchronously
    UploadQueuedForProcessing,
    /// Content is durably stored and validated
    Published,
    /// The last outstanding recipient confirmed download
    AllConfirmed,
    /// Content removed by retention expiry or explicit deletion
    Purged,
    /// Sender aborted the transfer
    Cancelled,
    /// Validation or storage failed irrecoverably
    Failed,
}

impl TransferStatus {
    /// Apply an event to the current status.
    ///
    /// Returns the next status, or `None` for an illegal transition. Callers
    /// must surface `None` as a conflict — never clamp or ignore the event.
    pub fn transition(self, event: TransferEvent) -> Option<TransferStatus> {
        use TransferEvent as E;
        use TransferStatus as S;

        match (self, event) {
            // Absorbing states never move again
            (S::Cancelled | S::Failed | S::Purged, _) => None,

            // Failure and cancellation are reachable from any non-terminal state
            (_, E::Failed) => Some(S::Failed),
            (_, E::Cancelled) => Some(S::Cancelled),

            // Happy path; UploadStarted self-loop lets a sender retry a
            // stream that aborted before the durable write completed
            (S::Initialized | S::UploadStarted, E::UploadStarted) => Some(S::UploadStarted),
            (S::UploadStarted, E::UploadQueuedForProcessing) => Some(S::UploadProcessing),
            (S::UploadStarted | S::UploadProcessing, E::Published) => Some(S::Published),
            (S::Published, E::AllConfirmed) => Some(S::AllConfirmedDownloaded),
            (S::Published | S::AllConfirmedDownloaded, E::Purged) => Some(S::Purged),

            _ => None,
        }
    }

    /// Whether this state absorbs all further events
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransferStatus::Cancelled | TransferStatus::Failed | TransferStatus::Purged
        )
    }

    /// Whether content has been durably stored and validated
    pub fn is_published_or_later(self) -> bool {
        matches!(
            self,
            TransferStatus::Published
                | TransferStatus::AllConfirmedDownloaded
                | TransferStatus::Purged
        )
    }

    /// Default human-readable status text for overviews
    pub fn describe(self) -> &'static str {
        match self {
            TransferStatus::Initialized => "Ready for upload",
            TransferStatus::UploadStarted => "Upload in progress",
            TransferStatus::UploadProcessing => "Processing uploaded content",
            TransferStatus::Published => "Available for download",
            TransferStatus::AllConfirmedDownloaded => "Downloaded and confirmed by all recipients",
            TransferStatus::Purged => "Content removed",
            TransferStatus::Cancelled => "Cancelled by sender",
            TransferStatus::Failed => "Failed",
        }
    }

    /// Convert integer status code to TransferStatus
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => TransferStatus::Initialized,
            1 => TransferStatus::UploadStarted,
            2 => TransferStatus::UploadProcessing,
            3 => TransferStatus::Published,
            4 => TransferStatus::AllConfirmedDownloaded,
            5 => TransferStatus::Purged,
            6 => TransferStatus::Cancelled,
            _ => TransferStatus::Failed, // Default to Failed for unknown status
        }
    }

    /// Convert TransferStatus to integer status code
    pub fn to_i32(self) -> i32 {
        match self {
            TransferStatus::Initialized => 0,
            TransferStatus::UploadStarted => 1,
            TransferStatus::UploadProcessing => 2,
            TransferStatus::Published => 3,
            TransferStatus::AllConfirmedDownloaded => 4,
            TransferStatus::Purged => 5,
            TransferStatus::Cancelled => 6,
            TransferStatus::Failed => 7,
        }
    }
}

/// Per-recipient download progress on a single file transfer.
///
/// Recipient-local; there is no failure state — a failed download is retried
/// by the client, not modeled server-side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorFileStatus {
    /// No progress recorded
    None,
    /// Recipient registered on the transfer
    Initialized,
    /// Recipient has begun downloading
    DownloadStarted,
    /// Recipient has confirmed a completed download
    DownloadConfirmed,
}

/// Event driving an [`ActorFileStatus`] transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActorEvent {
    /// Recipient registered on the transfer
    Initialized,
    /// Recipient began downloading
    DownloadStarted,
    /// Recipient confirmed a completed download
    DownloadConfirmed,
}

impl ActorFileStatus {
    /// Apply an event to the current status.
    ///
    /// Returns `None` for an illegal transition. `DownloadStarted` self-loops
    /// so a recipient can re-download; confirming twice is handled as an
    /// idempotent no-op by the caller, not here.
    pub fn transition(self, event: ActorEvent) -> Option<ActorFileStatus> {
        use ActorEvent as E;
        use ActorFileStatus as S;

        match (self, event) {
            (S::None, E::Initialized) => Some(S::Initialized),
            (S::None | S::Initialized | S::DownloadStarted, E::DownloadStarted) => {
                Some(S::DownloadStarted)
            }
            (S::DownloadStarted, E::DownloadConfirmed) => Some(S::DownloadConfirmed),
            _ => None,
        }
    }

    /// Convert integer status code to ActorFileStatus
    pub fn from_i32(status: i32) -> Self {
        match status {
            1 => ActorFileStatus::Initialized,
            2 => ActorFileStatus::DownloadStarted,
            3 => ActorFileStatus::DownloadConfirmed,
            _ => ActorFileStatus::None, // Default to None for unknown status
        }
    }

    /// Convert ActorFileStatus to integer status code
    pub fn to_i32(self) -> i32 {
        match self {
            ActorFileStatus::None => 0,
            ActorFileStatus::Initialized => 1,
            ActorFileStatus::DownloadStarted => 2,
            ActorFileStatus::DownloadConfirmed => 3,
        }
    }
}

/// Aggregate status of a shipment, derived from its constituents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    /// All file transfers registered, none uploaded yet
    Initialized,
    /// At least one file transfer has begun uploading
    UploadInProgress,
    /// Every file transfer is published (or later)
    AllFilesUploadedAndProcessed,
    /// Every recipient has confirmed every file
    Completed,
    /// Every file transfer was cancelled
    Cancelled,
    /// At least one file transfer failed
    Failed,
}

impl ShipmentStatus {
    /// Convert integer status code to ShipmentStatus
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => ShipmentStatus::Initialized,
            1 => ShipmentStatus::UploadInProgress,
            2 => ShipmentStatus::AllFilesUploadedAndProcessed,
            3 => ShipmentStatus::Completed,
            4 => ShipmentStatus::Cancelled,
            _ => ShipmentStatus::Failed, // Default to Failed for unknown status
        }
    }

    /// Convert ShipmentStatus to integer status code
    pub fn to_i32(self) -> i32 {
        match self {
            ShipmentStatus::Initialized => 0,
            ShipmentStatus::UploadInProgress => 1,
            ShipmentStatus::AllFilesUploadedAndProcessed => 2,
            ShipmentStatus::Completed => 3,
            ShipmentStatus::Cancelled => 4,
            ShipmentStatus::Failed => 5,
        }
    }
}

/// Recompute a shipment's status from its constituent file transfers.
///
/// `all_confirmed` must be computed from the authoritative per-recipient
/// statuses at the time of the change, not from a snapshot taken earlier.
/// The result is a pure function of its inputs; persisted shipment status is
/// only ever a cache of this value.
pub fn aggregate_shipment_status(
    transfers: &[TransferStatus],
    all_confirmed: bool,
) -> ShipmentStatus {
    if transfers.is_empty() {
        return ShipmentStatus::Initialized;
    }
    if transfers.iter().any(|s| *s == TransferStatus::Failed) {
        return ShipmentStatus::Failed;
    }
    if transfers.iter().all(|s| *s == TransferStatus::Cancelled) {
        return ShipmentStatus::Cancelled;
    }
    // Cancelled transfers no longer gate the rest of the shipment
    let live: Vec<TransferStatus> = transfers
        .iter()
        .copied()
        .filter(|s| *s != TransferStatus::Cancelled)
        .collect();
    if live.iter().all(|s| s.is_published_or_later()) {
        if all_confirmed {
            return ShipmentStatus::Completed;
        }
        return ShipmentStatus::AllFilesUploadedAndProcessed;
    }
    if live.iter().any(|s| *s != TransferStatus::Initialized) {
        return ShipmentStatus::UploadInProgress;
    }
    ShipmentStatus::Initialized
}
