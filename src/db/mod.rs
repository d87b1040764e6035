//! Database layer for file-broker
//!
//! Handles SQLite persistence for shipments, file transfers, and per-actor
//! statuses. File transfer rows carry a `version` column; every status
//! update is conditional on the version the writer read, so concurrent
//! writers never silently overwrite each other (a lost check surfaces as
//! [`DatabaseError::VersionConflict`](crate::error::DatabaseError) for the
//! caller to re-read and reapply).
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`shipments`] — Shipment and recipient CRUD
//! - [`transfers`] — File transfer CRUD and versioned status updates
//! - [`actors`] — Per-recipient status, including the atomic confirm

use sqlx::{FromRow, sqlite::SqlitePool};
use std::collections::HashMap;

mod actors;
mod migrations;
mod shipments;
mod transfers;

/// New shipment to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewShipment {
    /// Sender organization identifier
    pub sender: String,
    /// Sender's reference string
    pub sender_reference: String,
    /// Service code the shipment is sent under
    pub service_code: String,
    /// Service edition code the shipment is sent under
    pub service_edition_code: String,
    /// Ordered recipient organization identifiers
    pub recipients: Vec<String>,
    /// Arbitrary string-keyed properties, stored as JSON
    pub properties: HashMap<String, String>,
    /// Files to register, all starting out Initialized
    pub files: Vec<NewFileTransfer>,
}

/// New file transfer to be inserted as part of a shipment
#[derive(Debug, Clone)]
pub struct NewFileTransfer {
    /// File name as shown to recipients
    pub file_name: String,
    /// Sender's reference string for this file
    pub sender_reference: String,
    /// Optional declared SHA-256, verified when the upload completes
    pub declared_checksum: Option<String>,
}

/// Shipment record from database
#[derive(Debug, Clone, FromRow)]
pub struct ShipmentRow {
    /// Unique database ID
    pub id: i64,
    /// Sender organization identifier
    pub sender: String,
    /// Sender's reference string
    pub sender_reference: String,
    /// Service code
    pub service_code: String,
    /// Service edition code
    pub service_edition_code: String,
    /// Property bag as JSON text
    pub properties: String,
    /// Aggregate status code (cache of the recompute; see [`ShipmentStatus`](crate::status::ShipmentStatus))
    pub status: i32,
    /// Unix timestamp when the shipment was created
    pub created_at: i64,
    /// Unix timestamp when the aggregate status last changed
    pub status_changed_at: i64,
}

/// File transfer record from database
#[derive(Debug, Clone, FromRow)]
pub struct FileTransferRow {
    /// Unique database ID
    pub id: i64,
    /// Shipment this transfer belongs to
    pub shipment_id: i64,
    /// Sender organization identifier
    pub sender: String,
    /// Sender's reference string for this file
    pub sender_reference: String,
    /// File name
    pub file_name: String,
    /// Checksum the sender declared at initiation, if any
    pub declared_checksum: Option<String>,
    /// Verified SHA-256 of the stored content; immutable once set
    pub checksum: Option<String>,
    /// Content size in bytes, set when the upload completes
    pub size_bytes: Option<i64>,
    /// Current status code (see [`TransferStatus`](crate::status::TransferStatus))
    pub status: i32,
    /// Human-readable status text
    pub status_text: String,
    /// Unix timestamp when the status last changed
    pub status_changed_at: i64,
    /// Optimistic concurrency stamp, incremented on every status update
    pub version: i64,
    /// Unix timestamp when this transfer was flagged never-confirmed, if ever
    pub never_confirmed_flagged_at: Option<i64>,
    /// Unix timestamp when the transfer was created
    pub created_at: i64,
}

/// Per-recipient status record from database
#[derive(Debug, Clone, FromRow)]
pub struct ActorStatusRow {
    /// File transfer this entry belongs to
    pub file_transfer_id: i64,
    /// Recipient organization identifier
    pub recipient: String,
    /// Current status code (see [`ActorFileStatus`](crate::status::ActorFileStatus))
    pub status: i32,
    /// Unix timestamp when the status last changed
    pub status_changed_at: i64,
}

/// What the atomic confirm-download operation changed
#[must_use]
#[derive(Debug, Clone)]
pub struct ConfirmOutcome {
    /// Shipment the confirmed transfer belongs to
    pub shipment_id: i64,
    /// False when the recipient had already confirmed (idempotent no-op)
    pub newly_confirmed: bool,
    /// True when this confirmation was the last one outstanding and the
    /// transfer moved to AllConfirmedDownloaded
    pub transfer_all_confirmed: bool,
    /// True when the whole shipment moved to Completed
    pub shipment_completed: bool,
}

/// Database handle for file-broker
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
