//! Core types for file-broker

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::status::{ActorFileStatus, ShipmentStatus, TransferStatus};

/// Unique identifier for a shipment
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShipmentId(pub i64);

impl ShipmentId {
    /// Create a new ShipmentId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for ShipmentId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<ShipmentId> for i64 {
    fn from(id: ShipmentId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ShipmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ShipmentId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Unique identifier for a file transfer
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileTransferId(pub i64);

impl FileTransferId {
    /// Create a new FileTransferId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for FileTransferId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<FileTransferId> for i64 {
    fn from(id: FileTransferId) -> Self {
        id.0
    }
}

impl PartialEq<i64> for FileTransferId {
    fn eq(&self, other: &i64) -> bool {
        self.0 == *other
    }
}

impl PartialEq<FileTransferId> for i64 {
    fn eq(&self, other: &FileTransferId) -> bool {
        *self == other.0
    }
}

impl std::fmt::Display for FileTransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for FileTransferId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
macro_rules! sqlx_i64_newtype {
    ($name:ident) => {
        impl sqlx::Type<sqlx::Sqlite> for $name {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
            }

            fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
                <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
                sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $name {
            fn decode(
                value: sqlx::sqlite::SqliteValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
                Ok(Self(id))
            }
        }
    };
}

sqlx_i64_newtype!(ShipmentId);
sqlx_i64_newtype!(FileTransferId);

/// Validated claims of the current request
///
/// Ephemeral and never persisted: produced by the embedding service's
/// identity verification (signature, audience, expiry all checked before this
/// struct exists) and used only for authorization decisions within a single
/// request. The broker never parses tokens.
#[derive(Clone, Debug)]
pub struct CallerIdentity {
    /// Client identifier from the token
    pub client_id: String,
    /// Organization identifier of the consumer making the call
    pub consumer_id: String,
    /// Requested scope (e.g. "broker.write", "broker.read")
    pub scope: String,
}

impl CallerIdentity {
    /// Whether the caller's scope grants the given permission
    pub fn has_scope(&self, required: &str) -> bool {
        self.scope.split_whitespace().any(|s| s == required)
    }
}

/// Scope required for state-changing sender operations
pub const SCOPE_WRITE: &str = "broker.write";
/// Scope required for read and recipient operations
pub const SCOPE_READ: &str = "broker.read";

/// Request to initiate a new shipment
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewShipmentRequest {
    /// Sender's reference string for correlating with their own systems
    pub sender_reference: String,
    /// Service code this shipment is sent under
    pub service_code: String,
    /// Service edition code this shipment is sent under
    pub service_edition_code: String,
    /// Ordered recipient organization identifiers
    pub recipients: Vec<String>,
    /// Arbitrary string-keyed properties, opaque to the engine
    #[serde(default)]
    pub properties: HashMap<String, String>,
    /// Files the sender intends to upload
    pub files: Vec<NewFileRequest>,
}

/// One file registered within a shipment initiation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewFileRequest {
    /// File name as it should appear to recipients
    pub file_name: String,
    /// Sender's reference string for this file
    pub sender_reference: String,
    /// Optional declared SHA-256 checksum, verified on upload completion
    #[serde(default)]
    pub checksum: Option<String>,
}

/// Per-recipient progress entry in an overview
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActorOverview {
    /// Recipient organization identifier
    pub recipient: String,
    /// Current download progress
    pub status: ActorFileStatus,
    /// When the status last changed
    pub status_changed_at: DateTime<Utc>,
}

/// Read model for one file transfer
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileTransferOverview {
    /// Unique file transfer identifier
    pub id: FileTransferId,
    /// Shipment this transfer belongs to
    pub shipment_id: ShipmentId,
    /// Sender organization identifier
    pub sender: String,
    /// Sender's reference string for this file
    pub sender_reference: String,
    /// File name
    pub file_name: String,
    /// SHA-256 checksum, present once upload has completed and validated
    pub checksum: Option<String>,
    /// Content size in bytes, present once upload has completed
    pub size_bytes: Option<u64>,
    /// Current status
    pub status: TransferStatus,
    /// Human-readable status text
    pub status_text: String,
    /// When the status last changed
    pub status_changed_at: DateTime<Utc>,
    /// Per-recipient progress
    pub recipients: Vec<ActorOverview>,
}

/// Read model for a shipment
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShipmentOverview {
    /// Unique shipment identifier
    pub id: ShipmentId,
    /// Sender organization identifier
    pub sender: String,
    /// Sender's reference string
    pub sender_reference: String,
    /// Service code
    pub service_code: String,
    /// Service edition code
    pub service_edition_code: String,
    /// Ordered recipient organization identifiers
    pub recipients: Vec<String>,
    /// Arbitrary string-keyed properties, opaque to the engine
    pub properties: HashMap<String, String>,
    /// Aggregate status, recomputed from constituents
    pub status: ShipmentStatus,
    /// File transfers in this shipment
    pub file_transfers: Vec<FileTransferOverview>,
}

/// Payload sent to webhooks
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// Event kind (e.g. "published", "upload_failed")
    pub event: String,

    /// Shipment the event concerns
    pub shipment_id: ShipmentId,

    /// File transfer the event concerns, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_transfer_id: Option<FileTransferId>,

    /// Organization number of the subject actor, if the event concerns one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Timestamp of the event (Unix timestamp in seconds)
    pub timestamp: i64,
}
