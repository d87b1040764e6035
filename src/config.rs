//! Configuration types for file-broker

use crate::events::EventKind;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf, time::Duration};

/// Data storage and state management
///
/// Groups settings for the metadata database. Used as a nested sub-config
/// within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Path to the SQLite metadata database (default: "./broker.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Byte storage configuration
///
/// Groups settings for where file content is kept on disk. Which provider
/// wraps this root (direct or scanning) is selected per service owner via
/// [`ServiceOwnerConfig::storage_provider`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for stored file content (default: "./storage")
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
        }
    }
}

/// Retry behavior for transient persistence faults
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the initial try (default: 2,
    /// i.e. at most 3 attempts total)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 100ms)
    #[serde(default = "default_initial_delay")]
    pub initial_delay: Duration,

    /// Upper bound on any single delay (default: 5s)
    #[serde(default = "default_max_delay")]
    pub max_delay: Duration,

    /// Multiplier applied to the delay after each attempt (default: 1.0,
    /// fixed backoff)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays to prevent thundering herd (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

/// Notification configuration (webhooks)
///
/// Groups settings for external notifications triggered by lifecycle events.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Webhook configurations
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
}

/// A single webhook endpoint subscription
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// URL to POST event payloads to
    pub url: String,

    /// Event kinds this webhook subscribes to
    pub events: Vec<EventKind>,

    /// Optional value for the Authorization header
    #[serde(default)]
    pub auth_header: Option<String>,

    /// Request timeout (default: 30s)
    #[serde(default = "default_webhook_timeout")]
    pub timeout: Duration,
}

/// Which storage provider a service owner's content goes through
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageProviderKind {
    /// Durable write publishes immediately
    #[default]
    Direct,
    /// Durable write, then an asynchronous malware scan gates publication
    VirusScanned,
}

/// Per-tenant configuration for a service owner
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceOwnerConfig {
    /// Display name
    pub name: String,

    /// Storage provider selection for this owner's shipments
    #[serde(default)]
    pub storage_provider: StorageProviderKind,

    /// How long published content is retained before purging (default: 30 days)
    #[serde(default = "default_file_retention")]
    pub file_retention: Duration,

    /// How long to wait for recipient confirmations before flagging a
    /// transfer as never confirmed (default: 7 days)
    #[serde(default = "default_confirmation_window")]
    pub confirmation_window: Duration,
}

/// Registration of a service under a service owner
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service code callers present
    pub service_code: String,

    /// Service edition code callers present
    pub service_edition_code: String,

    /// Organization identifier of the owning tenant; must have an entry in
    /// [`Config::service_owners`]
    pub owner_id: String,
}

/// Main configuration for FileBroker
///
/// Fields are organized into logical sub-configs for maintainability:
/// - [`persistence`](PersistenceConfig) — metadata database
/// - [`storage`](StorageConfig) — byte storage root
/// - [`retry`](RetryConfig) — transient-fault retry bounds
/// - [`notifications`](NotificationConfig) — webhooks
///
/// plus the tenant registry (`service_owners`, `services`) mapping caller
/// service codes to owners and their storage/retention policies.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Metadata database settings
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Byte storage settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Retry behavior for transient persistence faults
    #[serde(default)]
    pub retry: RetryConfig,

    /// Notification settings (webhooks)
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Service owners by organization identifier
    #[serde(default)]
    pub service_owners: HashMap<String, ServiceOwnerConfig>,

    /// Registered services
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

impl Config {
    /// Look up a service registration by code and edition
    pub fn find_service(
        &self,
        service_code: &str,
        service_edition_code: &str,
    ) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| {
            s.service_code == service_code && s.service_edition_code == service_edition_code
        })
    }

    /// Look up a service owner by organization identifier
    pub fn find_service_owner(&self, owner_id: &str) -> Option<&ServiceOwnerConfig> {
        self.service_owners.get(owner_id)
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./broker.db")
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("./storage")
}

fn default_max_attempts() -> u32 {
    2
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_webhook_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_file_retention() -> Duration {
    Duration::from_secs(30 * 24 * 60 * 60)
}

fn default_confirmation_window() -> Duration {
    Duration::from_secs(7 * 24 * 60 * 60)
}
