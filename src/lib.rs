//! # file-broker
//!
//! Multi-tenant file transfer broker library with pluggable storage backends.
//!
//! ## Design Philosophy
//!
//! file-broker is designed to be:
//! - **Library-first** - No HTTP server or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to lifecycle events, no polling required
//! - **Tenant-aware** - Storage provider and retention policy are configured per service owner
//! - **Convergent** - Per-record optimistic concurrency keeps concurrent actors consistent
//!
//! ## Quick Start
//!
//! ```no_run
//! use file_broker::{Config, FileBroker};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         // register service owners and services here
//!         ..Default::default()
//!     };
//!     let broker = FileBroker::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = broker.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Core broker implementation (decomposed into focused submodules)
pub mod broker;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Lifecycle events and webhook delivery
pub mod events;
/// Retry logic for transient persistence faults
pub mod retry;
/// Status state machines
pub mod status;
/// Pluggable byte storage providers
pub mod storage;
/// Core types and identifiers
pub mod types;

// Re-export commonly used types
pub use broker::FileBroker;
pub use config::{Config, RetryConfig, ServiceConfig, ServiceOwnerConfig, StorageProviderKind};
pub use db::Database;
pub use error::{ApiError, DatabaseError, Error, ErrorDetail, Result, StorageError, ToHttpStatus};
pub use events::{Event, EventKind, LifecycleEvent};
pub use status::{ActorFileStatus, FileStatus, ShipmentStatus, TransferStatus};
pub use storage::{
    ContentStream, DiskStorageProvider, ScanOutcome, ScanVerdict, Scanner,
    ScanningStorageProvider, StorageProvider,
};
pub use types::{
    CallerIdentity, FileTransferId, FileTransferOverview, NewFileRequest, NewShipmentRequest,
    ShipmentId, ShipmentOverview,
};

/// Helper function to run the broker with graceful signal handling.
///
/// Waits for a termination signal and then calls the broker's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use file_broker::{Config, FileBroker, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let broker = FileBroker::new(Config::default()).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(broker).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(broker: FileBroker) -> Result<()> {
    wait_for_signal().await;
    broker.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
