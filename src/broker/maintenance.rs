//! Maintenance entry points for the background job runner.
//!
//! The broker has no internal scheduler; an embedding service calls these on
//! its own cadence. Both operations are idempotent, so overlapping or
//! repeated runs converge on the same state.

use crate::error::Result;
use crate::events::{EventKind, LifecycleEvent};
use crate::status::TransferEvent;
use crate::types::{FileTransferId, ShipmentId};

use super::FileBroker;

impl FileBroker {
    /// Purge published content past its owner's retention
    ///
    /// Deletes stored bytes and moves each expired transfer to `Purged`,
    /// publishing a `Purged` event per transfer. Returns the transfers
    /// purged by this run; transfers already purged are not candidates, so
    /// re-running is a no-op.
    pub async fn purge_expired(&self) -> Result<Vec<FileTransferId>> {
        let now = chrono::Utc::now().timestamp();

        // Coarse pre-filter on the shortest configured retention; the exact
        // per-owner window is applied per transfer below
        let Some(min_retention) = self
            .config
            .service_owners
            .values()
            .map(|o| o.file_retention.as_secs() as i64)
            .min()
        else {
            return Ok(Vec::new());
        };

        let candidates = self
            .db
            .transfers_eligible_for_purge(now - min_retention)
            .await?;

        let mut purged = Vec::new();
        for row in candidates {
            let id = FileTransferId::new(row.id);
            let shipment_id = ShipmentId::new(row.shipment_id);

            let Some(retention) = self.owner_retention(shipment_id).await? else {
                tracing::warn!(file_transfer_id = %id, "no tenant configuration, skipping purge");
                continue;
            };
            if row.status_changed_at >= now - retention {
                continue;
            }

            self.delete_content(id, shipment_id).await;
            self.apply_transfer_event(id, TransferEvent::Purged, None)
                .await?;

            tracing::info!(file_transfer_id = %id, "expired content purged");
            self.publisher.publish(LifecycleEvent {
                kind: EventKind::Purged,
                shipment_id,
                file_transfer_id: Some(id),
                subject: None,
            });
            purged.push(id);
        }

        Ok(purged)
    }

    /// Flag published transfers whose confirmation window has elapsed
    ///
    /// Publishes a `NeverConfirmedDownloaded` event once per transfer; the
    /// flag is recorded so repeat runs skip already-reported transfers. The
    /// transfer itself stays `Published` — retention and purging take it
    /// from there.
    pub async fn flag_never_confirmed(&self) -> Result<Vec<FileTransferId>> {
        let now = chrono::Utc::now().timestamp();

        let Some(min_window) = self
            .config
            .service_owners
            .values()
            .map(|o| o.confirmation_window.as_secs() as i64)
            .min()
        else {
            return Ok(Vec::new());
        };

        let candidates = self.db.transfers_unconfirmed_past(now - min_window).await?;

        let mut flagged = Vec::new();
        for row in candidates {
            let id = FileTransferId::new(row.id);
            let shipment_id = ShipmentId::new(row.shipment_id);

            let Some(window) = self.owner_confirmation_window(shipment_id).await? else {
                continue;
            };
            if row.status_changed_at >= now - window {
                continue;
            }

            self.db.set_never_confirmed_flagged(id).await?;

            tracing::info!(file_transfer_id = %id, "confirmation window elapsed");
            self.publisher.publish(LifecycleEvent {
                kind: EventKind::NeverConfirmedDownloaded,
                shipment_id,
                file_transfer_id: Some(id),
                subject: None,
            });
            flagged.push(id);
        }

        Ok(flagged)
    }

    /// Retention seconds for the owner of a shipment, if configured
    async fn owner_retention(&self, shipment_id: ShipmentId) -> Result<Option<i64>> {
        Ok(self
            .owner_config(shipment_id)
            .await?
            .map(|o| o.file_retention.as_secs() as i64))
    }

    /// Confirmation window seconds for the owner of a shipment, if configured
    async fn owner_confirmation_window(&self, shipment_id: ShipmentId) -> Result<Option<i64>> {
        Ok(self
            .owner_config(shipment_id)
            .await?
            .map(|o| o.confirmation_window.as_secs() as i64))
    }

    async fn owner_config(
        &self,
        shipment_id: ShipmentId,
    ) -> Result<Option<crate::config::ServiceOwnerConfig>> {
        let Some(shipment) = self.db.get_shipment(shipment_id).await? else {
            return Ok(None);
        };
        Ok(self
            .resolve_tenant(&shipment.service_code, &shipment.service_edition_code)
            .ok()
            .map(|(_, owner)| owner.clone()))
    }
}
