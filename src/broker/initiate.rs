//! Shipment initiation.

use crate::db::{NewFileTransfer, NewShipment};
use crate::error::{Error, Result};
use crate::events::{EventKind, LifecycleEvent};
use crate::retry::execute_with_retry;
use crate::types::{CallerIdentity, NewShipmentRequest, SCOPE_WRITE, ShipmentOverview};

use super::FileBroker;

impl FileBroker {
    /// Register a shipment and its file transfers
    ///
    /// The caller becomes the sender; every registered file starts out
    /// Initialized and a `FileTransferInitialized` event is published per
    /// file once the records are committed.
    pub async fn initiate_shipment(
        &self,
        identity: &CallerIdentity,
        request: NewShipmentRequest,
    ) -> Result<ShipmentOverview> {
        self.ensure_accepting()?;

        if !identity.has_scope(SCOPE_WRITE) {
            return Err(Error::NotFound(format!(
                "service {}/{}",
                request.service_code, request.service_edition_code
            )));
        }

        let (_service, _owner) =
            self.resolve_tenant(&request.service_code, &request.service_edition_code)?;

        if request.recipients.is_empty() {
            return Err(Error::Validation(
                "shipment requires at least one recipient".to_string(),
            ));
        }
        if request.files.is_empty() {
            return Err(Error::Validation(
                "shipment requires at least one file".to_string(),
            ));
        }
        if let Some(dup) = first_duplicate(&request.recipients) {
            return Err(Error::Validation(format!(
                "recipient {dup} is listed more than once"
            )));
        }

        let new_shipment = NewShipment {
            sender: identity.consumer_id.clone(),
            sender_reference: request.sender_reference.clone(),
            service_code: request.service_code.clone(),
            service_edition_code: request.service_edition_code.clone(),
            recipients: request.recipients.clone(),
            properties: request.properties.clone(),
            files: request
                .files
                .iter()
                .map(|f| NewFileTransfer {
                    file_name: f.file_name.clone(),
                    sender_reference: f.sender_reference.clone(),
                    declared_checksum: f.checksum.clone(),
                })
                .collect(),
        };

        let db = self.db.clone();
        let (shipment_id, transfer_ids) = execute_with_retry(&self.config.retry, || {
            let db = db.clone();
            let shipment = new_shipment.clone();
            async move { db.insert_shipment(&shipment).await }
        })
        .await?;

        tracing::info!(
            shipment_id = %shipment_id,
            sender = %identity.consumer_id,
            files = transfer_ids.len(),
            recipients = request.recipients.len(),
            "shipment initiated"
        );

        for transfer_id in &transfer_ids {
            self.publisher.publish(LifecycleEvent {
                kind: EventKind::FileTransferInitialized,
                shipment_id,
                file_transfer_id: Some(*transfer_id),
                subject: None,
            });
        }

        self.assemble_shipment_overview(shipment_id).await
    }
}

/// First recipient that appears more than once, if any
fn first_duplicate(recipients: &[String]) -> Option<&String> {
    let mut seen = std::collections::HashSet::new();
    recipients.iter().find(|r| !seen.insert(r.as_str()))
}
