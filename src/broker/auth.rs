//! Tenant resolution and caller authorization.
//!
//! Authorization failures on resource operations deliberately read as
//! `NotFound`: a caller who is neither the sender nor a listed recipient
//! must not be able to tell an inaccessible file transfer from an absent
//! one.

use crate::config::{ServiceConfig, ServiceOwnerConfig};
use crate::error::{Error, Result};
use crate::storage::StorageProvider;
use crate::types::{CallerIdentity, FileTransferId, SCOPE_READ, SCOPE_WRITE};
use std::sync::Arc;

use super::FileBroker;

impl FileBroker {
    /// Resolve a service registration and its owning tenant
    pub(crate) fn resolve_tenant(
        &self,
        service_code: &str,
        service_edition_code: &str,
    ) -> Result<(&ServiceConfig, &ServiceOwnerConfig)> {
        let service = self
            .config
            .find_service(service_code, service_edition_code)
            .ok_or_else(|| Error::ServiceNotConfigured {
                service_code: service_code.to_string(),
                service_edition_code: service_edition_code.to_string(),
            })?;

        let owner = self
            .config
            .find_service_owner(&service.owner_id)
            .ok_or_else(|| Error::ServiceOwnerNotConfigured {
                owner_id: service.owner_id.clone(),
            })?;

        Ok((service, owner))
    }

    /// The storage provider selected by a service owner's configuration
    pub(crate) fn provider_for(&self, owner_id: &str) -> Result<Arc<dyn StorageProvider>> {
        self.providers
            .get(owner_id)
            .cloned()
            .ok_or_else(|| Error::ServiceOwnerNotConfigured {
                owner_id: owner_id.to_string(),
            })
    }

    /// Authorize a sender operation on a file transfer
    ///
    /// The caller must carry the write scope and be the transfer's sender;
    /// anything else reads as the transfer not existing.
    pub(crate) fn authorize_sender(
        &self,
        identity: &CallerIdentity,
        id: FileTransferId,
        sender: &str,
    ) -> Result<()> {
        if identity.has_scope(SCOPE_WRITE) && identity.consumer_id == sender {
            Ok(())
        } else {
            tracing::debug!(
                file_transfer_id = %id,
                consumer = %identity.consumer_id,
                "caller is not the sender"
            );
            Err(Error::NotFound(format!("file transfer {id}")))
        }
    }

    /// Authorize a recipient operation on a file transfer
    ///
    /// The caller must carry the read scope and be on the transfer's
    /// authoritative recipient list.
    pub(crate) fn authorize_recipient(
        &self,
        identity: &CallerIdentity,
        id: FileTransferId,
        recipients: &[String],
    ) -> Result<()> {
        if identity.has_scope(SCOPE_READ)
            && recipients.iter().any(|r| *r == identity.consumer_id)
        {
            Ok(())
        } else {
            tracing::debug!(
                file_transfer_id = %id,
                consumer = %identity.consumer_id,
                "caller is not a listed recipient"
            );
            Err(Error::NotFound(format!("file transfer {id}")))
        }
    }

    /// Authorize a read operation: sender or listed recipient
    pub(crate) fn authorize_participant(
        &self,
        identity: &CallerIdentity,
        id: FileTransferId,
        sender: &str,
        recipients: &[String],
    ) -> Result<()> {
        let is_sender = identity.consumer_id == sender;
        let is_recipient = recipients.iter().any(|r| *r == identity.consumer_id);
        if identity.has_scope(SCOPE_READ) && (is_sender || is_recipient) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("file transfer {id}")))
        }
    }
}
