//! Resource ownership requirement.
//!
//! Every evaluation asks the ownership collaborator again; ownership can change between two
//! requests, so nothing is cached here. Any collaborator error denies.

use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::{auth::ticket::Principal, authz::registry::RequirementHandler, types::PrincipalId};

/// Name the ownership handler is registered under.
pub const PHOTO_OWNER_HANDLER: &str = "photo_owner";

#[derive(Debug, Error)]
pub enum OwnershipError {
    #[error("resource not found")]
    ResourceNotFound,

    #[error("ownership lookup failed: {0}")]
    Lookup(String),
}

/// Answers `is_owner(principal, resource)` from external resource data.
#[async_trait::async_trait]
pub trait ResourceOwnership: Send + Sync {
    async fn is_owner(&self, principal_id: &PrincipalId, resource_id: &str) -> Result<bool, OwnershipError>;
}

pub struct OwnershipHandler {
    ownership: Arc<dyn ResourceOwnership>,
    timeout: Duration,
}

impl OwnershipHandler {
    pub fn new(ownership: Arc<dyn ResourceOwnership>, timeout: Duration) -> Self {
        Self { ownership, timeout }
    }
}

#[async_trait::async_trait]
impl RequirementHandler for OwnershipHandler {
    #[instrument(skip_all, fields(resource_id = resource.unwrap_or("-")))]
    async fn handle(&self, principal: Option<&Principal>, resource: Option<&str>) -> bool {
        let (Some(principal), Some(resource_id)) = (principal, resource) else {
            debug!("Ownership check without principal or resource id");
            return false;
        };

        match tokio::time::timeout(self.timeout, self.ownership.is_owner(&principal.id, resource_id)).await {
            Ok(Ok(is_owner)) => {
                debug!(principal_id = %principal.id, is_owner, "Ownership checked");
                is_owner
            }
            Ok(Err(OwnershipError::ResourceNotFound)) => {
                debug!(principal_id = %principal.id, "Ownership check for unknown resource");
                false
            }
            Ok(Err(e)) => {
                warn!(principal_id = %principal.id, error = %e, "Ownership lookup failed, denying");
                false
            }
            Err(_) => {
                warn!(principal_id = %principal.id, timeout = ?self.timeout, "Ownership lookup timed out, denying");
                false
            }
        }
    }
}
