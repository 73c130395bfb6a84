//! Provisioning seam between the dispatch loop and a network controller.

use async_trait::async_trait;

use crate::{IgmResult, MappedAction};

/// Applies a mapped action at the network controller.
///
/// Implementations must be idempotent at the controller: the same action may
/// be issued again by another process sharing the cache.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Provision one client.
    ///
    /// # Errors
    /// Returns an [`IgmError::Provisioning`](crate::IgmError::Provisioning)
    /// carrying the network, MAC and identity when the controller call fails.
    async fn provision(&self, action: &MappedAction) -> IgmResult<()>;
}
