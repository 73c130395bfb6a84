//! Wiring for one epoch against the live control plane.

use std::sync::Arc;

use igm_core::{IgmResult, Provisioner};
use igm_mapper::IdentityGroupMapper;
use igm_pxgrid::{ControlPlaneClient, SessionPubsub, SessionService};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{EpochEnd, SessionDispatchLoop};

/// Discover the session service, subscribe to its topic and dispatch
/// until the epoch ends.
///
/// # Errors
/// Fails when discovery or the subscription fails, or when the transport
/// ends the epoch.
pub async fn run_session_bridge(
    control: Arc<ControlPlaneClient>,
    mapper: IdentityGroupMapper,
    provisioner: Arc<dyn Provisioner>,
    cancel: CancellationToken,
) -> IgmResult<EpochEnd> {
    let session = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(EpochEnd::Cancelled),
        session = SessionService::discover(control) => session?,
    };
    let mut pubsub = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(EpochEnd::Cancelled),
        pubsub = SessionPubsub::new(&session) => pubsub?,
    };
    info!(
        node = pubsub.node_name(),
        topic = pubsub.topic(),
        url = pubsub.ws_url(),
        "Session service discovered"
    );

    let mut dispatch = SessionDispatchLoop::new(Arc::new(mapper), provisioner);
    dispatch.run(&mut pubsub, cancel).await
}
