//! The session dispatch loop.
//!
//! One connection epoch: connect the event source, then handle one message
//! at a time until the source closes, the transport fails, or the token is
//! cancelled. Provisioning follows message arrival order.

use std::sync::Arc;

use async_trait::async_trait;
use igm_core::{IgmError, IgmResult, Provisioner, SessionEvent};
use igm_mapper::IdentityGroupMapper;
use igm_pxgrid::SessionPubsub;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A connection that yields session messages.
#[async_trait]
pub trait EventSource: Send {
    /// Open the connection.
    async fn connect(&mut self) -> IgmResult<()>;

    /// Next message; `Ok(None)` when the peer closed cleanly.
    async fn next_event(&mut self) -> IgmResult<Option<Value>>;

    /// Close the connection. Must be safe to call more than once.
    async fn close(&mut self) -> IgmResult<()>;
}

#[async_trait]
impl EventSource for SessionPubsub {
    async fn connect(&mut self) -> IgmResult<()> {
        Ok(Self::connect(self).await?)
    }

    async fn next_event(&mut self) -> IgmResult<Option<Value>> {
        Ok(self.read_message().await?)
    }

    async fn close(&mut self) -> IgmResult<()> {
        Ok(Self::close(self).await?)
    }
}

/// Why an epoch ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochEnd {
    /// The peer closed the channel.
    RemoteClosed,
    /// The cancellation token fired.
    Cancelled,
}

/// Counters for one epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpochStats {
    /// Messages received.
    pub messages: u64,
    /// Messages or sessions dropped as unreadable or unmappable.
    pub skipped: u64,
    /// Actions produced by the mapper.
    pub actions: u64,
    /// Actions the provisioner accepted.
    pub provisioned: u64,
    /// Actions the provisioner failed.
    pub failed: u64,
}

/// Reads session messages, maps them and provisions the results.
pub struct SessionDispatchLoop {
    mapper: Arc<IdentityGroupMapper>,
    provisioner: Arc<dyn Provisioner>,
    stats: EpochStats,
}

impl SessionDispatchLoop {
    #[must_use]
    pub fn new(mapper: Arc<IdentityGroupMapper>, provisioner: Arc<dyn Provisioner>) -> Self {
        Self {
            mapper,
            provisioner,
            stats: EpochStats::default(),
        }
    }

    /// Counters of the current or last epoch.
    #[must_use]
    pub const fn stats(&self) -> EpochStats {
        self.stats
    }

    /// Run one epoch over `source`.
    ///
    /// Unreadable messages, mapping failures and provisioning failures are
    /// logged and skipped. The source is closed before returning.
    ///
    /// # Errors
    /// Returns the error that ended the epoch: a failed connect, or a
    /// transport or configuration failure while reading.
    pub async fn run<S>(&mut self, source: &mut S, cancel: CancellationToken) -> IgmResult<EpochEnd>
    where
        S: EventSource + ?Sized,
    {
        self.stats = EpochStats::default();

        let connected = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(EpochEnd::Cancelled),
            connected = source.connect() => connected,
        };
        connected?;
        info!("Session feed connected");

        let end = loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => break Ok(EpochEnd::Cancelled),
                next = source.next_event() => next,
            };
            match next {
                Ok(Some(payload)) => self.handle_message(&payload).await,
                Ok(None) => break Ok(EpochEnd::RemoteClosed),
                Err(err) if err.class().ends_epoch() => break Err(err),
                Err(err) => {
                    self.stats.skipped += 1;
                    warn!(error = %err, class = ?err.class(), "Skipping unreadable message");
                }
            }
        };

        if let Err(err) = source.close().await {
            debug!(error = %err, "Closing session feed failed");
        }

        let stats = self.stats;
        match &end {
            Ok(reason) => info!(
                reason = ?reason,
                messages = stats.messages,
                skipped = stats.skipped,
                actions = stats.actions,
                provisioned = stats.provisioned,
                failed = stats.failed,
                "Epoch ended"
            ),
            Err(err) => error!(
                error = %err,
                messages = stats.messages,
                skipped = stats.skipped,
                actions = stats.actions,
                provisioned = stats.provisioned,
                failed = stats.failed,
                "Epoch ended by transport failure"
            ),
        }
        end
    }

    async fn handle_message(&mut self, payload: &Value) {
        self.stats.messages += 1;
        let Some(event) = SessionEvent::from_payload(payload) else {
            debug!("Ignoring message without sessions");
            return;
        };

        let actions = match self.mapper.map(&event).await {
            Ok(actions) => actions,
            Err(err) => {
                self.stats.skipped += 1;
                let err = IgmError::from(err);
                warn!(error = %err, class = ?err.class(), "Mapping failed; message dropped");
                return;
            }
        };

        for action in actions {
            self.stats.actions += 1;
            match self.provisioner.provision(&action).await {
                Ok(()) => self.stats.provisioned += 1,
                Err(err) => {
                    self.stats.failed += 1;
                    error!(
                        network = action.network.as_deref().unwrap_or("<none>"),
                        mac = %action.mac,
                        name = %action.name,
                        group = action.group.as_deref().unwrap_or("<none>"),
                        error = %err,
                        "Provisioning failed"
                    );
                }
            }
        }
    }
}
