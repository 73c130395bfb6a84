//! Session topic subscription over STOMP-on-WebSocket.

use std::sync::Arc;
use std::time::Duration;

use igm_streaming::{
    DEFAULT_ACK_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, StompClient, WsClient, WsConfig,
};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::{ControlPlaneClient, PxgridError, PxgridResult, ServiceDescriptor, SessionService};

const WS_URL: &str = "wsUrl";
const SUBSCRIPTION_ID: &str = "igm-session-0";

/// Pub/sub channel for the session topic.
///
/// Each [`connect`](Self::connect) fetches a fresh access secret for the
/// pub/sub node, opens the WebSocket, performs the STOMP handshake and
/// subscribes. No reconnect happens here.
pub struct SessionPubsub {
    client: Arc<ControlPlaneClient>,
    pubsub: ServiceDescriptor,
    ws_url: String,
    topic: String,
    connect_timeout: Duration,
    ack_timeout: Duration,
    stomp: Option<StompClient>,
}

impl SessionPubsub {
    /// Resolve the pub/sub service that carries the session topic.
    ///
    /// # Errors
    /// Fails when the lookup fails or the service advertises no `wsUrl`.
    pub async fn new(session: &SessionService) -> PxgridResult<Self> {
        let client = session.client().clone();
        let pubsub = client
            .lookup_service(session.pubsub_service_name()?)
            .await?;
        let ws_url = pubsub.require_property(WS_URL)?.to_string();
        Ok(Self {
            client,
            topic: session.session_topic()?.to_string(),
            pubsub,
            ws_url,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            stomp: None,
        })
    }

    /// Override the advertised WebSocket URL (for testing).
    #[must_use]
    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    #[must_use]
    pub const fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Node hosting the pub/sub service.
    #[must_use]
    pub fn node_name(&self) -> &str {
        &self.pubsub.node_name
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.stomp.is_some()
    }

    /// Open the channel and subscribe to the session topic.
    ///
    /// # Errors
    /// Fails when the secret cannot be fetched, TLS material is unusable,
    /// the socket cannot be opened, or the broker rejects the session.
    #[instrument(skip(self), fields(url = %self.ws_url, topic = %self.topic))]
    pub async fn connect(&mut self) -> PxgridResult<()> {
        self.close().await?;

        let secret = self.client.get_access_secret(&self.pubsub.node_name).await?;
        let nodename = self.client.config().nodename.clone();

        let ws_config = WsConfig::new()
            .with_connect_timeout(self.connect_timeout)
            .with_basic_auth(&nodename, secret.expose());
        let mut ws = WsClient::with_config(self.ws_url.clone(), ws_config);
        if self.ws_url.starts_with("wss://") {
            ws = ws.with_tls(self.client.config().tls_settings().client_config()?);
        }
        let conn = ws.connect().await?;

        let mut stomp = StompClient::new(conn).with_ack_timeout(self.ack_timeout);
        stomp
            .connect(&self.pubsub.node_name, &nodename, secret.expose())
            .await?;
        stomp.subscribe(&self.topic, SUBSCRIPTION_ID).await?;

        info!(node = %self.pubsub.node_name, "Subscribed to session topic");
        self.stomp = Some(stomp);
        Ok(())
    }

    /// Next message body as JSON. `Ok(None)` means the broker closed the
    /// channel cleanly.
    ///
    /// # Errors
    /// [`PxgridError::MalformedMessage`] for a body that is not JSON (the
    /// channel stays usable); transport and broker errors otherwise.
    pub async fn read_message(&mut self) -> PxgridResult<Option<Value>> {
        let stomp = self.stomp.as_mut().ok_or(PxgridError::NotConnected)?;
        let Some(frame) = stomp.next_message().await? else {
            debug!("Session topic closed by peer");
            self.stomp = None;
            return Ok(None);
        };
        serde_json::from_slice(&frame.body)
            .map(Some)
            .map_err(|e| PxgridError::MalformedMessage(e.to_string()))
    }

    /// Disconnect. Safe to call when not connected.
    ///
    /// # Errors
    /// Returns the socket close failure, if any.
    pub async fn close(&mut self) -> PxgridResult<()> {
        if let Some(mut stomp) = self.stomp.take() {
            stomp.close().await?;
            debug!("Session topic channel closed");
        }
        Ok(())
    }
}

impl std::fmt::Debug for SessionPubsub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPubsub")
            .field("ws_url", &self.ws_url)
            .field("topic", &self.topic)
            .field("node", &self.pubsub.node_name)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}
