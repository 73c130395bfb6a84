//! WebSocket transport under the STOMP client.
//!
//! Only what a subscribe-only consumer needs: a handshake with optional
//! HTTP Basic credentials and a custom TLS context, binary sends, and a
//! receive side that hides ping/pong.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::{SinkExt, StreamExt};
use rustls::ClientConfig;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config};
use tracing::{debug, trace};
use url::Url;

use crate::{DEFAULT_CONNECT_TIMEOUT, StreamError, StreamResult};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Something the peer sent that the STOMP layer cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Payload of a text or binary message.
    Data(Vec<u8>),
    /// The peer sent a close frame.
    Closed { code: Option<u16>, reason: String },
}

#[derive(Clone)]
struct BasicAuth {
    user: String,
    password: String,
}

/// Handshake settings.
#[derive(Clone)]
pub struct WsConfig {
    pub connect_timeout: Duration,
    basic_auth: Option<BasicAuth>,
}

impl fmt::Debug for WsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsConfig")
            .field("connect_timeout", &self.connect_timeout)
            .field("basic_auth_user", &self.basic_auth.as_ref().map(|a| a.user.as_str()))
            .finish()
    }
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            basic_auth: None,
        }
    }
}

impl WsConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Send `Authorization: Basic base64(user:password)` with the upgrade.
    #[must_use]
    pub fn with_basic_auth(mut self, user: &str, password: &str) -> Self {
        self.basic_auth = Some(BasicAuth {
            user: user.to_string(),
            password: password.to_string(),
        });
        self
    }

    /// Value of the handshake `Authorization` header, if any.
    #[must_use]
    pub fn authorization(&self) -> Option<String> {
        self.basic_auth.as_ref().map(|auth| {
            let token = BASE64.encode(format!("{}:{}", auth.user, auth.password));
            format!("Basic {token}")
        })
    }
}

/// Connects to one WebSocket endpoint.
pub struct WsClient {
    url: String,
    config: WsConfig,
    tls: Option<Arc<ClientConfig>>,
}

impl WsClient {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_config(url, WsConfig::default())
    }

    #[must_use]
    pub fn with_config(url: impl Into<String>, config: WsConfig) -> Self {
        Self {
            url: url.into(),
            config,
            tls: None,
        }
    }

    /// TLS context for `wss://` URLs. Without one the platform roots are
    /// used.
    #[must_use]
    pub fn with_tls(mut self, tls: ClientConfig) -> Self {
        self.tls = Some(Arc::new(tls));
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Perform the handshake.
    ///
    /// # Errors
    /// [`StreamError::Connect`] for a bad URL or credentials that
    /// cannot form a header, [`StreamError::Timeout`] when the handshake
    /// outlasts the connect timeout, and [`StreamError::Socket`]
    /// when it is refused.
    pub async fn connect(&self) -> StreamResult<WsConnection> {
        let refuse = |reason: String| StreamError::Connect {
            url: self.url.clone(),
            reason,
        };
        let url = Url::parse(&self.url).map_err(|e| refuse(e.to_string()))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(refuse("not a WebSocket URL".into()));
        }

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| refuse(e.to_string()))?;
        if let Some(authorization) = self.config.authorization() {
            let value = HeaderValue::from_str(&authorization)
                .map_err(|e| refuse(format!("authorization header: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let connector = self.tls.clone().map(Connector::Rustls);
        debug!(%url, custom_tls = connector.is_some(), "Opening WebSocket");

        let (socket, response) = tokio::time::timeout(
            self.config.connect_timeout,
            connect_async_tls_with_config(request, None, false, connector),
        )
        .await
        .map_err(|_| StreamError::Timeout(self.config.connect_timeout))?
        .map_err(|e| StreamError::Socket(e.to_string()))?;
        debug!(status = %response.status(), "WebSocket upgraded");

        Ok(WsConnection {
            socket,
            closed: false,
        })
    }
}

/// An open WebSocket.
pub struct WsConnection {
    socket: Socket,
    closed: bool,
}

impl WsConnection {
    /// Send one binary message.
    ///
    /// # Errors
    /// [`StreamError::InvalidState`] after close; the socket error otherwise.
    pub async fn send_binary(&mut self, data: impl Into<Vec<u8>>) -> StreamResult<()> {
        if self.closed {
            return Err(StreamError::InvalidState("WebSocket is closed".into()));
        }
        let data: Vec<u8> = data.into();
        self.socket
            .send(Message::binary(data))
            .await
            .map_err(|e| StreamError::Socket(e.to_string()))
    }

    /// Next data message or close notice. Ping and pong are consumed here
    /// (pongs are queued by the socket itself). `Ok(None)` once the stream
    /// has ended or after a close.
    ///
    /// # Errors
    /// The socket error, e.g. a reset without a closing handshake.
    pub async fn recv(&mut self) -> StreamResult<Option<Inbound>> {
        while !self.closed {
            let Some(message) = self.socket.next().await else {
                self.closed = true;
                return Ok(None);
            };
            match message.map_err(|e| StreamError::Socket(e.to_string()))? {
                Message::Text(text) => return Ok(Some(Inbound::Data(text.as_bytes().to_vec()))),
                Message::Binary(data) => return Ok(Some(Inbound::Data(data.to_vec()))),
                Message::Close(frame) => {
                    self.closed = true;
                    let (code, reason) = frame.map_or((None, String::new()), |f| {
                        (Some(u16::from(f.code)), f.reason.to_string())
                    });
                    return Ok(Some(Inbound::Closed { code, reason }));
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
                    trace!("WebSocket control message");
                }
            }
        }
        Ok(None)
    }

    /// Start the closing handshake. Safe to call repeatedly.
    ///
    /// # Errors
    /// The socket error if the close frame cannot be sent.
    pub async fn close(&mut self) -> StreamResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.socket
            .close(None)
            .await
            .map_err(|e| StreamError::Socket(e.to_string()))
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }
}
