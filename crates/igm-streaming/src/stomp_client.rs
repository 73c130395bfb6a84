//! Subscribe-only STOMP client over a WebSocket connection.

use std::time::Duration;

use tracing::{debug, warn};

use crate::{
    DEFAULT_ACK_TIMEOUT, Inbound, StompCommand, StompFrame, StreamError, StreamResult,
    WsConnection,
};

/// Client lifecycle. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StompState {
    /// WebSocket open, no STOMP session yet.
    Disconnected,
    /// CONNECTED received.
    Connected,
    /// SUBSCRIBE sent; MESSAGE frames may arrive.
    Subscribed,
    /// Closed locally, by the broker, or after a fatal error.
    Closed,
}

/// STOMP session driver.
pub struct StompClient {
    conn: WsConnection,
    state: StompState,
    ack_timeout: Duration,
    session: Option<String>,
}

impl StompClient {
    /// Wrap an open WebSocket connection.
    #[must_use]
    pub const fn new(conn: WsConnection) -> Self {
        Self {
            conn,
            state: StompState::Disconnected,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            session: None,
        }
    }

    /// Set how long to wait for CONNECTED.
    #[must_use]
    pub const fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> StompState {
        self.state
    }

    /// Session id reported by the broker in CONNECTED, if any.
    #[must_use]
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    /// Send CONNECT and wait for CONNECTED.
    ///
    /// # Errors
    /// Fails on a wrong state, a send failure, an ERROR frame, any other
    /// frame before CONNECTED, a close, or the ack timeout elapsing.
    pub async fn connect(&mut self, host: &str, login: &str, passcode: &str) -> StreamResult<()> {
        self.expect_state(StompState::Disconnected, "connect")?;
        self.send_frame(&StompFrame::connect(host, login, passcode))
            .await?;

        let frame = match tokio::time::timeout(self.ack_timeout, self.next_frame()).await {
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => {
                self.state = StompState::Closed;
                return Err(StreamError::Socket("closed before CONNECTED".into()));
            }
            Ok(Err(err)) => {
                self.state = StompState::Closed;
                return Err(err);
            }
            Err(_) => {
                self.state = StompState::Closed;
                return Err(StreamError::Timeout(self.ack_timeout));
            }
        };

        if frame.command != StompCommand::Connected {
            self.state = StompState::Closed;
            return Err(StreamError::UnexpectedFrame {
                expected: StompCommand::Connected.to_string(),
                actual: frame.command.to_string(),
            });
        }

        self.session = frame.header("session").map(str::to_string);
        debug!(
            host,
            version = frame.header("version").unwrap_or("?"),
            session = self.session.as_deref().unwrap_or(""),
            "STOMP session established"
        );
        self.state = StompState::Connected;
        Ok(())
    }

    /// Subscribe to a destination.
    ///
    /// # Errors
    /// Fails unless connected, or when the frame cannot be sent.
    pub async fn subscribe(&mut self, destination: &str, id: &str) -> StreamResult<()> {
        self.expect_state(StompState::Connected, "subscribe")?;
        self.send_frame(&StompFrame::subscribe(destination, id))
            .await?;
        debug!(destination, id, "STOMP subscription sent");
        self.state = StompState::Subscribed;
        Ok(())
    }

    /// Wait for the next MESSAGE frame.
    ///
    /// `Ok(None)` signals a clean remote close. Heart-beats, RECEIPT frames
    /// and ping/pong are consumed silently.
    ///
    /// # Errors
    /// An ERROR frame yields [`StreamError::Broker`]; socket and framing
    /// failures are returned as-is. Both close the client.
    pub async fn next_message(&mut self) -> StreamResult<Option<StompFrame>> {
        if self.state == StompState::Closed {
            return Ok(None);
        }
        self.expect_state(StompState::Subscribed, "read")?;

        loop {
            let frame = match self.next_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    self.state = StompState::Closed;
                    return Ok(None);
                }
                Err(err) => {
                    self.state = StompState::Closed;
                    return Err(err);
                }
            };

            match frame.command {
                StompCommand::Message => return Ok(Some(frame)),
                StompCommand::Receipt => {
                    debug!(receipt = frame.header("receipt-id").unwrap_or(""), "Skipping RECEIPT");
                }
                other => warn!(command = %other, "Ignoring unexpected STOMP frame"),
            }
        }
    }

    /// Send DISCONNECT and close the socket. Safe to call repeatedly.
    ///
    /// # Errors
    /// Returns the WebSocket close failure, if any.
    pub async fn close(&mut self) -> StreamResult<()> {
        if self.state == StompState::Closed {
            return self.conn.close().await;
        }
        self.state = StompState::Closed;
        if !self.conn.is_closed() {
            if let Err(err) = self.send_frame(&StompFrame::disconnect()).await {
                debug!(error = %err, "DISCONNECT not delivered");
            }
        }
        self.conn.close().await
    }

    fn expect_state(&self, expected: StompState, op: &str) -> StreamResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(StreamError::InvalidState(format!(
                "cannot {op} in state {:?}",
                self.state
            )))
        }
    }

    async fn send_frame(&mut self, frame: &StompFrame) -> StreamResult<()> {
        self.conn.send_binary(frame.encode()).await
    }

    /// Next decoded frame, skipping transport-level noise. An ERROR frame is
    /// turned into [`StreamError::Broker`].
    async fn next_frame(&mut self) -> StreamResult<Option<StompFrame>> {
        loop {
            let Some(message) = self.conn.recv().await? else {
                return Ok(None);
            };
            let frame = match message {
                Inbound::Data(data) => StompFrame::decode(&data)?,
                Inbound::Closed { code, reason } => {
                    debug!(?code, %reason, "WebSocket closed by peer");
                    return Ok(None);
                }
            };
            let Some(frame) = frame else {
                continue;
            };
            if frame.command == StompCommand::Error {
                let message = frame
                    .header("message")
                    .map_or_else(|| frame.body_text(), str::to_string);
                return Err(StreamError::Broker { message });
            }
            return Ok(Some(frame));
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::Message;

    use super::*;
    use crate::WsClient;

    /// Accept one connection, check CONNECT, then play `script` back.
    async fn serve(script: Vec<Message>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let first = ws.next().await.unwrap().unwrap();
            let connect = StompFrame::decode(&first.into_data()).unwrap().unwrap();
            assert_eq!(connect.command, StompCommand::Connect);
            for message in script {
                if ws.send(message).await.is_err() {
                    return;
                }
            }
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
            }
        });
        format!("ws://{addr}/pubsub")
    }

    fn frame(raw: &str) -> Message {
        Message::Binary(raw.as_bytes().to_vec().into())
    }

    #[tokio::test]
    async fn test_connect_subscribe_and_read() {
        let url = serve(vec![
            frame("CONNECTED\nversion:1.2\nsession:s-1\n\n\0"),
            Message::Text("\n".into()),
            Message::Ping(Vec::new().into()),
            frame("RECEIPT\nreceipt-id:1\n\n\0"),
            frame("MESSAGE\ndestination:/topic/s\nsubscription:sub-0\n\n{\"sessions\":[]}\0"),
        ])
        .await;

        let conn = WsClient::new(url).connect().await.unwrap();
        let mut client = StompClient::new(conn);
        client.connect("broker", "node", "pw").await.unwrap();
        assert_eq!(client.state(), StompState::Connected);
        assert_eq!(client.session(), Some("s-1"));
        client.subscribe("/topic/s", "sub-0").await.unwrap();

        let msg = client.next_message().await.unwrap().unwrap();
        assert_eq!(msg.body_text(), r#"{"sessions":[]}"#);

        client.close().await.unwrap();
        client.close().await.unwrap();
        assert_eq!(client.state(), StompState::Closed);
        assert!(client.next_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_error_frame_during_handshake() {
        let url = serve(vec![frame("ERROR\nmessage:bad credentials\n\n\0")]).await;
        let conn = WsClient::new(url).connect().await.unwrap();
        let mut client = StompClient::new(conn);
        let err = client.connect("broker", "node", "pw").await.unwrap_err();
        assert!(matches!(err, StreamError::Broker { ref message } if message == "bad credentials"));
        assert_eq!(client.state(), StompState::Closed);
    }

    #[tokio::test]
    async fn test_ack_timeout() {
        let url = serve(Vec::new()).await;
        let conn = WsClient::new(url).connect().await.unwrap();
        let mut client = StompClient::new(conn).with_ack_timeout(Duration::from_millis(100));
        let err = client.connect("broker", "node", "pw").await.unwrap_err();
        assert!(matches!(err, StreamError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_remote_close_ends_reading() {
        let url = serve(vec![
            frame("CONNECTED\nversion:1.2\n\n\0"),
            Message::Close(None),
        ])
        .await;
        let conn = WsClient::new(url).connect().await.unwrap();
        let mut client = StompClient::new(conn);
        client.connect("broker", "node", "pw").await.unwrap();
        client.subscribe("/topic/s", "sub-0").await.unwrap();
        assert!(client.next_message().await.unwrap().is_none());
        assert_eq!(client.state(), StompState::Closed);
    }

    #[tokio::test]
    async fn test_subscribe_requires_connect() {
        let url = serve(Vec::new()).await;
        let conn = WsClient::new(url).connect().await.unwrap();
        let mut client = StompClient::new(conn);
        let err = client.subscribe("/topic/s", "sub-0").await.unwrap_err();
        assert!(matches!(err, StreamError::InvalidState(_)));
    }
}
