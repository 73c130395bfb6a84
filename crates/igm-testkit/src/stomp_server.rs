//! Scripted STOMP-over-WebSocket broker for one client connection.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use igm_streaming::{StompCommand, StompFrame};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};

/// How the broker answers CONNECT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectReply {
    /// CONNECTED with `version:1.2`.
    Connected,
    /// ERROR with the given `message` header.
    Reject(String),
    /// Nothing; the client's ack timeout should fire.
    Silent,
}

/// One frame sent after SUBSCRIBE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    /// MESSAGE on the subscribed destination with this body.
    Message(String),
    /// A bare EOL heart-beat.
    Heartbeat,
    /// A WebSocket ping.
    Ping,
    /// RECEIPT for the given id.
    Receipt(String),
    /// ERROR with the given `message` header.
    Error(String),
}

/// What happens after the last step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptEnd {
    /// Send a WebSocket close frame.
    Close,
    /// Drop the TCP connection without a close handshake.
    Drop,
    /// Keep the connection open until the client leaves.
    Hold,
}

/// Broker behaviour for one session.
#[derive(Debug, Clone)]
pub struct StompScript {
    reply: ConnectReply,
    steps: Vec<ScriptStep>,
    end: ScriptEnd,
}

impl Default for StompScript {
    fn default() -> Self {
        Self {
            reply: ConnectReply::Connected,
            steps: Vec::new(),
            end: ScriptEnd::Close,
        }
    }
}

impl StompScript {
    /// Accept the session, send nothing, then close.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn reply(mut self, reply: ConnectReply) -> Self {
        self.reply = reply;
        self
    }

    #[must_use]
    pub fn step(mut self, step: ScriptStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Queue a MESSAGE carrying `body`.
    #[must_use]
    pub fn message(self, body: impl Into<String>) -> Self {
        self.step(ScriptStep::Message(body.into()))
    }

    #[must_use]
    pub const fn then_close(mut self) -> Self {
        self.end = ScriptEnd::Close;
        self
    }

    #[must_use]
    pub const fn then_drop(mut self) -> Self {
        self.end = ScriptEnd::Drop;
        self
    }

    #[must_use]
    pub const fn then_hold(mut self) -> Self {
        self.end = ScriptEnd::Hold;
        self
    }
}

/// What the broker saw from the client.
#[derive(Debug, Clone, Default)]
pub struct StompRecording {
    /// `Authorization` header of the WebSocket upgrade.
    pub authorization: Option<String>,
    /// The CONNECT frame.
    pub connect: Option<StompFrame>,
    /// The SUBSCRIBE frame.
    pub subscribe: Option<StompFrame>,
    /// Whether a DISCONNECT frame arrived.
    pub disconnected: bool,
}

impl StompRecording {
    /// Destination of the SUBSCRIBE frame.
    #[must_use]
    pub fn subscribe_destination(&self) -> Option<&str> {
        self.subscribe.as_ref().and_then(|f| f.header("destination"))
    }

    /// A CONNECT header.
    #[must_use]
    pub fn connect_header(&self, key: &str) -> Option<&str> {
        self.connect.as_ref().and_then(|f| f.header(key))
    }
}

/// A broker serving exactly one connection.
pub struct StompServer {
    addr: SocketAddr,
    handle: JoinHandle<StompRecording>,
}

impl StompServer {
    /// Bind to a local port and serve one client with `script`.
    ///
    /// # Panics
    /// Panics if the listener cannot bind.
    pub async fn start(script: StompScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            serve(stream, script).await
        });
        Self { addr, handle }
    }

    /// WebSocket URL of the broker.
    #[must_use]
    pub fn url(&self) -> String {
        format!("ws://{}/pxgrid/ise/pubsub", self.addr)
    }

    /// Wait for the session to end and return what was recorded.
    ///
    /// # Panics
    /// Panics if the broker task panicked (a protocol assertion failed).
    pub async fn finish(self) -> StompRecording {
        self.handle.await.expect("stomp server task")
    }
}

async fn serve(stream: TcpStream, script: StompScript) -> StompRecording {
    let mut recording = StompRecording::default();
    let mut authorization = None;
    let capture = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        authorization = request
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(response)
    };
    let mut ws = accept_hdr_async(stream, capture).await.expect("accept ws");
    recording.authorization = authorization;

    let Some(connect) = next_frame(&mut ws).await else {
        return recording;
    };
    assert_eq!(connect.command, StompCommand::Connect, "first frame must be CONNECT");
    recording.connect = Some(connect);

    match &script.reply {
        ConnectReply::Connected => {
            send(&mut ws, "CONNECTED\nversion:1.2\nsession:test-session\nheart-beat:0,0\n\n\0").await;
        }
        ConnectReply::Reject(message) => {
            let error = StompFrame::new(StompCommand::Error).with_header("message", message.as_str());
            let _ = ws.send(Message::Binary(error.encode().into())).await;
            drain(&mut ws, &mut recording).await;
            return recording;
        }
        ConnectReply::Silent => {
            drain(&mut ws, &mut recording).await;
            return recording;
        }
    }

    let Some(subscribe) = next_frame(&mut ws).await else {
        return recording;
    };
    assert_eq!(
        subscribe.command,
        StompCommand::Subscribe,
        "SUBSCRIBE must follow CONNECTED"
    );
    let destination = subscribe.header("destination").unwrap_or_default().to_string();
    let subscription = subscribe.header("id").unwrap_or_default().to_string();
    recording.subscribe = Some(subscribe);

    for (index, step) in script.steps.iter().enumerate() {
        let message = match step {
            ScriptStep::Message(body) => {
                let frame = StompFrame::new(StompCommand::Message)
                    .with_header("destination", destination.as_str())
                    .with_header("subscription", subscription.as_str())
                    .with_header("message-id", format!("m-{index}"))
                    .with_body(body.as_bytes());
                Message::Binary(frame.encode().into())
            }
            ScriptStep::Heartbeat => Message::Text("\n".into()),
            ScriptStep::Ping => Message::Ping(b"ping".to_vec().into()),
            ScriptStep::Receipt(id) => Message::Binary(
                StompFrame::new(StompCommand::Receipt)
                    .with_header("receipt-id", id.as_str())
                    .encode()
                    .into(),
            ),
            ScriptStep::Error(message) => Message::Binary(
                StompFrame::new(StompCommand::Error)
                    .with_header("message", message.as_str())
                    .encode()
                    .into(),
            ),
        };
        if ws.send(message).await.is_err() {
            return recording;
        }
    }

    match script.end {
        ScriptEnd::Close => {
            let _ = ws.close(None).await;
            drain(&mut ws, &mut recording).await;
        }
        ScriptEnd::Drop => drop(ws),
        ScriptEnd::Hold => drain(&mut ws, &mut recording).await,
    }
    recording
}

async fn send(ws: &mut WebSocketStream<TcpStream>, raw: &str) {
    ws.send(Message::Binary(raw.as_bytes().to_vec().into()))
        .await
        .expect("send frame");
}

/// Next STOMP frame from the client, skipping heart-beats and control
/// messages. `None` once the client has gone.
async fn next_frame(ws: &mut WebSocketStream<TcpStream>) -> Option<StompFrame> {
    while let Some(Ok(message)) = ws.next().await {
        let data = match message {
            Message::Text(text) => text.as_bytes().to_vec(),
            Message::Binary(data) => data.to_vec(),
            Message::Close(_) => return None,
            _ => continue,
        };
        if let Some(frame) = StompFrame::decode(&data).expect("client sent a malformed frame") {
            return Some(frame);
        }
    }
    None
}

/// Read until the client leaves, noting a DISCONNECT.
async fn drain(ws: &mut WebSocketStream<TcpStream>, recording: &mut StompRecording) {
    while let Some(frame) = next_frame(ws).await {
        if frame.command == StompCommand::Disconnect {
            recording.disconnected = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use igm_streaming::{StompClient, WsClient, WsConfig};

    use super::*;

    #[tokio::test]
    async fn test_script_round() {
        let server = StompServer::start(
            StompScript::new()
                .message(r#"{"sessions":[]}"#)
                .step(ScriptStep::Heartbeat)
                .then_hold(),
        )
        .await;

        let ws = WsClient::with_config(server.url(), WsConfig::new().with_basic_auth("node", "pw"))
            .connect()
            .await
            .expect("connect");
        let mut client = StompClient::new(ws);
        client.connect("ise-pubsub", "node", "pw").await.expect("stomp connect");
        client.subscribe("/topic/s", "sub-0").await.expect("subscribe");
        let message = client.next_message().await.expect("read").expect("message");
        assert_eq!(message.header("destination"), Some("/topic/s"));
        client.close().await.expect("close");

        let seen = server.finish().await;
        assert_eq!(seen.authorization.as_deref(), Some("Basic bm9kZTpwdw=="));
        assert_eq!(seen.connect_header("host"), Some("ise-pubsub"));
        assert_eq!(seen.subscribe_destination(), Some("/topic/s"));
        assert!(seen.disconnected);
    }
}
