//! STOMP 1.2 frame codec.
//!
//! A frame is `COMMAND EOL *(header EOL) EOL body NUL`. Header values are
//! escaped (`\\`, `\n`, `\r`, `\c`) on every frame except CONNECT and
//! CONNECTED. A bare EOL is a heart-beat and decodes to `None`.

use std::fmt;
use std::str::FromStr;

use crate::{StreamError, StreamResult};

/// STOMP protocol version spoken by this client.
pub const STOMP_VERSION: &str = "1.2";

/// The STOMP commands a subscribing client sends or receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StompCommand {
    // Client frames
    Connect,
    Subscribe,
    Disconnect,
    // Server frames
    Connected,
    Message,
    Receipt,
    Error,
}

impl StompCommand {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Subscribe => "SUBSCRIBE",
            Self::Disconnect => "DISCONNECT",
            Self::Connected => "CONNECTED",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// CONNECT and CONNECTED headers are sent verbatim.
    const fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl fmt::Display for StompCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StompCommand {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CONNECT" => Self::Connect,
            "SUBSCRIBE" => Self::Subscribe,
            "DISCONNECT" => Self::Disconnect,
            "CONNECTED" => Self::Connected,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            other => return Err(StreamError::Frame(format!("unknown command {other:?}"))),
        })
    }
}

/// One STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    /// Frame command.
    pub command: StompCommand,
    /// Headers in wire order.
    pub headers: Vec<(String, String)>,
    /// Frame body.
    pub body: Vec<u8>,
}

impl StompFrame {
    /// Create an empty frame.
    #[must_use]
    pub const fn new(command: StompCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// CONNECT frame for a broker virtual host with login credentials.
    #[must_use]
    pub fn connect(host: &str, login: &str, passcode: &str) -> Self {
        Self::new(StompCommand::Connect)
            .with_header("accept-version", STOMP_VERSION)
            .with_header("host", host)
            .with_header("login", login)
            .with_header("passcode", passcode)
    }

    /// SUBSCRIBE frame.
    #[must_use]
    pub fn subscribe(destination: &str, id: &str) -> Self {
        Self::new(StompCommand::Subscribe)
            .with_header("destination", destination)
            .with_header("id", id)
    }

    /// DISCONNECT frame.
    #[must_use]
    pub const fn disconnect() -> Self {
        Self::new(StompCommand::Disconnect)
    }

    /// First value of a header. Repeated headers keep the first occurrence.
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Body as text, lossily decoded.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Encode to wire bytes, NUL-terminated.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let escape = self.command.escapes_headers();
        let mut out = Vec::with_capacity(64 + self.body.len());
        out.extend_from_slice(self.command.as_str().as_bytes());
        out.push(b'\n');
        for (key, value) in &self.headers {
            if escape {
                out.extend_from_slice(escape_header(key).as_bytes());
                out.push(b':');
                out.extend_from_slice(escape_header(value).as_bytes());
            } else {
                out.extend_from_slice(key.as_bytes());
                out.push(b':');
                out.extend_from_slice(value.as_bytes());
            }
            out.push(b'\n');
        }
        if !self.body.is_empty() && self.header("content-length").is_none() {
            out.extend_from_slice(format!("content-length:{}\n", self.body.len()).as_bytes());
        }
        out.push(b'\n');
        out.extend_from_slice(&self.body);
        out.push(0);
        out
    }

    /// Decode one frame. Returns `Ok(None)` for a heart-beat (only EOLs).
    ///
    /// # Errors
    /// Returns [`StreamError::Frame`] for an unknown command, a header line
    /// without `:`, an invalid escape, a missing NUL terminator, or a
    /// `content-length` that overruns the data.
    pub fn decode(data: &[u8]) -> StreamResult<Option<Self>> {
        let start = data
            .iter()
            .position(|b| *b != b'\n' && *b != b'\r')
            .unwrap_or(data.len());
        let data = &data[start..];
        if data.is_empty() {
            return Ok(None);
        }

        let mut pos = 0;
        let command_line = next_line(data, &mut pos)?;
        let command: StompCommand = command_line.parse()?;
        let escaped = command.escapes_headers();

        let mut headers = Vec::new();
        loop {
            let line = next_line(data, &mut pos)?;
            if line.is_empty() {
                break;
            }
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| StreamError::Frame(format!("header without ':' {line:?}")))?;
            if escaped {
                headers.push((unescape_header(key)?, unescape_header(value)?));
            } else {
                headers.push((key.to_string(), value.to_string()));
            }
        }

        let rest = &data[pos..];
        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| StreamError::Frame(format!("invalid content-length {v:?}")))
            })
            .transpose()?;

        let body = match content_length {
            Some(len) => {
                if rest.len() < len + 1 || rest[len] != 0 {
                    return Err(StreamError::Frame(format!(
                        "content-length {len} does not match a NUL-terminated body"
                    )));
                }
                rest[..len].to_vec()
            }
            None => {
                let end = rest
                    .iter()
                    .position(|b| *b == 0)
                    .ok_or_else(|| StreamError::Frame("missing NUL terminator".into()))?;
                rest[..end].to_vec()
            }
        };

        Ok(Some(Self {
            command,
            headers,
            body,
        }))
    }
}

/// Read one EOL-terminated line (`\n` or `\r\n`) starting at `pos`.
fn next_line<'a>(data: &'a [u8], pos: &mut usize) -> StreamResult<&'a str> {
    let rest = &data[*pos..];
    let end = rest
        .iter()
        .position(|b| *b == b'\n')
        .ok_or_else(|| StreamError::Frame("truncated frame header".into()))?;
    *pos += end + 1;
    let line = rest[..end].strip_suffix(b"\r").unwrap_or(&rest[..end]);
    std::str::from_utf8(line).map_err(|e| StreamError::Frame(e.to_string()))
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(raw: &str) -> StreamResult<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(StreamError::Frame(format!(
                    "invalid header escape \\{}",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_connect_is_unescaped() {
        let frame = StompFrame::connect("ise-psn", "bridge", "se:cret");
        let wire = String::from_utf8(frame.encode()).unwrap();
        assert_eq!(
            wire,
            "CONNECT\naccept-version:1.2\nhost:ise-psn\nlogin:bridge\npasscode:se:cret\n\n\0"
        );
    }

    #[test]
    fn test_encode_subscribe_escapes_values() {
        let frame = StompFrame::subscribe("/topic/a:b", "sub-0");
        let wire = String::from_utf8(frame.encode()).unwrap();
        assert_eq!(wire, "SUBSCRIBE\ndestination:/topic/a\\cb\nid:sub-0\n\n\0");
    }

    #[test]
    fn test_decode_message_with_content_length() {
        let body = br#"{"sessions":[]}"#;
        let mut wire = format!(
            "MESSAGE\r\ndestination:/topic/com.cisco.ise.session\r\ncontent-length:{}\r\n\r\n",
            body.len()
        )
        .into_bytes();
        wire.extend_from_slice(body);
        wire.extend_from_slice(b"\0\n");

        let frame = StompFrame::decode(&wire).unwrap().unwrap();
        assert_eq!(frame.command, StompCommand::Message);
        assert_eq!(
            frame.header("destination"),
            Some("/topic/com.cisco.ise.session")
        );
        assert_eq!(frame.body, body);
    }

    #[test]
    fn test_decode_body_until_nul() {
        let frame = StompFrame::decode(b"\nRECEIPT\nreceipt-id:77\n\nok\0")
            .unwrap()
            .unwrap();
        assert_eq!(frame.command, StompCommand::Receipt);
        assert_eq!(frame.header("receipt-id"), Some("77"));
        assert_eq!(frame.body_text(), "ok");
    }

    #[test]
    fn test_decode_heartbeat() {
        assert_eq!(StompFrame::decode(b"\n").unwrap(), None);
        assert_eq!(StompFrame::decode(b"\r\n\r\n").unwrap(), None);
        assert_eq!(StompFrame::decode(b"").unwrap(), None);
    }

    #[test]
    fn test_decode_unescapes_and_keeps_first_repeated_header() {
        let frame = StompFrame::decode(b"ERROR\nmessage:bad\\cthing\\nhere\nmessage:second\n\n\0")
            .unwrap()
            .unwrap();
        assert_eq!(frame.header("message"), Some("bad:thing\nhere"));
    }

    #[test]
    fn test_decode_rejects_bad_frames() {
        assert!(StompFrame::decode(b"BOGUS\n\n\0").is_err());
        assert!(StompFrame::decode(b"SEND\n\n\0").is_err());
        assert!(StompFrame::decode(b"MESSAGE\nno-colon\n\n\0").is_err());
        assert!(StompFrame::decode(b"MESSAGE\n\nbody-without-nul").is_err());
        assert!(StompFrame::decode(b"MESSAGE\ncontent-length:50\n\nshort\0").is_err());
        assert!(StompFrame::decode(b"MESSAGE\nk:bad\\x\n\n\0").is_err());
    }

    #[test]
    fn test_encode_adds_content_length_for_body() {
        let frame = StompFrame::new(StompCommand::Message)
            .with_header("destination", "/topic/a")
            .with_body("hello");
        let decoded = StompFrame::decode(&frame.encode()).unwrap().unwrap();
        assert_eq!(decoded.header("content-length"), Some("5"));
        assert_eq!(decoded.body_text(), "hello");
    }
}
