//! IGM Streaming - Persistent transport plumbing for the session feed
//!
//! This crate provides:
//!
//! - **TLS**: rustls client contexts from PEM material, with an explicit
//!   verification toggle
//! - **WebSocket**: client connections with custom TLS and handshake headers
//! - **STOMP**: 1.2 frame codec and a small subscribe-only client state machine
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use igm_streaming::{StompClient, TlsSettings, WsClient, WsConfig};
//!
//! let tls = TlsSettings::new().with_ca_cert("ca.pem").client_config()?;
//! let ws = WsClient::with_config(url, WsConfig::new().with_basic_auth("node", "secret"))
//!     .with_tls(tls)
//!     .connect()
//!     .await?;
//! let mut stomp = StompClient::new(ws);
//! stomp.connect("broker-node", "node", "secret").await?;
//! stomp.subscribe("/topic/sessions", "sub-0").await?;
//! while let Some(frame) = stomp.next_message().await? {
//!     println!("{}", frame.body_text());
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod stomp;
mod stomp_client;
mod tls;
mod websocket;

pub use error::*;
pub use stomp::*;
pub use stomp_client::*;
pub use tls::*;
pub use websocket::*;

use std::time::Duration;

/// Default WebSocket connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time to wait for the broker's CONNECTED frame.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);
