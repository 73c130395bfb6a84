//! IGM Test Kit - Mock infrastructure for the bridge and its connectors
//!
//! - [`MockApiServer`] - wiremock-backed control plane and network-controller API
//! - [`StompServer`] - scripted STOMP-over-WebSocket broker
//! - Tracing configuration for test output
//!
//! # Example
//!
//! ```rust,ignore
//! use igm_testkit::{MockApiServer, StompScript, StompServer};
//!
//! #[tokio::test]
//! async fn test_subscribe() {
//!     igm_testkit::init_test_tracing();
//!
//!     let control = MockApiServer::start().await;
//!     control.expect_account_enabled().await;
//!
//!     let broker = StompServer::start(
//!         StompScript::new().message(r#"{"sessions":[]}"#).then_close(),
//!     )
//!     .await;
//!     // ... point the client at control.control_url() and broker.url()
//!     let seen = broker.finish().await;
//!     assert_eq!(seen.subscribe_destination(), Some("/topic/com.cisco.ise.session"));
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod mock_server;
mod stomp_server;
mod tracing_config;

pub use mock_server::*;
pub use stomp_server::*;
pub use tracing_config::*;
