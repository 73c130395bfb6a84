//! IGM pxGrid Connector
//!
//! Client side of the identity services control plane:
//!
//! - Account activation with Fibonacci backoff
//! - Service lookup and access secrets
//! - The session service and its STOMP-over-WebSocket topic
//!
//! The control plane answers JSON POSTs under `https://<host>:8910/pxgrid/control/`,
//! authenticated with a client certificate or with the node name and password.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod client;
mod config;
mod error;
mod pubsub;
mod service;

pub use client::ControlPlaneClient;
pub use config::{ControlPlaneConfig, DEFAULT_CONTROL_PORT};
pub use error::{PxgridError, PxgridResult};
pub use pubsub::SessionPubsub;
pub use service::{AccessSecret, SESSION_SERVICE, ServiceDescriptor, SessionService, UserGroup};
