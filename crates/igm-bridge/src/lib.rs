//! IGM Bridge - Maps live session events to network group policies
//!
//! Wires the control-plane session feed, the identity-group mapper and the
//! network-controller provisioner into one dispatch loop:
//!
//! ```text
//! SessionPubsub ──▶ SessionDispatchLoop ──▶ IdentityGroupMapper ──▶ Provisioner
//!                                              (cache, inventory)
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use igm_bridge::{BridgeConfig, run_session_bridge};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = BridgeConfig::load("config/config.yaml")?;
//! let control = Arc::new(config.control_plane_client()?);
//! let end = run_session_bridge(
//!     control,
//!     config.mapper(),
//!     Arc::new(config.meraki_client()?),
//!     CancellationToken::new(),
//! )
//! .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod bridge;
mod cli;
mod config;
mod dispatch;

pub use bridge::*;
pub use cli::*;
pub use config::*;
pub use dispatch::*;
