//! IGM Meraki Connector - Client provisioning on the network controller
//!
//! Applies a [`MappedAction`](igm_core::MappedAction) by provisioning the
//! client's MAC into a group policy on its network.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use igm_core::Provisioner;
//! use igm_meraki::MerakiClient;
//!
//! let meraki = MerakiClient::new(api_key)?;
//! meraki.provision(&action).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod client;
mod error;
mod types;

pub use client::{DEFAULT_BASE_URL, MerakiClient};
pub use error::{MerakiError, MerakiResult};
pub use types::{DevicePolicy, ProvisionClient, ProvisionRequest};
