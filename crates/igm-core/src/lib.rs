//! IGM Core - Shared types for the identity group mapper
//!
//! This crate holds the vocabulary every other crate in the workspace speaks:
//!
//! - **Session events**: decoded pub/sub or webhook payloads and their records
//! - **Mapped actions**: the (network, MAC, identity, group) decision
//! - **Cached mappings**: the canonical dedup record stored per MAC
//! - **Provisioning seam**: the [`Provisioner`] trait implemented by controllers
//! - **Error taxonomy**: [`IgmError`] and the [`ErrorClass`] it reduces to

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod action;
mod error;
mod provision;
mod session;

pub use action::*;
pub use error::*;
pub use provision::*;
pub use session::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
