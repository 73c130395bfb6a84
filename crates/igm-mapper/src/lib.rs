//! IGM Mapper - Decide which group a live session belongs in
//!
//! This crate turns [`SessionEvent`](igm_core::SessionEvent)s into
//! [`MappedAction`](igm_core::MappedAction)s:
//!
//! - **Profile selection**: which field carries the profile and in what shape
//! - **Network resolution**: first-match CIDR lookup over an inventory table
//! - **Dedup**: suppress actions whose canonical record is already cached
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use igm_mapper::{CsvInventory, IdentityGroupMapper, MemoryCacheStore, ProfileMap};
//!
//! let mapper = IdentityGroupMapper::new(
//!     Arc::new(MemoryCacheStore::new()),
//!     Arc::new(CsvInventory::new("config/networks.csv")),
//!     ProfileMap::from_pairs([("Guest", "100")]),
//! );
//! let actions = mapper.map(&event).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod cache;
mod error;
mod mapper;
mod network;
mod profile;

pub use cache::*;
pub use error::*;
pub use mapper::*;
pub use network::*;
pub use profile::*;

use std::time::Duration;

/// Default lifetime of client mappings and the cached network table.
pub const DEFAULT_CACHE_EXPIRE: Duration = Duration::from_secs(8 * 60 * 60);

/// Cache key of the serialized network table.
pub const NETWORKS_CACHE_KEY: &str = "networks";
