//! IGM Telemetry - logging setup for the identity group mapper.
//!
//! One call to [`init_logging`] installs a stderr subscriber, either
//! human-readable or one JSON object per line. Payloads exchanged with the
//! control plane pass through a [`Redactor`] before they reach the log.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use igm_telemetry::{init_logging, TelemetryConfig};
//!
//! init_logging(&TelemetryConfig::new("igm-bridge").with_json_logs(true))?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod logging;
mod redact;

pub use logging::*;
pub use redact::*;
