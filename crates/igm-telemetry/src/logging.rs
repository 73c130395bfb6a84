//! Subscriber installation.
//!
//! The filter comes from `RUST_LOG` when set, otherwise from
//! [`TelemetryConfig::filter_directive`].

use std::io::{self, IsTerminal};

use thiserror::Error;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Dependencies whose debug output drowns the bridge's own.
pub const NOISY_TARGETS: &[&str] = &[
    "hyper",
    "h2",
    "reqwest",
    "rustls",
    "tungstenite",
    "tokio_tungstenite",
];

const DEFAULT_LEVEL: &str = "info";

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter {directive:?}: {reason}")]
    InvalidFilter { directive: String, reason: String },

    #[error("A global subscriber is already installed: {0}")]
    AlreadyInstalled(String),
}

/// What [`init_logging`] installs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// Base level or a full `EnvFilter` directive.
    pub log_level: String,
    pub json_logs: bool,
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            log_level: DEFAULT_LEVEL.to_string(),
            json_logs: false,
        }
    }

    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    #[must_use]
    pub const fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    /// The configured level with [`NOISY_TARGETS`] capped at `warn`.
    ///
    /// A directive the operator already scoped to one of those targets wins.
    #[must_use]
    pub fn filter_directive(&self) -> String {
        let level = self.log_level.trim();
        let mut parts = vec![if level.is_empty() { DEFAULT_LEVEL } else { level }.to_string()];
        parts.extend(
            NOISY_TARGETS
                .iter()
                .filter(|target| !level.contains(&format!("{target}=")))
                .map(|target| format!("{target}=warn")),
        );
        parts.join(",")
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_NAME"))
    }
}

/// Parse the filter for `config`. `RUST_LOG` overrides the configured level.
pub fn build_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    let directive = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(env) if !env.trim().is_empty() => env,
        _ => config.filter_directive(),
    };
    EnvFilter::try_new(&directive).map_err(|err| TelemetryError::InvalidFilter {
        directive,
        reason: err.to_string(),
    })
}

/// Install the global subscriber. Output goes to stderr.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = build_filter(config)?;

    let layer: Box<dyn Layer<Registry> + Send + Sync> = if config.json_logs {
        fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(io::stderr)
            .with_filter(filter)
            .boxed()
    } else {
        fmt::layer()
            .compact()
            .with_ansi(io::stderr().is_terminal())
            .with_writer(io::stderr)
            .with_filter(filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|err| TelemetryError::AlreadyInstalled(err.to_string()))?;

    tracing::info!(
        service = %config.service_name,
        version = env!("CARGO_PKG_VERSION"),
        json = config.json_logs,
        "Logging initialised"
    );
    Ok(())
}
