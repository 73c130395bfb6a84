//! YAML configuration.
//!
//! Keys follow the deployed `config.yaml` layout; everything added since
//! is optional.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use igm_core::IgmError;
use igm_mapper::{
    CsvInventory, DEFAULT_CACHE_EXPIRE, IdentityGroupMapper, MemoryCacheStore, ProfileMap,
    ProfileSelector, ProfileShape,
};
use igm_meraki::{MerakiClient, MerakiResult};
use igm_pxgrid::{ControlPlaneClient, ControlPlaneConfig, DEFAULT_CONTROL_PORT, PxgridResult};
use igm_telemetry::TelemetryConfig;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::Cli;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

/// Default inventory CSV path.
pub const DEFAULT_NETWORKS_PATH: &str = "config/networks.csv";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML for this schema
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The values are inconsistent or incomplete
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for IgmError {
    fn from(err: ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}

/// Bridge configuration.
#[derive(Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub pxgrid_host: String,
    #[serde(default = "default_port")]
    pub pxgrid_port: u16,
    #[serde(default)]
    pub pxgrid_nodename: String,
    #[serde(default)]
    pub pxgrid_password: Option<String>,
    #[serde(default)]
    pub pxgrid_description: Option<String>,
    #[serde(default)]
    pub pxgrid_client_cert: Option<PathBuf>,
    #[serde(default)]
    pub pxgrid_client_key: Option<PathBuf>,
    #[serde(default)]
    pub pxgrid_ca_cert: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub pxgrid_ca_verify: bool,

    #[serde(default)]
    pub meraki_api_key: String,
    #[serde(default)]
    pub meraki_base_url: Option<String>,

    #[serde(default = "default_networks_path")]
    pub networks_file_path: PathBuf,

    /// Profile name to group policy id. YAML integers are accepted.
    #[serde(default, deserialize_with = "group_ids")]
    pub profile_map: BTreeMap<String, String>,
    #[serde(default)]
    pub profile_field: Option<String>,
    #[serde(default)]
    pub profile_shape: Option<ProfileShape>,

    #[serde(default = "default_cache_expire_secs")]
    pub cache_expire_secs: u64,

    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub json_logs: bool,
}

const fn default_port() -> u16 {
    DEFAULT_CONTROL_PORT
}

const fn default_true() -> bool {
    true
}

fn default_networks_path() -> PathBuf {
    PathBuf::from(DEFAULT_NETWORKS_PATH)
}

const fn default_cache_expire_secs() -> u64 {
    DEFAULT_CACHE_EXPIRE.as_secs()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GroupId {
    Text(String),
    Number(i64),
}

fn group_ids<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, GroupId>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(profile, id)| {
            let id = match id {
                GroupId::Text(text) => text,
                GroupId::Number(n) => n.to_string(),
            };
            (profile, id)
        })
        .collect())
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("pxgrid_host", &self.pxgrid_host)
            .field("pxgrid_port", &self.pxgrid_port)
            .field("pxgrid_nodename", &self.pxgrid_nodename)
            .field(
                "pxgrid_password",
                &self.pxgrid_password.as_ref().map(|_| "[REDACTED]"),
            )
            .field("pxgrid_client_cert", &self.pxgrid_client_cert)
            .field("pxgrid_ca_cert", &self.pxgrid_ca_cert)
            .field("pxgrid_ca_verify", &self.pxgrid_ca_verify)
            .field("meraki_api_key", &"[REDACTED]")
            .field("meraki_base_url", &self.meraki_base_url)
            .field("networks_file_path", &self.networks_file_path)
            .field("profile_map", &self.profile_map)
            .field("profile_field", &self.profile_field)
            .field("profile_shape", &self.profile_shape)
            .field("cache_expire_secs", &self.cache_expire_secs)
            .finish_non_exhaustive()
    }
}

impl BridgeConfig {
    /// Read, parse and validate a configuration file.
    ///
    /// # Errors
    /// Fails when the file cannot be read, does not parse, or does not
    /// validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    /// Parse and validate YAML text.
    ///
    /// # Errors
    /// Fails when the text does not parse or does not validate.
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check required keys and TLS consistency.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pxgrid_host.trim().is_empty() {
            return Err(ConfigError::Invalid("pxgrid_host is required".into()));
        }
        if self.pxgrid_nodename.trim().is_empty() {
            return Err(ConfigError::Invalid("pxgrid_nodename is required".into()));
        }
        if self.meraki_api_key.trim().is_empty() {
            return Err(ConfigError::Invalid("meraki_api_key is required".into()));
        }
        if self.pxgrid_client_cert.is_some() != self.pxgrid_client_key.is_some() {
            return Err(ConfigError::Invalid(
                "pxgrid_client_cert and pxgrid_client_key must be set together".into(),
            ));
        }
        if self.pxgrid_ca_verify && self.pxgrid_ca_cert.is_none() {
            return Err(ConfigError::Invalid(
                "pxgrid_ca_verify is true but pxgrid_ca_cert is not set".into(),
            ));
        }
        if self.profile_field.as_deref().is_some_and(|f| f.trim().is_empty()) {
            return Err(ConfigError::Invalid("profile_field must not be empty".into()));
        }
        Ok(())
    }

    /// Apply command-line overrides.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(networks) = &cli.networks {
            self.networks_file_path.clone_from(networks);
        }
        if let Some(level) = &cli.log_level {
            self.log_level = Some(level.clone());
        }
        if cli.json_logs {
            self.json_logs = true;
        }
    }

    /// Control-plane connection settings.
    #[must_use]
    pub fn control_plane(&self) -> ControlPlaneConfig {
        let mut config = ControlPlaneConfig::new(&self.pxgrid_host, &self.pxgrid_nodename)
            .with_ca_verify(self.pxgrid_ca_verify);
        config.port = self.pxgrid_port;
        config.password.clone_from(&self.pxgrid_password);
        config.description.clone_from(&self.pxgrid_description);
        if let (Some(cert), Some(key)) = (&self.pxgrid_client_cert, &self.pxgrid_client_key) {
            config = config.with_client_identity(cert, key);
        }
        if let Some(ca) = &self.pxgrid_ca_cert {
            config = config.with_ca_cert(ca);
        }
        config
    }

    /// Control-plane client for these settings.
    ///
    /// # Errors
    /// Fails when the TLS material cannot be loaded.
    pub fn control_plane_client(&self) -> PxgridResult<ControlPlaneClient> {
        ControlPlaneClient::new(self.control_plane())
    }

    /// Network-controller client for these settings.
    ///
    /// # Errors
    /// Fails when the HTTP client cannot be built.
    pub fn meraki_client(&self) -> MerakiResult<MerakiClient> {
        let client = MerakiClient::new(self.meraki_api_key.as_str())?;
        Ok(match &self.meraki_base_url {
            Some(url) => client.with_base_url(url),
            None => client,
        })
    }

    /// Profile field and shape. An unset field takes the usual field for
    /// the shape.
    #[must_use]
    pub fn profile_selector(&self) -> ProfileSelector {
        let shape = self.profile_shape.unwrap_or_default();
        match &self.profile_field {
            Some(field) => ProfileSelector::new(field.trim(), shape),
            None => match shape {
                ProfileShape::Single => ProfileSelector::endpoint_profile(),
                ProfileShape::List => ProfileSelector::authz_profiles(),
                ProfileShape::CommaSeparated => ProfileSelector::roles(),
            },
        }
    }

    #[must_use]
    pub fn profile_map(&self) -> ProfileMap {
        ProfileMap::from_pairs(self.profile_map.iter().map(|(k, v)| (k, v.clone())))
    }

    #[must_use]
    pub const fn cache_expire(&self) -> Duration {
        Duration::from_secs(self.cache_expire_secs)
    }

    /// Mapper over an in-memory cache and the CSV inventory.
    #[must_use]
    pub fn mapper(&self) -> IdentityGroupMapper {
        IdentityGroupMapper::new(
            Arc::new(MemoryCacheStore::new()),
            Arc::new(CsvInventory::new(&self.networks_file_path)),
            self.profile_map(),
        )
        .with_selector(self.profile_selector())
        .with_expire(self.cache_expire())
    }

    /// Logging settings.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryConfig {
        let config = TelemetryConfig::new("igm-bridge").with_json_logs(self.json_logs);
        match &self.log_level {
            Some(level) => config.with_log_level(level.as_str()),
            None => config,
        }
    }
}
