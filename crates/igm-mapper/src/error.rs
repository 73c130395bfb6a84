//! Mapper error types.

use std::path::PathBuf;

use igm_core::IgmError;

/// Errors raised while mapping sessions.
#[derive(Debug, thiserror::Error)]
pub enum MapperError {
    /// The cache store failed.
    #[error("cache error: {0}")]
    Cache(String),

    /// The inventory source could not be read.
    #[error("inventory {path} unreadable: {message}")]
    Inventory {
        /// Inventory location.
        path: PathBuf,
        /// Underlying failure.
        message: String,
    },
}

impl MapperError {
    /// Convert to the workspace error type. Both kinds are transient: the
    /// next event retries the cache and the inventory.
    #[must_use]
    pub fn to_igm_error(&self) -> IgmError {
        match self {
            Self::Cache(message) => IgmError::Cache {
                message: message.clone(),
            },
            Self::Inventory { .. } => IgmError::External {
                service: "inventory".into(),
                message: self.to_string(),
                status_code: None,
            },
        }
    }
}

impl From<MapperError> for IgmError {
    fn from(err: MapperError) -> Self {
        err.to_igm_error()
    }
}

/// Result type for mapper operations.
pub type MapperResult<T> = Result<T, MapperError>;
