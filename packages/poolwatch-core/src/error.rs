//! Error taxonomy shared by the pool operations and the reconciliation engine.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PoolError>;

#[derive(Debug, Error)]
pub enum PoolError {
    /// Text that is not four dot-separated octets in 0-255
    #[error("malformed address '{0}'")]
    MalformedAddress(String),

    /// Bulk insert request that is not `a.b.c.d` or `a.b.c.S-E`
    #[error("invalid range spec '{spec}': {reason}")]
    InvalidRangeSpec { spec: String, reason: String },

    #[error("address {0} is already in the pool")]
    DuplicateAddress(String),

    #[error("no pool entry for {0}")]
    NotFound(String),

    /// The link-layer discovery tool could not run or reported failure
    #[error("link-layer discovery unavailable: {0}")]
    DiscoveryUnavailable(String),

    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

impl PoolError {
    pub(crate) fn invalid_range(spec: &str, reason: impl Into<String>) -> Self {
        PoolError::InvalidRangeSpec {
            spec: spec.to_string(),
            reason: reason.into(),
        }
    }
}
