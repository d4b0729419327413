//! Error types for multiup-hosts.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HostError>;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("unknown host: {0}")]
    NotFound(String),

    #[error("invalid host descriptor '{id}': {reason}")]
    Invalid { id: String, reason: String },

    #[error("host configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("malformed host table: {0}")]
    Toml(#[from] toml::de::Error),
}

impl HostError {
    pub(crate) fn invalid(id: &str, reason: impl Into<String>) -> Self {
        HostError::Invalid {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}
