use thiserror::Error;

/// Error taxonomy for the fingerprinting/matching core.
///
/// Variants map directly onto the error kinds named in the system design:
/// decode failures and store failures are per-item and get logged and
/// swallowed by the pipeline; `InvalidFilter`/`InvalidConfig` are rejected
/// immediately to the caller; `Cancelled` marks cooperative shutdown.
#[derive(Debug, Error)]
pub enum SabiError {
    #[error("failed to decode audio file: {0}")]
    Decode(String),

    #[error("acquisition failed: {0}")]
    Acquisition(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<diesel::result::Error> for SabiError {
    fn from(e: diesel::result::Error) -> Self {
        SabiError::Store(e.to_string())
    }
}

impl From<diesel::ConnectionError> for SabiError {
    fn from(e: diesel::ConnectionError) -> Self {
        SabiError::Store(e.to_string())
    }
}

impl From<diesel::r2d2::PoolError> for SabiError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        SabiError::Store(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SabiError>;
