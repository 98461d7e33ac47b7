use thiserror::Error;

/// Store failures. `NotFound` is the only recoverable outcome — component
/// methods surface it as `Ok(None)` where a miss is expected, or as this
/// error where it is not. Everything else is fatal for the transaction.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found")]
    NotFound,

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("database schema version {found} is newer than supported version {supported}")]
    VersionTooNew { found: u32, supported: u32 },

    #[error("database schema version {found} is older than the oldest upgradable version {oldest}")]
    VersionTooOld { found: u32, oldest: u32 },
}

impl From<heed::Error> for StoreError {
    fn from(error: heed::Error) -> Self {
        Self::Backend(error.to_string())
    }
}

impl From<bincode::Error> for StoreError {
    fn from(error: bincode::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}
