use crate::provider::ProviderError;
use crate::search::relevance::OutputParseError;

/// Error taxonomy for the sync/search pipeline.
///
/// `InvalidInput` always surfaces to the caller; the web layer maps the
/// remaining variants per route (see `web.rs`).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("model output rejected: {0}")]
    Parse(#[from] OutputParseError),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("talent {0} not found")]
    NotFound(i64),
}

pub type Result<T> = std::result::Result<T, CoreError>;
