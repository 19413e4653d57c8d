//! Error taxonomy for the assembly engine

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Fatal at startup: the catalog source is unreadable or malformed.
    #[error("catalog load failed: {0}")]
    CatalogLoad(String),

    /// Recoverable: the requested document type does not exist.
    #[error("unknown document type '{requested}' (available: {})", .available.join(", "))]
    UnknownDocType {
        requested: String,
        available: Vec<String>,
    },

    /// Recovered per-turn: treated as "no new answers this turn".
    #[error("answer extraction failed: {0}")]
    Extraction(String),

    /// Recoverable: the session stays ready and the render may be retried.
    #[error("document rendering failed: {0}")]
    Render(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
