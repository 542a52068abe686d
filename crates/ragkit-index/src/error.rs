use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Index not built: call build_index() or load_index() first")]
    NotBuilt,

    #[error("Index artifact not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Dimension mismatch: expected vectors of width {expected}, got shape {shape:?}")]
    DimensionMismatch { expected: usize, shape: Vec<usize> },

    #[error("Identifier count mismatch: {vectors} vectors but {ids} ids")]
    IdCountMismatch { vectors: usize, ids: usize },

    #[error("Stored identifier map does not match the index: {vectors} vectors but {ids} ids")]
    MetaMismatch { vectors: usize, ids: usize },

    #[error("Malformed index file: {0}")]
    Format(String),

    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type IndexResult<T> = Result<T, IndexError>;
