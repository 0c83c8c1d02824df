//! Error types for ringfield
//!
//! Only the configuration boundary produces errors. The per-frame path
//! recovers locally: an empty pool skips a cell, a broken configuration
//! yields zero density, and a stale handle resolves to "not found".

use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
