//! Error types for tslgen-report.

use std::path::PathBuf;

use thiserror::Error;
use tslgen_core::CoreError;

#[derive(Debug, Error)]
pub enum ReportError {
    /// A graph query failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A report could not be written.
    #[error("failed to write '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}
