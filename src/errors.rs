use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Config(String),
    #[error("cache file {} is corrupt: {reason}", path.display())]
    CacheCorrupt { path: PathBuf, reason: String },
    #[error("geocoding request failed with HTTP {status}: {body}")]
    LookupTransport { status: u16, body: String },
    #[error("geocoding quota or permission issue ({status}): {message}")]
    QuotaOrPermission { status: String, message: String },
    #[error("unexpected geocoding status {status}: {message}")]
    UnexpectedProviderStatus { status: String, message: String },
}

impl AppError {
    /// Errors raised mid-batch that must stop the run.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            AppError::Http(_)
                | AppError::LookupTransport { .. }
                | AppError::QuotaOrPermission { .. }
                | AppError::UnexpectedProviderStatus { .. }
        )
    }
}
