use thiserror::Error;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// Local store failure (quota, corruption, store not initialized).
    /// Non-fatal: callers may retry the operation later.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Transient network failure, retried by the sync managers up to
    /// the attempt cap.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Session expired or credentials invalid. Retrying is pointless
    /// until the user re-authenticates, so sync batches abort for the
    /// cycle on this error.
    #[error("Not authenticated")]
    Unauthorized,

    /// The server denied access to a resource (e.g. a chapter beyond
    /// the free preview). Downloads treat this as skip, not error.
    #[error("No access: {0}")]
    NoAccess(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether this failure consumes retry budget in the sync queue.
    /// Authorization failures do not: the remaining batch is aborted
    /// for the cycle instead.
    pub fn counts_against_retries(&self) -> bool {
        !matches!(self, AppError::Unauthorized)
    }
}

/// Result type alias for the application.
pub type Result<T> = std::result::Result<T, AppError>;
