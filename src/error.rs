use reqwest::StatusCode;
use thiserror::Error;

/// Failures on the artifact transfer path.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("remote returned {0}")]
    Status(StatusCode),
    #[error("transfer failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("a transfer is already in progress on this fetcher")]
    AlreadyInFlight,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures surfaced from the generation engine.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("engine returned {0}")]
    Status(StatusCode),
    #[error("engine request failed: {0}")]
    Transport(#[from] reqwest::Error),
}
