#[derive(Debug, thiserror::Error)]
pub enum DeckforgeError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Catalog error: {0}")]
    Upstream(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Import queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Duplicate deck: {0}")]
    Duplicate(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<duckdb::Error> for DeckforgeError {
    fn from(e: duckdb::Error) -> Self {
        DeckforgeError::Persistence(e.to_string())
    }
}

impl From<reqwest::Error> for DeckforgeError {
    fn from(e: reqwest::Error) -> Self {
        DeckforgeError::Upstream(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DeckforgeError>;
