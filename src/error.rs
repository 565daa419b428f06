use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found or could not be read: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON document: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid time format '{0}', expected HH:MM in 24h range")]
    InvalidTimeFormat(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Rate limited by upstream: {0}")]
    RateLimited(String),

    #[error("Upstream server error: {0}")]
    ServerError(String),

    #[error("No element found for selector category '{category}': {message}")]
    ElementNotFound { category: String, message: String },

    #[error("Circuit breaker is open, request rejected")]
    CircuitOpen,

    #[error("No eligible slot pair: {0}")]
    NoEligiblePair(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Booking validation failed: {0}")]
    ValidationError(String),

    #[error("Page driver error: {0}")]
    Driver(String),
}

impl Error {
    /// A driver failure that is classified later by its message text.
    pub fn driver(message: impl Into<String>) -> Self {
        Error::Driver(message.into())
    }

    pub fn element_not_found(category: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ElementNotFound { category: category.into(), message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
