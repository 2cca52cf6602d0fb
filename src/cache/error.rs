use thiserror::Error;

/// Failures of the cache layer. Never surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store unavailable: {message}")]
    Unavailable { message: String },
    #[error("cache payload could not be serialized: {message}")]
    Serialization { message: String },
}

impl CacheError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Short label used for log fields and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "unavailable",
            Self::Serialization { .. } => "serialization",
        }
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(error: redis::RedisError) -> Self {
        Self::unavailable(error.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(error: serde_json::Error) -> Self {
        Self::serialization(error.to_string())
    }
}
