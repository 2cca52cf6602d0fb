use std::net::SocketAddr;

use thiserror::Error;

use crate::cache::{CacheBackend, CacheError};

/// Failures of the process around the cache: listener, store, logging.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("http server stopped: {0}")]
    Serve(#[source] std::io::Error),
    #[error("{backend} cache store unavailable: {source}")]
    Store {
        backend: CacheBackend,
        #[source]
        source: CacheError,
    },
    #[error("failed to purge cached `{resource}` responses: {source}")]
    Purge {
        resource: String,
        #[source]
        source: CacheError,
    },
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}

impl InfraError {
    pub fn bind(addr: SocketAddr, source: std::io::Error) -> Self {
        Self::Bind { addr, source }
    }

    pub fn store(backend: CacheBackend, source: CacheError) -> Self {
        Self::Store { backend, source }
    }

    pub fn purge(resource: impl Into<String>, source: CacheError) -> Self {
        Self::Purge {
            resource: resource.into(),
            source,
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
