//! Error taxonomy.
//!
//! # Propagation
//! ```text
//! SizeLimitExceeded   → returned from resolve_includes (caller-visible)
//! parse anomalies     → span kept as literal text, logged at debug
//! FetchError          → fallback src → inline fallback → error content
//! CacheError          → logged, treated as a cache miss
//! ```

use std::time::Duration;

use http::StatusCode;

/// Failure of a whole resolution call.
#[derive(Debug, thiserror::Error)]
pub enum TransclusionError {
    /// Markup exceeds `max_markup_bytes`; checked before parsing.
    #[error("markup size {size} bytes exceeds limit of {limit} bytes")]
    SizeLimitExceeded { size: usize, limit: usize },

    /// The outbound HTTP client could not be constructed.
    #[error("failed to build fragment client: {0}")]
    Client(String),
}

/// Failure fetching one fragment source. Never escapes the resolver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("fragment request timed out after {0:?}")]
    Timeout(Duration),

    #[error("fragment request failed: {0}")]
    Network(String),

    #[error("fragment returned non-success status {0}")]
    Status(u16),

    #[error("invalid fragment url: {0}")]
    InvalidUrl(String),

    /// The enclosing request was aborted while this fragment was pending.
    #[error("fragment resolution aborted")]
    Aborted,
}

impl FetchError {
    /// Status reported for an error fragment in place of the failed source.
    pub fn status_code(&self) -> StatusCode {
        match self {
            FetchError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            FetchError::Network(_) | FetchError::InvalidUrl(_) => StatusCode::BAD_GATEWAY,
            FetchError::Status(code) => {
                StatusCode::from_u16(*code).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            FetchError::Aborted => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Short label used for metrics and stats.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout(_) => "timeout",
            FetchError::Network(_) => "network",
            FetchError::Status(_) => "status",
            FetchError::InvalidUrl(_) => "invalid_url",
            FetchError::Aborted => "aborted",
        }
    }
}

/// Internal cache fault. Logged and treated as a miss.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("entry of {size} bytes exceeds cache capacity of {capacity} bytes")]
    EntryTooLarge { size: usize, capacity: usize },
}
