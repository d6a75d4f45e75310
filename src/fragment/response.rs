//! Fragment response value.

use std::time::Duration;

use chrono::Utc;
use http::{HeaderMap, StatusCode};

use crate::fragment::cache_control::CachePolicy;
use crate::fragment::client::FetchedFragment;

/// Resolved content for one include. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentResponse {
    pub status: StatusCode,
    pub body: String,
    pub headers: HeaderMap,
    pub cacheable: bool,
    /// Remaining cacheable lifetime; zero when not cacheable.
    pub ttl: Duration,
}

impl FragmentResponse {
    /// Build from a successful fetch, deriving the TTL from the fragment's own
    /// cache directives or `default_ttl` when it has none.
    pub fn from_fetched(fetched: FetchedFragment, default_ttl: Duration) -> Self {
        let policy = CachePolicy::from_headers(&fetched.headers, Utc::now());
        let ttl = match policy {
            CachePolicy::Unspecified => Some(default_ttl).filter(|ttl| !ttl.is_zero()),
            other => other.ttl(),
        };

        Self {
            status: fetched.status,
            body: fetched.body,
            headers: fetched.headers,
            cacheable: ttl.is_some(),
            ttl: ttl.unwrap_or(Duration::ZERO),
        }
    }

    /// Inline fallback markup. Never cached.
    pub fn inline(content: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            body: content.into(),
            headers: HeaderMap::new(),
            cacheable: false,
            ttl: Duration::ZERO,
        }
    }

    /// Configured error content standing in for a failed fragment.
    pub fn error(status: StatusCode, content: impl Into<String>) -> Self {
        Self {
            status,
            ..Self::inline(content)
        }
    }

    /// Copy with a different remaining lifetime.
    pub fn with_ttl(&self, ttl: Duration) -> Self {
        Self {
            ttl,
            ..self.clone()
        }
    }

    /// Approximate memory footprint used for cache capacity accounting.
    pub fn size_bytes(&self) -> usize {
        let headers: usize = self
            .headers
            .iter()
            .map(|(name, value)| name.as_str().len() + value.len())
            .sum();
        self.body.len() + headers
    }
}
